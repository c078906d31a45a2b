//! Hysteresis for supervisor status reports.
//!
//! Supervisors report on every iteration (up to 30 times a second for a camera),
//! but a status-change event is emitted only when something new happened.

use crate::health::SubsystemState;

/// Remembers the last report and decides whether a new one is news.
#[derive(Debug, Default, Clone)]
pub struct ReportFilter {
    last_state: Option<SubsystemState>,
    last_error: Option<String>,
}

impl ReportFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a report; true when the state differs from the previous report or
    /// a new, distinct error string appears.
    pub fn observe(&mut self, state: SubsystemState, error: Option<&str>) -> bool {
        let state_changed = self.last_state != Some(state);
        let new_error = error.is_some_and(|e| self.last_error.as_deref() != Some(e));

        self.last_state = Some(state);
        if let Some(e) = error {
            self.last_error = Some(e.to_owned());
        } else if state == SubsystemState::Active {
            self.last_error = None;
        }
        state_changed || new_error
    }

    pub fn last_state(&self) -> Option<SubsystemState> {
        self.last_state
    }
}
