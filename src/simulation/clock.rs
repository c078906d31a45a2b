//! # SimulationClock: process-wide synthetic waveform.
//!
//! A togglable clock producing one value in `[0, 1]` that every device supervisor
//! uses to animate synthetic frames and readings, so all simulated subsystems move
//! in lockstep.
//!
//! ```text
//! cycle
//!  1.0 ┤      ╱╲          ╱╲
//!      │    ╱    ╲      ╱    ╲
//!  0.5 ┤  ╱        ╲  ╱        ╲     (inactive: flat 0.5)
//!      │╱            ╲            ╲
//!  0.0 ┼──────┬──────┬──────┬──────
//!      0    P/2     P     3P/2
//! ```
//!
//! ## Rules
//! - Inactive → `cycle() == 0.5` ("idle" mid-range reading, not zero).
//! - Switching on resets the phase to zero; there is no phase continuity across toggles.
//! - Time comes from `tokio::time::Instant`, so paused test runtimes drive it too.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Waveform period.
pub const CYCLE_PERIOD: Duration = Duration::from_secs(15);

/// Value returned while the clock is inactive.
pub const IDLE_CYCLE: f64 = 0.5;

#[derive(Debug)]
struct ClockState {
    active: bool,
    start: Instant,
}

/// Togglable triangle-wave generator shared by all supervisors.
#[derive(Debug)]
pub struct SimulationClock {
    state: Mutex<ClockState>,
    period: Duration,
}

impl SimulationClock {
    /// Inactive clock with the standard 15 s period.
    pub fn new() -> Self {
        Self::with_period(CYCLE_PERIOD)
    }

    /// Inactive clock with a custom period (clamped to at least 1 ms).
    pub fn with_period(period: Duration) -> Self {
        Self {
            state: Mutex::new(ClockState {
                active: false,
                start: Instant::now(),
            }),
            period: period.max(Duration::from_millis(1)),
        }
    }

    /// Flips the global flag and returns the new value.
    pub fn toggle(&self) -> bool {
        let mut st = self.lock();
        st.active = !st.active;
        if st.active {
            st.start = Instant::now();
        }
        st.active
    }

    /// Sets the flag explicitly. Activation from inactive restarts the phase.
    pub fn set_active(&self, active: bool) {
        let mut st = self.lock();
        if active && !st.active {
            st.start = Instant::now();
        }
        st.active = active;
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Current waveform value.
    pub fn cycle(&self) -> f64 {
        self.cycle_at(Instant::now())
    }

    /// Waveform value at `now`; pure for a fixed `now`.
    pub fn cycle_at(&self, now: Instant) -> f64 {
        let st = self.lock();
        if !st.active {
            return IDLE_CYCLE;
        }
        let elapsed = now.saturating_duration_since(st.start).as_secs_f64();
        let period = self.period.as_secs_f64();
        triangle((elapsed % period) / period)
    }

    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Symmetric triangle over one phase: 0 → 1 at 0.5 → 0.
pub fn triangle(phase: f64) -> f64 {
    1.0 - (2.0 * phase - 1.0).abs()
}
