//! # HealthRegistry: authoritative subsystem name → lifecycle state map.
//!
//! Every device supervisor reports into the registry on every poll cycle; the
//! HTTP layer reads summaries from it. It therefore never fails: unknown names
//! and unparsable states are ignored, and a poisoned lock is recovered.
//!
//! ## Transition rules (`update_status`)
//! ```text
//! update_status(name, state, message?, error?)
//!   ├─ unknown name                                  → ignored
//!   ├─ restart_count ≥ max && state ∉ {ACTIVE,FAULTY} → TransitionBlocked, no change
//!   ├─ state/message/last_update ← request
//!   ├─ error?  → restart_count += 1, last_error ← error       (FailureRecorded)
//!   │            └─ restart_count ≥ max → state ← FAULTY       (MarkedFaulty)
//!   └─ no error && ACTIVE
//!                ├─ restart_count > 0 → restart_count ← 0      (Recovered)
//!                └─ previous state ≠ ACTIVE                    (SteadyState)
//! ```
//!
//! ## Rules
//! - One mutex guards the whole map; the gate check and the increment are atomic.
//! - Events are published after the lock is released.
//! - `reset_subsystem` is the only operation that bypasses the gate.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use crate::events::{Bus, Event, EventKind, Level};
use crate::health::names;
use crate::health::status::{
    HealthSummary, OverallStatus, SubsystemState, SubsystemStatus,
};

/// Subsystems whose FAULTY state fails the whole system rather than degrading it.
pub const CRITICAL_SUBSYSTEMS: [&str; 2] = [names::BACKEND, names::NETWORKING];

/// Message forced onto a subsystem when it reaches the retry cap.
pub const MAX_RETRIES_MESSAGE: &str = "MAX RETRIES EXCEEDED. Supervision stopped.";

const SUPERVISOR_SOURCE: &str = "supervisor";

/// Thread-safe registry of subsystem health.
pub struct HealthRegistry {
    inner: Mutex<HashMap<String, SubsystemStatus>>,
    max_retries: u32,
    bus: Bus,
}

impl HealthRegistry {
    /// Creates a registry with the standard subsystem set and startup defaults:
    /// software subsystems `ACTIVE`, `camera_rear`/`obd` `WAITING`, `camera_front` `DISABLED`.
    pub fn new(max_retries: u32, bus: Bus) -> Self {
        Self::with_subsystems(
            max_retries,
            bus,
            [
                (names::NETWORKING, SubsystemState::Active),
                (names::BACKEND, SubsystemState::Active),
                (names::CAMERA_REAR, SubsystemState::Waiting),
                (names::CAMERA_FRONT, SubsystemState::Disabled),
                (names::OBD, SubsystemState::Waiting),
                (names::LOGGING, SubsystemState::Active),
                (names::SYSTEM, SubsystemState::Active),
            ],
        )
    }

    /// Creates a registry with an explicit, fixed set of subsystems.
    pub fn with_subsystems<'a>(
        max_retries: u32,
        bus: Bus,
        subsystems: impl IntoIterator<Item = (&'a str, SubsystemState)>,
    ) -> Self {
        let map = subsystems
            .into_iter()
            .map(|(name, state)| (name.to_string(), SubsystemStatus::new(name, state)))
            .collect();
        Self {
            inner: Mutex::new(map),
            max_retries,
            bus,
        }
    }

    /// Configured retry cap.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Applies a status report for `name`. See the module docs for the rules.
    pub fn update_status(
        &self,
        name: &str,
        state: SubsystemState,
        message: Option<&str>,
        error: Option<&str>,
    ) {
        let events = {
            let mut map = self.lock();
            let Some(sub) = map.get_mut(name) else {
                return;
            };
            self.apply(sub, state, message, error)
        };
        for ev in events {
            self.bus.publish(ev);
        }
    }

    /// Like [`update_status`](Self::update_status) with a raw state string.
    ///
    /// Unparsable states are ignored.
    pub fn update_status_str(
        &self,
        name: &str,
        state: &str,
        message: Option<&str>,
        error: Option<&str>,
    ) {
        if let Ok(state) = state.parse::<SubsystemState>() {
            self.update_status(name, state, message, error);
        }
    }

    /// Forces `WAITING` with a cleared counter and error, bypassing the gate.
    pub fn reset_subsystem(&self, name: &str) {
        {
            let mut map = self.lock();
            let Some(sub) = map.get_mut(name) else {
                return;
            };
            sub.restart_count = 0;
            sub.state = SubsystemState::Waiting;
            sub.message = Some("Manual reset triggered.".to_string());
            sub.last_error = None;
            sub.last_update = SystemTime::now();
        }
        self.bus.publish(
            Event::new(
                EventKind::ManualReset,
                SUPERVISOR_SOURCE,
                format!("Manual reset triggered for {}", name.to_uppercase()),
            )
            .with_action("Resetting restart counter and state to WAITING"),
        );
    }

    /// True iff the subsystem is known and below its retry cap.
    ///
    /// Available to callers that want to stop reconnecting; the device
    /// supervisors keep trying regardless.
    pub fn should_retry(&self, name: &str) -> bool {
        self.lock()
            .get(name)
            .is_some_and(|s| s.restart_count < self.max_retries)
    }

    /// Current restart count, `None` for unknown names.
    pub fn restart_count(&self, name: &str) -> Option<u32> {
        self.lock().get(name).map(|s| s.restart_count)
    }

    /// Copy of one subsystem record.
    pub fn status(&self, name: &str) -> Option<SubsystemStatus> {
        self.lock().get(name).cloned()
    }

    /// Aggregated health: `FAULTY` if a critical subsystem is faulty, `DEGRADED`
    /// if any other one is, `OK` otherwise.
    pub fn get_health_summary(&self) -> HealthSummary {
        let subsystems: BTreeMap<String, SubsystemStatus> = self
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let faulty = |s: &SubsystemStatus| s.state == SubsystemState::Faulty;
        let status = if CRITICAL_SUBSYSTEMS
            .iter()
            .any(|name| subsystems.get(*name).is_some_and(faulty))
        {
            OverallStatus::Faulty
        } else if subsystems.values().any(faulty) {
            OverallStatus::Degraded
        } else {
            OverallStatus::Ok
        };

        HealthSummary {
            status,
            subsystems,
            timestamp: SystemTime::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SubsystemStatus>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutates one record under the lock; returns the events to publish.
    fn apply(
        &self,
        sub: &mut SubsystemStatus,
        state: SubsystemState,
        message: Option<&str>,
        error: Option<&str>,
    ) -> Vec<Event> {
        let name = sub.name.clone();
        let mut events = Vec::new();

        if sub.restart_count >= self.max_retries
            && !matches!(state, SubsystemState::Active | SubsystemState::Faulty)
        {
            events.push(
                Event::new(
                    EventKind::TransitionBlocked,
                    SUPERVISOR_SOURCE,
                    format!("Transition to {state} blocked for {}", name.to_uppercase()),
                )
                .with_level(Level::Warn)
                .with_reason(format!(
                    "Subsystem exceeded max retries ({})",
                    self.max_retries
                ))
                .with_action(
                    "Maintaining FAULTY state until manual intervention or successful ACTIVE heartbeats",
                ),
            );
            return events;
        }

        let old_state = sub.state;
        sub.state = state;
        sub.message = message.map(str::to_string);
        sub.last_update = SystemTime::now();

        if let Some(error) = error {
            sub.last_error = Some(error.to_string());
            sub.restart_count = sub.restart_count.saturating_add(1);
            events.push(
                Event::new(EventKind::FailureRecorded, name.as_str(), "Subsystem failure detected")
                    .with_level(Level::Error)
                    .with_reason(error)
                    .with_action(format!(
                        "Incrementing restart count ({}/{})",
                        sub.restart_count, self.max_retries
                    )),
            );

            if sub.restart_count >= self.max_retries {
                sub.state = SubsystemState::Faulty;
                sub.message = Some(MAX_RETRIES_MESSAGE.to_string());
                events.push(
                    Event::new(
                        EventKind::MarkedFaulty,
                        SUPERVISOR_SOURCE,
                        format!("Subsystem {} marked as FAULTY", name.to_uppercase()),
                    )
                    .with_level(Level::Critical)
                    .with_reason("Hard failure threshold reached")
                    .with_action("Automatic recovery attempts suspended"),
                );
            }
        } else if state == SubsystemState::Active {
            if sub.restart_count > 0 {
                sub.restart_count = 0;
                events.push(
                    Event::new(EventKind::Recovered, name.as_str(), "Subsystem recovered")
                        .with_reason("Steady state reached")
                        .with_action("Resetting restart counter"),
                );
            }
            if old_state != SubsystemState::Active {
                events.push(
                    Event::new(
                        EventKind::SteadyState,
                        name.as_str(),
                        "Subsystem reached steady state (ACTIVE)",
                    )
                    .with_reason("Health checks passed")
                    .with_action("Monitoring operational data"),
                );
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::broadcast::error::TryRecvError;

    fn registry(max_retries: u32) -> (HealthRegistry, tokio::sync::broadcast::Receiver<Event>) {
        let bus = Bus::new(256);
        let rx = bus.subscribe();
        (HealthRegistry::new(max_retries, bus), rx)
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(ev) => kinds.push(ev.kind),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return kinds,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
    }

    #[test]
    fn startup_defaults() {
        let (reg, _rx) = registry(3);
        let summary = reg.get_health_summary();
        assert_eq!(summary.status, OverallStatus::Ok);
        assert_eq!(summary.subsystems.len(), 7);
        assert_eq!(summary.subsystems["backend"].state, SubsystemState::Active);
        assert_eq!(summary.subsystems["obd"].state, SubsystemState::Waiting);
        assert_eq!(
            summary.subsystems["camera_front"].state,
            SubsystemState::Disabled
        );
    }

    #[test]
    fn retry_cap_forces_faulty_and_blocks_waiting() {
        let (reg, mut rx) = registry(3);

        for n in 1..=3 {
            reg.update_status("obd", SubsystemState::Waiting, None, Some("x"));
            assert_eq!(reg.restart_count("obd"), Some(n));
        }
        let obd = reg.status("obd").unwrap();
        assert_eq!(obd.state, SubsystemState::Faulty);
        assert_eq!(obd.message.as_deref(), Some(MAX_RETRIES_MESSAGE));
        assert_eq!(obd.last_error.as_deref(), Some("x"));
        assert!(!reg.should_retry("obd"));

        drain(&mut rx);
        reg.update_status("obd", SubsystemState::Waiting, None, Some("y"));
        let after = reg.status("obd").unwrap();
        assert_eq!(after.state, SubsystemState::Faulty);
        assert_eq!(after.restart_count, 3);
        assert_eq!(after.last_error.as_deref(), Some("x"));
        assert_eq!(after.last_update, obd.last_update);
        assert_eq!(drain(&mut rx), vec![EventKind::TransitionBlocked]);
    }

    #[test]
    fn manual_reset_escapes_faulty() {
        let (reg, _rx) = registry(3);
        for _ in 0..3 {
            reg.update_status("obd", SubsystemState::Waiting, None, Some("x"));
        }
        reg.reset_subsystem("obd");

        let obd = reg.status("obd").unwrap();
        assert_eq!(obd.state, SubsystemState::Waiting);
        assert_eq!(obd.restart_count, 0);
        assert!(obd.last_error.is_none());
        assert_eq!(obd.message.as_deref(), Some("Manual reset triggered."));
        assert!(reg.should_retry("obd"));
    }

    #[test]
    fn reset_from_any_state() {
        let (reg, _rx) = registry(3);
        for state in [
            SubsystemState::Active,
            SubsystemState::Disabled,
            SubsystemState::Faulty,
        ] {
            reg.update_status("camera_rear", state, None, None);
            reg.reset_subsystem("camera_rear");
            let s = reg.status("camera_rear").unwrap();
            assert_eq!(s.state, SubsystemState::Waiting);
            assert_eq!(s.restart_count, 0);
            assert!(s.last_error.is_none());
        }
    }

    #[test]
    fn active_report_recovers_from_faulty() {
        let (reg, mut rx) = registry(2);
        reg.update_status("camera_rear", SubsystemState::Waiting, None, Some("gone"));
        reg.update_status("camera_rear", SubsystemState::Waiting, None, Some("gone"));
        assert_eq!(
            reg.status("camera_rear").unwrap().state,
            SubsystemState::Faulty
        );
        drain(&mut rx);

        reg.update_status("camera_rear", SubsystemState::Active, None, None);
        let s = reg.status("camera_rear").unwrap();
        assert_eq!(s.state, SubsystemState::Active);
        assert_eq!(s.restart_count, 0);
        assert_eq!(
            drain(&mut rx),
            vec![EventKind::Recovered, EventKind::SteadyState]
        );
    }

    #[test]
    fn active_refresh_is_silent() {
        let (reg, mut rx) = registry(3);
        reg.update_status("obd", SubsystemState::Active, None, None);
        assert_eq!(drain(&mut rx), vec![EventKind::SteadyState]);

        let before = reg.status("obd").unwrap().last_update;
        reg.update_status("obd", SubsystemState::Active, Some("Simulation Mode"), None);
        assert!(drain(&mut rx).is_empty());
        let after = reg.status("obd").unwrap();
        assert!(after.last_update >= before);
        assert_eq!(after.message.as_deref(), Some("Simulation Mode"));
    }

    #[test]
    fn restart_count_is_monotonic_until_recovery() {
        let (reg, _rx) = registry(10);
        let mut last = 0;
        for i in 0..6 {
            let error = (i % 2 == 0).then_some("flap");
            reg.update_status("obd", SubsystemState::Waiting, None, error);
            let now = reg.restart_count("obd").unwrap();
            assert!(now >= last);
            last = now;
        }
        assert_eq!(last, 3);
        reg.update_status("obd", SubsystemState::Active, None, None);
        assert_eq!(reg.restart_count("obd"), Some(0));
    }

    #[test]
    fn unknown_names_and_states_are_ignored() {
        let (reg, mut rx) = registry(3);
        let before = reg.get_health_summary().subsystems;

        reg.update_status("flux_capacitor", SubsystemState::Faulty, None, Some("x"));
        reg.reset_subsystem("flux_capacitor");
        reg.update_status_str("obd", "EXPLODED", None, Some("x"));

        assert!(!reg.should_retry("flux_capacitor"));
        assert!(reg.status("flux_capacitor").is_none());
        assert_eq!(reg.get_health_summary().subsystems, before);
        assert!(drain(&mut rx).is_empty());

        reg.update_status_str("obd", "active", None, None);
        assert_eq!(reg.status("obd").unwrap().state, SubsystemState::Active);
    }

    #[test]
    fn summary_distinguishes_critical_from_optional() {
        let (reg, _rx) = registry(3);
        reg.update_status("obd", SubsystemState::Faulty, None, None);
        assert_eq!(reg.get_health_summary().status, OverallStatus::Degraded);

        reg.update_status("networking", SubsystemState::Faulty, None, None);
        assert_eq!(reg.get_health_summary().status, OverallStatus::Faulty);

        reg.update_status("networking", SubsystemState::Active, None, None);
        reg.update_status("obd", SubsystemState::Active, None, None);
        assert_eq!(reg.get_health_summary().status, OverallStatus::Ok);

        reg.update_status("backend", SubsystemState::Faulty, None, None);
        assert_eq!(reg.get_health_summary().status, OverallStatus::Faulty);
    }

    #[test]
    fn concurrent_updates_do_not_interfere() {
        let reg = Arc::new(HealthRegistry::new(1000, Bus::new(16)));
        std::thread::scope(|s| {
            for name in ["obd", "camera_rear"] {
                for _ in 0..4 {
                    let reg = Arc::clone(&reg);
                    s.spawn(move || {
                        for _ in 0..50 {
                            reg.update_status(name, SubsystemState::Waiting, None, Some("e"));
                        }
                    });
                }
            }
        });
        assert_eq!(reg.restart_count("obd"), Some(200));
        assert_eq!(reg.restart_count("camera_rear"), Some(200));
    }

    #[test]
    fn gate_is_atomic_under_contention() {
        let reg = Arc::new(HealthRegistry::new(3, Bus::new(16)));
        std::thread::scope(|s| {
            for _ in 0..8 {
                let reg = Arc::clone(&reg);
                s.spawn(move || {
                    reg.update_status("obd", SubsystemState::Waiting, None, Some("e"));
                });
            }
        });
        let obd = reg.status("obd").unwrap();
        assert_eq!(obd.restart_count, 3);
        assert_eq!(obd.state, SubsystemState::Faulty);
    }
}
