//! Simulation-vs-hardware arbitration.
//!
//! ```text
//! global clock active ───────────────────────────────► simulate
//! device.simulation == false ────────────────────────► real
//! maintenance && allow_real_override && probe Found ─► real (this iteration)
//! otherwise ─────────────────────────────────────────► simulate
//! ```
//!
//! The decision is a pure function; the probe result is produced by the caller and
//! injected, so the supervisor owns every side effect.

use crate::config::Mode;
use crate::core::DeviceParams;

/// Outcome of the maintenance-mode presence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Preconditions not met; nothing was checked.
    NotAttempted,
    /// Hardware answered (or is already held open).
    Found,
    /// Hardware is not there.
    Absent,
}

/// True when the supervisor should check for real hardware this iteration.
pub fn should_probe(device: &DeviceParams, mode: Mode, global_active: bool) -> bool {
    mode == Mode::Maintenance && device.simulation && device.allow_real_override && !global_active
}

/// Decides whether this iteration uses synthetic data.
pub fn decide_use_simulation(
    device: &DeviceParams,
    mode: Mode,
    global_active: bool,
    probe: Probe,
) -> bool {
    if global_active {
        return true;
    }
    if !device.simulation {
        return false;
    }
    let overridden =
        mode == Mode::Maintenance && device.allow_real_override && probe == Probe::Found;
    !overridden
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::Target;
    use std::time::Duration;

    fn device(simulation: bool, allow_real_override: bool) -> DeviceParams {
        DeviceParams {
            name: "camera_rear".into(),
            target: Target::Video(0),
            simulation,
            allow_real_override,
            cadence: Duration::from_millis(33),
            poll_interval: Duration::ZERO,
            read_failure: "Failed to grab frame",
        }
    }

    #[test]
    fn global_clock_forces_simulation() {
        for probe in [Probe::NotAttempted, Probe::Found, Probe::Absent] {
            assert!(decide_use_simulation(&device(false, false), Mode::Operational, true, probe));
            assert!(decide_use_simulation(&device(true, true), Mode::Maintenance, true, probe));
        }
        assert!(!should_probe(&device(true, true), Mode::Maintenance, true));
    }

    #[test]
    fn real_device_ignores_probe() {
        let d = device(false, true);
        assert!(!decide_use_simulation(&d, Mode::Maintenance, false, Probe::Absent));
        assert!(!should_probe(&d, Mode::Maintenance, false));
    }

    #[test]
    fn override_needs_all_conditions() {
        let d = device(true, true);
        assert!(should_probe(&d, Mode::Maintenance, false));
        assert!(!decide_use_simulation(&d, Mode::Maintenance, false, Probe::Found));
        assert!(decide_use_simulation(&d, Mode::Maintenance, false, Probe::Absent));

        assert!(!should_probe(&d, Mode::Operational, false));
        assert!(decide_use_simulation(&d, Mode::Operational, false, Probe::Found));

        let locked = device(true, false);
        assert!(!should_probe(&locked, Mode::Maintenance, false));
        assert!(decide_use_simulation(&locked, Mode::Maintenance, false, Probe::Found));
    }
}
