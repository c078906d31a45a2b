//! Synthetic adapter telemetry.
//!
//! Every value is a linear map of the clock cycle into a plausible range, so the
//! whole dashboard rises and falls together.

use std::time::SystemTime;

use super::Synthesize;
use crate::devices::{pid, Telemetry};

/// Telemetry synthesizer for the diagnostics adapter slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryWaveform;

impl TelemetryWaveform {
    pub fn new() -> Self {
        Self
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

impl Synthesize for TelemetryWaveform {
    type Sample = Telemetry;

    fn synthesize(&self, now: SystemTime, cycle: f64) -> Telemetry {
        let c = cycle.clamp(0.0, 1.0);
        Telemetry::new(now, true)
            .with(pid::RPM, (800.0 + 6200.0 * c).round(), "rpm")
            .with(pid::SPEED, round1(120.0 * c), "km/h")
            .with(pid::COOLANT_TEMP, round1(20.0 + 90.0 * c), "degC")
            .with(pid::THROTTLE_POS, round1(100.0 * c), "%")
            .with(pid::INTAKE_TEMP, round1(25.0 + 5.0 * c), "degC")
            .with(pid::ELM_VOLTAGE, round1(12.0 + 2.5 * c), "V")
    }
}
