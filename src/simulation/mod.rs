//! # Simulation: the global clock and the synthetic sample generators.
//!
//! [`SimulationClock`] owns the process-wide "simulation on/off" flag and the
//! triangle wave. Generators implementing [`Synthesize`] turn `(now, cycle)` into a
//! device sample:
//!
//! - [`TestPattern`] renders camera frames ([`PatternKind::Orbit`] for the rear slot,
//!   [`PatternKind::Sweep`] for the front slot);
//! - [`TelemetryWaveform`] produces adapter readings.

mod clock;
mod pattern;
mod waveform;

use std::time::SystemTime;

pub use clock::{triangle, SimulationClock, CYCLE_PERIOD, IDLE_CYCLE};
pub use pattern::{PatternKind, TestPattern};
pub use waveform::TelemetryWaveform;

/// Produces a synthetic sample for a device.
///
/// Implementations must be pure in `(now, cycle)`.
pub trait Synthesize: Send + Sync + 'static {
    /// Sample type the generator emits.
    type Sample: Clone + Send + Sync + 'static;

    fn synthesize(&self, now: SystemTime, cycle: f64) -> Self::Sample;
}
