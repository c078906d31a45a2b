//! Supervision core: arbitration, hysteresis, the per-device loop and the runtime.
//!
//! Internal modules:
//! - [`arbitration`]: pure simulation-vs-hardware decision;
//! - [`report`]: hysteresis filter for status-change events;
//! - [`supervisor`]: one polling loop per device;
//! - [`runtime`]: spawns supervisors, wires subscribers, drives shutdown;
//! - [`shutdown`]: OS signal handling.

pub mod arbitration;
pub mod report;
mod runtime;
mod shutdown;
mod supervisor;

pub use arbitration::{decide_use_simulation, should_probe, Probe};
pub use report::ReportFilter;
pub use runtime::{Runtime, RuntimeBuilder, RuntimeHandle};
pub use shutdown::wait_for_shutdown_signal;
pub use supervisor::{DeviceParams, DeviceSupervisor, SupervisionContext, SIMULATION_MESSAGE};
