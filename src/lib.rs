//! # devicevisor
//!
//! **Devicevisor** supervises unreliable, intermittently-present peripherals (cameras,
//! a vehicle diagnostics adapter) for an embedded dashboard.
//!
//! It guarantees two things to the rest of the application: a coherent health signal
//! from the [`HealthRegistry`], and *some* data to show from every device, real or
//! synthetic.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ camera_rear  │   │ camera_front │   │     obd      │
//!     │ VideoNode +  │   │ VideoNode +  │   │  Elm327 +    │
//!     │ TestPattern  │   │ TestPattern  │   │  Waveform    │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Runtime (composition root)                                       │
//! │  - Bus (broadcast events)                                         │
//! │  - HealthRegistry (subsystem → state, retry gating)               │
//! │  - SimulationClock (global on/off + triangle wave)                │
//! │  - SubscriberSet (fans out to LogWriter and user subscribers)     │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │DeviceSupervi.│   │DeviceSupervi.│   │DeviceSupervi.│
//!     │ (poll loop)  │   │ (poll loop)  │   │ (poll loop)  │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘
//!      │ update_status    │                  │
//!      ├─────────────────►│ HealthRegistry ◄─┤
//!      │ record(...)      │                  │
//!      ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber_listener   │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                              SubscriberSet
//!                         ┌─────────┼─────────┐
//!                         ▼         ▼         ▼
//!                     LogWriter    sub2  …   subN
//! ```
//!
//! ### Device loop
//! ```text
//! loop {
//!   ├─► cancelled? ─► close handle, exit
//!   ├─► decide_use_simulation(device, mode, clock.is_active(), probe)
//!   ├─► simulate ─► synthesize(now, cycle) ─► ACTIVE "Simulation Mode" ─► sleep(cadence)
//!   ├─► open(target) fails ─► WAITING + error ─► sleep(backoff)
//!   └─► read(handle)
//!         ├─ None ─► close, WAITING + error ─► sleep(backoff)
//!         └─ Some ─► cache, ACTIVE ─► sleep(poll_interval)
//! }
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Health**        | Per-subsystem state with retry gating and self-healing.      | [`HealthRegistry`], [`SubsystemState`]      |
//! | **Supervision**   | One polling loop per device, arbitration, hysteresis.        | [`DeviceSupervisor`], [`ReportFilter`]      |
//! | **Simulation**    | Global clock and deterministic synthetic samples.            | [`SimulationClock`], [`Synthesize`]         |
//! | **Hardware**      | Seam to real devices plus reference backends.                | [`Hardware`], [`VideoNode`], [`Elm327`]     |
//! | **Subscriber API**| Hook into events (logging, alerting).                        | [`Subscribe`], [`LogWriter`]                |
//! | **Policies**      | Reconnection backoff and jitter.                             | [`BackoffPolicy`], [`JitterPolicy`]         |
//! | **Runtime**       | Spawning, signals, graceful shutdown.                        | [`Runtime`], [`RuntimeBuilder`]             |
//! | **Configuration** | YAML + environment settings.                                 | [`Settings`]                                |
//! | **Errors**        | Typed errors.                                                | [`HardwareError`], [`ConfigError`], [`RuntimeError`] |
//!
//! ## Example
//! ```rust
//! use devicevisor::{Bus, HealthRegistry, OverallStatus, SubsystemState};
//!
//! let registry = HealthRegistry::new(3, Bus::new(64));
//! for _ in 0..3 {
//!     registry.update_status("obd", SubsystemState::Waiting, None, Some("no adapter"));
//! }
//! assert_eq!(registry.status("obd").unwrap().state, SubsystemState::Faulty);
//! assert_eq!(registry.get_health_summary().status, OverallStatus::Degraded);
//!
//! registry.reset_subsystem("obd");
//! assert_eq!(registry.status("obd").unwrap().restart_count, 0);
//! ```
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use devicevisor::{Elm327, LogWriter, RuntimeBuilder, Settings, TelemetryWaveform};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load(None)?;
//!     let mut rt = RuntimeBuilder::from_settings(&settings)
//!         .with_subscribers(vec![Arc::new(LogWriter::new().verbose(settings.verbose()))])
//!         .build();
//!     let obd = rt.supervise(Elm327::new(), TelemetryWaveform, settings.obd_params());
//!     rt.run().await?;
//!     println!("{:?}", obd.latest_value());
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod devices;
mod error;
mod events;
mod hardware;
mod health;
mod policies;
mod simulation;
mod subscribers;

// ---- Public re-exports ----

pub use crate::config::{
    discover, env_source, CameraSettings, Mode, ObdSettings, RuntimeSettings, Settings,
    SupervisionSettings, CAMERA_READ_FAILURE, CONFIG_FILES, ENV_PREFIX, MAX_SECONDS, OBD_READ_FAILURE,
};
pub use crate::core::{
    decide_use_simulation, should_probe, wait_for_shutdown_signal, DeviceParams,
    DeviceSupervisor, Probe, ReportFilter, Runtime, RuntimeBuilder, RuntimeHandle,
    SupervisionContext, SIMULATION_MESSAGE,
};
pub use devices::{pid, DeviceStatus, DeviceView, Frame, PixelFormat, Reading, Telemetry};
pub use error::{ConfigError, HardwareError, RuntimeError};
pub use events::{Bus, Event, EventKind, Level};
pub use hardware::{
    scan_serial_ports, scan_serial_ports_in, Elm327, Hardware, Target, VideoNode, SERIAL_PREFIXES,
};
pub use health::{
    names, HealthRegistry, HealthSummary, OverallStatus, SubsystemState, SubsystemStatus,
    UnknownState, CRITICAL_SUBSYSTEMS, MAX_RETRIES_MESSAGE,
};
pub use policies::{BackoffPolicy, Growth, JitterPolicy};
pub use simulation::{
    triangle, PatternKind, SimulationClock, Synthesize, TelemetryWaveform, TestPattern,
    CYCLE_PERIOD, IDLE_CYCLE,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
