//! Health registry: per-subsystem lifecycle state with retry gating.
//!
//! ## State machine
//! ```text
//!   DISABLED ──► WAITING ◄──► ACTIVE
//!                  │            ▲
//!   restart_count  │            │ ACTIVE report (recovery, count → 0)
//!   reaches cap    ▼            │
//!                FAULTY ────────┘
//!                  │
//!                  └── reset_subsystem() ──► WAITING (count → 0)
//! ```
//!
//! Once a subsystem is at its cap, only `ACTIVE` and `FAULTY` reports are applied;
//! late failure reports cannot pull it back into `WAITING`.

mod registry;
mod status;

pub use registry::{HealthRegistry, CRITICAL_SUBSYSTEMS, MAX_RETRIES_MESSAGE};
pub use status::{HealthSummary, OverallStatus, SubsystemState, SubsystemStatus, UnknownState};

/// Well-known subsystem names.
pub mod names {
    pub const NETWORKING: &str = "networking";
    pub const BACKEND: &str = "backend";
    pub const CAMERA_REAR: &str = "camera_rear";
    pub const CAMERA_FRONT: &str = "camera_front";
    pub const OBD: &str = "obd";
    pub const LOGGING: &str = "logging";
    pub const SYSTEM: &str = "system";
}
