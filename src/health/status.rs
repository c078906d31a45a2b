//! Subsystem lifecycle states and the records the registry keeps for them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use serde::Serialize;
use thiserror::Error;

/// Lifecycle state of one subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubsystemState {
    /// Producing data (real or simulated).
    Active,
    /// Looking for hardware or backing off after a failure.
    Waiting,
    /// Retry cap exhausted; needs a manual reset or a successful ACTIVE report.
    Faulty,
    /// Turned off in configuration.
    Disabled,
}

impl SubsystemState {
    /// Upper-case wire name (`ACTIVE`, `WAITING`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            SubsystemState::Active => "ACTIVE",
            SubsystemState::Waiting => "WAITING",
            SubsystemState::Faulty => "FAULTY",
            SubsystemState::Disabled => "DISABLED",
        }
    }
}

impl fmt::Display for SubsystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a state string is not one of the four known names.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown subsystem state `{0}`")]
pub struct UnknownState(pub String);

impl FromStr for SubsystemState {
    type Err = UnknownState;

    /// Case-insensitive parse of the wire names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(SubsystemState::Active),
            "WAITING" => Ok(SubsystemState::Waiting),
            "FAULTY" => Ok(SubsystemState::Faulty),
            "DISABLED" => Ok(SubsystemState::Disabled),
            _ => Err(UnknownState(s.to_string())),
        }
    }
}

/// Per-subsystem record owned by the [`HealthRegistry`](crate::HealthRegistry).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubsystemStatus {
    pub name: String,
    pub state: SubsystemState,
    pub message: Option<String>,
    pub last_error: Option<String>,
    /// Failures reported since the last reset or recovery.
    pub restart_count: u32,
    pub last_update: SystemTime,
}

impl SubsystemStatus {
    pub(crate) fn new(name: &str, state: SubsystemState) -> Self {
        Self {
            name: name.to_string(),
            state,
            message: None,
            last_error: None,
            restart_count: 0,
            last_update: SystemTime::now(),
        }
    }
}

/// Aggregated judgment of overall health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverallStatus {
    Ok,
    /// An optional peripheral is FAULTY.
    Degraded,
    /// A critical subsystem (backend process or network link) is FAULTY.
    Faulty,
}

/// Snapshot returned by [`HealthRegistry::get_health_summary`](crate::HealthRegistry::get_health_summary).
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub status: OverallStatus,
    pub subsystems: BTreeMap<String, SubsystemStatus>,
    pub timestamp: SystemTime,
}
