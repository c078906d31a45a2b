//! # Deployment settings.
//!
//! [`Settings`] is loaded once at startup with the `config` crate from an optional
//! YAML file plus `DEVICEVISOR_*` environment overrides, then validated.
//!
//! ```text
//! config/maintenance.yaml ─┐ (first found, or --config <path>)
//! config/operational.yaml ─┤
//!                          ├──► config::Config ──► Settings ──► validate()
//! DEVICEVISOR_MODE=…  ─────┤
//! DEVICEVISOR_OBD__PORT=… ─┘   (`__` separates nested keys)
//! ```
//!
//! Every field has a default, so an empty source set yields a runnable
//! operational deployment with both enabled devices simulating.
//!
//! ## Sentinel values
//! - `obd.port = null` → auto-scan serial ports
//! - `camera_*.enabled = false` → the device starts `DISABLED` and no supervisor is spawned
//! - `supervision.backoff_factor = null` → linear backoff; a number switches to exponential
//!
//! Every duration must lie within [`MAX_SECONDS`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::core::DeviceParams;
use crate::error::ConfigError;
use crate::hardware::{Elm327, Target};
use crate::health::names;
use crate::policies::{BackoffPolicy, Growth, JitterPolicy};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "DEVICEVISOR";

/// Config file names searched in order.
pub const CONFIG_FILES: [&str; 2] = ["maintenance.yaml", "operational.yaml"];

/// Upper bound for every duration setting, in seconds.
pub const MAX_SECONDS: f64 = 3600.0;

/// Error reported when a camera read yields nothing.
pub const CAMERA_READ_FAILURE: &str = "Failed to grab frame";

/// Error reported when an adapter poll yields nothing.
pub const OBD_READ_FAILURE: &str = "No data from adapter";

/// Deployment mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// In-vehicle: configured simulation flags are final.
    #[default]
    Operational,
    /// Bench: simulating devices may switch to real hardware when it shows up,
    /// and debug events are logged.
    Maintenance,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Operational => "operational",
            Mode::Maintenance => "maintenance",
        }
    }
}

/// One camera slot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub enabled: bool,
    pub device_index: u32,
    /// `[width, height]`.
    pub resolution: [u32; 2],
    pub fps: u32,
    pub simulation: bool,
    #[serde(alias = "allow_real_override")]
    pub allow_real: bool,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            device_index: 0,
            resolution: [640, 480],
            fps: 30,
            simulation: true,
            allow_real: false,
        }
    }
}

impl CameraSettings {
    fn front() -> Self {
        Self {
            enabled: false,
            device_index: 1,
            ..Self::default()
        }
    }

    pub fn width(&self) -> u32 {
        self.resolution[0]
    }

    pub fn height(&self) -> u32 {
        self.resolution[1]
    }
}

/// Diagnostics adapter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ObdSettings {
    pub enabled: bool,
    /// Serial node; `None` scans for one.
    pub port: Option<PathBuf>,
    pub simulation: bool,
    #[serde(alias = "allow_real_override")]
    pub allow_real: bool,
    /// Seconds between polls.
    pub polling_interval: f64,
    /// Line speed of the adapter link.
    pub baud_rate: u32,
}

impl Default for ObdSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: None,
            simulation: true,
            allow_real: false,
            polling_interval: 0.5,
            baud_rate: Elm327::DEFAULT_BAUD_RATE,
        }
    }
}

/// Retry gating and reconnection backoff.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SupervisionSettings {
    pub max_retries: u32,
    pub backoff_seconds: f64,
    pub backoff_cap_seconds: f64,
    /// `None` grows linearly; `Some(f)` multiplies by `f` per failure.
    pub backoff_factor: Option<f64>,
    pub jitter: JitterPolicy,
}

impl Default for SupervisionSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_seconds: 5.0,
            backoff_cap_seconds: 30.0,
            backoff_factor: None,
            jitter: JitterPolicy::None,
        }
    }
}

/// Process-level knobs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// How long supervisors get to stop after shutdown is requested.
    pub grace_seconds: f64,
    /// Event bus ring buffer size.
    pub bus_capacity: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            grace_seconds: 5.0,
            bus_capacity: 1024,
        }
    }
}

/// Complete deployment configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mode: Mode,
    pub camera_rear: CameraSettings,
    pub camera_front: CameraSettings,
    pub obd: ObdSettings,
    pub supervision: SupervisionSettings,
    pub runtime: RuntimeSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            camera_rear: CameraSettings::default(),
            camera_front: CameraSettings::front(),
            obd: ObdSettings::default(),
            supervision: SupervisionSettings::default(),
            runtime: RuntimeSettings::default(),
        }
    }
}

impl Settings {
    /// Loads settings from `path`, or from the first of [`CONFIG_FILES`] found in
    /// `./config`, then applies environment overrides and validates.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => discover(Path::new("config")),
        };
        Self::from_sources(file.as_deref(), env_source())
    }

    /// Builds settings from an explicit file and environment source.
    pub fn from_sources(file: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(File::from(file));
        }
        let settings: Settings = builder.add_source(env).build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects values the supervisors cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_camera(&self.camera_rear, "camera_rear.fps", "camera_rear.resolution")?;
        check_camera(&self.camera_front, "camera_front.fps", "camera_front.resolution")?;

        if !seconds(self.obd.polling_interval) || self.obd.polling_interval == 0.0 {
            return Err(invalid(
                "obd.polling_interval",
                format!("must be in (0, {MAX_SECONDS}] seconds"),
            ));
        }
        if self.obd.baud_rate == 0 {
            return Err(invalid("obd.baud_rate", "must be non-zero"));
        }
        let sup = &self.supervision;
        if sup.max_retries == 0 {
            return Err(invalid("supervision.max_retries", "must be at least 1"));
        }
        if !seconds(sup.backoff_seconds) || sup.backoff_seconds == 0.0 {
            return Err(invalid(
                "supervision.backoff_seconds",
                format!("must be in (0, {MAX_SECONDS}] seconds"),
            ));
        }
        if !seconds(sup.backoff_cap_seconds) || sup.backoff_cap_seconds < sup.backoff_seconds {
            return Err(invalid(
                "supervision.backoff_cap_seconds",
                format!(
                    "must be between backoff_seconds ({}) and {MAX_SECONDS}",
                    sup.backoff_seconds
                ),
            ));
        }
        if let Some(factor) = sup.backoff_factor {
            if !factor.is_finite() || factor < 1.0 {
                return Err(invalid("supervision.backoff_factor", "must be a finite number >= 1"));
            }
        }
        if !seconds(self.runtime.grace_seconds) {
            return Err(invalid(
                "runtime.grace_seconds",
                format!("must be in [0, {MAX_SECONDS}] seconds"),
            ));
        }
        Ok(())
    }

    /// Reconnection backoff. Linear by default: `min(cap, base × (restart_count + 1))`.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        let sup = &self.supervision;
        BackoffPolicy {
            first: Duration::from_secs_f64(sup.backoff_seconds),
            max: Duration::from_secs_f64(sup.backoff_cap_seconds),
            growth: match sup.backoff_factor {
                Some(factor) => Growth::Exponential { factor },
                None => Growth::Linear,
            },
            jitter: sup.jitter,
        }
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs_f64(self.runtime.grace_seconds)
    }

    /// Debug events are only logged on the bench.
    pub fn verbose(&self) -> bool {
        self.mode == Mode::Maintenance
    }

    pub fn camera_rear_params(&self) -> DeviceParams {
        camera_params(names::CAMERA_REAR, &self.camera_rear)
    }

    pub fn camera_front_params(&self) -> DeviceParams {
        camera_params(names::CAMERA_FRONT, &self.camera_front)
    }

    pub fn obd_params(&self) -> DeviceParams {
        let interval = Duration::from_secs_f64(self.obd.polling_interval);
        DeviceParams {
            name: names::OBD.into(),
            target: Target::Serial(self.obd.port.clone()),
            simulation: self.obd.simulation,
            allow_real_override: self.obd.allow_real,
            cadence: interval,
            poll_interval: interval,
            read_failure: OBD_READ_FAILURE,
        }
    }
}

/// Environment source with the crate prefix.
pub fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// First of [`CONFIG_FILES`] present in `dir`.
pub fn discover(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

fn camera_params(name: &str, cam: &CameraSettings) -> DeviceParams {
    DeviceParams {
        name: name.into(),
        target: Target::Video(cam.device_index),
        simulation: cam.simulation,
        allow_real_override: cam.allow_real,
        cadence: Duration::from_secs_f64(1.0 / f64::from(cam.fps.max(1))),
        poll_interval: Duration::ZERO,
        read_failure: CAMERA_READ_FAILURE,
    }
}

fn check_camera(
    cam: &CameraSettings,
    fps_field: &'static str,
    res_field: &'static str,
) -> Result<(), ConfigError> {
    if cam.fps == 0 {
        return Err(invalid(fps_field, "must be at least 1"));
    }
    if cam.width() == 0 || cam.height() == 0 {
        return Err(invalid(res_field, "width and height must be non-zero"));
    }
    Ok(())
}

/// Finite, non-negative and within [`MAX_SECONDS`].
fn seconds(v: f64) -> bool {
    (0.0..=MAX_SECONDS).contains(&v)
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        env_source().source(Some(map))
    }

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn defaults_without_sources() {
        let s = Settings::from_sources(None, env(&[])).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.mode, Mode::Operational);
        assert!(s.camera_rear.enabled);
        assert!(!s.camera_front.enabled);
        assert_eq!(s.camera_front.device_index, 1);
        assert_eq!(s.supervision.max_retries, 3);
        assert_eq!(s.grace(), Duration::from_secs(5));
        assert_eq!(s.obd.baud_rate, 38_400);
        assert!(!s.verbose());
    }

    #[test]
    fn yaml_file_and_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "maintenance.yaml",
            "mode: maintenance\n\
             camera_rear:\n  device_index: 2\n  resolution: [320, 240]\n  allow_real: true\n\
             obd:\n  port: /dev/rfcomm0\n  polling_interval: 1.5\n\
             supervision:\n  max_retries: 5\n",
        );
        let s = Settings::from_sources(
            Some(&path),
            env(&[("DEVICEVISOR_SUPERVISION__BACKOFF_SECONDS", "2")]),
        )
        .unwrap();

        assert_eq!(s.mode, Mode::Maintenance);
        assert!(s.verbose());
        assert_eq!(s.camera_rear.device_index, 2);
        assert_eq!((s.camera_rear.width(), s.camera_rear.height()), (320, 240));
        assert!(s.camera_rear.allow_real);
        assert_eq!(s.obd.port.as_deref(), Some(Path::new("/dev/rfcomm0")));
        assert_eq!(s.supervision.max_retries, 5);
        assert_eq!(s.supervision.backoff_seconds, 2.0);

        let obd = s.obd_params();
        assert_eq!(obd.poll_interval, Duration::from_millis(1500));
        assert_eq!(obd.target, Target::Serial(Some(PathBuf::from("/dev/rfcomm0"))));
        assert_eq!(s.camera_rear_params().target, Target::Video(2));
    }

    #[test]
    fn unknown_mode_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "operational.yaml", "mode: turbo\n");
        let err = Settings::from_sources(Some(&path), env(&[])).unwrap_err();
        assert_eq!(err.as_label(), "config_load");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut s = Settings::default();
        s.camera_rear.fps = 0;
        assert!(matches!(s.validate(), Err(ConfigError::Invalid { field: "camera_rear.fps", .. })));

        let mut s = Settings::default();
        s.camera_front.resolution = [0, 480];
        assert!(matches!(
            s.validate(),
            Err(ConfigError::Invalid { field: "camera_front.resolution", .. })
        ));

        let mut s = Settings::default();
        s.obd.polling_interval = 0.0;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.supervision.backoff_seconds = -1.0;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.supervision.backoff_cap_seconds = 1.0;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.obd.baud_rate = 0;
        assert!(matches!(s.validate(), Err(ConfigError::Invalid { field: "obd.baud_rate", .. })));
    }

    #[test]
    fn validation_bounds_durations() {
        let mut s = Settings::default();
        s.supervision.backoff_seconds = 1e20;
        s.supervision.backoff_cap_seconds = 1e20;
        assert!(matches!(
            s.validate(),
            Err(ConfigError::Invalid { field: "supervision.backoff_seconds", .. })
        ));

        let mut s = Settings::default();
        s.supervision.backoff_cap_seconds = f64::INFINITY;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.obd.polling_interval = 1e20;
        assert!(matches!(
            s.validate(),
            Err(ConfigError::Invalid { field: "obd.polling_interval", .. })
        ));

        let mut s = Settings::default();
        s.runtime.grace_seconds = f64::NAN;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.supervision.backoff_cap_seconds = MAX_SECONDS;
        s.runtime.grace_seconds = MAX_SECONDS;
        s.validate().unwrap();
        assert_eq!(s.backoff_policy().max, Duration::from_secs(3600));
    }

    #[test]
    fn oversized_file_values_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "operational.yaml",
            "supervision:\n  backoff_seconds: 1e20\n  backoff_cap_seconds: 1e20\n",
        );
        let err = Settings::from_sources(Some(&path), env(&[])).unwrap_err();
        assert_eq!(err.as_label(), "config_invalid");
    }

    #[test]
    fn exponential_backoff_with_jitter_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "operational.yaml",
            "supervision:\n  backoff_seconds: 1\n  backoff_cap_seconds: 60\n  backoff_factor: 2\n  jitter: equal\n",
        );
        let s = Settings::from_sources(Some(&path), env(&[])).unwrap();
        let p = s.backoff_policy();
        assert_eq!(p.growth, Growth::Exponential { factor: 2.0 });
        assert_eq!(p.jitter, JitterPolicy::Equal);
        for _ in 0..20 {
            let d = p.next(3);
            assert!(d >= Duration::from_secs(4) && d <= Duration::from_secs(8));
        }

        let mut bad = s.clone();
        bad.supervision.backoff_factor = Some(0.5);
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::Invalid { field: "supervision.backoff_factor", .. })
        ));
    }

    #[test]
    fn jitter_from_env() {
        let s = Settings::from_sources(None, env(&[("DEVICEVISOR_SUPERVISION__JITTER", "full")]))
            .unwrap();
        assert_eq!(s.supervision.jitter, JitterPolicy::Full);
        assert_eq!(s.backoff_policy().growth, Growth::Linear);
    }

    #[test]
    fn maintenance_file_preferred() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(discover(dir.path()), None);
        let op = write(dir.path(), "operational.yaml", "mode: operational\n");
        assert_eq!(discover(dir.path()), Some(op));
        let maint = write(dir.path(), "maintenance.yaml", "mode: maintenance\n");
        assert_eq!(discover(dir.path()), Some(maint));
    }

    #[test]
    fn backoff_policy_matches_linear_formula() {
        let p = Settings::default().backoff_policy();
        assert_eq!(p.next(0), Duration::from_secs(5));
        assert_eq!(p.next(2), Duration::from_secs(15));
        assert_eq!(p.next(9), Duration::from_secs(30));
    }

    #[test]
    fn camera_cadence_follows_fps() {
        let s = Settings::default();
        let p = s.camera_rear_params();
        assert_eq!(p.name, "camera_rear");
        assert_eq!(p.poll_interval, Duration::ZERO);
        assert!((p.cadence.as_secs_f64() - 1.0 / 30.0).abs() < 1e-9);
        assert_eq!(p.read_failure, CAMERA_READ_FAILURE);
    }
}
