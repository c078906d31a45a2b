//! Read side of a device supervisor: last sample plus connection status.
//!
//! A [`DeviceView`] is cloned out of the supervisor before it is spawned. The
//! supervisor is the only writer; any number of readers (HTTP handlers, tests,
//! the binary's status dump) may hold clones.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use serde::Serialize;

use super::sample::{Frame, Telemetry};

/// Connection status of one device as last observed by its supervisor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceStatus {
    /// Real hardware is currently held open.
    pub detected: bool,
    /// Samples are currently synthetic.
    pub simulation: bool,
    /// Time of the last stored sample.
    pub last_update: Option<SystemTime>,
    /// Last hardware failure; cleared by a successful real read.
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct Shared<S> {
    latest: Option<S>,
    status: DeviceStatus,
}

/// Cloneable handle onto a supervisor's cache.
#[derive(Debug)]
pub struct DeviceView<S> {
    name: Arc<str>,
    inner: Arc<RwLock<Shared<S>>>,
}

impl<S> Clone for DeviceView<S> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Clone> DeviceView<S> {
    pub(crate) fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(RwLock::new(Shared {
                latest: None,
                status: DeviceStatus::default(),
            })),
        }
    }

    /// Subsystem name of the device.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last stored sample, real or synthetic.
    pub fn latest(&self) -> Option<S> {
        self.read().latest.clone()
    }

    pub fn status(&self) -> DeviceStatus {
        self.read().status.clone()
    }

    pub(crate) fn store(&self, sample: S, simulation: bool) {
        let mut g = self.write();
        g.latest = Some(sample);
        g.status.simulation = simulation;
        g.status.last_update = Some(SystemTime::now());
        if !simulation {
            g.status.detected = true;
            g.status.last_error = None;
        }
    }

    pub(crate) fn set_detected(&self, detected: bool) {
        self.write().status.detected = detected;
    }

    pub(crate) fn set_simulation(&self, simulation: bool) {
        self.write().status.simulation = simulation;
    }

    pub(crate) fn set_error(&self, error: impl Into<String>) {
        let mut g = self.write();
        g.status.detected = false;
        g.status.last_error = Some(error.into());
    }

    fn read(&self) -> RwLockReadGuard<'_, Shared<S>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Shared<S>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceView<Frame> {
    /// Last camera frame.
    pub fn latest_frame(&self) -> Option<Frame> {
        self.latest()
    }
}

impl DeviceView<Telemetry> {
    /// Last adapter poll.
    pub fn latest_value(&self) -> Option<Telemetry> {
        self.latest()
    }

    /// Single value from the last adapter poll.
    pub fn reading(&self, pid: &str) -> Option<f64> {
        self.read().latest.as_ref().and_then(|t| t.get(pid))
    }
}
