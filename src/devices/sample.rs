//! Data produced by the supervised devices: camera frames and adapter telemetry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;

/// Pixel layout of a [`Frame`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PixelFormat {
    /// 3 bytes per pixel, R G B.
    Rgb24,
    /// 2 bytes per pixel, packed Y0 U Y1 V (the default V4L2 read() format of most webcams).
    Yuyv,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Yuyv => 2,
        }
    }
}

/// One camera image. Cheap to clone; the pixel buffer is shared.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Arc<[u8]>,
    pub captured_at: SystemTime,
    pub simulated: bool,
}

impl Frame {
    /// Expected buffer length for a frame of this geometry.
    pub fn expected_len(width: u32, height: u32, format: PixelFormat) -> usize {
        width as usize * height as usize * format.bytes_per_pixel()
    }
}

/// PID names reported by the diagnostics adapter.
pub mod pid {
    pub const RPM: &str = "RPM";
    pub const SPEED: &str = "SPEED";
    pub const COOLANT_TEMP: &str = "COOLANT_TEMP";
    pub const THROTTLE_POS: &str = "THROTTLE_POS";
    pub const INTAKE_TEMP: &str = "INTAKE_TEMP";
    pub const ELM_VOLTAGE: &str = "ELM_VOLTAGE";
}

/// A single decoded value with its unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    pub value: f64,
    pub unit: &'static str,
}

/// One poll worth of adapter data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Telemetry {
    pub readings: BTreeMap<&'static str, Reading>,
    pub timestamp: SystemTime,
    pub simulated: bool,
}

impl Telemetry {
    pub fn new(timestamp: SystemTime, simulated: bool) -> Self {
        Self {
            readings: BTreeMap::new(),
            timestamp,
            simulated,
        }
    }

    pub fn with(mut self, pid: &'static str, value: f64, unit: &'static str) -> Self {
        self.readings.insert(pid, Reading { value, unit });
        self
    }

    pub fn get(&self, pid: &str) -> Option<f64> {
        self.readings.get(pid).map(|r| r.value)
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}
