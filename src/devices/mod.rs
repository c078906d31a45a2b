//! # Devices: samples and the read-side views exposed by supervisors.

mod sample;
mod view;

pub use sample::{pid, Frame, PixelFormat, Reading, Telemetry};
pub use view::{DeviceStatus, DeviceView};
