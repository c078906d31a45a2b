//! # Hardware: the seam between supervisors and real devices.
//!
//! A device supervisor only talks to hardware through [`Hardware`]. The binary wires
//! in the reference backends ([`VideoNode`], [`Elm327`]); tests use scripted mocks.
//!
//! ```text
//!   DeviceSupervisor ──open(target)──► Hardware ──► Handle
//!          │        ──read(&mut h)──►           ──► Option<Sample>
//!          │        ──close(h)──────►
//!          └─────── ──probe(target)─►           ──► bool (maintenance only)
//! ```
//!
//! ### Rules
//! - `open` is the only fallible call; its error becomes a `WAITING` report.
//! - `read` returning `None` means the link is gone; the supervisor closes the handle.
//! - `probe` must not keep anything open.

mod elm327;
mod ports;
mod video;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::HardwareError;

pub use elm327::Elm327;
pub use ports::{scan_serial_ports, scan_serial_ports_in, SERIAL_PREFIXES};
pub use video::VideoNode;

/// Where a device lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// V4L2 capture node index (`/dev/video<N>`).
    Video(u32),
    /// Serial device node; `None` means "first port found by scanning".
    Serial(Option<PathBuf>),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Video(index) => write!(f, "/dev/video{index}"),
            Target::Serial(Some(path)) => write!(f, "{}", path.display()),
            Target::Serial(None) => f.write_str("serial:auto"),
        }
    }
}

/// # Access to one kind of physical device.
///
/// The handle is owned by exactly one supervisor at a time and is always given
/// back through [`close`](Hardware::close).
#[async_trait]
pub trait Hardware: Send + Sync + 'static {
    /// Exclusive connection state.
    type Handle: Send + 'static;
    /// What one successful read yields.
    type Sample: Clone + Send + Sync + 'static;

    /// Acquires the device.
    async fn open(&self, target: &Target) -> Result<Self::Handle, HardwareError>;

    /// Pulls one sample; `None` when the link is broken or returned nothing.
    async fn read(&self, handle: &mut Self::Handle) -> Option<Self::Sample>;

    /// Releases the device.
    async fn close(&self, handle: Self::Handle);

    /// Best-effort presence check. Defaults to open-then-close.
    async fn probe(&self, target: &Target) -> bool {
        match self.open(target).await {
            Ok(handle) => {
                self.close(handle).await;
                true
            }
            Err(_) => false,
        }
    }
}
