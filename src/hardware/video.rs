//! V4L2 capture node backend.
//!
//! With the `v4l2` feature, `open` negotiates packed YUYV at the configured
//! geometry and maps a small ring of driver buffers; `read` dequeues one of them.
//! The driver calls block, so they run on the blocking pool under a timeout.
//!
//! Without the feature an existing node is rejected, which keeps the camera
//! `WAITING` (or simulating) exactly as if it were unplugged.
//!
//! ```text
//! open:  /dev/video<N> ─► VIDIOC_S_FMT (YUYV, w×h) ─► mmap stream (4 buffers)
//! read:  DQBUF ─► copy w×h×2 bytes ─► QBUF
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tracing::debug;

use super::{Hardware, Target};
use crate::devices::{Frame, PixelFormat};
use crate::error::HardwareError;

/// Open capture node.
#[cfg_attr(not(feature = "v4l2"), allow(dead_code))]
pub struct VideoHandle {
    path: PathBuf,
    width: u32,
    height: u32,
    #[cfg(feature = "v4l2")]
    stream: Option<v4l::io::mmap::Stream<'static>>,
}

impl std::fmt::Debug for VideoHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoHandle")
            .field("path", &self.path)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Camera backend for `/dev/video<N>`.
#[derive(Debug, Clone)]
pub struct VideoNode {
    width: u32,
    height: u32,
    timeout: Duration,
}

impl VideoNode {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            timeout: Duration::from_secs(2),
        }
    }

    /// Bound on a single open or frame read.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[cfg_attr(not(feature = "v4l2"), allow(dead_code))]
    fn timed_out(&self, target: &Target) -> HardwareError {
        HardwareError::Timeout {
            target: target.to_string(),
            timeout: self.timeout,
        }
    }
}

#[async_trait]
impl Hardware for VideoNode {
    type Handle = VideoHandle;
    type Sample = Frame;

    async fn open(&self, target: &Target) -> Result<VideoHandle, HardwareError> {
        let Target::Video(index) = *target else {
            return Err(HardwareError::Rejected {
                target: target.to_string(),
                reason: "not a video target".into(),
            });
        };
        let path = PathBuf::from(format!("/dev/video{index}"));
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(HardwareError::NotFound {
                target: target.to_string(),
            });
        }
        self.start(index, path, target).await
    }

    async fn read(&self, handle: &mut VideoHandle) -> Option<Frame> {
        let data = self.grab(handle).await?;
        Some(Frame {
            width: handle.width,
            height: handle.height,
            format: PixelFormat::Yuyv,
            data: Arc::from(data),
            captured_at: SystemTime::now(),
            simulated: false,
        })
    }

    async fn close(&self, handle: VideoHandle) {
        debug!(path = %handle.path.display(), "capture node released");
        drop(handle);
    }
}

#[cfg(feature = "v4l2")]
impl VideoNode {
    async fn start(
        &self,
        index: u32,
        path: PathBuf,
        target: &Target,
    ) -> Result<VideoHandle, HardwareError> {
        let (width, height, timeout) = (self.width, self.height, self.timeout);
        let label = target.to_string();
        let starting =
            tokio::task::spawn_blocking(move || capture::start(index, width, height, timeout, label));
        let (stream, width, height) = match tokio::time::timeout(self.timeout, starting).await {
            Ok(Ok(started)) => started?,
            Ok(Err(join)) => return Err(HardwareError::Io(std::io::Error::other(join))),
            Err(_) => return Err(self.timed_out(target)),
        };

        debug!(path = %path.display(), width, height, "capture stream ready");
        Ok(VideoHandle {
            path,
            width,
            height,
            stream: Some(stream),
        })
    }

    async fn grab(&self, handle: &mut VideoHandle) -> Option<Vec<u8>> {
        let mut stream = handle.stream.take()?;
        let len = Frame::expected_len(handle.width, handle.height, PixelFormat::Yuyv);
        let grabbing = tokio::task::spawn_blocking(move || {
            let frame = capture::next(&mut stream, len);
            (stream, frame)
        });
        match tokio::time::timeout(self.timeout, grabbing).await {
            Ok(Ok((stream, frame))) => {
                handle.stream = Some(stream);
                frame
                    .map_err(|e| debug!(path = %handle.path.display(), error = %e, "frame read failed"))
                    .ok()
            }
            Ok(Err(e)) => {
                debug!(path = %handle.path.display(), error = %e, "capture task failed");
                None
            }
            Err(_) => {
                debug!(path = %handle.path.display(), "frame read timed out");
                None
            }
        }
    }
}

#[cfg(not(feature = "v4l2"))]
impl VideoNode {
    async fn start(
        &self,
        _index: u32,
        path: PathBuf,
        target: &Target,
    ) -> Result<VideoHandle, HardwareError> {
        debug!(path = %path.display(), "capture node present but v4l2 support is not built in");
        Err(HardwareError::Rejected {
            target: target.to_string(),
            reason: "built without the `v4l2` feature".into(),
        })
    }

    async fn grab(&self, _handle: &mut VideoHandle) -> Option<Vec<u8>> {
        None
    }
}

#[cfg(feature = "v4l2")]
mod capture {
    use std::io;
    use std::time::Duration;

    use v4l::buffer::Type;
    use v4l::io::mmap::Stream;
    use v4l::io::traits::CaptureStream;
    use v4l::video::Capture;
    use v4l::{Device, FourCC};

    use super::packed_frame;
    use crate::error::HardwareError;

    const BUFFERS: u32 = 4;

    /// Negotiates YUYV and maps the buffer ring. Returns the geometry the driver chose.
    pub(super) fn start(
        index: u32,
        width: u32,
        height: u32,
        timeout: Duration,
        target: String,
    ) -> Result<(Stream<'static>, u32, u32), HardwareError> {
        let yuyv = FourCC::new(b"YUYV");
        let dev = Device::new(index as usize)?;

        let mut fmt = dev.format()?;
        fmt.width = width;
        fmt.height = height;
        fmt.fourcc = yuyv;
        let fmt = dev.set_format(&fmt)?;
        if fmt.fourcc != yuyv {
            return Err(HardwareError::Rejected {
                target,
                reason: format!("driver offers {} instead of YUYV", fmt.fourcc),
            });
        }

        let mut stream = Stream::with_buffers(&dev, Type::VideoCapture, BUFFERS)?;
        stream.set_timeout(timeout);
        Ok((stream, fmt.width, fmt.height))
    }

    /// Dequeues one buffer and copies out a full frame.
    pub(super) fn next(stream: &mut Stream<'static>, len: usize) -> io::Result<Vec<u8>> {
        let (buf, meta) = stream.next()?;
        packed_frame(buf, meta.bytesused as usize, len)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "short frame"))
    }
}

/// First `len` bytes of a dequeued buffer, if the driver filled that many.
///
/// `bytesused == 0` means the driver did not report a fill level.
#[cfg_attr(not(feature = "v4l2"), allow(dead_code))]
fn packed_frame(buf: &[u8], bytesused: usize, len: usize) -> Option<&[u8]> {
    let used = if bytesused == 0 {
        buf.len()
    } else {
        bytesused.min(buf.len())
    };
    (used >= len).then(|| &buf[..len])
}
