//! Synthetic camera frames.
//!
//! Each pattern is a pure function of wall time and the clock cycle, so the same
//! inputs always render the same buffer.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::Synthesize;
use crate::devices::{Frame, PixelFormat};

/// Which picture to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// Amber disc orbiting the frame centre (rear camera).
    Orbit,
    /// Vertical cyan bar sweeping left and right (front camera).
    Sweep,
}

/// Frame synthesizer for a camera slot.
#[derive(Debug, Clone)]
pub struct TestPattern {
    kind: PatternKind,
    width: u32,
    height: u32,
}

impl TestPattern {
    pub fn new(kind: PatternKind, width: u32, height: u32) -> Self {
        Self {
            kind,
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Renders an RGB frame for `secs` seconds since the epoch at waveform value `cycle`.
    pub fn render(&self, secs: f64, cycle: f64) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let cycle = cycle.clamp(0.0, 1.0);
        let bg = (16.0 + 48.0 * cycle) as u8;
        let mut buf = vec![bg; w * h * 3];

        // brighter overlays at the top of the cycle
        let gain = 0.5 + 0.5 * cycle;
        match self.kind {
            PatternKind::Orbit => {
                let cx = w as f64 / 2.0 + 0.3125 * w as f64 * (2.0 * secs).cos();
                let cy = h as f64 / 2.0 + 0.3125 * h as f64 * (2.0 * secs).sin();
                let r = (w.min(h) as f64 / 10.0).max(1.0);
                let color = scale([255, 210, 0], gain);
                let x0 = (cx - r).floor().max(0.0) as usize;
                let x1 = ((cx + r).ceil() as usize).min(w.saturating_sub(1));
                let y0 = (cy - r).floor().max(0.0) as usize;
                let y1 = ((cy + r).ceil() as usize).min(h.saturating_sub(1));
                for y in y0..=y1 {
                    for x in x0..=x1 {
                        let (dx, dy) = (x as f64 - cx, y as f64 - cy);
                        if dx * dx + dy * dy <= r * r {
                            put(&mut buf, w, x, y, color);
                        }
                    }
                }
            }
            PatternKind::Sweep => {
                let bar = (w / 16).max(1);
                let phase = (secs / 4.0).rem_euclid(1.0);
                let tri = 1.0 - (2.0 * phase - 1.0).abs();
                let left = (tri * (w - bar) as f64).round() as usize;
                let color = scale([0, 200, 255], gain);
                for y in 0..h {
                    for x in left..(left + bar).min(w) {
                        put(&mut buf, w, x, y, color);
                    }
                }
            }
        }
        buf
    }
}

impl Synthesize for TestPattern {
    type Sample = Frame;

    fn synthesize(&self, now: SystemTime, cycle: f64) -> Frame {
        let secs = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        Frame {
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgb24,
            data: Arc::from(self.render(secs, cycle)),
            captured_at: now,
            simulated: true,
        }
    }
}

fn scale(rgb: [u8; 3], gain: f64) -> [u8; 3] {
    rgb.map(|c| (c as f64 * gain).round().clamp(0.0, 255.0) as u8)
}

fn put(buf: &mut [u8], w: usize, x: usize, y: usize, rgb: [u8; 3]) {
    let i = (y * w + x) * 3;
    buf[i..i + 3].copy_from_slice(&rgb);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pixel(buf: &[u8], w: usize, x: usize, y: usize) -> [u8; 3] {
        let i = (y * w + x) * 3;
        [buf[i], buf[i + 1], buf[i + 2]]
    }

    #[test]
    fn orbit_starts_right_of_centre() {
        let p = TestPattern::new(PatternKind::Orbit, 640, 480);
        let buf = p.render(0.0, 1.0);
        assert_eq!(buf.len(), 640 * 480 * 3);
        // t=0: centre at (520, 240)
        assert_eq!(pixel(&buf, 640, 520, 240), [255, 210, 0]);
        assert_eq!(pixel(&buf, 640, 320, 240), [64, 64, 64]);
    }

    #[test]
    fn brightness_follows_cycle() {
        let p = TestPattern::new(PatternKind::Sweep, 64, 8);
        let dim = p.render(1.0, 0.0);
        let bright = p.render(1.0, 1.0);
        let sum = |b: &[u8]| b.iter().map(|&v| v as u64).sum::<u64>();
        assert!(sum(&bright) > sum(&dim));
    }

    #[test]
    fn same_inputs_same_frame() {
        let p = TestPattern::new(PatternKind::Orbit, 32, 24);
        let now = UNIX_EPOCH + Duration::from_millis(12_345);
        let a = p.synthesize(now, 0.3);
        let b = p.synthesize(now, 0.3);
        assert_eq!(a.data, b.data);
        assert!(a.simulated);
        assert_eq!(a.data.len(), Frame::expected_len(32, 24, PixelFormat::Rgb24));
    }

    #[test]
    fn sweep_bar_moves() {
        let p = TestPattern::new(PatternKind::Sweep, 160, 4);
        assert_ne!(p.render(0.0, 0.5), p.render(1.0, 0.5));
    }
}
