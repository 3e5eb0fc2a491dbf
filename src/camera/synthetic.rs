//! Synthetic camera for `stub://` devices.
//!
//! Produces a dark gradient with a bright square sliding across it, which the
//! stub detector picks up as one object. `stub://denied` simulates a refused
//! permission prompt.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::{CameraConstraints, CameraSource, CameraStream};
use crate::frame::{rgb_len, Frame};

const DENIED_DEVICE: &str = "stub://denied";
const SQUARE_LUMA: u8 = 255;
const MAX_BACKGROUND_LUMA: u8 = 120;

/// Shared counters for observing a synthetic camera from tests.
#[derive(Clone, Debug, Default)]
pub struct SyntheticProbe {
    opened: Arc<AtomicU64>,
    tracks_stopped: Arc<AtomicU64>,
    frames: Arc<AtomicU64>,
    deny: Arc<AtomicBool>,
}

impl SyntheticProbe {
    /// Streams granted so far.
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    /// Tracks stopped so far.
    pub fn tracks_stopped(&self) -> u64 {
        self.tracks_stopped.load(Ordering::SeqCst)
    }

    /// Frames handed out so far.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    /// Make subsequent `open` calls fail as if permission were refused.
    pub fn set_deny(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }
}

pub struct SyntheticCamera {
    device: String,
    probe: SyntheticProbe,
}

impl SyntheticCamera {
    pub fn new(device: impl Into<String>) -> Self {
        let device = device.into();
        let probe = SyntheticProbe::default();
        if device == DENIED_DEVICE {
            probe.set_deny(true);
        }
        Self { device, probe }
    }

    pub fn probe(&self) -> SyntheticProbe {
        self.probe.clone()
    }
}

impl CameraSource for SyntheticCamera {
    fn describe(&self) -> String {
        format!("{} (synthetic)", self.device)
    }

    fn open(&mut self, constraints: &CameraConstraints) -> Result<Box<dyn CameraStream>> {
        if self.probe.deny.load(Ordering::SeqCst) {
            return Err(anyhow!("permission denied for camera {}", self.device));
        }
        if constraints.ideal_width == 0 || constraints.ideal_height == 0 {
            return Err(anyhow!(
                "cannot satisfy {}x{} on {}",
                constraints.ideal_width,
                constraints.ideal_height,
                self.device
            ));
        }
        rgb_len(constraints.ideal_width, constraints.ideal_height)?;

        self.probe.opened.fetch_add(1, Ordering::SeqCst);
        log::info!(
            "SyntheticCamera: granted {} facing={} {}x{}",
            self.device,
            constraints.facing_mode,
            constraints.ideal_width,
            constraints.ideal_height
        );
        Ok(Box::new(SyntheticStream {
            width: constraints.ideal_width,
            height: constraints.ideal_height,
            frame_count: 0,
            live: true,
            probe: self.probe.clone(),
        }))
    }
}

struct SyntheticStream {
    width: u32,
    height: u32,
    frame_count: u64,
    live: bool,
    probe: SyntheticProbe,
}

impl SyntheticStream {
    fn generate_pixels(&self) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let side = (w.min(h) / 6).max(1);
        let travel = w.saturating_sub(side).max(1);
        let x0 = ((self.frame_count as usize) * 4) % travel;
        let y0 = (h - side.min(h)) / 2;

        let mut pixels = vec![0u8; w * h * 3];
        for y in 0..h {
            for x in 0..w {
                let offset = (y * w + x) * 3;
                let inside = x >= x0 && x < x0 + side && y >= y0 && y < y0 + side;
                let px = if inside {
                    [SQUARE_LUMA; 3]
                } else {
                    let shade = ((x + y) * usize::from(MAX_BACKGROUND_LUMA) / (w + h)) as u8;
                    [shade / 2, shade, shade.saturating_add(20).min(MAX_BACKGROUND_LUMA)]
                };
                pixels[offset..offset + 3].copy_from_slice(&px);
            }
        }
        pixels
    }
}

impl CameraStream for SyntheticStream {
    fn next_frame(&mut self) -> Result<Frame> {
        if !self.live {
            return Err(anyhow!("camera stream has been stopped"));
        }
        let pixels = self.generate_pixels();
        self.frame_count += 1;
        self.probe.frames.fetch_add(1, Ordering::SeqCst);
        Frame::from_rgb(pixels, self.width, self.height)
    }

    fn stop_tracks(&mut self) {
        if self.live {
            self.live = false;
            self.probe.tracks_stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraints(width: u32, height: u32) -> CameraConstraints {
        CameraConstraints {
            ideal_width: width,
            ideal_height: height,
            ..CameraConstraints::default()
        }
    }

    #[test]
    fn produces_frames_at_requested_resolution() -> Result<()> {
        let mut camera = SyntheticCamera::new("stub://test");
        let mut stream = camera.open(&constraints(96, 64))?;
        let frame = stream.next_frame()?;
        assert_eq!((frame.width, frame.height), (96, 64));
        assert_eq!(stream.resolution(), (96, 64));
        Ok(())
    }

    #[test]
    fn square_moves_between_frames() -> Result<()> {
        let mut camera = SyntheticCamera::new("stub://test");
        let mut stream = camera.open(&constraints(96, 64))?;
        let first = stream.next_frame()?;
        let second = stream.next_frame()?;
        assert_ne!(first.pixels(), second.pixels());
        assert_eq!(first.pixel(0, 32), Some([SQUARE_LUMA; 3]));
        Ok(())
    }

    #[test]
    fn denied_device_refuses_access() {
        let mut camera = SyntheticCamera::new(DENIED_DEVICE);
        let err = camera.open(&constraints(64, 48)).err().unwrap();
        assert!(err.to_string().contains("permission denied"));
        assert_eq!(camera.probe().opened(), 0);
    }

    #[test]
    fn stop_is_idempotent_and_counted() -> Result<()> {
        let mut camera = SyntheticCamera::new("stub://test");
        let probe = camera.probe();
        let mut stream = camera.open(&constraints(32, 24))?;
        stream.stop_tracks();
        stream.stop_tracks();
        assert!(!stream.is_live());
        assert!(stream.next_frame().is_err());
        drop(stream);
        assert_eq!(probe.tracks_stopped(), 1);
        Ok(())
    }
}
