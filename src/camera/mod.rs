//! Camera access.
//!
//! A `CameraSource` grants a live `CameraStream` for a set of constraints. The
//! `CameraController` is the only owner of that stream: it starts it, stops every
//! track on shutdown, and holds the cancellation token of the pending detection
//! iteration.
//!
//! Sources:
//! - Synthetic `stub://` devices (always available, used by tests and demos)
//! - V4L2 devices such as `/dev/video0` (feature: ingest-v4l2)
//!
//! Streams MUST NOT write frames to disk; frames only flow to the detection loop.

mod controller;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::frame::Frame;

pub use controller::CameraController;
pub use synthetic::{SyntheticCamera, SyntheticProbe};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Camera;

/// Which way the requested camera faces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    #[default]
    Environment,
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacingMode::User => f.write_str("user"),
            FacingMode::Environment => f.write_str("environment"),
        }
    }
}

impl FromStr for FacingMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(FacingMode::User),
            "environment" => Ok(FacingMode::Environment),
            other => Err(anyhow!(
                "unknown facing mode '{}'; expected user or environment",
                other
            )),
        }
    }
}

/// Stream request. Width and height are preferences, not hard requirements.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraConstraints {
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub target_fps: u32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::Environment,
            ideal_width: 640,
            ideal_height: 480,
            target_fps: 30,
        }
    }
}

/// A granted, live video stream.
pub trait CameraStream: Send {
    /// Grab the current frame.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Stop every track and release the device. Idempotent.
    fn stop_tracks(&mut self);

    /// False once the tracks have been stopped.
    fn is_live(&self) -> bool;

    /// Negotiated resolution, which may differ from the ideal one.
    fn resolution(&self) -> (u32, u32);
}

/// Something that can be asked for a camera stream.
pub trait CameraSource: Send {
    /// Human-readable device description for logs.
    fn describe(&self) -> String;

    /// Request access. Fails on denial or device error.
    fn open(&mut self, constraints: &CameraConstraints) -> Result<Box<dyn CameraStream>>;
}

/// Pick a camera source for a device path.
///
/// `stub://...` paths yield a synthetic camera; anything else is treated as a
/// V4L2 device node.
pub fn open_camera_source(device: &str) -> Result<Box<dyn CameraSource>> {
    if device.starts_with("stub://") {
        return Ok(Box::new(SyntheticCamera::new(device)));
    }
    open_device_source(device)
}

#[cfg(feature = "ingest-v4l2")]
fn open_device_source(device: &str) -> Result<Box<dyn CameraSource>> {
    Ok(Box::new(V4l2Camera::new(device)))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device_source(device: &str) -> Result<Box<dyn CameraSource>> {
    Err(anyhow!(
        "camera device {} requires the ingest-v4l2 feature",
        device
    ))
}
