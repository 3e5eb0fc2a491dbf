use std::time::Instant;

use anyhow::{Context, Result};

use super::{CameraConstraints, CameraSource, CameraStream};
use crate::scheduler::{FrameHandle, FrameScheduler};

/// Exclusive owner of the camera stream for one session.
///
/// Besides the stream, the controller owns the cancellation token of the pending
/// detection iteration, so stopping the camera always cancels it.
pub struct CameraController {
    source: Box<dyn CameraSource>,
    constraints: CameraConstraints,
    stream: Option<Box<dyn CameraStream>>,
    pending_frame: Option<FrameHandle>,
}

impl CameraController {
    pub fn new(source: Box<dyn CameraSource>, constraints: CameraConstraints) -> Self {
        Self {
            source,
            constraints,
            stream: None,
            pending_frame: None,
        }
    }

    pub fn constraints(&self) -> &CameraConstraints {
        &self.constraints
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Acquire the stream. Returns `Ok(false)` when it is already active.
    ///
    /// On failure the controller stays inactive and may be started again.
    pub fn start(&mut self) -> Result<bool> {
        if self.stream.is_some() {
            return Ok(false);
        }
        let stream = self
            .source
            .open(&self.constraints)
            .with_context(|| format!("open camera {}", self.source.describe()))?;
        let (width, height) = stream.resolution();
        log::info!(
            "camera started: {} at {}x{}",
            self.source.describe(),
            width,
            height
        );
        self.stream = Some(stream);
        Ok(true)
    }

    /// Stop every track and cancel the pending iteration.
    ///
    /// Returns false when the camera was not active.
    pub fn stop(&mut self, scheduler: &mut FrameScheduler) -> bool {
        self.cancel_pending(scheduler);
        let Some(mut stream) = self.stream.take() else {
            return false;
        };
        stream.stop_tracks();
        log::info!("camera stopped: {}", self.source.describe());
        true
    }

    /// Schedule the next detection iteration if the camera is active.
    pub fn schedule_next(
        &mut self,
        scheduler: &mut FrameScheduler,
        now: Instant,
    ) -> Option<FrameHandle> {
        if self.stream.is_none() {
            return None;
        }
        self.cancel_pending(scheduler);
        let handle = scheduler.request_frame(now);
        self.pending_frame = Some(handle);
        Some(handle)
    }

    /// Claim a fired handle. Only the handle this controller is waiting on counts.
    pub fn claim(&mut self, handle: FrameHandle) -> bool {
        if self.pending_frame == Some(handle) {
            self.pending_frame = None;
            true
        } else {
            false
        }
    }

    pub fn pending_frame(&self) -> Option<FrameHandle> {
        self.pending_frame
    }

    pub fn stream_mut(&mut self) -> Option<&mut (dyn CameraStream + 'static)> {
        self.stream.as_deref_mut()
    }

    fn cancel_pending(&mut self, scheduler: &mut FrameScheduler) {
        if let Some(handle) = self.pending_frame.take() {
            scheduler.cancel(handle);
        }
    }
}
