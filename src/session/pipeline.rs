use std::time::Instant;

use anyhow::{anyhow, Result};

use super::state::SessionState;
use crate::camera::CameraController;
use crate::detect::{map_predictions, ModelLoader, ModelState};
use crate::error::SessionError;
use crate::persistence::NewDetectionRecord;
use crate::render::RenderSurface;
use crate::scheduler::{FrameHandle, FrameScheduler};
use crate::snapshot::encode_data_url;

/// Counters for the detection loop. Transient failures only show up here and
/// in the log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u64,
    pub frame_failures: u64,
    pub detect_failures: u64,
    pub render_failures: u64,
    /// Fired handles that no longer belonged to the loop.
    pub stale_handles: u64,
}

/// Result of one loop iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Detections were updated and drawn.
    Detected(usize),
    FrameFailed,
    DetectFailed,
    RenderFailed,
}

/// Result of `DetectionSession::poll`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// No iteration was due.
    Idle,
    /// A handle fired after it had been superseded or cancelled.
    Stale(FrameHandle),
    /// An iteration ran and the next one was scheduled.
    Ran(IterationOutcome),
}

/// One live detection session: model, camera, loop and drawing surface.
///
/// The session is driven by `poll(now)`. Each due iteration grabs a frame,
/// runs the model, updates `SessionState`, draws, and schedules the next
/// iteration for the following refresh. Transient failures are logged and the
/// loop carries on; only `stop_camera` or `teardown` end it.
pub struct DetectionSession<S: RenderSurface> {
    loader: ModelLoader,
    camera: CameraController,
    scheduler: FrameScheduler,
    surface: S,
    state: SessionState,
    stats: LoopStats,
    torn_down: bool,
}

impl<S: RenderSurface> DetectionSession<S> {
    pub fn new(loader: ModelLoader, camera: CameraController, surface: S) -> Self {
        let mut state = SessionState::new();
        state.set_model_loading(!loader.is_ready());
        Self {
            loader,
            camera,
            scheduler: FrameScheduler::default(),
            surface,
            state,
            stats: LoopStats::default(),
            torn_down: false,
        }
    }

    pub fn with_scheduler(mut self, scheduler: FrameScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Clear the banner error; detections and camera status are left alone.
    pub fn dismiss_error(&mut self) {
        self.state.dismiss_error();
    }

    pub fn loop_stats(&self) -> LoopStats {
        self.stats
    }

    pub fn model_state(&self) -> ModelState {
        self.loader.state()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn camera(&self) -> &CameraController {
        &self.camera
    }

    /// When the pending iteration becomes due, if one is scheduled.
    pub fn next_due(&self) -> Option<Instant> {
        self.scheduler.next_due()
    }

    /// Initialise the model. A failure disables detection for the rest of the
    /// session.
    ///
    /// When the camera is already streaming, a successful load starts the loop.
    pub fn load_model(&mut self, now: Instant) -> Result<()> {
        self.state.set_model_loading(true);
        let loaded = self.loader.load();
        self.state.set_model_loading(false);
        if let Err(err) = loaded {
            self.state.set_error(SessionError::ModelLoad);
            return Err(err.context(SessionError::ModelLoad));
        }
        if self.camera.is_active() && self.camera.pending_frame().is_none() {
            self.camera.schedule_next(&mut self.scheduler, now);
        }
        Ok(())
    }

    /// Start the camera. Returns `Ok(false)` when it is already streaming.
    ///
    /// The first iteration is scheduled only once a model is ready. Access
    /// failures are recorded as a recoverable error; calling again retries.
    pub fn start_camera(&mut self, now: Instant) -> Result<bool> {
        if self.torn_down {
            return Err(anyhow!("detection session has been torn down"));
        }
        match self.camera.start() {
            Ok(false) => Ok(false),
            Ok(true) => {
                self.state.set_camera_active(true);
                self.state.clear_error_if(SessionError::CameraAccess);
                if self.loader.is_ready() {
                    self.camera.schedule_next(&mut self.scheduler, now);
                } else {
                    log::warn!("camera started before the model is ready; detection is idle");
                }
                Ok(true)
            }
            Err(err) => {
                log::error!("camera access failed: {:#}", err);
                self.state.set_error(SessionError::CameraAccess);
                Err(err.context(SessionError::CameraAccess))
            }
        }
    }

    /// Stop every camera track, cancel the pending iteration and clear the
    /// detections. Returns false when the camera was not streaming.
    pub fn stop_camera(&mut self) -> bool {
        let stopped = self.camera.stop(&mut self.scheduler);
        self.state.set_camera_active(false);
        self.state.clear_detections();
        stopped
    }

    /// Run the iteration that is due at `now`, if any.
    pub fn poll(&mut self, now: Instant) -> PollOutcome {
        let Some(handle) = self.scheduler.take_due(now) else {
            return PollOutcome::Idle;
        };
        if !self.camera.claim(handle) {
            self.stats.stale_handles += 1;
            log::debug!("ignoring stale frame handle {}", handle.id());
            return PollOutcome::Stale(handle);
        }
        match self.run_iteration(now) {
            Some(outcome) => PollOutcome::Ran(outcome),
            None => PollOutcome::Idle,
        }
    }

    /// One pass of the loop, then schedule the next one.
    ///
    /// Returns `None` without doing anything unless the camera is streaming
    /// and a model is loaded.
    pub fn run_iteration(&mut self, now: Instant) -> Option<IterationOutcome> {
        let (Some(stream), Some(model)) = (self.camera.stream_mut(), self.loader.model_mut()) else {
            return None;
        };
        self.stats.iterations += 1;

        let outcome = match stream.next_frame() {
            Err(err) => {
                self.stats.frame_failures += 1;
                log::warn!("frame grab failed: {:#}", err);
                IterationOutcome::FrameFailed
            }
            Ok(frame) => match model.detect(&frame) {
                Err(err) => {
                    self.stats.detect_failures += 1;
                    log::error!("detection failed: {:#}", err);
                    IterationOutcome::DetectFailed
                }
                Ok(raw) => {
                    self.state.apply_detections(map_predictions(&raw));
                    let detections = self.state.current_detections();
                    log::debug!(
                        "frame {}: {} objects, avg {}%",
                        self.stats.iterations,
                        detections.len(),
                        self.state.average_confidence()
                    );
                    match self.surface.draw(&frame, detections) {
                        Ok(()) => IterationOutcome::Detected(detections.len()),
                        Err(err) => {
                            self.stats.render_failures += 1;
                            log::warn!("render failed: {:#}", err);
                            IterationOutcome::RenderFailed
                        }
                    }
                }
            },
        };

        self.camera.schedule_next(&mut self.scheduler, now);
        Some(outcome)
    }

    /// Snapshot of the current detections and the drawn surface, ready to save.
    ///
    /// Returns `Ok(None)` when nothing is detected.
    pub fn capture(&self) -> Result<Option<NewDetectionRecord>> {
        let detections = self.state.current_detections();
        if detections.is_empty() {
            return Ok(None);
        }
        let image = self
            .surface
            .snapshot()
            .ok_or_else(|| anyhow!("render surface holds no image to snapshot"))?;
        Ok(Some(NewDetectionRecord {
            detection_data: detections.to_vec(),
            image_url: encode_data_url(image)?,
            confidence: self.state.average_confidence(),
        }))
    }

    /// Stop the camera and drop anything still scheduled. The session cannot
    /// be restarted afterwards.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.stop_camera();
        self.scheduler.clear();
        self.torn_down = true;
        log::debug!("detection session torn down");
    }
}

impl<S: RenderSurface> Drop for DetectionSession<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraConstraints, SyntheticCamera};
    use crate::detect::{StubBackend, DetectorBackend};
    use crate::render::Canvas;
    use std::time::Duration;

    fn session(device: &str) -> DetectionSession<Canvas> {
        let constraints = CameraConstraints {
            ideal_width: 64,
            ideal_height: 48,
            ..CameraConstraints::default()
        };
        let camera = CameraController::new(Box::new(SyntheticCamera::new(device)), constraints);
        let backend: Box<dyn DetectorBackend> = Box::new(StubBackend::new().with_label("square"));
        DetectionSession::new(ModelLoader::ready(backend), camera, Canvas::new())
            .with_scheduler(FrameScheduler::new(Duration::from_millis(10)))
    }

    #[test]
    fn synthetic_square_is_detected_and_drawn() -> Result<()> {
        let start = Instant::now();
        let mut session = session("stub://cam");
        assert!(!session.state().is_model_loading());
        assert!(session.start_camera(start)?);

        let outcome = session.poll(start + Duration::from_millis(10));
        assert_eq!(outcome, PollOutcome::Ran(IterationOutcome::Detected(1)));
        assert_eq!(session.state().current_detections()[0].label, "square");
        assert_eq!(session.surface().dimensions(), (64, 48));
        assert!(session.next_due().is_some());

        let capture = session.capture()?.expect("detections present");
        assert!(capture.image_url.starts_with("data:image/jpeg;base64,"));
        assert_eq!(capture.confidence, session.state().average_confidence());
        Ok(())
    }

    #[test]
    fn nothing_runs_before_the_refresh_is_due() -> Result<()> {
        let start = Instant::now();
        let mut session = session("stub://cam");
        session.start_camera(start)?;
        assert_eq!(session.poll(start), PollOutcome::Idle);
        assert_eq!(session.loop_stats().iterations, 0);
        Ok(())
    }

    #[test]
    fn camera_denial_is_recoverable() {
        let start = Instant::now();
        let mut session = session("stub://denied");
        let err = session.start_camera(start).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to access the camera"));
        assert_eq!(session.state().error(), Some(SessionError::CameraAccess));
        assert!(!session.state().is_camera_active());
        assert!(session.next_due().is_none());
    }

    #[test]
    fn teardown_is_final() -> Result<()> {
        let start = Instant::now();
        let mut session = session("stub://cam");
        session.start_camera(start)?;
        session.teardown();
        assert!(session.next_due().is_none());
        assert!(session.start_camera(start).is_err());
        assert_eq!(session.poll(start + Duration::from_secs(1)), PollOutcome::Idle);
        Ok(())
    }

    #[test]
    fn capture_without_detections_is_none() -> Result<()> {
        let session = session("stub://cam");
        assert!(session.capture()?.is_none());
        Ok(())
    }
}
