//! Live camera object detection.
//!
//! Frames from a camera run through an object-detection model; the current
//! detections are drawn as labelled boxes over the frame, and a signed-in user
//! can save a snapshot (detections, rendered image, average confidence) to a
//! detection store and browse the saved history.
//!
//! # Module Structure
//!
//! - `frame`: RGB frames handed from the camera to the model and the canvas
//! - `camera`: camera sources (synthetic, V4L2) and the `CameraController`
//! - `detect`: model loading, backends and the raw-prediction boundary
//! - `scheduler`: refresh-cadence scheduling with cancellable handles
//! - `session`: the detection loop and the session state
//! - `render`: drawing surface and overlays
//! - `snapshot`: JPEG `data:` URL encoding of the drawn canvas
//! - `persistence`: detection stores and the history client
//! - `auth`: the signed-in user as handed over by the host
//! - `config`: file + environment configuration

pub mod auth;
pub mod camera;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod persistence;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod ui;

pub use auth::{AuthSession, User};
pub use camera::{open_camera_source, CameraController, CameraConstraints, FacingMode};
pub use config::DetectConfig;
pub use detect::{
    average_confidence, map_predictions, BoundingBox, Detection, DetectorBackend, ModelLoader,
    ModelSource, ModelState, RawPrediction,
};
pub use error::SessionError;
pub use frame::Frame;
pub use persistence::{
    DetectionRecord, DetectionStore, HistoryClient, InMemoryDetectionStore, NewDetectionRecord,
};
pub use render::{Canvas, RenderSurface};
pub use scheduler::{FrameHandle, FrameScheduler};
pub use session::{DetectionSession, IterationOutcome, LoopStats, PollOutcome, SessionState};
