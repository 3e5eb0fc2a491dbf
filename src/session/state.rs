use crate::detect::{average_confidence, Detection};
use crate::error::SessionError;

/// What the user sees: loading/streaming flags, the current detections and
/// their average confidence, and the last user-facing error.
///
/// `average_confidence` is always derived from `current_detections`; the two
/// only change together.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionState {
    is_model_loading: bool,
    is_camera_active: bool,
    current_detections: Vec<Detection>,
    average_confidence: u8,
    error: Option<SessionError>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            is_model_loading: true,
            is_camera_active: false,
            current_detections: Vec::new(),
            average_confidence: 0,
            error: None,
        }
    }

    pub fn is_model_loading(&self) -> bool {
        self.is_model_loading
    }

    pub fn is_camera_active(&self) -> bool {
        self.is_camera_active
    }

    pub fn current_detections(&self) -> &[Detection] {
        &self.current_detections
    }

    pub fn average_confidence(&self) -> u8 {
        self.average_confidence
    }

    /// Number of objects currently on screen.
    pub fn object_count(&self) -> usize {
        self.current_detections.len()
    }

    pub fn error(&self) -> Option<SessionError> {
        self.error
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub(crate) fn set_model_loading(&mut self, loading: bool) {
        self.is_model_loading = loading;
    }

    pub(crate) fn set_camera_active(&mut self, active: bool) {
        self.is_camera_active = active;
    }

    pub(crate) fn set_error(&mut self, error: SessionError) {
        self.error = Some(error);
    }

    pub(crate) fn clear_error_if(&mut self, error: SessionError) {
        if self.error == Some(error) {
            self.error = None;
        }
    }

    /// Replace the current detections and recompute the average.
    pub fn apply_detections(&mut self, detections: Vec<Detection>) {
        self.average_confidence = average_confidence(&detections);
        self.current_detections = detections;
    }

    pub fn clear_detections(&mut self) {
        self.current_detections.clear();
        self.average_confidence = 0;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
