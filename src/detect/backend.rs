use anyhow::Result;

use crate::detect::prediction::RawPrediction;
use crate::frame::Frame;

/// Object detector backend.
///
/// A backend maps one frame to a list of raw predictions. It is called once per
/// loop iteration and may fail on any call; the detection loop treats such
/// failures as transient.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Boxes are returned in pixel coordinates of `frame`, not model input space.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawPrediction>>;

    /// Optional warm-up hook, run once after the model is loaded.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
