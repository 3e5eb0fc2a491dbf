mod backend;
mod backends;
mod labels;
mod loader;
mod prediction;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use labels::coco_label;
pub use loader::{ModelLoader, ModelSource, ModelState};
pub use prediction::{
    average_confidence, map_predictions, score_to_percent, BoundingBox, Detection, RawPrediction,
};
