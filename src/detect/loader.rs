use std::path::PathBuf;

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::backends::StubBackend;

type ModelFactory = Box<dyn FnOnce() -> Result<Box<dyn DetectorBackend>> + Send>;

/// Where the detection model comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelSource {
    /// Built-in bright-region detector.
    Stub { label: String },
    /// SSD-style ONNX export run through tract (feature `backend-tract`).
    Onnx {
        path: PathBuf,
        input_width: u32,
        input_height: u32,
        min_score: f32,
        max_detections: usize,
    },
}

impl ModelSource {
    fn into_factory(self) -> ModelFactory {
        match self {
            ModelSource::Stub { label } => Box::new(move || open_stub(label)),
            ModelSource::Onnx {
                path,
                input_width,
                input_height,
                min_score,
                max_detections,
            } => Box::new(move || open_onnx(path, input_width, input_height, min_score, max_detections)),
        }
    }
}

fn open_stub(label: String) -> Result<Box<dyn DetectorBackend>> {
    Ok(Box::new(StubBackend::new().with_label(label)))
}

#[cfg(feature = "backend-tract")]
fn open_onnx(
    path: PathBuf,
    input_width: u32,
    input_height: u32,
    min_score: f32,
    max_detections: usize,
) -> Result<Box<dyn DetectorBackend>> {
    let backend = crate::detect::backends::TractBackend::new(&path, input_width, input_height)?
        .with_min_score(min_score)
        .with_max_detections(max_detections);
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn open_onnx(
    path: PathBuf,
    _input_width: u32,
    _input_height: u32,
    _min_score: f32,
    _max_detections: usize,
) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "cannot load {}: built without the backend-tract feature",
        path.display()
    ))
}

/// Observable loader state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelState {
    Pending,
    Ready,
    Failed(String),
}

/// One-shot model initialisation.
///
/// The factory runs at most once. A failed load is never retried; later calls
/// return the recorded failure. A successful load is reused by every later call.
pub struct ModelLoader {
    factory: Option<ModelFactory>,
    handle: Option<Box<dyn DetectorBackend>>,
    failure: Option<String>,
}

impl ModelLoader {
    pub fn new(source: ModelSource) -> Self {
        Self::from_factory(source.into_factory())
    }

    /// Loader over an arbitrary constructor, e.g. a test backend.
    pub fn from_factory<F>(factory: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn DetectorBackend>> + Send + 'static,
    {
        Self {
            factory: Some(Box::new(factory)),
            handle: None,
            failure: None,
        }
    }

    /// Loader that already holds a ready backend.
    pub fn ready(backend: Box<dyn DetectorBackend>) -> Self {
        Self {
            factory: None,
            handle: Some(backend),
            failure: None,
        }
    }

    pub fn load(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        if let Some(failure) = &self.failure {
            return Err(anyhow!("model load previously failed: {}", failure));
        }
        let factory = self
            .factory
            .take()
            .ok_or_else(|| anyhow!("model loader has no factory"))?;

        let loaded = factory().and_then(|mut backend| {
            backend.warm_up()?;
            Ok(backend)
        });
        match loaded {
            Ok(backend) => {
                log::info!("model loaded: backend={}", backend.name());
                self.handle = Some(backend);
                Ok(())
            }
            Err(err) => {
                let message = format!("{:#}", err);
                log::error!("model load failed: {}", message);
                self.failure = Some(message);
                Err(err)
            }
        }
    }

    pub fn state(&self) -> ModelState {
        match (&self.handle, &self.failure) {
            (Some(_), _) => ModelState::Ready,
            (None, Some(failure)) => ModelState::Failed(failure.clone()),
            (None, None) => ModelState::Pending,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.handle.is_some()
    }

    /// The loaded model, if any.
    pub fn model_mut(&mut self) -> Option<&mut (dyn DetectorBackend + 'static)> {
        self.handle.as_deref_mut()
    }
}
