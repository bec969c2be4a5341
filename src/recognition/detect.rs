//! Object detection adapter.
//!
//! The detector runs on a file path rather than a decoded image. Only the
//! class labels of its results are used downstream.

use crate::error::ModelError;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Default detector confidence cutoff
pub const DEFAULT_CONFIDENCE: f32 = 0.20;

/// One detected instance as reported by the model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub class_id: usize,
    pub confidence: f32,
    /// Bounding box as `[x1, y1, x2, y2]` in pixels
    pub bbox: [f32; 4],
}

/// A loaded object detector.
pub trait DetectorModel: Send {
    /// Label for each class id, indexed by id
    fn class_names(&self) -> &[String];

    /// Run detection on the image at `image_path`, reporting instances at or
    /// above `confidence`.
    fn predict(
        &mut self,
        image_path: &Path,
        confidence: f32,
    ) -> Result<Vec<RawDetection>, ModelError>;
}

#[derive(Clone)]
pub struct DetectionAdapter {
    model: Arc<Mutex<Box<dyn DetectorModel>>>,
}

impl DetectionAdapter {
    pub fn new(model: impl DetectorModel + 'static) -> Self {
        Self {
            model: Arc::new(Mutex::new(Box::new(model))),
        }
    }

    /// Load weights from `path` with the given runtime loader.
    pub fn load<M, F>(path: impl AsRef<Path>, loader: F) -> Result<Self, ModelError>
    where
        M: DetectorModel + 'static,
        F: FnOnce(&Path) -> Result<M, ModelError>,
    {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ModelError::Load {
                path: path.to_path_buf(),
                reason: "model file not found".into(),
            });
        }
        let model = loader(path)?;
        tracing::info!("🧠 Detector loaded from {}", path.display());
        Ok(Self::new(model))
    }

    /// Labels of every detected instance at or above `confidence`, highest
    /// confidence first. A label repeats once per instance.
    pub fn detect(&self, image_path: &Path, confidence: f32) -> Result<Vec<String>, ModelError> {
        if !image_path.is_file() {
            return Err(ModelError::Inference(format!(
                "image not found: {}",
                image_path.display()
            )));
        }

        let mut model = self
            .model
            .lock()
            .map_err(|_| ModelError::Inference("detector lock poisoned".into()))?;

        let mut detections = model.predict(image_path, confidence)?;
        detections.retain(|d| d.confidence >= confidence);
        // sort_by is stable, so near-ties keep the model's order
        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let names = model.class_names();
        detections
            .iter()
            .map(|d| {
                names
                    .get(d.class_id)
                    .cloned()
                    .ok_or(ModelError::UnknownClass(d.class_id))
            })
            .collect()
    }
}
