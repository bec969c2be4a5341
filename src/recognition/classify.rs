//! Scene classification adapter.
//!
//! The adapter owns preprocessing (resize to the model's square input and
//! VGG16-style mean subtraction) and postprocessing (probabilities, argmax).
//! The model itself is anything implementing `ClassifierModel`.

use crate::error::ModelError;
use image::{imageops::FilterType, DynamicImage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Side length of the classifier's square input
pub const INPUT_SIZE: u32 = 224;

/// ImageNet channel means in BGR order, subtracted from raw 0-255 values
const IMAGENET_BGR_MEANS: [f32; 3] = [103.939, 116.779, 123.68];

/// A preprocessed image ready for the classifier.
///
/// Layout is NHWC with N = 1 and channels in BGR order.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl ImageTensor {
    /// Resize `image` to `size`×`size` (bicubic) and apply mean subtraction.
    pub fn from_image(image: &DynamicImage, size: u32) -> Self {
        let resized = image.resize_exact(size, size, FilterType::CatmullRom).to_rgb8();

        let mut data = Vec::with_capacity((size * size * 3) as usize);
        for pixel in resized.pixels() {
            let [r, g, b] = pixel.0;
            data.push(b as f32 - IMAGENET_BGR_MEANS[0]);
            data.push(g as f32 - IMAGENET_BGR_MEANS[1]);
            data.push(r as f32 - IMAGENET_BGR_MEANS[2]);
        }

        Self {
            width: size,
            height: size,
            data,
        }
    }

    /// Tensor shape as `[batch, height, width, channels]`
    pub fn shape(&self) -> [usize; 4] {
        [1, self.height as usize, self.width as usize, 3]
    }
}

/// A loaded image classifier.
///
/// Returns one score per category, in the same order as the adapter's
/// category list. Implementations are not assumed to be thread-safe; the
/// adapter serializes calls.
pub trait ClassifierModel: Send {
    fn predict(&mut self, input: &ImageTensor) -> Result<Vec<f32>, ModelError>;
}

/// The classifier's verdict for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub confidence: f32,
}

/// Shared handle to a classifier and the categories it was trained on.
#[derive(Clone)]
pub struct ClassificationAdapter {
    model: Arc<Mutex<Box<dyn ClassifierModel>>>,
    categories: Arc<[String]>,
    input_size: u32,
}

impl ClassificationAdapter {
    pub fn new(model: impl ClassifierModel + 'static, categories: Vec<String>) -> Self {
        Self {
            model: Arc::new(Mutex::new(Box::new(model))),
            categories: categories.into(),
            input_size: INPUT_SIZE,
        }
    }

    /// Load weights from `path` with the given runtime loader.
    ///
    /// A missing weights file or a loader failure is returned as
    /// `ModelError::Load`; the caller should treat it as fatal.
    pub fn load<M, F>(
        path: impl AsRef<Path>,
        categories: Vec<String>,
        loader: F,
    ) -> Result<Self, ModelError>
    where
        M: ClassifierModel + 'static,
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
        tracing::info!("🧠 Classifier loaded from {}", path.display());
        Ok(Self::new(model, categories))
    }

    /// Override the square input size (defaults to 224)
    pub fn with_input_size(mut self, size: u32) -> Self {
        self.input_size = size;
        self
    }

    /// The fixed set of categories this classifier can produce
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn classify(&self, image: &DynamicImage) -> Result<Classification, ModelError> {
        let tensor = ImageTensor::from_image(image, self.input_size);

        let scores = {
            let mut model = self
                .model
                .lock()
                .map_err(|_| ModelError::Inference("classifier lock poisoned".into()))?;
            model.predict(&tensor)?
        };

        pick_category(&self.categories, &scores)
    }
}

/// Turn raw scores into a probability vector.
/// Scores already within [0, 1] are taken as probabilities; anything else
/// is treated as logits and passed through softmax.
fn to_probabilities(scores: &[f32]) -> Result<Vec<f32>, ModelError> {
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(ModelError::Inference("non-finite score".into()));
    }
    if scores.iter().all(|s| (0.0..=1.0).contains(s)) {
        return Ok(scores.to_vec());
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if !sum.is_finite() || sum <= 0.0 {
        return Err(ModelError::Inference("softmax sum is not finite".into()));
    }
    Ok(exps.into_iter().map(|e| e / sum).collect())
}

/// Argmax over the categories. Ties go to the earliest category.
fn pick_category(categories: &[String], scores: &[f32]) -> Result<Classification, ModelError> {
    if scores.is_empty() {
        return Err(ModelError::EmptyOutput);
    }
    if scores.len() != categories.len() {
        return Err(ModelError::OutputShape {
            expected: categories.len(),
            actual: scores.len(),
        });
    }

    let probabilities = to_probabilities(scores)?;
    let mut best = 0;
    for (i, p) in probabilities.iter().enumerate() {
        if *p > probabilities[best] {
            best = i;
        }
    }

    Ok(Classification {
        category: categories[best].clone(),
        confidence: probabilities[best],
    })
}
