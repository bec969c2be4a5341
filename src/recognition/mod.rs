//! Recognition boundary
//!
//! This module wraps the two pretrained models the pipeline consumes:
//! - Scene classification (classify.rs)
//! - Object detection (detect.rs)
//!
//! Models are loaded once at startup, bundled into `Models` and handed to the
//! pipeline. Each model sits behind its own mutex, and every call runs on a
//! blocking worker under a deadline.

pub mod classify;
pub mod detect;

pub use classify::{Classification, ClassificationAdapter, ClassifierModel, ImageTensor, INPUT_SIZE};
pub use detect::{DetectionAdapter, DetectorModel, RawDetection, DEFAULT_CONFIDENCE};

use crate::error::{CatalogError, Result};
use std::time::Duration;

/// The recognition capabilities injected into the pipeline
#[derive(Clone)]
pub struct Models {
    pub classifier: ClassificationAdapter,
    pub detector: DetectionAdapter,
}

impl Models {
    pub fn new(classifier: ClassificationAdapter, detector: DetectionAdapter) -> Self {
        Self { classifier, detector }
    }
}

/// Run `work` on the blocking pool and give up after `deadline`.
///
/// A timed-out worker keeps running in the background; its result is dropped.
pub(crate) async fn with_deadline<T, F>(
    stage: &'static str,
    deadline: Duration,
    work: F,
) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(work);
    match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(CatalogError::Worker(format!("{stage}: {join}"))),
        Err(_) => {
            tracing::warn!("⏱️  {} exceeded {:?}", stage, deadline);
            Err(CatalogError::Timeout {
                stage,
                millis: deadline.as_millis(),
            })
        }
    }
}

/// Run `work` on the blocking pool without a deadline.
pub(crate) async fn blocking<T, F>(stage: &'static str, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|join| CatalogError::Worker(format!("{stage}: {join}")))?
}
