//! Staging/commit pipeline: the API the confirmation surface talks to.
//!
//! `stage` runs both models and returns a `StagedResult` without touching
//! durable storage. The caller edits and confirms it, then either
//! `commit_staged`s or `discard`s it.

use crate::catalog::Catalog;
use crate::commit::{CommitReceipt, ImageSource};
use crate::config::Config;
use crate::error::{CatalogError, Result};
use crate::recognition::{blocking, with_deadline, Models};
use crate::search::SearchIndex;
use crate::state::data::SubmissionId;
use crate::state::staged::StagedResult;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub struct Pipeline {
    catalog: Catalog,
    models: Models,
    threshold: f32,
    deadline: Duration,
}

impl Pipeline {
    /// Open the catalog described by `config` and attach the loaded models.
    ///
    /// The classifier must have been built for exactly `config.categories`.
    pub fn new(config: &Config, models: Models) -> Result<Self> {
        if models.classifier.categories() != config.categories.as_slice() {
            return Err(CatalogError::Config(format!(
                "classifier categories {:?} do not match configured categories {:?}",
                models.classifier.categories(),
                config.categories
            )));
        }
        let catalog = Catalog::open(config)?;
        Ok(Self {
            catalog,
            models,
            threshold: config.detection_threshold,
            deadline: config.model_timeout(),
        })
    }

    /// Override the per-model-call deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The fixed set of categories the classifier can produce
    pub fn list_categories(&self) -> &[String] {
        self.models.classifier.categories()
    }

    /// Run recognition on `image` and stage the result.
    ///
    /// On any failure the temporary copy is removed and nothing durable
    /// has changed; the caller retries with the image.
    pub async fn stage(&self, image: DynamicImage) -> Result<StagedResult> {
        let submission = SubmissionId::new();
        let image = Arc::new(image);

        let temp = {
            let staging = self.catalog.staging().clone();
            let image = Arc::clone(&image);
            blocking("staging copy", move || staging.write(&submission, &image)).await?
        };

        let classification = {
            let classifier = self.models.classifier.clone();
            let image = Arc::clone(&image);
            with_deadline("classification", self.deadline, move || {
                Ok(classifier.classify(&image)?)
            })
            .await?
        };

        let detected = {
            let detector = self.models.detector.clone();
            let path = temp.path().to_path_buf();
            let threshold = self.threshold;
            with_deadline("detection", self.deadline, move || {
                Ok(detector.detect(&path, threshold)?)
            })
            .await?
        };

        let staged = StagedResult::new(submission, classification, detected, temp.keep());
        tracing::info!(
            "📥 Staged {} as {} ({:.2}) with objects {:?}",
            submission,
            staged.category(),
            staged.confidence(),
            staged.object_labels().collect::<Vec<_>>()
        );

        Ok(staged)
    }

    /// Decode the image at `path` (converted to RGB) and stage it.
    pub async fn stage_path(&self, path: impl AsRef<Path>) -> Result<StagedResult> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let image = blocking("decode upload", move || {
            Ok(DynamicImage::ImageRgb8(image::open(&path)?.to_rgb8()))
        })
        .await?;
        self.stage(image).await
    }

    /// Commit a confirmed staged result, using its staging copy as the source.
    pub async fn commit_staged(&self, staged: &StagedResult) -> Result<CommitReceipt> {
        if !staged.is_fully_confirmed() {
            return Err(CatalogError::Unconfirmed {
                submission: staged.submission().to_string(),
                pending: staged.pending_confirmations(),
            });
        }

        let labels: Vec<String> = staged.object_labels().map(String::from).collect();
        self.commit(
            staged.submission(),
            staged.category().to_string(),
            labels,
            ImageSource::Path(staged.temp_path().to_path_buf()),
        )
        .await
    }

    /// Commit `labels` under `category` for `submission`, replacing any
    /// previous commit of the same submission.
    pub async fn commit(
        &self,
        submission: SubmissionId,
        category: String,
        labels: Vec<String>,
        source: ImageSource,
    ) -> Result<CommitReceipt> {
        let commits = Arc::clone(self.catalog.commits());
        blocking("commit", move || commits.commit(&submission, &category, &labels, &source)).await
    }

    /// Abandon a staged result and delete its temporary copy.
    pub fn discard(&self, staged: StagedResult) -> Result<()> {
        if self.catalog.staging().remove(&staged.submission())? {
            tracing::info!("🧹 Discarded {}", staged.submission());
        }
        Ok(())
    }

    pub fn search(&self, keyword: &str) -> Result<Vec<PathBuf>> {
        self.catalog.search().search(keyword)
    }

    pub fn search_index(&self) -> &SearchIndex {
        self.catalog.search()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::recognition::{
        ClassificationAdapter, ClassifierModel, DetectionAdapter, DetectorModel, ImageTensor,
        RawDetection,
    };
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedClassifier {
        scores: Vec<f32>,
        delay: Duration,
    }

    impl ClassifierModel for FixedClassifier {
        fn predict(&mut self, _input: &ImageTensor) -> std::result::Result<Vec<f32>, ModelError> {
            std::thread::sleep(self.delay);
            Ok(self.scores.clone())
        }
    }

    struct FixedDetector {
        names: Vec<String>,
        class_ids: Vec<usize>,
        calls: Arc<AtomicUsize>,
    }

    impl DetectorModel for FixedDetector {
        fn class_names(&self) -> &[String] {
            &self.names
        }

        fn predict(
            &mut self,
            image_path: &Path,
            _confidence: f32,
        ) -> std::result::Result<Vec<RawDetection>, ModelError> {
            assert!(image_path.is_file(), "detector must see the staging copy");
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .class_ids
                .iter()
                .enumerate()
                .map(|(i, &class_id)| RawDetection {
                    class_id,
                    confidence: 0.9 - i as f32 * 0.1,
                    bbox: [0.0; 4],
                })
                .collect())
        }
    }

    struct FailingDetector;

    impl DetectorModel for FailingDetector {
        fn class_names(&self) -> &[String] {
            &[]
        }

        fn predict(
            &mut self,
            _image_path: &Path,
            _confidence: f32,
        ) -> std::result::Result<Vec<RawDetection>, ModelError> {
            Err(ModelError::Inference("GPU fell over".into()))
        }
    }

    fn categories() -> Vec<String> {
        vec!["Modern".into(), "Western".into()]
    }

    fn classifier(delay: Duration) -> ClassificationAdapter {
        ClassificationAdapter::new(
            FixedClassifier {
                scores: vec![0.8, 0.2],
                delay,
            },
            categories(),
        )
    }

    fn detector(class_ids: Vec<usize>) -> (DetectionAdapter, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = DetectionAdapter::new(FixedDetector {
            names: vec!["sink".into(), "mirror".into(), "toilet".into()],
            class_ids,
            calls: Arc::clone(&calls),
        });
        (adapter, calls)
    }

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([30, 60, 90])))
    }

    fn staged_files(pipeline: &Pipeline) -> usize {
        std::fs::read_dir(pipeline.catalog().staging().dir()).unwrap().count()
    }

    #[tokio::test]
    async fn test_stage_dedups_and_leaves_durable_state_alone() {
        let dir = tempfile::tempdir().unwrap();
        let (detector, calls) = detector(vec![0, 0, 1, 0]);
        let pipeline = Pipeline::new(
            &Config::rooted_at(dir.path()),
            Models::new(classifier(Duration::ZERO), detector),
        )
        .unwrap();

        let staged = pipeline.stage(sample()).await.unwrap();

        assert_eq!(staged.category(), "Modern");
        assert!((staged.confidence() - 0.8).abs() < 1e-6);
        assert_eq!(staged.object_labels().collect::<Vec<_>>(), vec!["sink", "mirror"]);
        assert!(staged.temp_path().is_file());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.search_index().record_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_staging_twice_mints_two_identities() {
        let dir = tempfile::tempdir().unwrap();
        let (detector, _) = detector(vec![2]);
        let pipeline = Pipeline::new(
            &Config::rooted_at(dir.path()),
            Models::new(classifier(Duration::ZERO), detector),
        )
        .unwrap();

        let first = pipeline.stage(sample()).await.unwrap();
        let second = pipeline.stage(sample()).await.unwrap();

        assert_ne!(first.submission(), second.submission());
        assert_ne!(first.temp_path(), second.temp_path());
        assert_eq!(staged_files(&pipeline), 2);
    }

    #[tokio::test]
    async fn test_detector_failure_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            &Config::rooted_at(dir.path()),
            Models::new(classifier(Duration::ZERO), DetectionAdapter::new(FailingDetector)),
        )
        .unwrap();

        let err = pipeline.stage(sample()).await.unwrap_err();

        assert!(matches!(err, CatalogError::Model(ModelError::Inference(_))));
        assert_eq!(staged_files(&pipeline), 0);
    }

    #[tokio::test]
    async fn test_slow_classifier_times_out_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let (detector, calls) = detector(vec![0]);
        let pipeline = Pipeline::new(
            &Config::rooted_at(dir.path()),
            Models::new(classifier(Duration::from_millis(300)), detector),
        )
        .unwrap()
        .with_deadline(Duration::from_millis(20));

        let err = pipeline.stage(sample()).await.unwrap_err();

        assert!(matches!(err, CatalogError::Timeout { stage: "classification", .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(staged_files(&pipeline), 0);
    }

    #[tokio::test]
    async fn test_commit_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let (detector, _) = detector(vec![0, 1]);
        let pipeline = Pipeline::new(
            &Config::rooted_at(dir.path()),
            Models::new(classifier(Duration::ZERO), detector),
        )
        .unwrap();

        let mut staged = pipeline.stage(sample()).await.unwrap();
        staged.confirm_category();
        staged.confirm_object_label("sink").unwrap();

        let err = pipeline.commit_staged(&staged).await.unwrap_err();
        match err {
            CatalogError::Unconfirmed { pending, .. } => {
                assert_eq!(pending, vec!["mirror".to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(pipeline.search_index().record_count().unwrap(), 0);
        assert!(staged.temp_path().is_file());
    }

    #[tokio::test]
    async fn test_edit_confirm_commit() {
        let dir = tempfile::tempdir().unwrap();
        let (detector, _) = detector(vec![0, 1]);
        let pipeline = Pipeline::new(
            &Config::rooted_at(dir.path()),
            Models::new(classifier(Duration::ZERO), detector),
        )
        .unwrap();

        let mut staged = pipeline.stage(sample()).await.unwrap();
        staged.set_category("Western").unwrap();
        staged.rename_object_label("mirror", "toilet").unwrap();
        staged.confirm_all();

        let receipt = pipeline.commit_staged(&staged).await.unwrap();

        assert_eq!(receipt.hierarchy, "Western");
        assert_eq!(receipt.stored.len(), 2);
        assert!(!staged.temp_path().exists());
        assert_eq!(
            pipeline.search("toilet").unwrap(),
            vec![pipeline
                .catalog()
                .commits()
                .tree()
                .copy_path("Western", "toilet", &staged.submission())]
        );
    }

    #[tokio::test]
    async fn test_discard_removes_temp_copy() {
        let dir = tempfile::tempdir().unwrap();
        let (detector, _) = detector(vec![0]);
        let pipeline = Pipeline::new(
            &Config::rooted_at(dir.path()),
            Models::new(classifier(Duration::ZERO), detector),
        )
        .unwrap();

        let staged = pipeline.stage(sample()).await.unwrap();
        let copy = staged.submission();
        pipeline.discard(staged.clone()).unwrap();
        pipeline.discard(staged).unwrap();

        assert!(!pipeline.catalog().staging().path_for(&copy).exists());
        assert_eq!(pipeline.search_index().record_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stage_path_decodes_upload() {
        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("upload.png");
        sample().save(&upload).unwrap();

        let (detector, _) = detector(vec![2]);
        let pipeline = Pipeline::new(
            &Config::rooted_at(dir.path()),
            Models::new(classifier(Duration::ZERO), detector),
        )
        .unwrap();

        let staged = pipeline.stage_path(&upload).await.unwrap();
        assert_eq!(staged.object_labels().collect::<Vec<_>>(), vec!["toilet"]);
        assert_eq!(image::image_dimensions(staged.temp_path()).unwrap(), (64, 48));
    }

    #[test]
    fn test_list_categories() {
        let dir = tempfile::tempdir().unwrap();
        let (detector, _) = detector(Vec::new());
        let pipeline = Pipeline::new(
            &Config::rooted_at(dir.path()),
            Models::new(classifier(Duration::ZERO), detector),
        )
        .unwrap();

        assert_eq!(pipeline.list_categories(), ["Modern".to_string(), "Western".to_string()]);
    }

    #[test]
    fn test_category_mismatch_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::rooted_at(dir.path());
        config.categories = vec!["Rustic".into()];
        let (detector, _) = detector(Vec::new());

        let result = Pipeline::new(&config, Models::new(classifier(Duration::ZERO), detector));

        assert!(matches!(result, Err(CatalogError::Config(_))));
        assert!(!config.db_path.exists());
    }
}
