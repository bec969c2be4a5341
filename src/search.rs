//! Keyword search over the detection index.
//!
//! Read-only. Matching is accent- and case-insensitive substring containment
//! on either the object label or the hierarchy of a row.

use crate::error::Result;
use crate::state::data::{DetectionRecord, SubmissionId};
use crate::state::library::Library;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;

/// Decompose to base characters, drop anything non-ASCII, lower-case.
pub fn normalize(text: &str) -> String {
    text.nfkd()
        .filter(char::is_ascii)
        .collect::<String>()
        .to_lowercase()
}

/// Index rows whose stored copy has gone missing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftReport {
    pub checked: usize,
    pub missing: Vec<DetectionRecord>,
}

pub struct SearchIndex {
    library: Arc<Library>,
    root: PathBuf,
}

impl SearchIndex {
    pub fn new(library: Arc<Library>, root: impl Into<PathBuf>) -> Self {
        Self {
            library,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Paths of stored copies whose label or hierarchy contains `keyword`.
    ///
    /// Sorted by path, one entry per (submission, hierarchy, label). Rows
    /// whose file no longer exists are left out silently.
    pub fn search(&self, keyword: &str) -> Result<Vec<PathBuf>> {
        let needle = normalize(keyword);

        let candidates: BTreeSet<PathBuf> = self
            .library
            .all_records()?
            .into_iter()
            .filter(|record| {
                normalize(&record.object_label).contains(&needle)
                    || normalize(&record.hierarchy).contains(&needle)
            })
            .map(|record| record.stored_path(&self.root))
            .collect();

        let total = candidates.len();
        let paths: Vec<PathBuf> = candidates.into_iter().filter(|p| p.is_file()).collect();

        if paths.len() < total {
            tracing::debug!(
                "🔍 {:?}: dropped {} indexed path(s) missing on disk",
                keyword,
                total - paths.len()
            );
        }
        tracing::debug!("🔍 {:?} matched {} image(s)", keyword, paths.len());

        Ok(paths)
    }

    pub fn records_for(&self, submission: &SubmissionId) -> Result<Vec<DetectionRecord>> {
        self.library.records_for(submission)
    }

    pub fn record_count(&self) -> Result<i64> {
        self.library.record_count()
    }

    pub fn submission_count(&self) -> Result<i64> {
        self.library.submission_count()
    }

    /// Report index rows whose stored copy is missing. Nothing is repaired.
    pub fn verify(&self) -> Result<DriftReport> {
        let records = self.library.all_records()?;
        let checked = records.len();
        let missing: Vec<DetectionRecord> = records
            .into_iter()
            .filter(|record| !record.stored_path(&self.root).is_file())
            .collect();

        if !missing.is_empty() {
            tracing::warn!(
                "⚠️  {} of {} indexed copies are missing on disk",
                missing.len(),
                checked
            );
        }

        Ok(DriftReport { checked, missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ImageTree;
    use image::{DynamicImage, Rgb, RgbImage};

    struct Fixture {
        _dir: tempfile::TempDir,
        library: Arc<Library>,
        tree: ImageTree,
        index: SearchIndex,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let library = Arc::new(Library::open_in_memory().unwrap());
        let tree = ImageTree::open(dir.path().join("output_images")).unwrap();
        let index = SearchIndex::new(Arc::clone(&library), tree.root());
        Fixture {
            _dir: dir,
            library,
            tree,
            index,
        }
    }

    fn store(f: &Fixture, hierarchy: &str, labels: &[&str]) -> SubmissionId {
        let id = SubmissionId::new();
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([9, 9, 9])));
        let labels: Vec<String> = labels.iter().map(|s| s.to_string()).collect();
        for label in &labels {
            f.tree.write_copy(hierarchy, label, &id, &image).unwrap();
        }
        f.library.replace_records(&id, hierarchy, &labels).unwrap();
        id
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Modern"), "modern");
        assert_eq!(normalize("MODÉRN"), "modern");
        assert_eq!(normalize("Céramique Évier"), "ceramique evier");
        assert_eq!(normalize("ｓｉｎｋ"), "sink");
    }

    #[test]
    fn test_case_and_accent_insensitive() {
        let f = fixture();
        let id = store(&f, "Modern", &["Sink"]);
        let expected = vec![f.tree.copy_path("Modern", "Sink", &id)];

        for query in ["modern", "MODERN", "Modérn", "sink", "SÍNK", "ode"] {
            assert_eq!(f.index.search(query).unwrap(), expected, "query {query:?}");
        }
        assert!(f.index.search("western").unwrap().is_empty());
    }

    #[test]
    fn test_accented_stored_labels() {
        let f = fixture();
        let id = store(&f, "Western", &["Lavabo Céramique"]);

        let hits = f.index.search("ceramique").unwrap();
        assert_eq!(hits, vec![f.tree.copy_path("Western", "Lavabo Céramique", &id)]);
    }

    #[test]
    fn test_hierarchy_match_returns_every_label() {
        let f = fixture();
        let id = store(&f, "Western", &["toilet", "sink"]);
        store(&f, "Modern", &["sink"]);

        let hits = f.index.search("western").unwrap();
        let mut expected = vec![
            f.tree.copy_path("Western", "sink", &id),
            f.tree.copy_path("Western", "toilet", &id),
        ];
        expected.sort();
        assert_eq!(hits, expected);
        assert_eq!(f.index.search("sink").unwrap().len(), 2);
    }

    #[test]
    fn test_missing_files_are_dropped() {
        let f = fixture();
        let id = store(&f, "Modern", &["sink", "mirror"]);
        std::fs::remove_file(f.tree.copy_path("Modern", "sink", &id)).unwrap();

        assert!(f.index.search("sink").unwrap().is_empty());
        assert_eq!(f.index.search("modern").unwrap().len(), 1);

        let report = f.index.verify().unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].object_label, "sink");
    }

    #[test]
    fn test_empty_keyword_matches_everything() {
        let f = fixture();
        store(&f, "Modern", &["sink"]);
        store(&f, "Western", &["toilet"]);

        assert_eq!(f.index.search("").unwrap().len(), 2);
    }
}
