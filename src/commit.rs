//! Commit manager: the only writer of durable state.
//!
//! A commit replaces everything the catalog holds for one submission:
//! 1. every stored copy of the submission, under any hierarchy or label, is deleted
//! 2. one JPEG copy is written per confirmed label
//! 3. the index rows are replaced (one transaction)
//! 4. the staging copy is removed
//!
//! Steps are not rolled back across the filesystem/index boundary. A failure
//! part way through is returned to the caller, who recovers by committing
//! again; recommit is idempotent.

use crate::error::{CatalogError, Result};
use crate::state::data::{validate_label, SubmissionId};
use crate::state::library::Library;
use crate::state::staged::dedup_labels;
use crate::store::{ImageTree, StagingArea};
use image::DynamicImage;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// Where the pixels for a commit come from
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// An image file, typically the staging copy
    Path(PathBuf),
    /// An image already in memory
    Decoded(DynamicImage),
}

impl ImageSource {
    fn load(&self) -> Result<Cow<'_, DynamicImage>> {
        match self {
            ImageSource::Path(path) => Ok(Cow::Owned(image::open(path)?)),
            ImageSource::Decoded(image) => Ok(Cow::Borrowed(image)),
        }
    }
}

/// What a commit wrote
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitReceipt {
    pub submission: SubmissionId,
    pub hierarchy: String,
    pub stored: Vec<PathBuf>,
    /// Stored copies deleted before writing
    pub removed_copies: usize,
    /// Index rows replaced
    pub replaced_rows: usize,
}

/// What a removal deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    pub removed_copies: usize,
    pub removed_rows: usize,
}

pub struct CommitManager {
    library: Arc<Library>,
    tree: ImageTree,
    staging: StagingArea,
    locks: Mutex<HashMap<SubmissionId, Arc<Mutex<()>>>>,
}

impl CommitManager {
    pub fn new(library: Arc<Library>, tree: ImageTree, staging: StagingArea) -> Self {
        Self {
            library,
            tree,
            staging,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn tree(&self) -> &ImageTree {
        &self.tree
    }

    /// Replace the durable record of `submission` with `hierarchy`/`labels`.
    ///
    /// Labels are validated and the source decoded before anything is
    /// touched. Repeated labels are collapsed.
    pub fn commit(
        &self,
        submission: &SubmissionId,
        hierarchy: &str,
        labels: &[String],
        source: &ImageSource,
    ) -> Result<CommitReceipt> {
        validate_label(hierarchy)?;
        for label in labels {
            validate_label(label)?;
        }
        let labels = dedup_labels(labels.iter().cloned());
        let image = source.load()?;

        self.with_submission_lock(submission, || {
            let removed_copies = self.tree.remove_submission(submission)?;

            let stored = labels
                .iter()
                .map(|label| self.tree.write_copy(hierarchy, label, submission, &image))
                .collect::<Result<Vec<_>>>()?;

            let replaced_rows = self.library.replace_records(submission, hierarchy, &labels)?;

            self.staging.remove(submission)?;

            tracing::info!(
                "✅ Committed {} under {} with {} label(s)",
                submission,
                hierarchy,
                labels.len()
            );

            Ok(CommitReceipt {
                submission: *submission,
                hierarchy: hierarchy.to_string(),
                stored,
                removed_copies,
                replaced_rows,
            })
        })
    }

    /// Delete every stored copy and index row of `submission`.
    pub fn remove(&self, submission: &SubmissionId) -> Result<RemovalReport> {
        self.with_submission_lock(submission, || {
            let removed_copies = self.tree.remove_submission(submission)?;
            let removed_rows = self.library.delete_records(submission)?;
            tracing::info!(
                "🗑️  Removed {} ({} copies, {} rows)",
                submission,
                removed_copies,
                removed_rows
            );
            Ok(RemovalReport {
                removed_copies,
                removed_rows,
            })
        })
    }

    /// Run `work` holding the lock for `submission`. Different submissions
    /// don't contend.
    /// Poison on the per-submission mutex is ignored; it guards no data.
    fn with_submission_lock<T>(
        &self,
        submission: &SubmissionId,
        work: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| CatalogError::LockPoisoned("commit lock table"))?;
            Arc::clone(locks.entry(*submission).or_default())
        };
        let _prune = PruneOnExit {
            locks: &self.locks,
            submission,
            lock: &lock,
        };

        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        work()
    }
}

/// Forgets a submission's lock once nobody else holds or waits on it.
/// Runs on unwind too.
struct PruneOnExit<'a> {
    locks: &'a Mutex<HashMap<SubmissionId, Arc<Mutex<()>>>>,
    submission: &'a SubmissionId,
    lock: &'a Arc<Mutex<()>>,
}

impl Drop for PruneOnExit<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(self.lock) == 2 {
            locks.remove(self.submission);
        }
    }
}
