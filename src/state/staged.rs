//! Staged recognition results awaiting confirmation
//!
//! A `StagedResult` holds what the models proposed for one upload. The
//! confirmation surface edits and confirms it, then hands it back to the
//! pipeline for commit. It serializes to JSON so it can live in session
//! state between requests.

use super::data::{validate_label, SubmissionId};
use crate::error::{CatalogError, Result};
use crate::recognition::Classification;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Drop repeated labels, keeping each at the position of its first occurrence.
pub fn dedup_labels<I>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    labels
        .into_iter()
        .filter(|label| seen.insert(label.clone()))
        .collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct StagedObject {
    label: String,
    confirmed: bool,
}

/// Result of staging one image
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StagedResult {
    submission: SubmissionId,
    category: String,
    category_confirmed: bool,
    /// Classifier confidence for the originally proposed category
    confidence: f32,
    objects: Vec<StagedObject>,
    temp_path: PathBuf,
    staged_at: DateTime<Utc>,
}

impl StagedResult {
    /// Build a staged result. `detected` may hold repeats; they are collapsed.
    pub fn new(
        submission: SubmissionId,
        classification: Classification,
        detected: Vec<String>,
        temp_path: PathBuf,
    ) -> Self {
        let objects = dedup_labels(detected)
            .into_iter()
            .map(|label| StagedObject {
                label,
                confirmed: false,
            })
            .collect();

        Self {
            submission,
            category: classification.category,
            category_confirmed: false,
            confidence: classification.confidence,
            objects,
            temp_path,
            staged_at: Utc::now(),
        }
    }

    pub fn submission(&self) -> SubmissionId {
        self.submission
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Distinct object labels in detection order
    pub fn object_labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.objects.iter().map(|o| o.label.as_str())
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn staged_at(&self) -> DateTime<Utc> {
        self.staged_at
    }

    /// Replace the category. A changed value needs confirming again.
    pub fn set_category(&mut self, category: impl Into<String>) -> Result<()> {
        let category = category.into();
        validate_label(&category)?;
        if category != self.category {
            self.category = category;
            self.category_confirmed = false;
        }
        Ok(())
    }

    /// Rename one object label in place. The renamed label needs confirming again.
    ///
    /// Renaming onto a label that is already present merges the two: the
    /// renamed entry is dropped and the existing one keeps its position and
    /// confirmation state.
    pub fn rename_object_label(&mut self, from: &str, to: impl Into<String>) -> Result<()> {
        let to = to.into();
        validate_label(&to)?;

        let index = self
            .position(from)
            .ok_or_else(|| CatalogError::UnknownLabel(from.to_string()))?;

        if to == from {
            return Ok(());
        }

        if self.position(&to).is_some() {
            self.objects.remove(index);
        } else {
            self.objects[index] = StagedObject {
                label: to,
                confirmed: false,
            };
        }
        Ok(())
    }

    pub fn confirm_category(&mut self) {
        self.category_confirmed = true;
    }

    pub fn confirm_object_label(&mut self, label: &str) -> Result<()> {
        let index = self
            .position(label)
            .ok_or_else(|| CatalogError::UnknownLabel(label.to_string()))?;
        self.objects[index].confirmed = true;
        Ok(())
    }

    /// Confirm the category and every object label at once
    pub fn confirm_all(&mut self) {
        self.category_confirmed = true;
        for object in &mut self.objects {
            object.confirmed = true;
        }
    }

    /// Values still awaiting confirmation: `"category"` and/or object labels
    pub fn pending_confirmations(&self) -> Vec<String> {
        let mut pending = Vec::new();
        if !self.category_confirmed {
            pending.push("category".to_string());
        }
        pending.extend(
            self.objects
                .iter()
                .filter(|o| !o.confirmed)
                .map(|o| o.label.clone()),
        );
        pending
    }

    pub fn is_fully_confirmed(&self) -> bool {
        self.category_confirmed && self.objects.iter().all(|o| o.confirmed)
    }

    /// Convert to JSON for session storage
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON (from session storage)
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn position(&self, label: &str) -> Option<usize> {
        self.objects.iter().position(|o| o.label == label)
    }
}
