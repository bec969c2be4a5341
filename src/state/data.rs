//! Shared data structures for the catalog
//!
//! These types flow between the pipeline, the detection index and the
//! stored image tree.

use crate::error::{CatalogError, Result};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// Extension of every stored and staged image copy
pub const IMAGE_EXTENSION: &str = "jpg";

/// Opaque identity minted once per uploaded image.
///
/// Joins the staging copy, the stored copies and the index rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(Uuid);

impl SubmissionId {
    /// Mint a fresh identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// File name used for every copy of this submission
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.0, IMAGE_EXTENSION)
    }
}

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for SubmissionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl ToSql for SubmissionId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.to_string()))
    }
}

impl FromSql for SubmissionId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Uuid::parse_str(text)
            .map(Self)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// One durable row of the `detections` table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub submission: SubmissionId,
    /// Confirmed object label (`class_name` column)
    pub object_label: String,
    /// Confirmed category (`hierarchy` column)
    pub hierarchy: String,
}

impl DetectionRecord {
    /// Where the stored copy for this row lives under `root`
    pub fn stored_path(&self, root: &Path) -> PathBuf {
        stored_path(root, &self.hierarchy, &self.object_label, &self.submission)
    }
}

/// `<root>/<hierarchy>/<label>/<id>.jpg`
pub fn stored_path(
    root: &Path,
    hierarchy: &str,
    label: &str,
    submission: &SubmissionId,
) -> PathBuf {
    root.join(hierarchy).join(label).join(submission.file_name())
}

/// Check that a category or object label can be used as a single directory name.
pub fn validate_label(label: &str) -> Result<()> {
    let trimmed = label.trim();
    let bad = trimmed.is_empty()
        || trimmed != label
        || label == "."
        || label == ".."
        || label.contains(['/', '\\', '\0']);

    if bad {
        return Err(CatalogError::InvalidLabel(label.to_string()));
    }
    Ok(())
}
