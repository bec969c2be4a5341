//! Error types shared across the catalog.
//!
//! `ModelError` covers the recognition boundary (loading and running the
//! classifier and detector). `CatalogError` covers everything else and wraps
//! `ModelError` so staging failures surface through one type.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a recognition model or its adapter.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The model weights could not be loaded. Fatal at startup.
    #[error("Failed to load model from {}: {reason}", .path.display())]
    Load { path: PathBuf, reason: String },

    /// The model ran but reported a failure.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// The classifier produced a score vector of the wrong length.
    #[error("Classifier returned {actual} scores for {expected} categories")]
    OutputShape { expected: usize, actual: usize },

    /// The classifier produced no scores at all.
    #[error("Classifier returned an empty score vector")]
    EmptyOutput,

    /// The detector reported a class id missing from its name table.
    #[error("Detector returned unknown class id {0}")]
    UnknownClass(usize),
}

/// Errors raised by staging, committing and searching.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Error from the SQLite detection index.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error without a known path.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IO error on a specific file or directory.
    #[error("IO error at {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error while walking the stored image tree.
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// Image decode or encode failure.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// A recognition model failed.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// A model call missed its deadline.
    #[error("{stage} did not finish within {millis} ms")]
    Timeout { stage: &'static str, millis: u128 },

    /// A blocking worker panicked or was cancelled.
    #[error("Worker failed: {0}")]
    Worker(String),

    /// A category or object label cannot be used as a directory name.
    #[error("Invalid label {0:?}")]
    InvalidLabel(String),

    /// A rename or confirmation named a label the staged result doesn't have.
    #[error("Unknown object label {0:?}")]
    UnknownLabel(String),

    /// Commit was requested before every value was confirmed.
    #[error("Submission {submission} still needs confirmation for: {}", .pending.join(", "))]
    Unconfirmed {
        submission: String,
        pending: Vec<String>,
    },

    /// JSON (de)serialization of a staged result failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The TOML configuration file could not be parsed.
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The configuration parsed but holds unusable values.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A mutex guarding shared state was poisoned by a panicking holder.
    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl CatalogError {
    /// Attach a path to an IO error.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CatalogError::File {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfirmed_lists_pending_values() {
        let err = CatalogError::Unconfirmed {
            submission: "abc".to_string(),
            pending: vec!["category".to_string(), "sink".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Submission abc still needs confirmation for: category, sink"
        );
    }

    #[test]
    fn test_model_error_converts() {
        let err: CatalogError = ModelError::UnknownClass(7).into();
        assert!(matches!(err, CatalogError::Model(ModelError::UnknownClass(7))));
    }
}
