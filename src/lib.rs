//! Fixture catalog
//!
//! Classifies a bathroom image, detects the fixtures in it, stages the result
//! for human confirmation, and commits confirmed images into a searchable
//! `<category>/<object>/<id>.jpg` tree backed by a SQLite index.
//!
//! The recognition models are supplied by the embedding application through
//! the `ClassifierModel` and `DetectorModel` traits.

pub mod catalog;
pub mod commit;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod recognition;
pub mod search;
pub mod state;
pub mod store;

pub use catalog::Catalog;
pub use commit::{CommitManager, CommitReceipt, ImageSource, RemovalReport};
pub use config::Config;
pub use error::{CatalogError, ModelError, Result};
pub use pipeline::Pipeline;
pub use recognition::Models;
pub use search::{DriftReport, SearchIndex};
pub use state::data::{DetectionRecord, SubmissionId};
pub use state::staged::StagedResult;
