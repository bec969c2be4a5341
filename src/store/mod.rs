//! Filesystem side of the catalog
//!
//! This module handles:
//! - The durable hierarchy-keyed image tree (tree.rs)
//! - The transient staging area for uploads awaiting confirmation (staging.rs)

pub mod staging;
pub mod tree;

pub use staging::{StagingArea, TempCopy};
pub use tree::ImageTree;
