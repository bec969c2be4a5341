//! State management module
//!
//! This module handles all catalog state, including:
//! - The SQLite detection index (library.rs)
//! - Shared data structures (data.rs)
//! - Staged results awaiting confirmation (staged.rs)

pub mod data;
pub mod library;
pub mod staged;
