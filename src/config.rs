//! Catalog configuration.
//!
//! Sources, lowest priority first: built-in defaults, a TOML file,
//! `FIXTURE_CATALOG_*` environment variables. The binary applies CLI flags
//! on top of that.

use crate::error::{CatalogError, Result};
use crate::recognition::DEFAULT_CONFIDENCE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const ENV_PREFIX: &str = "FIXTURE_CATALOG_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file holding the `detections` table
    pub db_path: PathBuf,
    /// Root of the `<hierarchy>/<label>/<id>.jpg` tree
    pub output_root: PathBuf,
    /// Where temporary copies live between staging and commit
    pub staging_dir: PathBuf,
    /// Detector confidence cutoff, inclusive
    pub detection_threshold: f32,
    /// Deadline for a single model call
    pub model_timeout_secs: u64,
    /// Categories the classifier can produce, in model output order
    pub categories: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("detections.db"),
            output_root: PathBuf::from("output_images"),
            staging_dir: PathBuf::from("staging"),
            detection_threshold: DEFAULT_CONFIDENCE,
            model_timeout_secs: 30,
            categories: vec!["Modern".to_string(), "Western".to_string()],
        }
    }
}

impl Config {
    /// Defaults with every path placed under `dir`.
    pub fn rooted_at(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            db_path: dir.join("detections.db"),
            output_root: dir.join("output_images"),
            staging_dir: dir.join("staging"),
            ..Self::default()
        }
    }

    /// Defaults placed in the user's data directory:
    /// - Linux: ~/.local/share/fixture-catalog/
    /// - macOS: ~/Library/Application Support/fixture-catalog/
    /// - Windows: %APPDATA%\fixture-catalog\
    pub fn in_data_dir() -> Result<Self> {
        let base = dirs::data_dir().or_else(dirs::home_dir).ok_or_else(|| {
            CatalogError::Config("could not determine user data directory".into())
        })?;
        Ok(Self::rooted_at(base.join("fixture-catalog")))
    }

    /// Parse a TOML file. Missing keys fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CatalogError::file(path, e))?;
        let config: Config = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `FIXTURE_CATALOG_*` environment variables.
    /// Values that fail to parse are logged and ignored.
    pub fn apply_env(self) -> Self {
        self.apply_vars(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("OUTPUT_ROOT") {
            self.output_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("STAGING_DIR") {
            self.staging_dir = PathBuf::from(v);
        }
        if let Some(v) = parsed(&lookup, "DETECTION_THRESHOLD") {
            self.detection_threshold = v;
        }
        if let Some(v) = parsed(&lookup, "MODEL_TIMEOUT_SECS") {
            self.model_timeout_secs = v;
        }
        if let Some(v) = lookup("CATEGORIES") {
            self.categories = v
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect();
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.detection_threshold) {
            return Err(CatalogError::Config(format!(
                "detection_threshold must be within [0, 1], got {}",
                self.detection_threshold
            )));
        }
        if self.categories.is_empty() {
            return Err(CatalogError::Config("categories must not be empty".into()));
        }
        if self.model_timeout_secs == 0 {
            return Err(CatalogError::Config("model_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("⚠️  Ignoring {ENV_PREFIX}{key}={raw:?}: not a valid value");
            None
        }
    }
}
