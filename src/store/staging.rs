use crate::error::{CatalogError, Result};
use crate::state::data::SubmissionId;
use image::{DynamicImage, ImageFormat};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Scratch directory for temporary copies between staging and commit.
///
/// Lives outside the durable tree so a commit's cleanup scan never sees it.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    /// Open the staging directory, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CatalogError::file(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<staging>/<id>.jpg`
    pub fn path_for(&self, submission: &SubmissionId) -> PathBuf {
        self.dir.join(submission.file_name())
    }

    /// Write the temporary copy for `submission`.
    ///
    /// The returned guard deletes the file when dropped unless `keep` is called.
    pub fn write(&self, submission: &SubmissionId, image: &DynamicImage) -> Result<TempCopy> {
        let path = self.path_for(submission);
        let guard = TempCopy { path: Some(path.clone()) };
        image.to_rgb8().save_with_format(&path, ImageFormat::Jpeg)?;
        Ok(guard)
    }

    /// Delete the temporary copy for `submission`.
    /// Returns `false` if there was nothing to delete.
    pub fn remove(&self, submission: &SubmissionId) -> Result<bool> {
        let path = self.path_for(submission);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CatalogError::file(path, e)),
        }
    }
}

/// A temporary copy that is removed on drop unless kept
#[derive(Debug)]
pub struct TempCopy {
    path: Option<PathBuf>,
}

impl TempCopy {
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Keep the file and hand back its path
    pub fn keep(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }
}

impl Drop for TempCopy {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!("🧹 Cleaned up staging copy {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("⚠️  Could not remove staging copy {}: {}", path.display(), e)
                }
            }
        }
    }
}
