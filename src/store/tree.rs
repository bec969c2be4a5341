use crate::error::{CatalogError, Result};
use crate::state::data::{stored_path, SubmissionId};
use image::{DynamicImage, ImageFormat};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Suffix of a copy that is still being written
const PARTIAL_SUFFIX: &str = "partial";

/// The durable `<root>/<hierarchy>/<label>/<id>.jpg` tree.
///
/// One submission is intentionally duplicated into every label directory it
/// was confirmed under.
#[derive(Debug, Clone)]
pub struct ImageTree {
    root: PathBuf,
}

impl ImageTree {
    /// Open the tree at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| CatalogError::file(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a stored copy would have. Does not check existence.
    pub fn copy_path(&self, hierarchy: &str, label: &str, submission: &SubmissionId) -> PathBuf {
        stored_path(&self.root, hierarchy, label, submission)
    }

    /// Delete every file under the root whose name begins with the
    /// submission's identity, whatever directory it sits in.
    /// Returns the number of files removed.
    pub fn remove_submission(&self, submission: &SubmissionId) -> Result<usize> {
        let prefix = submission.to_string();
        let mut removed = 0;

        for entry in WalkDir::new(&self.root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let matches = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(&prefix));
            if !matches {
                continue;
            }

            fs::remove_file(entry.path()).map_err(|e| CatalogError::file(entry.path(), e))?;
            tracing::debug!("🗑️  Removed {}", entry.path().display());
            removed += 1;
        }

        Ok(removed)
    }

    /// Write a JPEG copy of `image` to `<root>/<hierarchy>/<label>/<id>.jpg`.
    ///
    /// The copy is written beside its final name and renamed into place, so a
    /// failed write never leaves a truncated file under the final name.
    pub fn write_copy(
        &self,
        hierarchy: &str,
        label: &str,
        submission: &SubmissionId,
        image: &DynamicImage,
    ) -> Result<PathBuf> {
        let final_path = self.copy_path(hierarchy, label, submission);
        let dir = final_path
            .parent()
            .ok_or_else(|| CatalogError::InvalidLabel(label.to_string()))?;
        fs::create_dir_all(dir).map_err(|e| CatalogError::file(dir, e))?;

        let partial = final_path.with_extension(format!("jpg.{PARTIAL_SUFFIX}"));
        image.to_rgb8().save_with_format(&partial, ImageFormat::Jpeg)?;
        fs::rename(&partial, &final_path).map_err(|e| CatalogError::file(&final_path, e))?;

        tracing::debug!("📸 Stored copy: {}", final_path.display());
        Ok(final_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, Rgb([120, 90, 60])))
    }

    #[test]
    fn test_write_copy_layout_and_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let tree = ImageTree::open(dir.path().join("output_images")).unwrap();
        let id = SubmissionId::new();

        let path = tree.write_copy("Western", "toilet", &id, &sample()).unwrap();

        assert_eq!(path, tree.root().join("Western").join("toilet").join(id.file_name()));
        assert_eq!(image::image_dimensions(&path).unwrap(), (40, 30));
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_remove_submission_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let tree = ImageTree::open(dir.path()).unwrap();
        let id = SubmissionId::new();
        let other = SubmissionId::new();

        tree.write_copy("Modern", "sink", &id, &sample()).unwrap();
        tree.write_copy("Western", "mirror", &id, &sample()).unwrap();
        let kept = tree.write_copy("Modern", "sink", &other, &sample()).unwrap();
        // leftover from an interrupted write
        fs::write(tree.root().join("Modern").join(format!("{id}.jpg.partial")), b"x").unwrap();

        assert_eq!(tree.remove_submission(&id).unwrap(), 3);
        assert!(kept.exists());
        assert_eq!(tree.remove_submission(&id).unwrap(), 0);
    }
}
