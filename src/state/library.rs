use super::data::{DetectionRecord, SubmissionId};
use crate::error::{CatalogError, Result};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// The Library manages the SQLite detection index.
/// It stores one row per (submission, confirmed object label) and is the
/// only persisted structure besides the image tree itself.
pub struct Library {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Library {
    /// Open or create the index at `db_path` and initialize the schema.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CatalogError::file(parent, e))?;
        }

        let conn = Connection::open(&db_path)?;
        tracing::info!("📁 Detection index at: {}", db_path.display());

        let library = Library {
            conn: Mutex::new(conn),
            db_path,
        };
        library.init_schema()?;

        Ok(library)
    }

    /// An index that lives only as long as this value
    pub fn open_in_memory() -> Result<Self> {
        let library = Library {
            conn: Mutex::new(Connection::open_in_memory()?),
            db_path: PathBuf::from(":memory:"),
        };
        library.init_schema()?;
        Ok(library)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.connection()?;

        // No primary key: one row per (submission, confirmed object label)
        conn.execute(
            "CREATE TABLE IF NOT EXISTS detections (
                img_id      TEXT,
                class_name  TEXT,
                hierarchy   TEXT
            )",
            [],
        )?;

        // Replace-set and per-submission lookups go through img_id
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_detections_img_id
             ON detections(img_id)",
            [],
        )?;

        tracing::debug!("✅ Detection schema initialized");
        Ok(())
    }

    /// Get the path to the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Count of rows in the index
    pub fn record_count(&self) -> Result<i64> {
        let conn = self.connection()?;
        let count = conn.query_row("SELECT COUNT(*) FROM detections", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Count of distinct submissions in the index
    pub fn submission_count(&self) -> Result<i64> {
        let conn = self.connection()?;
        let count = conn.query_row(
            "SELECT COUNT(DISTINCT img_id) FROM detections",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Make the rows for `submission` exactly one per label under `hierarchy`.
    ///
    /// The delete and the inserts share one transaction.
    /// Returns the number of rows that were replaced.
    pub fn replace_records(
        &self,
        submission: &SubmissionId,
        hierarchy: &str,
        labels: &[String],
    ) -> Result<usize> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;

        let removed = tx.execute("DELETE FROM detections WHERE img_id = ?1", params![submission])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO detections (img_id, class_name, hierarchy) VALUES (?1, ?2, ?3)",
            )?;
            for label in labels {
                insert.execute(params![submission, label, hierarchy])?;
            }
        }
        tx.commit()?;

        Ok(removed)
    }

    /// Delete every row for `submission`
    pub fn delete_records(&self, submission: &SubmissionId) -> Result<usize> {
        let conn = self.connection()?;
        let removed =
            conn.execute("DELETE FROM detections WHERE img_id = ?1", params![submission])?;
        Ok(removed)
    }

    /// Rows for one submission, in insertion order
    pub fn records_for(&self, submission: &SubmissionId) -> Result<Vec<DetectionRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT img_id, class_name, hierarchy FROM detections WHERE img_id = ?1 ORDER BY rowid",
        )?;

        let records = stmt
            .query_map(params![submission], |row| {
                Ok(DetectionRecord {
                    submission: row.get(0)?,
                    object_label: row.get(1)?,
                    hierarchy: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    /// Every row in the index.
    /// Rows that can't be read back (e.g. a malformed img_id written by
    /// another tool) are skipped.
    pub fn all_records(&self) -> Result<Vec<DetectionRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT img_id, class_name, hierarchy FROM detections")?;

        let records: Vec<DetectionRecord> = stmt
            .query_map([], |row| {
                Ok(DetectionRecord {
                    submission: row.get(0)?,
                    object_label: row.get(1)?,
                    hierarchy: row.get(2)?,
                })
            })?
            .filter_map(|r| match r {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("⚠️  Skipping unreadable detection row: {}", e);
                    None
                }
            })
            .collect();

        Ok(records)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CatalogError::LockPoisoned("detection index"))
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}
