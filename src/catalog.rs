//! The durable catalog without the recognition models: index, image tree,
//! staging area, commit manager and search, opened from one `Config`.

use crate::commit::CommitManager;
use crate::config::Config;
use crate::error::Result;
use crate::search::SearchIndex;
use crate::state::library::Library;
use crate::store::{ImageTree, StagingArea};
use std::sync::Arc;

pub struct Catalog {
    library: Arc<Library>,
    commits: Arc<CommitManager>,
    search: SearchIndex,
    staging: StagingArea,
}

impl Catalog {
    /// Open (or create) the index, the image tree and the staging area.
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;

        let library = Arc::new(Library::open(&config.db_path)?);
        let tree = ImageTree::open(&config.output_root)?;
        let staging = StagingArea::open(&config.staging_dir)?;

        let search = SearchIndex::new(Arc::clone(&library), tree.root());
        let commits = Arc::new(CommitManager::new(Arc::clone(&library), tree, staging.clone()));

        let records = library.record_count()?;
        tracing::info!("🎨 Catalog ready with {} detection record(s)", records);

        Ok(Self {
            library,
            commits,
            search,
            staging,
        })
    }

    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    pub fn commits(&self) -> &Arc<CommitManager> {
        &self.commits
    }

    pub fn search(&self) -> &SearchIndex {
        &self.search
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }
}
