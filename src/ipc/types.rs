use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::db::SqliteStore;
use crate::fixtures::{self, SeedSummary};
use crate::store::{MemoryStore, RecordStore};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub store: Option<Box<dyn RecordStore>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_workspace(&mut self, path: &Path) -> anyhow::Result<()> {
        let store = SqliteStore::open(path)?;
        info!(workspace = %path.display(), "workspace opened");
        self.workspace = Some(path.to_path_buf());
        self.store = Some(Box::new(store));
        Ok(())
    }

    /// Replaces the current store with a fresh in-memory one holding the
    /// demo dataset.
    pub fn open_demo(&mut self) -> anyhow::Result<SeedSummary> {
        let mut store = MemoryStore::new();
        let summary = fixtures::seed(&mut store)?;
        self.workspace = None;
        self.store = Some(Box::new(store));
        Ok(summary)
    }

    pub fn backend(&self) -> Option<&'static str> {
        self.store.as_ref().map(|s| s.backend())
    }
}
