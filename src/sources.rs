//! Registry of the source videos a project has taken frames from.
//!
//! `metadata/sources.csv` holds one row per video identity:
//!
//! ```text
//! video_id,src_video_path
//! ```
//!
//! Like the frame ledger it is append-only. Registering an id that is
//! already present is a no-op, so callers can register on every extraction.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::FrameLedgerError,
    ledger::{appender, read_rows},
    project::VideoContext,
};

/// Column names of the source registry, in order.
pub const SOURCE_COLUMNS: [&str; 2] = ["video_id", "src_video_path"];

/// One registry row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Identity of the source video.
    pub video_id: String,
    /// Source path as first registered.
    pub src_video_path: String,
}

impl From<&VideoContext> for SourceRecord {
    fn from(video: &VideoContext) -> Self {
        Self {
            video_id: video.video_id.clone(),
            src_video_path: video.src_video_path.clone(),
        }
    }
}

/// Handle to a source registry file.
///
/// Creating the handle touches nothing; the file and its header are written
/// by the first registration.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    path: PathBuf,
}

impl SourceRegistry {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add `source` unless its `video_id` is already registered.
    ///
    /// Returns `true` if a row was written.
    pub fn register(&self, source: &SourceRecord) -> Result<bool, FrameLedgerError> {
        Ok(self.register_all(std::slice::from_ref(source))? == 1)
    }

    /// Register several sources in order, skipping ids already present
    /// (including repeats within `sources`). Returns the rows written.
    pub fn register_all(&self, sources: &[SourceRecord]) -> Result<usize, FrameLedgerError> {
        let mut known: HashSet<String> = self
            .read_all()?
            .into_iter()
            .map(|source| source.video_id)
            .collect();
        let fresh: Vec<&SourceRecord> = sources
            .iter()
            .filter(|source| known.insert(source.video_id.clone()))
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        let mut writer = appender(&self.path, &SOURCE_COLUMNS)?;
        for source in &fresh {
            writer.serialize(source)?;
        }
        writer.flush()?;

        log::debug!("Registered {} source(s) in {}", fresh.len(), self.path.display());
        Ok(fresh.len())
    }

    /// Every registered source in file order. A missing file reads as empty.
    pub fn read_all(&self) -> Result<Vec<SourceRecord>, FrameLedgerError> {
        read_rows(&self.path, &SOURCE_COLUMNS)
    }

    /// Look up the row for `video_id`.
    pub fn find(&self, video_id: &str) -> Result<Option<SourceRecord>, FrameLedgerError> {
        Ok(self
            .read_all()?
            .into_iter()
            .find(|source| source.video_id == video_id))
    }
}
