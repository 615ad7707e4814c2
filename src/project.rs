//! Project storage layout.
//!
//! A project is a directory holding extracted frame images and the frame
//! ledger:
//!
//! ```text
//! <root>/
//!   frames/<video_folder>/keyframes/<filename>
//!   frames/<video_folder>/ranges/<filename>
//!   metadata/frames.csv
//!   metadata/sources.csv
//! ```
//!
//! Filenames encode the timestamp and frame index, so the same logical frame
//! always maps to the same path. Ledger rows store paths relative to the
//! project root, always `/`-separated.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    error::FrameLedgerError,
    identity::{DEFAULT_HASH_LENGTH, video_folder_name},
    ledger::{FrameKind, FrameLedger},
    sources::SourceRegistry,
};

const FRAMES_DIR: &str = "frames";
const METADATA_DIR: &str = "metadata";
const LEDGER_FILE: &str = "frames.csv";
const SOURCES_FILE: &str = "sources.csv";

/// Paths inside one project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    /// Wrap an existing project root without touching the filesystem.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Create `frames/`, `metadata/`, and the ledger header if missing.
    ///
    /// Existing content is left untouched.
    pub fn init<P: Into<PathBuf>>(root: P) -> Result<Self, FrameLedgerError> {
        let layout = Self::new(root);
        fs::create_dir_all(layout.frames_dir())?;
        fs::create_dir_all(layout.metadata_dir())?;
        FrameLedger::open(layout.ledger_path())?;
        log::debug!("Initialised project at {}", layout.root.display());
        Ok(layout)
    }

    /// Project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/frames`.
    pub fn frames_dir(&self) -> PathBuf {
        self.root.join(FRAMES_DIR)
    }

    /// `<root>/metadata`.
    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(METADATA_DIR)
    }

    /// `<root>/metadata/frames.csv`.
    pub fn ledger_path(&self) -> PathBuf {
        self.metadata_dir().join(LEDGER_FILE)
    }

    /// Open the project's ledger, creating it with a header if absent.
    pub fn ledger(&self) -> Result<FrameLedger, FrameLedgerError> {
        FrameLedger::open(self.ledger_path())
    }

    /// `<root>/metadata/sources.csv`.
    pub fn sources_path(&self) -> PathBuf {
        self.metadata_dir().join(SOURCES_FILE)
    }

    /// The project's source registry. Nothing is created until the first
    /// registration.
    pub fn sources(&self) -> SourceRegistry {
        SourceRegistry::new(self.sources_path())
    }

    /// `<root>/frames/<video_folder>`.
    pub fn video_dir(&self, video_folder: &str) -> PathBuf {
        self.frames_dir().join(video_folder)
    }

    /// `<root>/frames/<video_folder>/{keyframes,ranges}`.
    pub fn kind_dir(&self, video_folder: &str, kind: FrameKind) -> PathBuf {
        self.video_dir(video_folder).join(kind.dir_name())
    }

    /// Create both per-video subtrees, returning `(keyframes, ranges)`.
    pub fn ensure_video_dirs(
        &self,
        video_folder: &str,
    ) -> Result<(PathBuf, PathBuf), FrameLedgerError> {
        let keyframes = self.kind_dir(video_folder, FrameKind::Keyframe);
        let ranges = self.kind_dir(video_folder, FrameKind::Range);
        fs::create_dir_all(&keyframes)?;
        fs::create_dir_all(&ranges)?;
        Ok((keyframes, ranges))
    }

    /// Ledger-relative path for a frame file.
    pub fn image_relpath(&self, video_folder: &str, kind: FrameKind, filename: &str) -> String {
        format!("{FRAMES_DIR}/{video_folder}/{}/{filename}", kind.dir_name())
    }

    /// Resolve a `/`-separated relative path against the project root.
    pub fn resolve(&self, image_relpath: &str) -> PathBuf {
        image_relpath
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

/// The per-video values stamped onto every ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoContext {
    /// Storage folder name under `frames/`.
    pub video_folder: String,
    /// Identifier written to the ledger.
    pub video_id: String,
    /// Source path written to the ledger.
    pub src_video_path: String,
}

impl VideoContext {
    /// Build a context from explicit values.
    pub fn new(
        video_folder: impl Into<String>,
        video_id: impl Into<String>,
        src_video_path: impl Into<String>,
    ) -> Self {
        Self {
            video_folder: video_folder.into(),
            video_id: video_id.into(),
            src_video_path: src_video_path.into(),
        }
    }

    /// Derive the context for a video file: the folder name from its
    /// identity, the id equal to the folder name, and the source path
    /// normalised against the project root.
    ///
    /// # Errors
    ///
    /// Returns [`FrameLedgerError::NotFound`] if the video does not exist.
    pub fn for_video<P: AsRef<Path>>(
        layout: &ProjectLayout,
        video_path: P,
    ) -> Result<Self, FrameLedgerError> {
        let video_path = video_path.as_ref();
        let video_folder = video_folder_name(video_path, DEFAULT_HASH_LENGTH)?;
        let src_video_path = normalize_source_path(layout.root(), video_path);
        Ok(Self::new(video_folder.clone(), video_folder, src_video_path))
    }
}

/// Deterministic filename for a frame: `t{timestamp_ms:010}_f{frame_index:08}.{ext}`.
///
/// The extension is lower-cased and any leading dot is stripped.
pub fn frame_filename(timestamp_ms: u64, frame_index: u64, ext: &str) -> String {
    format!(
        "t{timestamp_ms:010}_f{frame_index:08}.{}",
        normalize_extension(ext)
    )
}

pub(crate) fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Path of `video_path` relative to `project_root` when it lives inside the
/// project, otherwise its absolute resolved path.
pub fn normalize_source_path<P: AsRef<Path>, Q: AsRef<Path>>(
    project_root: P,
    video_path: Q,
) -> String {
    let video_path = video_path.as_ref();
    let resolved_video = fs::canonicalize(video_path).unwrap_or_else(|_| video_path.to_path_buf());
    let resolved_root = fs::canonicalize(project_root.as_ref())
        .unwrap_or_else(|_| project_root.as_ref().to_path_buf());

    match resolved_video.strip_prefix(&resolved_root) {
        Ok(relative) => relative.display().to_string(),
        Err(_) => resolved_video.display().to_string(),
    }
}
