//! The append-only frame ledger.
//!
//! [`FrameLedger`] persists one [`FrameRecord`] per extracted or saved frame
//! as a CSV file with a fixed header:
//!
//! ```text
//! video_id,src_video_path,timestamp_ms,frame_index,kind,image_relpath
//! ```
//!
//! Rows are only ever appended; existing rows are never rewritten or
//! reordered. Uniqueness of `image_relpath` is guaranteed by the writers
//! (they skip frames whose destination file already exists), not checked on
//! read. The ledger does no locking: callers serialize appends.
//!
//! # Example
//!
//! ```no_run
//! use frameledger::{FrameKind, FrameLedger};
//!
//! let ledger = FrameLedger::open("project/metadata/frames.csv")?;
//! let keyframes: Vec<_> = ledger
//!     .read_all()?
//!     .into_iter()
//!     .filter(|record| record.kind == FrameKind::Keyframe)
//!     .collect();
//! println!("{} keyframes", keyframes.len());
//! # Ok::<(), frameledger::FrameLedgerError>(())
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use csv::{ReaderBuilder, Terminator, Trim, Writer, WriterBuilder};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::FrameLedgerError;

/// Column names of the ledger, in order.
pub const LEDGER_COLUMNS: [&str; 6] = [
    "video_id",
    "src_video_path",
    "timestamp_ms",
    "frame_index",
    "kind",
    "image_relpath",
];

/// How a frame entered the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// A single frame captured on demand by the operator.
    Keyframe,
    /// A frame sampled by batch range extraction.
    Range,
}

impl FrameKind {
    /// Value stored in the `kind` column.
    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Keyframe => "keyframe",
            FrameKind::Range => "range",
        }
    }

    /// Storage subdirectory under the video folder.
    pub fn dir_name(self) -> &'static str {
        match self {
            FrameKind::Keyframe => "keyframes",
            FrameKind::Range => "ranges",
        }
    }
}

impl Display for FrameKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keyframe" => Ok(FrameKind::Keyframe),
            "range" => Ok(FrameKind::Range),
            other => Err(format!("unknown frame kind: {other}")),
        }
    }
}

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Identity of the source video.
    pub video_id: String,
    /// Source video path as recorded at extraction time.
    pub src_video_path: String,
    /// Presentation time of the frame in milliseconds.
    pub timestamp_ms: u64,
    /// Frame index in the source video's native frame rate.
    pub frame_index: u64,
    /// Keyframe or range-extracted.
    pub kind: FrameKind,
    /// `/`-separated image path relative to the project root.
    pub image_relpath: String,
}

/// Handle to a ledger file.
#[derive(Debug, Clone)]
pub struct FrameLedger {
    path: PathBuf,
}

impl FrameLedger {
    /// Open a ledger, creating it (and its parent directory) with a header
    /// row if it is missing or empty.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, FrameLedgerError> {
        let ledger = Self::at(path);
        let needs_header = match fs::metadata(&ledger.path) {
            Ok(metadata) => metadata.len() == 0,
            Err(_) => true,
        };
        if needs_header {
            write_header(&ledger.path, &LEDGER_COLUMNS)?;
        }
        Ok(ledger)
    }

    /// Handle to a ledger at `path` without touching the filesystem.
    ///
    /// [`read_all`](Self::read_all) on a missing file returns no rows, and
    /// the first [`append`](Self::append) creates it.
    pub fn at<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Path of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append rows in the order given. Returns the number of rows written.
    ///
    /// Existing content is never rewritten; a missing trailing newline left
    /// by a manual edit is repaired before the new rows.
    pub fn append(&self, records: &[FrameRecord]) -> Result<usize, FrameLedgerError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut writer = appender(&self.path, &LEDGER_COLUMNS)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;

        log::debug!("Appended {} row(s) to {}", records.len(), self.path.display());
        Ok(records.len())
    }

    /// Read every row in file order.
    ///
    /// A missing ledger reads as empty.
    ///
    /// # Errors
    ///
    /// Returns [`FrameLedgerError::LedgerSchema`] if the header does not
    /// match [`LEDGER_COLUMNS`], or [`FrameLedgerError::Ledger`] for a row
    /// that cannot be parsed.
    pub fn read_all(&self) -> Result<Vec<FrameRecord>, FrameLedgerError> {
        read_rows(&self.path, &LEDGER_COLUMNS)
    }
}

/// Read every row of a headed CSV file, checking the header against
/// `columns`. A missing or empty file reads as no rows.
pub(crate) fn read_rows<T: DeserializeOwned>(
    path: &Path,
    columns: &[&str],
) -> Result<Vec<T>, FrameLedgerError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    // Values are stored verbatim; only header cells are trimmed.
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::Headers)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Ok(Vec::new());
    }
    if !headers.iter().eq(columns.iter().copied()) {
        return Err(FrameLedgerError::LedgerSchema {
            expected: columns.join(","),
            found: headers.iter().collect::<Vec<_>>().join(","),
        });
    }

    reader
        .deserialize::<T>()
        .map(|row| row.map_err(FrameLedgerError::from))
        .collect()
}

/// Writer positioned after the last complete row of `path`, writing the
/// header first when the file is missing or empty.
pub(crate) fn appender(path: &Path, columns: &[&str]) -> Result<Writer<File>, FrameLedgerError> {
    let length = fs::metadata(path).map(|metadata| metadata.len()).unwrap_or(0);
    if length == 0 {
        write_header(path, columns)?;
    } else if !ends_with_newline(path)? {
        OpenOptions::new().append(true).open(path)?.write_all(b"\n")?;
    }

    let file = OpenOptions::new().append(true).open(path)?;
    Ok(WriterBuilder::new()
        .has_headers(false)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(file))
}

fn write_header(path: &Path, columns: &[&str]) -> Result<(), FrameLedgerError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_path(path)?;
    writer.write_record(columns)?;
    writer.flush()?;
    Ok(())
}

fn ends_with_newline(path: &Path) -> Result<bool, FrameLedgerError> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0_u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_text() {
        for kind in [FrameKind::Keyframe, FrameKind::Range] {
            assert_eq!(kind.as_str().parse::<FrameKind>().unwrap(), kind);
        }
        assert!("thumbnail".parse::<FrameKind>().is_err());
        assert_eq!(FrameKind::Range.dir_name(), "ranges");
    }

    #[test]
    fn open_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata").join("frames.csv");
        FrameLedger::open(&path).unwrap();
        FrameLedger::open(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, format!("{}\n", LEDGER_COLUMNS.join(",")));
    }
}
