//! Range extraction configuration.
//!
//! [`ExtractOptions`] is a builder that threads progress callbacks,
//! cancellation, a watchdog timeout, and encoder tuning through
//! [`RangeExtractor`](crate::RangeExtractor) without widening its
//! signature. A default-constructed value reproduces the plain behaviour:
//! no progress, no cancellation, no timeout.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use frameledger::{CancellationToken, ExtractOptions};
//!
//! let token = CancellationToken::new();
//! let options = ExtractOptions::new()
//!     .with_cancellation(token.clone())
//!     .with_timeout(Duration::from_secs(120))
//!     .with_batch_size(10);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;

use crate::progress::{CancellationToken, ProgressCallback};

/// JPEG quality scale passed as `-q:v` (2 is near-lossless).
const DEFAULT_JPEG_QUALITY: u8 = 2;

/// Configuration for range extraction.
#[derive(Clone)]
pub struct ExtractOptions {
    pub(crate) progress: Option<Arc<dyn ProgressCallback>>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) batch_size: u64,
    pub(crate) timeout: Option<Duration>,
    pub(crate) jpeg_quality: u8,
}

impl Debug for ExtractOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExtractOptions")
            .field("has_progress", &self.progress.is_some())
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .field("timeout", &self.timeout)
            .field("jpeg_quality", &self.jpeg_quality)
            .finish_non_exhaustive()
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractOptions {
    /// Defaults: no progress callback, no cancellation, batch size 1, no
    /// timeout, JPEG quality 2.
    pub fn new() -> Self {
        Self {
            progress: None,
            cancellation: None,
            batch_size: 1,
            timeout: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Attach a progress callback, fired every
    /// [`batch_size`](ExtractOptions::with_batch_size) frames.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Attach a cancellation token.
    ///
    /// When cancelled, the decoder process is killed and the call returns
    /// [`FrameLedgerError::Cancelled`](crate::FrameLedgerError::Cancelled).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Set how often the progress callback fires. Clamped to at least 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Terminate the decoder if it has not finished within `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the JPEG quality scale (`-q:v`, 2–31, lower is better).
    #[must_use]
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(2, 31);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}
