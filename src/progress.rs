//! Progress-callback trait for stamping and upload events.
//!
//! Inject an [`Arc<dyn SubmissionProgressCallback>`] via
//! [`crate::config::FormConfigBuilder::progress_callback`] to follow a
//! submission as the template is stamped and the two objects are uploaded.
//!
//! # Example
//!
//! ```rust
//! use membership_form::{SubmissionProgressCallback, UploadKind};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     uploaded: AtomicUsize,
//! }
//!
//! impl SubmissionProgressCallback for CountingCallback {
//!     fn on_upload_complete(&self, kind: UploadKind, url: &str) {
//!         self.uploaded.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{kind} stored at {url}");
//!     }
//! }
//!
//! let cb: Arc<dyn SubmissionProgressCallback> =
//!     Arc::new(CountingCallback { uploaded: AtomicUsize::new(0) });
//! cb.on_upload_complete(UploadKind::Pdf, "https://storage.example.org/a.pdf");
//! ```

use std::fmt;
use std::sync::Arc;

/// The two objects a submission stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Pdf,
    Metadata,
}

impl fmt::Display for UploadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadKind::Pdf => f.write_str("PDF"),
            UploadKind::Metadata => f.write_str("metadata"),
        }
    }
}

/// Called by the session as a submission is stamped and uploaded.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events arrive in order; stamping and uploads never
/// overlap.
pub trait SubmissionProgressCallback: Send + Sync {
    /// Called before the template is fetched and stamped.
    fn on_stamp_start(&self) {}

    /// Called when the stamped PDF is ready.
    ///
    /// # Arguments
    /// * `pdf_len` — byte length of the stamped PDF
    fn on_stamp_complete(&self, pdf_len: usize) {
        let _ = pdf_len;
    }

    /// Called just before an object is sent to storage.
    fn on_upload_start(&self, kind: UploadKind) {
        let _ = kind;
    }

    /// Called when storage has accepted an object.
    fn on_upload_complete(&self, kind: UploadKind, url: &str) {
        let _ = (kind, url);
    }

    /// Called when an upload fails. The submission stops there.
    fn on_upload_error(&self, kind: UploadKind, error: &str) {
        let _ = (kind, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SubmissionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::FormConfig`].
pub type ProgressCallback = Arc<dyn SubmissionProgressCallback>;
