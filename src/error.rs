//! Error types for the membership-form library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`FormError`] — **Fatal for the current operation**: the template could
//!   not be fetched, the PDF could not be stamped, an upload was rejected,
//!   or a screen was submitted out of order. Returned as `Err(FormError)`
//!   from session, stamping and upload entry points.
//!
//! * [`FieldError`] — **Non-fatal, field-scoped**: one input value broke one
//!   rule. Collected into [`FieldErrors`] so the UI can show every problem on
//!   the current screen at once and the session can stay where it is.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Message shown for any failure the UI has no specific text for.
pub const FALLBACK_MESSAGE: &str = "Something went wrong. Please reload the page and try again.";

/// All fatal errors returned by the membership-form library.
///
/// Field-level validation failures are carried inside
/// [`FormError::Validation`] rather than as separate variants.
#[derive(Debug, Error)]
pub enum FormError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// One or more fields on the submitted screen are invalid.
    #[error("{0}")]
    Validation(FieldErrors),

    /// A screen was submitted, or `back` was requested, in the wrong stage.
    #[error("Cannot {action} while on the {stage} screen")]
    InvalidTransition { stage: String, action: String },

    // ── Resource errors ───────────────────────────────────────────────────
    /// Local resource file was not found at the given path.
    #[error("Resource not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The source string is not a valid file path or URL.
    #[error("Invalid resource '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidSource { input: String },

    /// HTTP URL was syntactically valid but the download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The template was fetched but is not a PDF.
    #[error("Template '{source_name}' is not a PDF (first bytes: {magic:?})")]
    NotAPdf { source_name: String, magic: [u8; 4] },

    // ── Stamping errors ───────────────────────────────────────────────────
    /// The template PDF could not be parsed.
    #[error("Template PDF is corrupt: {detail}")]
    CorruptTemplate { detail: String },

    /// The template has no page with the requested number.
    #[error("Template page {page} is missing (document has {total} pages)")]
    MissingPage { page: u32, total: usize },

    /// A font resource could not be parsed as TrueType/OpenType.
    #[error("Font '{name}' could not be loaded: {detail}")]
    FontLoadFailed { name: String, detail: String },

    /// The text font has no glyph for a character that must be stamped.
    #[error("Font '{font}' has no glyph for {ch:?} (field '{field}')")]
    MissingGlyph { font: String, field: String, ch: char },

    /// A signature image is neither PNG nor JPEG, or cannot be decoded.
    #[error("Unsupported signature image: {detail}")]
    UnsupportedImage { detail: String },

    /// Writing the stamped PDF failed.
    #[error("Failed to write stamped PDF: {detail}")]
    PdfWriteFailed { detail: String },

    /// Any stamping failure, as surfaced to the session's caller.
    #[error("Could not generate the membership form: {reason}")]
    StampingFailed { reason: String },

    // ── Upload errors ─────────────────────────────────────────────────────
    /// The upload service answered with a non-success status.
    #[error("Upload of {object} rejected with HTTP {status}: {detail}")]
    UploadRejected {
        object: String,
        status: u16,
        detail: String,
    },

    /// Network failure or malformed response while talking to the upload service.
    #[error("Upload of {object} failed: {reason}")]
    UploadTransport { object: String, reason: String },

    /// Any upload failure, as surfaced to the session's caller.
    #[error("Could not submit the membership form: {reason}")]
    UploadFailed { reason: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or layout validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FormError {
    /// The single notification text the UI shows for this error.
    ///
    /// Validation errors are shown inline per field, so their notification is
    /// a short summary; everything else collapses to one message per category.
    pub fn user_message(&self) -> &'static str {
        match self {
            FormError::Validation(_) => "Please correct the highlighted fields.",
            FormError::InvalidTransition { .. } => FALLBACK_MESSAGE,
            FormError::FileNotFound { .. }
            | FormError::InvalidSource { .. }
            | FormError::DownloadFailed { .. }
            | FormError::DownloadTimeout { .. }
            | FormError::NotAPdf { .. }
            | FormError::CorruptTemplate { .. }
            | FormError::MissingPage { .. }
            | FormError::FontLoadFailed { .. }
            | FormError::MissingGlyph { .. }
            | FormError::UnsupportedImage { .. }
            | FormError::PdfWriteFailed { .. }
            | FormError::StampingFailed { .. } => {
                "The form document could not be generated. Please try again."
            }
            FormError::UploadRejected { .. }
            | FormError::UploadTransport { .. }
            | FormError::UploadFailed { .. } => {
                "The form could not be submitted. Please try again."
            }
            FormError::OutputWriteFailed { .. }
            | FormError::InvalidConfig(_)
            | FormError::Internal(_) => FALLBACK_MESSAGE,
        }
    }

    /// Field errors carried by a [`FormError::Validation`], if any.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            FormError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<FieldErrors> for FormError {
    fn from(errors: FieldErrors) -> Self {
        FormError::Validation(errors)
    }
}

/// A non-fatal error for a single input field.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{field}: {message}")]
pub struct FieldError {
    /// Field name as used by the input drafts (e.g. `"id_number"`).
    pub field: String,
    /// Human-readable message suitable for inline display.
    pub message: String,
}

/// Every field error found on one screen, in rule order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// True if at least one error is attached to `field`.
    pub fn has(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    /// First message recorded for `field`.
    pub fn message_for(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} invalid field(s)", self.0.len())?;
        for (i, e) in self.0.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

impl<'a> IntoIterator for &'a FieldErrors {
    type Item = &'a FieldError;
    type IntoIter = std::slice::Iter<'a, FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
