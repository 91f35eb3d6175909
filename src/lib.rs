//! # membership-form
//!
//! Collect a membership registration over several screens, stamp the answers
//! onto the organisation's blank PDF form and hand the result to storage.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Session
//!  │
//!  ├─ 1. Primary   personal details, identity checksum, signature
//!  ├─ 2. Spouse    only when the applicant includes one
//!  ├─ 3. Payment   card details, payer selection
//!  ├─ 4. Stamp     template + Hebrew-capable font → filled PDF (spawn_blocking)
//!  ├─ 5. Preview   the user checks the generated document
//!  └─ 6. Confirm   PDF upload, then JSON metadata pointing at it
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use membership_form::{ClientEnvironment, FormConfig, ResourceSource, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FormConfig::builder()
//!         .template(ResourceSource::parse("https://cdn.example.org/form.pdf")?)
//!         .text_font(ResourceSource::parse("fonts/Rubik-Regular.ttf")?)
//!         .upload_endpoint("https://functions.example.org/api")
//!         .build()?;
//!
//!     let mut session = Session::from_config(&config).await?;
//!     # let primary = membership_form::PersonInput::default();
//!     # let payment = membership_form::PaymentInput::default();
//!     session.submit_primary(primary)?;
//!     session.submit_payment(payment).await?;
//!     let preview = session.preview_pdf().unwrap_or_default();
//!     eprintln!("preview is {} bytes", preview.len());
//!     let receipt = session.confirm(&ClientEnvironment::default()).await?;
//!     println!("stored at {}", receipt.pdf_url);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `formstamp` developer binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! membership-form = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod fetch;
pub mod output;
pub mod progress;
pub mod record;
pub mod reference;
pub mod script;
pub mod session;
pub mod signature;
pub mod stamp;
pub mod upload;
pub mod validate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{FormConfig, FormConfigBuilder, ResourceSource, UploadMode, UploadRoutes};
pub use error::{FieldError, FieldErrors, FormError};
pub use output::write_pdf;
pub use progress::{NoopProgressCallback, ProgressCallback, SubmissionProgressCallback, UploadKind};
pub use record::{
    Gender, MaritalStatus, Payer, PaymentInput, PaymentRecord, PersonInput, PersonRecord,
    PrimaryApplicant, SpouseRecord, SubmissionBundle,
};
pub use session::{Screen, Session, Stage};
pub use signature::{SignatureImage, SignaturePad, SignatureRenderer};
pub use stamp::layout::FieldLayout;
pub use stamp::{DocumentStamper, TemplateStamper};
pub use upload::backend::UploadBackend;
pub use upload::environment::ClientEnvironment;
pub use upload::{Dispatcher, HttpUploadBackend, UploadContext, UploadReceipt};
pub use validate::{is_valid_identity_number, ValidationContext};
