//! Upload dispatch: persist the stamped PDF and its JSON metadata.
//!
//! Both objects share an *upload context*,
//! `{primaryIdentityNumber}-{timestamp}-{uuid}`, used as the object name
//! stem. The PDF always goes first; the metadata, which embeds the PDF's
//! URL, is only sent once storage has accepted the PDF. Nothing is retried
//! and the two uploads never overlap.

pub mod backend;
pub mod environment;

use crate::error::FormError;
use crate::progress::{ProgressCallback, UploadKind};
use crate::record::SubmissionBundle;
use backend::{PdfUpload, UploadBackend};
use chrono::{DateTime, SecondsFormat, Utc};
use environment::{ClientEnvironment, EnvironmentRecord};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

pub use backend::{HttpUploadBackend, StoredObject};
pub use environment::{lookup_ip, Geometry, UNKNOWN_IP};

/// Shared object-name stem of one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UploadContext(String);

impl UploadContext {
    /// `{id}-{UTC ISO-8601 with milliseconds}-{uuid v4}`.
    pub fn new(id_number: &str, at: DateTime<Utc>, nonce: Uuid) -> Self {
        let stamp = at.to_rfc3339_opts(SecondsFormat::Millis, true);
        Self(format!("{id_number}-{stamp}-{nonce}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn pdf_name(&self) -> String {
        format!("{}.pdf", self.0)
    }
}

impl fmt::Display for UploadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a successful dispatch stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub context: UploadContext,
    pub pdf_url: String,
    pub metadata_url: String,
    pub submitted_at: DateTime<Utc>,
}

/// The metadata object, as uploaded.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMetadata<'a> {
    pub upload_context: &'a UploadContext,
    pub submitted_at: String,
    pub pdf_url: &'a str,
    pub form_data: &'a SubmissionBundle,
    pub environment: EnvironmentRecord,
}

/// Sends a stamped submission to storage.
pub struct Dispatcher {
    backend: Arc<dyn UploadBackend>,
    client: reqwest::Client,
    ip_lookup_url: Option<String>,
    progress: Option<ProgressCallback>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn UploadBackend>, client: reqwest::Client) -> Self {
        Self {
            backend,
            client,
            ip_lookup_url: None,
            progress: None,
        }
    }

    /// Resolve the client's public IP through `url`. Without one the IP is
    /// recorded as [`UNKNOWN_IP`].
    pub fn with_ip_lookup(mut self, url: impl Into<String>) -> Self {
        self.ip_lookup_url = Some(url.into());
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Upload `pdf`, then the metadata describing it.
    pub async fn dispatch(
        &self,
        pdf: &[u8],
        bundle: &SubmissionBundle,
        env: &ClientEnvironment,
    ) -> Result<UploadReceipt, FormError> {
        self.dispatch_at(pdf, bundle, env, Utc::now(), Uuid::new_v4())
            .await
    }

    /// [`Dispatcher::dispatch`] with the clock and nonce supplied.
    pub async fn dispatch_at(
        &self,
        pdf: &[u8],
        bundle: &SubmissionBundle,
        env: &ClientEnvironment,
        now: DateTime<Utc>,
        nonce: Uuid,
    ) -> Result<UploadReceipt, FormError> {
        let id_number = bundle.primary.person.id_number.as_str();
        let context = UploadContext::new(id_number, now, nonce);
        let pdf_name = context.pdf_name();
        info!("Uploading submission {}", context);

        self.notify(|cb| cb.on_upload_start(UploadKind::Pdf));
        let pdf_object = self
            .backend
            .upload_pdf(PdfUpload {
                file_name: &pdf_name,
                content_type: "application/pdf",
                id_number,
                bytes: pdf,
            })
            .await
            .inspect_err(|e| self.failed(UploadKind::Pdf, e))?;
        self.notify(|cb| cb.on_upload_complete(UploadKind::Pdf, &pdf_object.url));
        info!("PDF stored at {}", pdf_object.url);

        let ip_address = match &self.ip_lookup_url {
            Some(url) => lookup_ip(&self.client, url).await,
            None => UNKNOWN_IP.to_string(),
        };
        let metadata = SubmissionMetadata {
            upload_context: &context,
            submitted_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            pdf_url: &pdf_object.url,
            form_data: bundle,
            environment: EnvironmentRecord {
                ip_address,
                client: env.clone(),
            },
        };
        let metadata = serde_json::to_value(&metadata)
            .map_err(|e| FormError::Internal(format!("metadata serialisation: {e}")))?;

        self.notify(|cb| cb.on_upload_start(UploadKind::Metadata));
        let metadata_object = self
            .backend
            .upload_metadata(context.as_str(), &metadata, &pdf_object.url)
            .await
            .inspect_err(|e| self.failed(UploadKind::Metadata, e))?;
        self.notify(|cb| cb.on_upload_complete(UploadKind::Metadata, &metadata_object.url));
        info!("Metadata stored at {}", metadata_object.url);

        Ok(UploadReceipt {
            context,
            pdf_url: pdf_object.url,
            metadata_url: metadata_object.url,
            submitted_at: now,
        })
    }

    fn notify(&self, event: impl FnOnce(&ProgressCallback)) {
        if let Some(cb) = &self.progress {
            event(cb);
        }
    }

    fn failed(&self, kind: UploadKind, e: &FormError) {
        error!("{} upload failed: {}", kind, e);
        self.notify(|cb| cb.on_upload_error(kind, &e.to_string()));
    }
}
