//! Storage collaborators: the server-side functions that hold the signing
//! credentials and write objects to the bucket.

use crate::config::{FormConfig, UploadMode, UploadRoutes};
use crate::error::FormError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// A PDF on its way to storage.
#[derive(Debug, Clone, Copy)]
pub struct PdfUpload<'a> {
    pub file_name: &'a str,
    pub content_type: &'a str,
    /// Identity number of the primary applicant, for server-side foldering.
    pub id_number: &'a str,
    pub bytes: &'a [u8],
}

/// Where storage put an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub url: String,
}

/// Writes the PDF and its metadata to storage.
#[async_trait]
pub trait UploadBackend: Send + Sync {
    async fn upload_pdf(&self, upload: PdfUpload<'_>) -> Result<StoredObject, FormError>;

    async fn upload_metadata(
        &self,
        upload_context: &str,
        metadata: &Value,
        pdf_url: &str,
    ) -> Result<StoredObject, FormError>;
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DirectUploadRequest<'a> {
    file_data: String,
    file_name: &'a str,
    content_type: &'a str,
    id_number: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectUploadResponse {
    success: bool,
    #[serde(default)]
    file_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedUrlRequest<'a> {
    file_name: &'a str,
    content_type: &'a str,
    id_number: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedUrlResponse {
    signed_url: String,
    file_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataRequest<'a> {
    upload_context: &'a str,
    metadata: &'a Value,
    pdf_url: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataResponse {
    success: bool,
    #[serde(default)]
    json_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// ── HTTP backend ─────────────────────────────────────────────────────────

/// Talks to the upload functions over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpUploadBackend {
    client: reqwest::Client,
    endpoint: String,
    routes: UploadRoutes,
    mode: UploadMode,
}

impl HttpUploadBackend {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        routes: UploadRoutes,
        mode: UploadMode,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            routes,
            mode,
        }
    }

    /// `None` when the configuration has no upload endpoint.
    pub fn from_config(config: &FormConfig) -> Result<Option<Self>, FormError> {
        let Some(endpoint) = &config.upload_endpoint else {
            return Ok(None);
        };
        Ok(Some(Self::new(
            config.http_client()?,
            endpoint.clone(),
            config.upload_routes.clone(),
            config.upload_mode,
        )))
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{}", self.endpoint, route.trim_start_matches('/'))
    }

    async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        object: &str,
        route: &str,
        body: &B,
    ) -> Result<R, FormError> {
        let url = self.url(route);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport(object, e))?;
        let response = check_status(object, response).await?;
        response.json::<R>().await.map_err(|e| FormError::UploadRejected {
            object: object.to_string(),
            status: 200,
            detail: format!("unexpected response body: {e}"),
        })
    }

    async fn upload_direct(&self, upload: PdfUpload<'_>) -> Result<StoredObject, FormError> {
        let request = DirectUploadRequest {
            file_data: STANDARD.encode(upload.bytes),
            file_name: upload.file_name,
            content_type: upload.content_type,
            id_number: upload.id_number,
        };
        let response: DirectUploadResponse = self
            .post_json(upload.file_name, &self.routes.upload_file, &request)
            .await?;
        match (response.success, response.file_url) {
            (true, Some(url)) => Ok(StoredObject { url }),
            (_, _) => Err(FormError::UploadRejected {
                object: upload.file_name.to_string(),
                status: 200,
                detail: response
                    .error
                    .unwrap_or_else(|| "upload function reported failure".into()),
            }),
        }
    }

    async fn upload_signed(&self, upload: PdfUpload<'_>) -> Result<StoredObject, FormError> {
        let request = SignedUrlRequest {
            file_name: upload.file_name,
            content_type: upload.content_type,
            id_number: upload.id_number,
        };
        let signed: SignedUrlResponse = self
            .post_json(upload.file_name, &self.routes.signed_url, &request)
            .await?;

        debug!("PUT {} ({} bytes)", upload.file_name, upload.bytes.len());
        let response = self
            .client
            .put(&signed.signed_url)
            .header(reqwest::header::CONTENT_TYPE, upload.content_type)
            .body(upload.bytes.to_vec())
            .send()
            .await
            .map_err(|e| transport(upload.file_name, e))?;
        check_status(upload.file_name, response).await?;
        Ok(StoredObject {
            url: signed.file_url,
        })
    }
}

#[async_trait]
impl UploadBackend for HttpUploadBackend {
    async fn upload_pdf(&self, upload: PdfUpload<'_>) -> Result<StoredObject, FormError> {
        match self.mode {
            UploadMode::Direct => self.upload_direct(upload).await,
            UploadMode::SignedUrl => self.upload_signed(upload).await,
        }
    }

    async fn upload_metadata(
        &self,
        upload_context: &str,
        metadata: &Value,
        pdf_url: &str,
    ) -> Result<StoredObject, FormError> {
        let object = format!("{upload_context}.json");
        let request = MetadataRequest {
            upload_context,
            metadata,
            pdf_url,
        };
        let response: MetadataResponse = self
            .post_json(&object, &self.routes.upload_metadata, &request)
            .await?;
        match (response.success, response.json_url) {
            (true, Some(url)) => Ok(StoredObject { url }),
            (_, _) => Err(FormError::UploadRejected {
                object,
                status: 200,
                detail: response
                    .error
                    .unwrap_or_else(|| "metadata function reported failure".into()),
            }),
        }
    }
}

fn transport(object: &str, e: reqwest::Error) -> FormError {
    FormError::UploadTransport {
        object: object.to_string(),
        reason: e.to_string(),
    }
}

/// Map non-2xx responses to [`FormError::UploadRejected`] with a reason the
/// logs can act on.
async fn check_status(
    object: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, FormError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let reason = match status {
        StatusCode::METHOD_NOT_ALLOWED => "method not allowed by the upload function",
        StatusCode::BAD_REQUEST => "upload function rejected the request",
        StatusCode::INTERNAL_SERVER_ERROR => "upload function failed",
        _ => "unexpected status",
    };
    let detail = if body.trim().is_empty() {
        reason.to_string()
    } else {
        format!("{reason}: {}", body.trim())
    };
    Err(FormError::UploadRejected {
        object: object.to_string(),
        status: status.as_u16(),
        detail,
    })
}
