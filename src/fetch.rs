//! Resource resolution: load a template, font or reference file from a URL
//! or a local path into memory.
//!
//! The stamping engine works on byte buffers (`lopdf::Document::load_mem`,
//! `rustybuzz::Face::from_slice`), so nothing is written to disk. PDF
//! sources are checked for the `%PDF` magic before they are handed on so
//! callers get a meaningful error rather than a parser failure.

use crate::config::ResourceSource;
use crate::error::FormError;
use std::path::Path;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load the raw bytes behind `source`.
pub async fn fetch_bytes(
    client: &reqwest::Client,
    source: &ResourceSource,
    timeout_secs: Option<u64>,
) -> Result<Vec<u8>, FormError> {
    match source {
        ResourceSource::Url(url) => download(client, url, timeout_secs).await,
        ResourceSource::Path(path) => read_local(path).await,
    }
}

/// Load `source` and verify it is a PDF.
pub async fn fetch_pdf(
    client: &reqwest::Client,
    source: &ResourceSource,
    timeout_secs: Option<u64>,
) -> Result<Vec<u8>, FormError> {
    let bytes = fetch_bytes(client, source, timeout_secs).await?;
    check_pdf_magic(&source.to_string(), &bytes)?;
    Ok(bytes)
}

/// Fail with [`FormError::NotAPdf`] unless `bytes` starts with `%PDF`.
pub fn check_pdf_magic(source_name: &str, bytes: &[u8]) -> Result<(), FormError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(FormError::NotAPdf {
        source_name: source_name.to_string(),
        magic,
    })
}

async fn read_local(path: &Path) -> Result<Vec<u8>, FormError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            debug!("Read {} bytes from {}", bytes.len(), path.display());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FormError::FileNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(FormError::Internal(format!(
            "cannot read '{}': {e}",
            path.display()
        ))),
    }
}

async fn download(
    client: &reqwest::Client,
    url: &str,
    timeout_secs: Option<u64>,
) -> Result<Vec<u8>, FormError> {
    info!("Downloading {}", url);

    let map_err = |e: reqwest::Error| match (e.is_timeout(), timeout_secs) {
        (true, Some(secs)) => FormError::DownloadTimeout {
            url: url.to_string(),
            secs,
        },
        _ => FormError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        },
    };

    let response = client.get(url).send().await.map_err(map_err)?;

    if !response.status().is_success() {
        return Err(FormError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_err)?;
    debug!("Downloaded {} bytes from {}", bytes.len(), url);
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn pdf_magic_is_checked() {
        assert!(check_pdf_magic("t", b"%PDF-1.7\n").is_ok());
        match check_pdf_magic("t", b"<html") {
            Err(FormError::NotAPdf { magic, .. }) => assert_eq!(&magic, b"<htm"),
            other => panic!("expected NotAPdf, got {other:?}"),
        }
        assert!(check_pdf_magic("t", b"%P").is_err());
    }

    #[tokio::test]
    async fn local_files_are_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"%PDF-1.4 test").unwrap();
        let source = ResourceSource::Path(file.path().to_path_buf());
        let bytes = fetch_pdf(&reqwest::Client::new(), &source, None).await.unwrap();
        assert_eq!(bytes, b"%PDF-1.4 test");
    }

    #[tokio::test]
    async fn missing_local_file_is_reported() {
        let source = ResourceSource::Path("/definitely/not/here.pdf".into());
        let err = fetch_bytes(&reqwest::Client::new(), &source, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FormError::FileNotFound { .. }));
    }
}
