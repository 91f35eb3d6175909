//! Writing stamped documents to disk.

use crate::error::FormError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Write `pdf` to `path` atomically: a temp file in the target directory is
/// filled, flushed and then renamed over `path`, so readers never see a
/// partial document.
pub async fn write_pdf(path: impl AsRef<Path>, pdf: Vec<u8>) -> Result<(), FormError> {
    let path = path.as_ref().to_path_buf();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent)
        .await
        .map_err(|e| write_failed(&path, e))?;

    let target = path.clone();
    tokio::task::spawn_blocking(move || {
        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| write_failed(&target, e))?;
        tmp.write_all(&pdf).map_err(|e| write_failed(&target, e))?;
        tmp.as_file().sync_all().map_err(|e| write_failed(&target, e))?;
        tmp.persist(&target)
            .map_err(|e| write_failed(&target, e.error))?;
        debug!("Wrote {} bytes to {}", pdf.len(), target.display());
        Ok(())
    })
    .await
    .map_err(|e| FormError::Internal(format!("write task failed: {e}")))?
}

fn write_failed(path: &Path, source: std::io::Error) -> FormError {
    FormError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    }
}
