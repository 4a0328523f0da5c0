//! Input resolution: normalise a user-supplied path, URL or byte buffer to a
//! local PDF file.
//!
//! The page store opens documents by path, so URLs and in-memory buffers
//! are written into a `TempDir` that lives as long as the `ResolvedInput`.
//! Every input has its `%PDF` header checked before anything is written or
//! handed to pdfium, so a wrong file surfaces as `NotAPdf` rather than a
//! parse error. The resolved file name keys the persisted index.

use crate::error::PdfQaError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";
const FALLBACK_NAME: &str = "document.pdf";

/// The resolved input: a local path, or a temp file that is removed on drop.
#[derive(Debug)]
pub enum ResolvedInput {
    Local(PathBuf),
    /// A URL or a byte buffer written to a temp directory.
    Temporary { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Temporary { path, .. } => path,
        }
    }

    /// File name used to key the persisted index.
    pub fn source_name(&self) -> String {
        self.path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| FALLBACK_NAME.to_string())
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a path or HTTP(S) URL; URLs are downloaded within `timeout_secs`.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, PdfQaError> {
    if is_url(input) {
        let bytes = download(input, timeout_secs).await?;
        let resolved = write_temp(&bytes, &url_file_name(input)).await?;
        info!("Downloaded {} bytes from {}", bytes.len(), input);
        Ok(resolved)
    } else {
        resolve_local(Path::new(input)).await
    }
}

/// Write an in-memory PDF to a temp file named `name`.
pub async fn from_bytes(bytes: &[u8], name: &str) -> Result<ResolvedInput, PdfQaError> {
    write_temp(bytes, name).await
}

/// `Err(magic)` with the first (up to) four bytes when `bytes` is no PDF.
fn check_magic(bytes: &[u8]) -> Result<(), [u8; 4]> {
    if bytes.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(magic)
}

async fn resolve_local(path: &Path) -> Result<ResolvedInput, PdfQaError> {
    let path = path.to_path_buf();
    let mut file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PdfQaError::PermissionDenied { path });
        }
        Err(_) => return Err(PdfQaError::FileNotFound { path }),
    };

    let mut header = [0u8; 4];
    let n = file.read(&mut header).await.unwrap_or(0);
    if let Err(magic) = check_magic(&header[..n]) {
        return Err(PdfQaError::NotAPdf { path, magic });
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download(url: &str, timeout_secs: u64) -> Result<Vec<u8>, PdfQaError> {
    info!("Downloading PDF from {}", url);
    let failed = |reason: String| PdfQaError::DownloadFailed {
        url: url.to_string(),
        reason,
    };
    let transport = |e: reqwest::Error| {
        if e.is_timeout() {
            PdfQaError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;
    let response = client.get(url).send().await.map_err(transport)?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }
    Ok(response.bytes().await.map_err(transport)?.to_vec())
}

/// Check the header, then write `bytes` into a fresh temp dir as `name`.
async fn write_temp(bytes: &[u8], name: &str) -> Result<ResolvedInput, PdfQaError> {
    let temp_dir = TempDir::new().map_err(|e| PdfQaError::Internal(e.to_string()))?;
    let file_name = if name.is_empty() { FALLBACK_NAME } else { name };
    let path = temp_dir.path().join(file_name);

    if let Err(magic) = check_magic(bytes) {
        return Err(PdfQaError::NotAPdf { path, magic });
    }

    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| PdfQaError::Internal(format!("Failed to write temp file: {}", e)))?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());

    Ok(ResolvedInput::Temporary {
        path,
        _temp_dir: temp_dir,
    })
}

/// Last URL path segment, given a `.pdf` extension when it has none.
fn url_file_name(url: &str) -> String {
    let segment = reqwest::Url::parse(url).ok().and_then(|u| {
        u.path_segments()
            .and_then(|mut s| s.next_back().map(str::to_string))
    });
    match segment {
        Some(s) if s.to_ascii_lowercase().ends_with(".pdf") => s,
        Some(s) if !s.is_empty() => format!("{s}.pdf"),
        _ => FALLBACK_NAME.to_string(),
    }
}
