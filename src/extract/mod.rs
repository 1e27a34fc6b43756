//! File-content extraction: one strategy per supported upload type.
//!
//! [`extract_file`] is the single entry point. It dispatches on the file
//! extension and never panics on strange input; anything it cannot handle
//! becomes a [`FileError`] the batch loop records against that file while the
//! rest of the batch continues.
//!
//! Strategies:
//! * `.docx` — pandoc conversion to markdown plus embedded images
//!   ([`docx`]).
//! * `.pdf`  — pdfium text extraction plus rendered page images ([`pdf`]).
//! * raster images — raw bytes, base64-encoded ([`image_file`]).

mod docx;
mod encode;
mod image_file;
mod pdf;

pub use encode::encode_page;

use crate::content::{is_image_extension, FileContent};
use crate::error::FileError;
use std::path::Path;
use tracing::{info, warn};

/// Display name of a path for per-file error messages.
pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Extract the analysable content of one uploaded file.
///
/// Dispatches by extension: `.docx`, `.pdf`, or a raster image format.
/// Anything else is [`FileError::Unsupported`]. Extraction failures are
/// logged and returned as [`FileError::Extraction`]; this function never
/// panics on malformed files.
pub async fn extract_file(
    path: &Path,
    max_rendered_pixels: u32,
) -> Result<FileContent, FileError> {
    let filename = display_name(path);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let result = match ext.as_str() {
        "docx" => docx::extract(path).await,
        "pdf" => pdf::extract(path, max_rendered_pixels).await,
        e if is_image_extension(e) => image_file::extract(path, e).await,
        _ => {
            warn!(file = %filename, "unsupported file type");
            return Err(FileError::Unsupported { filename });
        }
    };

    match result {
        Ok(content) => {
            info!(
                file = %filename,
                kind = content.kind(),
                images = content.images().len(),
                "extracted file content"
            );
            Ok(content)
        }
        Err(detail) => {
            warn!(file = %filename, error = %detail, "extraction failed");
            Err(FileError::Extraction { filename, detail })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_extension_is_unsupported() {
        let err = extract_file(Path::new("notes.txt"), 2000).await.unwrap_err();
        assert!(matches!(err, FileError::Unsupported { filename } if filename == "notes.txt"));
    }

    #[tokio::test]
    async fn extensionless_file_is_unsupported() {
        let err = extract_file(Path::new("README"), 2000).await.unwrap_err();
        assert!(matches!(err, FileError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn missing_image_is_extraction_error_not_panic() {
        let err = extract_file(Path::new("/nonexistent/photo.png"), 2000)
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::Extraction { filename, .. } if filename == "photo.png"));
    }

    #[tokio::test]
    async fn image_extraction_base64_encodes_bytes() {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.jpg");
        tokio::fs::write(&path, b"jpegbytes").await.unwrap();

        let content = extract_file(&path, 2000).await.unwrap();
        match content {
            FileContent::Image { data, media_type } => {
                assert_eq!(media_type, "image/jpeg");
                assert_eq!(STANDARD.decode(&data).unwrap(), b"jpegbytes");
            }
            other => panic!("expected image content, got {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn extension_dispatch_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.PNG");
        tokio::fs::write(&path, b"pngbytes").await.unwrap();

        let content = extract_file(&path, 2000).await.unwrap();
        assert_eq!(content.kind(), "image");
    }
}
