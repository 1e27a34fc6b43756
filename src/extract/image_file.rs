//! Image strategy: raw bytes, base64-encoded.
//!
//! Photographed or scanned reports go to the model as a single image block,
//! so no decoding or resizing happens here; the bytes pass through verbatim
//! and the media type comes from the extension table.

use crate::content::{mime_for_extension, FileContent};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;

pub async fn extract(path: &Path, ext: &str) -> Result<FileContent, String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("Could not read image: {e}"))?;
    Ok(FileContent::Image {
        data: STANDARD.encode(&bytes),
        media_type: mime_for_extension(ext).to_string(),
    })
}
