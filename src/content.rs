//! Normalised file content: the extraction pipeline's output record.
//!
//! Every uploaded report, whatever its source format, is reduced to one
//! [`FileContent`] value before analysis. The analysis gateway never sees raw
//! files — only this record — so adding a new source format touches the
//! extractor alone.
//!
//! ## Invariants
//!
//! * `Image` always carries a media type and valid base64 data.
//! * `Pdf` / `Docx` carry the extracted plain text plus zero or more rendered
//!   page images **in source page/section order**. The order is meaningful:
//!   images are forwarded to the model in exactly this order so the model
//!   reads the report the way a human would.
//! * A `FileContent` is constructed once per file and consumed immediately by
//!   the gateway; it is never persisted.

use serde::{Deserialize, Serialize};

/// A rendered page (or embedded figure) as a base64 PNG/JPEG payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageImage {
    /// Base64-encoded image bytes.
    pub data: String,
    /// MIME type, e.g. "image/png".
    pub media_type: String,
}

/// Normalised content of one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum FileContent {
    /// Plain text, passed to the model verbatim.
    Text { data: String },
    /// A raster image of the whole report (photo or scan).
    Image { data: String, media_type: String },
    /// A PDF: extracted text plus rendered pages in page order.
    Pdf { data: String, images: Vec<PageImage> },
    /// A Word document: converted markdown (equations in `$…$` / `$$…$$`
    /// delimiters) plus any embedded images in document order.
    Docx { data: String, images: Vec<PageImage> },
}

impl FileContent {
    /// The primary text payload (base64 for `Image`).
    pub fn data(&self) -> &str {
        match self {
            FileContent::Text { data }
            | FileContent::Image { data, .. }
            | FileContent::Pdf { data, .. }
            | FileContent::Docx { data, .. } => data,
        }
    }

    /// Rendered page images, empty for `Text` and `Image`.
    pub fn images(&self) -> &[PageImage] {
        match self {
            FileContent::Pdf { images, .. } | FileContent::Docx { images, .. } => images,
            _ => &[],
        }
    }

    /// Tag string matching the wire format ("text" | "image" | "pdf" | "docx").
    pub fn kind(&self) -> &'static str {
        match self {
            FileContent::Text { .. } => "text",
            FileContent::Image { .. } => "image",
            FileContent::Pdf { .. } => "pdf",
            FileContent::Docx { .. } => "docx",
        }
    }
}

/// Map a lowercase file extension to a MIME type.
///
/// Covers the raster formats students actually upload plus the formats pandoc
/// extracts from Word archives. Unknown extensions map to a generic
/// octet-stream so callers never have to special-case a missing entry.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// True when the extension names a raster format the image strategy accepts.
pub fn is_image_extension(ext: &str) -> bool {
    mime_for_extension(ext).starts_with("image/") && ext != "svg"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_matches_wire_format() {
        let c = FileContent::Pdf {
            data: "text".into(),
            images: vec![],
        };
        assert_eq!(c.kind(), "pdf");
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["type"], "pdf");
    }

    #[test]
    fn image_serialises_media_type_camel_case() {
        let c = FileContent::Image {
            data: "aGVsbG8=".into(),
            media_type: "image/png".into(),
        };
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["mediaType"], "image/png");

        let wire = r#"{"type": "image", "data": "aGVsbG8=", "mediaType": "image/png"}"#;
        let parsed: FileContent = serde_json::from_str(wire).unwrap();
        assert_eq!(parsed, c);
    }

    #[test]
    fn images_accessor_empty_for_text() {
        let c = FileContent::Text { data: "x".into() };
        assert!(c.images().is_empty());
    }

    #[test]
    fn mime_table_known_and_unknown() {
        assert_eq!(mime_for_extension("png"), "image/png");
        assert_eq!(mime_for_extension("jpeg"), "image/jpeg");
        assert_eq!(mime_for_extension("xyz"), "application/octet-stream");
    }

    #[test]
    fn svg_is_not_a_raster_upload() {
        assert!(is_image_extension("png"));
        assert!(!is_image_extension("svg"));
        assert!(!is_image_extension("docx"));
    }
}
