//! Rendered page → base64 PNG [`PageImage`].
//!
//! PNG is lossless, so the crisp text edges pdfium renders survive encoding;
//! JPEG artefacts on rendered text measurably hurt what vision models can
//! read back, especially handwritten annotations and subscripts in formulas.

use crate::content::PageImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a base64 PNG.
pub fn encode_page(img: &DynamicImage) -> Result<PageImage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page image → {} bytes base64", b64.len());

    Ok(PageImage {
        data: b64,
        media_type: "image/png".to_string(),
    })
}
