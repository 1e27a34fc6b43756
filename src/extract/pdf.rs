//! PDF strategy: text extraction plus page rasterisation via pdfium.
//!
//! pdfium wraps a C++ library with thread-local state that must not run on
//! async worker threads, so the whole document pass happens inside
//! `spawn_blocking`. Pages are processed in order; the extracted text of all
//! pages joins into one blob (blank line between pages) and each page is also
//! rendered to a PNG so the model can see equations and diagrams the text
//! layer drops.
//!
//! A page whose render fails is logged and its image omitted; its text still
//! ships. Only a document that cannot be opened at all fails the file.

use super::encode::encode_page;
use crate::content::{FileContent, PageImage};
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, warn};

/// Extract text and rendered page images from a PDF.
pub async fn extract(path: &Path, max_rendered_pixels: u32) -> Result<FileContent, String> {
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || extract_blocking(&path, max_rendered_pixels))
        .await
        .map_err(|e| format!("PDF task panicked: {e}"))?
}

fn extract_blocking(path: &Path, max_rendered_pixels: u32) -> Result<FileContent, String> {
    let pdfium = Pdfium::default();

    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| format!("Could not open PDF: {e:?}"))?;

    let pages = document.pages();
    let total_pages = pages.len();
    debug!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_rendered_pixels as i32)
        .set_maximum_height(max_rendered_pixels as i32);

    let mut page_texts: Vec<String> = Vec::with_capacity(total_pages as usize);
    let mut images: Vec<PageImage> = Vec::with_capacity(total_pages as usize);

    for idx in 0..total_pages {
        let page = pages
            .get(idx)
            .map_err(|e| format!("Could not read page {}: {e:?}", idx + 1))?;

        match page.text() {
            Ok(text) => page_texts.push(text.all()),
            Err(e) => {
                warn!("No text layer on page {}: {:?}", idx + 1, e);
                page_texts.push(String::new());
            }
        }

        // The bitmap borrows the page; bind it so the borrow ends before
        // the page drops at the bottom of the loop.
        let rendered = page.render_with_config(&render_config);
        match rendered {
            Ok(bitmap) => {
                let image = bitmap.as_image();
                debug!(
                    "Rendered page {} → {}x{} px",
                    idx + 1,
                    image.width(),
                    image.height()
                );
                match encode_page(&image) {
                    Ok(page_image) => images.push(page_image),
                    Err(e) => warn!("Could not encode page {}: {}", idx + 1, e),
                }
            }
            Err(e) => warn!("Could not render page {}: {:?}", idx + 1, e),
        }
    }

    Ok(FileContent::Pdf {
        data: page_texts.join("\n\n"),
        images,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn garbage_bytes_fail_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        tokio::fs::write(&path, b"not a pdf at all").await.unwrap();

        let err = extract(&path, 1000).await.unwrap_err();
        assert!(err.contains("Could not open PDF"), "got: {err}");
    }
}
