//! Word-document conversion via external tools.
//!
//! `.docx` is an opaque ZIP archive; rather than reimplement OOXML parsing,
//! conversion shells out to `pandoc`, which turns the document into markdown
//! with LaTeX equation delimiters preserved (`$…$` inline, `$$…$$` display)
//! and extracts embedded media into a scratch directory. A variant path uses
//! LibreOffice to produce a PDF when the caller wants rasterised pages
//! instead of markdown.
//!
//! Tool availability is probed before each conversion so a missing binary is
//! reported as [`LabError::ToolNotInstalled`] rather than a confusing
//! subprocess error. All scratch files live in a per-request [`TempDir`] and
//! are removed on every exit path.

use crate::content::{mime_for_extension, PageImage};
use crate::error::LabError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, warn};

/// `$$…$$` display equations. Matched before the inline pattern so a display
/// equation is never double-counted as two inline fragments.
static DISPLAY_EQUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\$([^$]+)\$\$").expect("valid display equation regex"));

/// `$…$` inline equations.
static INLINE_EQUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$([^$]+)\$").expect("valid inline equation regex"));

/// Result of converting a `.docx` file to markdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedDocument {
    /// Markdown text with LaTeX equation delimiters preserved.
    pub content: String,
    /// Always "markdown".
    pub format: String,
    /// Distinct equations in first-seen source order.
    pub equations: Vec<String>,
    /// Embedded images in document order (pandoc's extraction order).
    pub images: Vec<PageImage>,
}

/// Probe for pandoc on PATH.
pub async fn pandoc_available() -> bool {
    tool_available("pandoc").await
}

/// Probe for LibreOffice (either binary name) on PATH.
pub async fn libreoffice_available() -> bool {
    tool_available("libreoffice").await || tool_available("soffice").await
}

async fn tool_available(binary: &str) -> bool {
    Command::new(binary)
        .arg("--version")
        .output()
        .await
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Convert a `.docx` file to markdown with pandoc.
///
/// Equations survive as `$…$` / `$$…$$` delimiters; embedded images are
/// extracted into a scratch directory, base64-encoded and returned in
/// document order. The input file itself is left untouched; callers that
/// create it (the server handler's temp upload) own its cleanup.
pub async fn convert_docx(path: &Path) -> Result<ConvertedDocument, LabError> {
    if !pandoc_available().await {
        return Err(LabError::ToolNotInstalled { tool: "pandoc" });
    }

    let media_dir = TempDir::new().map_err(|e| LabError::Io {
        path: std::env::temp_dir(),
        source: e,
    })?;

    let output = Command::new("pandoc")
        .arg(path)
        .arg("--from=docx")
        .arg("--to=markdown")
        .arg("--wrap=none")
        .arg(format!("--extract-media={}", media_dir.path().display()))
        .output()
        .await
        .map_err(|e| LabError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        return Err(LabError::ConversionFailed {
            detail: format!(
                "pandoc exited with {}: {}",
                output.status,
                stderr.trim()
            ),
        });
    }
    if !stderr.is_empty() && !stderr.contains("Warning") {
        warn!(stderr = %stderr.trim(), "pandoc reported problems");
    }

    let content = String::from_utf8_lossy(&output.stdout).into_owned();
    let equations = extract_equations(&content);
    let images = collect_media_images(media_dir.path()).await;
    debug!(
        chars = content.len(),
        equations = equations.len(),
        images = images.len(),
        "converted document"
    );

    Ok(ConvertedDocument {
        content,
        format: "markdown".into(),
        equations,
        images,
    })
}

/// Convert a `.docx` file to PDF bytes with LibreOffice.
///
/// Used when the caller prefers rasterised pages over markdown (handwritten
/// annotations, exotic layouts). The produced PDF lands in a scratch
/// directory that is removed before returning.
pub async fn convert_docx_to_pdf(path: &Path) -> Result<Vec<u8>, LabError> {
    let binary = if tool_available("libreoffice").await {
        "libreoffice"
    } else if tool_available("soffice").await {
        "soffice"
    } else {
        return Err(LabError::ToolNotInstalled {
            tool: "libreoffice",
        });
    };

    let out_dir = TempDir::new().map_err(|e| LabError::Io {
        path: std::env::temp_dir(),
        source: e,
    })?;

    let output = Command::new(binary)
        .arg("--headless")
        .arg("--convert-to")
        .arg("pdf")
        .arg("--outdir")
        .arg(out_dir.path())
        .arg(path)
        .output()
        .await
        .map_err(|e| LabError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(LabError::ConversionFailed {
            detail: format!(
                "{} exited with {}: {}",
                binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    // LibreOffice names the output after the input stem.
    let stem = path
        .file_stem()
        .ok_or_else(|| LabError::ConversionFailed {
            detail: format!("input path '{}' has no file stem", path.display()),
        })?;
    let pdf_path = out_dir.path().join(stem).with_extension("pdf");
    tokio::fs::read(&pdf_path).await.map_err(|_| {
        LabError::ConversionFailed {
            detail: format!(
                "{} produced no output for '{}'",
                binary,
                path.display()
            ),
        }
    })
}

/// Scan markdown for LaTeX equations.
///
/// Display equations come first in source order, then inline ones; entries
/// are de-duplicated by trimmed text with first-seen order kept.
pub fn extract_equations(content: &str) -> Vec<String> {
    let mut equations: Vec<String> = Vec::new();
    for captures in DISPLAY_EQUATION.captures_iter(content) {
        let eq = captures[1].trim().to_string();
        if !equations.contains(&eq) {
            equations.push(eq);
        }
    }
    for captures in INLINE_EQUATION.captures_iter(content) {
        let eq = captures[1].trim().to_string();
        if !equations.contains(&eq) {
            equations.push(eq);
        }
    }
    equations
}

/// Read the images pandoc extracted, in stable (filename-sorted) order.
///
/// Pandoc writes media under `<dir>/media/`; a document without embedded
/// images produces no such directory, which is not an error.
async fn collect_media_images(dir: &Path) -> Vec<PageImage> {
    let media = dir.join("media");
    let mut entries = match tokio::fs::read_dir(&media).await {
        Ok(rd) => rd,
        Err(_) => return Vec::new(),
    };

    let mut paths = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            paths.push(entry.path());
        }
    }
    paths.sort();

    let mut images = Vec::new();
    for path in paths {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let mime = mime_for_extension(&ext);
        if !mime.starts_with("image/") {
            continue;
        }
        match tokio::fs::read(&path).await {
            Ok(bytes) => images.push(PageImage {
                data: BASE64.encode(&bytes),
                media_type: mime.to_string(),
            }),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable media file"),
        }
    }
    images
}
