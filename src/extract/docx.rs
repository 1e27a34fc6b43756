//! Word strategy: pandoc conversion to markdown.
//!
//! Thin adapter over [`crate::convert::convert_docx`]; the converter owns
//! the subprocess and scratch-directory handling, this module only maps the
//! result into [`FileContent`] form.

use crate::content::FileContent;
use crate::convert::convert_docx;
use std::path::Path;

pub async fn extract(path: &Path) -> Result<FileContent, String> {
    let converted = convert_docx(path).await.map_err(|e| e.to_string())?;
    Ok(FileContent::Docx {
        data: converted.content,
        images: converted.images,
    })
}
