//! Document text extraction.
//!
//! Converts an uploaded file into plain text, dispatching on the file
//! extension. Supported: pdf, txt, md, docx. Legacy `.doc` is rejected as
//! unsupported rather than misparsed. An extraction that yields only
//! whitespace is a warning condition, not a failure: the caller receives
//! the empty string and decides whether to continue.

mod docx;
mod pdf;

use std::fs;
use std::path::Path;

use crate::core::errors::ApiError;

pub fn load_document(path: &Path) -> Result<String, ApiError> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let text = match ext.as_str() {
        "pdf" => pdf::extract_text(path)?,
        "txt" | "md" => fs::read_to_string(path).map_err(ApiError::internal)?,
        "docx" => docx::extract_text(path)?,
        other => return Err(ApiError::UnsupportedFormat(other.to_string())),
    };

    if text.trim().is_empty() {
        tracing::warn!("No text extracted from {}", path.display());
    } else {
        tracing::info!("Loaded {} ({} chars)", path.display(), text.chars().count());
    }

    Ok(text)
}
