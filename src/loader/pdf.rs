use std::path::Path;

use crate::core::errors::ApiError;

pub fn extract_text(path: &Path) -> Result<String, ApiError> {
    pdf_extract::extract_text(path).map_err(ApiError::internal)
}
