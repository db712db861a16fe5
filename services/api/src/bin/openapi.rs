//! services/api/src/bin/openapi.rs
//!
//! Writes the OpenAPI document for the session API. The output path is the first
//! argument and defaults to `openapi.json`.

use std::path::{Path, PathBuf};
use tutor_api_lib::{error::ApiError, web::rest::ApiDoc};
use utoipa::OpenApi;

const DEFAULT_OUTPUT: &str = "openapi.json";

fn write_document(path: &Path) -> Result<(), ApiError> {
    let json = ApiDoc::openapi().to_pretty_json().map_err(|e| {
        ApiError::Internal(format!("Failed to render the OpenAPI document: {}", e))
    })?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)?;
    Ok(())
}

fn main() -> Result<(), ApiError> {
    let output = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
    write_document(&output)?;
    println!("OpenAPI document written to {}", output.display());
    Ok(())
}
