//! Staging of uploaded files under the upload directory

use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::has_extension;
use crate::error::{LedgerError, LedgerResult};
use crate::excel::secure_filename;

/// `{sanitized stem}_{8 hex chars}.{ext}` so repeated uploads never collide
pub fn unique_upload_name(original_filename: &str) -> String {
    let original = Path::new(original_filename);
    let stem = original
        .file_stem()
        .map(|s| secure_filename(&s.to_string_lossy()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "upload".to_string());
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    match original.extension() {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext.to_string_lossy().to_lowercase()),
        None => format!("{}_{}", stem, suffix),
    }
}

/// Write uploaded bytes into `dir`, rejecting disallowed extensions
pub fn stage_bytes(
    dir: &Path,
    original_filename: &str,
    bytes: &[u8],
    allowed: &[&str],
) -> LedgerResult<PathBuf> {
    if !has_extension(Path::new(original_filename), allowed) {
        return Err(LedgerError::Validation(format!(
            "Unsupported file type: {} (allowed: {})",
            original_filename,
            allowed.join(", ")
        )));
    }
    fs::create_dir_all(dir)?;
    let path = dir.join(unique_upload_name(original_filename));
    fs::write(&path, bytes)?;
    Ok(path)
}

/// Copy a local file into `dir` under a unique name
pub fn stage_copy(dir: &Path, source: &Path, allowed: &[&str]) -> LedgerResult<PathBuf> {
    let original_filename = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bytes = fs::read(source)?;
    stage_bytes(dir, &original_filename, &bytes, allowed)
}

pub fn image_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}
