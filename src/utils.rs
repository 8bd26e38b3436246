// src/utils.rs
use std::path::Path;

/// Normalize an owner id for file system usage
pub fn normalize_owner_id(id: &str) -> String {
    id.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Get file extension in lowercase
pub fn get_file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_lowercase())
}

/// Extension with leading dot, `.bin` when the path carries none
pub fn extension_or_default(path: &str) -> String {
    match get_file_extension(path) {
        Some(ext) => format!(".{}", ext),
        None => ".bin".to_string(),
    }
}

/// Content type inferred from the path extension
pub fn content_type_for(path: &str) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// Join a base URL and a path segment with exactly one slash
pub fn join_url(base: &str, segment: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        segment.trim_start_matches('/')
    )
}
