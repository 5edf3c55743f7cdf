//! Content-addressed image storage on local disk.
//!
//! Uploaded images arrive as base64 data-URLs and are stored as:
//! - File at `{data_dir}/media/{sha256_hex}.{ext}`
//! - Served back at `/media/{sha256_hex}.{ext}`
//!
//! Writes are idempotent: identical content lands at the same path.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use base64::Engine;

/// Compute the media storage directory path.
fn media_dir(data_dir: &str) -> PathBuf {
    Path::new(data_dir).join("media")
}

/// File extension for a supported image MIME type.
fn extension_for(mime: &str) -> Option<&'static str> {
    match mime {
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// MIME type for a stored file name, derived from its extension.
pub fn content_type_for(name: &str) -> Option<&'static str> {
    match name.rsplit('.').next() {
        Some("png") => Some("image/png"),
        Some("jpg") => Some("image/jpeg"),
        Some("webp") => Some("image/webp"),
        Some("gif") => Some("image/gif"),
        _ => None,
    }
}

/// Validate a stored file name: sha256 hex + known extension.
/// Guards the GET path against traversal — anything else is rejected.
fn is_valid_name(name: &str) -> bool {
    let Some((hash, ext)) = name.rsplit_once('.') else {
        return false;
    };
    hash.len() == 64
        && hash.chars().all(|c| c.is_ascii_hexdigit())
        && content_type_for(ext).is_some()
}

/// Decode a `data:image/...;base64,` URL, store the bytes, and return the
/// public URL path (`/media/{hash}.{ext}`).
pub fn put_data_url(data_dir: &str, data_url: &str) -> Result<String, String> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| "Not a data URL".to_string())?;
    let (mime, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| "Data URL must be base64-encoded".to_string())?;

    let ext = extension_for(mime).ok_or_else(|| format!("Unsupported image type: {}", mime))?;

    let data = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| format!("Invalid base64 payload: {}", e))?;
    if data.is_empty() {
        return Err("Empty image payload".to_string());
    }

    let hash_hex = hex::encode(Sha256::digest(&data));
    let file_name = format!("{}.{}", hash_hex, ext);

    // Ensure media directory exists
    let dir = media_dir(data_dir);
    std::fs::create_dir_all(&dir)
        .map_err(|e| format!("Failed to create media directory: {}", e))?;

    let file_path = dir.join(&file_name);
    if !file_path.exists() {
        std::fs::write(&file_path, &data)
            .map_err(|e| format!("Failed to write media file: {}", e))?;
        tracing::debug!("Stored media {} ({} bytes)", file_name, data.len());
    }

    Ok(format!("/media/{}", file_name))
}

/// Read a stored image by file name.
///
/// Returns `Ok(Some(bytes))` if found, `Ok(None)` if not found.
pub fn get(data_dir: &str, name: &str) -> Result<Option<Vec<u8>>, String> {
    if !is_valid_name(name) {
        return Err(format!("Invalid media name: {}", name));
    }

    let file_path = media_dir(data_dir).join(name);
    match std::fs::read(&file_path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(format!(
            "Failed to read media file {}: {}",
            file_path.display(),
            e
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = tmp.path().to_str().unwrap();

        let payload = base64::engine::general_purpose::STANDARD.encode(b"fake png bytes");
        let url = put_data_url(data_dir, &format!("data:image/png;base64,{}", payload)).unwrap();

        let name = url.strip_prefix("/media/").unwrap();
        assert!(name.ends_with(".png"));

        let stored = get(data_dir, name).unwrap().unwrap();
        assert_eq!(stored, b"fake png bytes");

        // Same content, same path
        let again = put_data_url(data_dir, &format!("data:image/png;base64,{}", payload)).unwrap();
        assert_eq!(url, again);
    }

    #[test]
    fn test_rejects_non_image_and_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = tmp.path().to_str().unwrap();

        assert!(put_data_url(data_dir, "data:text/plain;base64,aGk=").is_err());
        assert!(put_data_url(data_dir, "not a data url").is_err());
        assert!(put_data_url(data_dir, "data:image/png;base64,!!!").is_err());
    }

    #[test]
    fn test_get_rejects_traversal_names() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = tmp.path().to_str().unwrap();

        assert!(get(data_dir, "../swifttalk.db").is_err());
        assert!(get(data_dir, "nothex.png").is_err());
    }
}
