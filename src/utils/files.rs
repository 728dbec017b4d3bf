//! Predicates and filesystem helpers for file-valued call data.

use std::path::{Path, PathBuf};

use base64::Engine;
use serde_json::Value;

use crate::error::{ClientError, ClientResult};

/// Whether a string is a remote URL.
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Whether a value is a reference-shaped file object: a JSON object with
/// a string `path` field.
pub fn is_file_ref(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|obj| obj.get("path"))
        .map(Value::is_string)
        .unwrap_or(false)
}

/// Whether a string points at an existing local file.
pub fn is_local_file(s: &str) -> bool {
    Path::new(s).is_file()
}

/// Whether a string is an inline-encoded file (`data:` URI).
pub fn is_data_uri(s: &str) -> bool {
    s.starts_with("data:")
}

/// Pick a path under `dir` named after `file_name`, appending `_1`,
/// `_2`, ... before the extension until the name is free.
pub fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    let ext = Path::new(file_name).extension().and_then(|e| e.to_str());

    for n in 1.. {
        let name = match ext {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        let candidate = dir.join(name);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("suffix counter exhausted");
}

/// Decode a `data:` URI into a file under `dir`. Returns the written
/// path. The media type is ignored; naming falls back to `file`.
pub async fn decode_data_uri_to_file(uri: &str, dir: &Path) -> ClientResult<PathBuf> {
    let payload = uri
        .split_once(',')
        .map(|(_, rest)| rest)
        .ok_or_else(|| ClientError::File(format!("malformed data URI: {uri:.32}")))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| ClientError::File(format!("invalid base64 in data URI: {e}")))?;

    tokio::fs::create_dir_all(dir).await?;
    let path = unique_path(dir, "file");
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}
