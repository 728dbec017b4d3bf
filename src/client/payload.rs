//! Payload codec: converts caller argument trees to wire-safe values and
//! materializes file-valued outputs back to local files.
//!
//! File-like leaves are lifted out of the argument tree into a flat list,
//! uploaded in one batched multipart request, and substituted back via
//! typed marker nodes ([`ArgNode::FileSlot`]) so the original nested
//! shape survives the round trip. Upload failure degrades to passing the
//! original values through untouched.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{from_reqwest, ClientError, ClientResult};
use crate::types::UploadedFile;
use crate::utils::{
    decode_data_uri_to_file, is_data_uri, is_file_ref, is_local_file, is_url, unique_path,
    FILE_URL_PREFIX,
};

/// An argument tree with file-like leaves replaced by typed markers.
///
/// A `FileSlot(i)` points at index `i` of the external resolved list,
/// which holds either the server-assigned upload reference or (on upload
/// failure) the original leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgNode {
    /// A leaf kept as-is.
    Leaf(Value),
    /// Placeholder for entry `i` of the resolved-file list.
    FileSlot(usize),
    /// Ordered children.
    Array(Vec<ArgNode>),
    /// Keyed children (insertion order preserved).
    Object(Vec<(String, ArgNode)>),
}

/// A file leaf lifted out of an argument tree.
#[derive(Debug, Clone)]
pub struct FileInput {
    /// Local path to upload.
    pub path: PathBuf,
    /// The leaf as the caller supplied it, used when uploads degrade.
    pub original: Value,
}

/// Whether a leaf should be treated as a local file to upload: either a
/// reference-shaped object with a local `path`, or a bare string naming
/// an existing file.
fn is_file_leaf(value: &Value) -> bool {
    if is_file_ref(value) {
        return true;
    }
    value.as_str().map(is_local_file).unwrap_or(false)
}

/// Walk `value`, replacing every file-like leaf with a [`ArgNode::FileSlot`]
/// marker and pushing the corresponding [`FileInput`] onto `files`.
pub fn gather_files(value: &Value, files: &mut Vec<FileInput>) -> ArgNode {
    if is_file_leaf(value) {
        let path = match value {
            Value::String(s) => PathBuf::from(s),
            Value::Object(obj) => PathBuf::from(obj["path"].as_str().unwrap_or_default()),
            _ => unreachable!("file leaf is a string or object"),
        };
        files.push(FileInput {
            path,
            original: value.clone(),
        });
        return ArgNode::FileSlot(files.len() - 1);
    }

    match value {
        Value::Array(items) => {
            ArgNode::Array(items.iter().map(|v| gather_files(v, files)).collect())
        }
        Value::Object(obj) => ArgNode::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), gather_files(v, files)))
                .collect(),
        ),
        other => ArgNode::Leaf(other.clone()),
    }
}

/// Rebuild a [`Value`] from a marker tree, substituting `resolved[i]` for
/// every `FileSlot(i)`.
pub fn resolve_files(node: ArgNode, resolved: &[Value]) -> Value {
    match node {
        ArgNode::Leaf(v) => v,
        ArgNode::FileSlot(i) => resolved.get(i).cloned().unwrap_or(Value::Null),
        ArgNode::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|n| resolve_files(n, resolved))
                .collect(),
        ),
        ArgNode::Object(entries) => Value::Object(
            entries
                .into_iter()
                .map(|(k, n)| (k, resolve_files(n, resolved)))
                .collect::<Map<String, Value>>(),
        ),
    }
}

/// Wrap every URL-valued string leaf as a remote file reference
/// (`{"path": url}`), leaving everything else untouched.
pub fn wrap_urls(value: Value) -> Value {
    match value {
        Value::String(s) if is_url(&s) => {
            let mut obj = Map::new();
            obj.insert("path".to_string(), Value::String(s));
            Value::Object(obj)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(wrap_urls).collect()),
        Value::Object(obj) => {
            // Reference-shaped objects are already wire form.
            if obj.get("path").map(Value::is_string).unwrap_or(false) {
                return Value::Object(obj);
            }
            Value::Object(obj.into_iter().map(|(k, v)| (k, wrap_urls(v))).collect())
        }
        other => other,
    }
}

/// Upload all gathered files in a single multipart request.
///
/// The response is an ordered list of server paths matching submission
/// order; each is paired with its original basename into an
/// [`UploadedFile`].
pub async fn upload_files(
    http: &reqwest::Client,
    upload_url: &str,
    files: &[FileInput],
) -> ClientResult<Vec<UploadedFile>> {
    if files.is_empty() {
        return Ok(Vec::new());
    }

    let mut form = reqwest::multipart::Form::new();
    for file in files {
        let name = basename(&file.path);
        let bytes = tokio::fs::read(&file.path).await.map_err(|e| {
            ClientError::File(format!("could not read {}: {e}", file.path.display()))
        })?;
        form = form.part(
            "files",
            reqwest::multipart::Part::bytes(bytes).file_name(name),
        );
    }

    let response = http
        .post(upload_url)
        .multipart(form)
        .send()
        .await
        .map_err(|e| from_reqwest(e, "file upload failed"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Http {
            status: status.as_u16(),
            body,
        });
    }

    let server_paths: Vec<String> = response
        .json()
        .await
        .map_err(|e| ClientError::InvalidJson(format!("upload response: {e}")))?;

    if server_paths.len() != files.len() {
        return Err(ClientError::Transport(format!(
            "upload returned {} paths for {} files",
            server_paths.len(),
            files.len()
        )));
    }

    debug!(count = files.len(), "uploaded call files");

    Ok(files
        .iter()
        .zip(server_paths)
        .map(|(file, path)| UploadedFile {
            path,
            orig_name: basename(&file.path),
        })
        .collect())
}

/// The wire shape an uploaded file reference takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileWireShape {
    /// Current protocol: `{"path": ..., "orig_name": ...}`.
    Reference,
    /// Legacy protocol: `{"is_file": true, "name": ..., "orig_name": ..., "data": null}`.
    Legacy,
}

fn to_wire(uploaded: UploadedFile, shape: FileWireShape) -> Value {
    match shape {
        FileWireShape::Reference => {
            serde_json::to_value(uploaded).expect("uploaded file serializes")
        }
        FileWireShape::Legacy => serde_json::json!({
            "is_file": true,
            "name": uploaded.path,
            "orig_name": uploaded.orig_name,
            "data": null,
        }),
    }
}

/// Serialize one call's arguments: lift file leaves out of the args whose
/// input component is file-valued (`file_flags`), upload them in one
/// batch, substitute references back, and — on the current protocol —
/// wrap URL strings as remote references.
///
/// Upload failures are swallowed: the original values pass through and
/// the call proceeds (non-transactional by design of the wire protocol).
pub async fn serialize_args(
    http: &reqwest::Client,
    upload_url: &str,
    args: Vec<Value>,
    file_flags: &[bool],
    shape: FileWireShape,
) -> Vec<Value> {
    let mut files = Vec::new();
    let nodes: Vec<ArgNode> = args
        .iter()
        .enumerate()
        .map(|(i, v)| {
            if file_flags.get(i).copied().unwrap_or(false) {
                gather_files(v, &mut files)
            } else {
                ArgNode::Leaf(v.clone())
            }
        })
        .collect();

    let resolved = if files.is_empty() {
        Vec::new()
    } else {
        match upload_files(http, upload_url, &files).await {
            Ok(uploaded) => uploaded.into_iter().map(|u| to_wire(u, shape)).collect(),
            Err(e) => {
                warn!(error = %e, "file upload failed, passing values through");
                files.iter().map(|f| f.original.clone()).collect()
            }
        }
    };

    nodes
        .into_iter()
        .map(|n| {
            let value = resolve_files(n, &resolved);
            match shape {
                FileWireShape::Reference => wrap_urls(value),
                FileWireShape::Legacy => value,
            }
        })
        .collect()
}

/// A file-valued output leaf awaiting materialization.
enum OutputRef {
    /// Reference-shaped value; the path may be remote or server-local.
    Reference(String),
    /// Inline-encoded `data:` URI.
    Inline(String),
}

/// Whether an output leaf needs materializing to a local file.
fn is_output_file_leaf(value: &Value) -> bool {
    if is_file_ref(value) {
        return true;
    }
    value.as_str().map(is_data_uri).unwrap_or(false)
}

fn gather_output_refs(value: &Value, refs: &mut Vec<OutputRef>) -> ArgNode {
    if is_output_file_leaf(value) {
        let r = match value {
            Value::Object(obj) => {
                OutputRef::Reference(obj["path"].as_str().unwrap_or_default().to_string())
            }
            Value::String(s) => OutputRef::Inline(s.clone()),
            _ => unreachable!("output file leaf is a string or object"),
        };
        refs.push(r);
        return ArgNode::FileSlot(refs.len() - 1);
    }

    match value {
        Value::Array(items) => ArgNode::Array(
            items
                .iter()
                .map(|v| gather_output_refs(v, refs))
                .collect(),
        ),
        Value::Object(obj) => ArgNode::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), gather_output_refs(v, refs)))
                .collect(),
        ),
        other => ArgNode::Leaf(other.clone()),
    }
}

/// Download a single file to `output_dir`, named after the URL basename
/// with a collision-avoiding suffix.
pub async fn download_file(
    http: &reqwest::Client,
    url: &str,
    output_dir: &Path,
    file_name: &str,
) -> ClientResult<PathBuf> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| from_reqwest(e, "file download failed"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Http {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ClientError::Transport(format!("file download body: {e}")))?;

    tokio::fs::create_dir_all(output_dir).await?;
    let path = unique_path(output_dir, file_name);
    tokio::fs::write(&path, &bytes).await?;
    debug!(path = %path.display(), bytes = bytes.len(), "materialized output file");
    Ok(path)
}

/// Deserialize one call's outputs: every reference-shaped value is
/// downloaded (remote URLs directly, server paths via the file route)
/// and every inline-encoded string is decoded, each into a local file
/// under `output_dir`; the tree is rewritten with local path strings.
pub async fn materialize_outputs(
    http: &reqwest::Client,
    root_url: &str,
    output_dir: &Path,
    outputs: Vec<Value>,
) -> ClientResult<Vec<Value>> {
    let mut refs = Vec::new();
    let nodes: Vec<ArgNode> = outputs
        .iter()
        .map(|v| gather_output_refs(v, &mut refs))
        .collect();

    let mut resolved = Vec::with_capacity(refs.len());
    for r in &refs {
        let local = match r {
            OutputRef::Reference(path) => {
                let url = if is_url(path) {
                    path.clone()
                } else {
                    format!("{root_url}{FILE_URL_PREFIX}{path}")
                };
                let name = path.rsplit('/').next().unwrap_or("file").to_string();
                download_file(http, &url, output_dir, &name).await?
            }
            OutputRef::Inline(uri) => decode_data_uri_to_file(uri, output_dir).await?,
        };
        resolved.push(Value::String(local.to_string_lossy().into_owned()));
    }

    Ok(nodes
        .into_iter()
        .map(|n| resolve_files(n, &resolved))
        .collect())
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}
