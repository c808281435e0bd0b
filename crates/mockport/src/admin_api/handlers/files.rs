//! File management handlers for FTP and SFTP endpoint roots.
//!
//! Every client path is resolved with [`resolve_in_root`]; anything that would
//! land outside the endpoint root is answered with 403.

use crate::admin_api::types::*;
use crate::endpoint::EndpointManager;
use crate::files::{normalize_virtual, resolve_in_root};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::CONTENT_LENGTH;
use hyper::{HeaderMap, Response, StatusCode};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Largest accepted upload body.
pub const MAX_UPLOAD_SIZE: usize = 100 * 1024 * 1024;

const MOD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One directory entry in a listing
#[derive(Debug, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
    pub mod_time: String,
    /// Path relative to the endpoint root, `/` separated
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct FileListing {
    pub files: Vec<FileInfo>,
    pub current_path: String,
    pub root_dir: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub size: u64,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub path: String,
}

/// Value of `key` in a query string, form-decoded.
pub fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Root directory of the endpoint plus `relative` resolved inside it.
async fn locate(
    manager: &EndpointManager,
    id: &str,
    relative: &str,
) -> Result<(PathBuf, PathBuf), Response<Full<Bytes>>> {
    let root = manager
        .root_dir(id)
        .await
        .map_err(|e| endpoint_error_response(&e))?;
    let target = resolve_in_root(&root, relative).map_err(|e| {
        warn!("Rejected file path for endpoint {}: {}", id, e);
        error_response(StatusCode::FORBIDDEN, "access_denied", &e.to_string())
    })?;
    Ok((root, target))
}

/// `/` separated path of `target` below `root`, without a leading slash.
fn relative_to(root: &Path, target: &Path) -> String {
    target
        .strip_prefix(root)
        .unwrap_or(target)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn decode_segment(raw: &str) -> Result<String, Response<Full<Bytes>>> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| {
            error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                &format!("File path is not valid UTF-8: {e}"),
            )
        })
}

fn io_error_response(err: &io::Error, path: &str) -> Response<Full<Bytes>> {
    match err.kind() {
        io::ErrorKind::NotFound => error_response(
            StatusCode::NOT_FOUND,
            "file_not_found",
            &format!("File not found: {path}"),
        ),
        _ => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "io_error",
            &format!("{path}: {err}"),
        ),
    }
}

fn format_mod_time(metadata: &std::fs::Metadata) -> String {
    metadata
        .modified()
        .map(|t| {
            chrono::DateTime::<chrono::Local>::from(t)
                .format(MOD_TIME_FORMAT)
                .to_string()
        })
        .unwrap_or_default()
}

/// GET /api/mocks/:id/files?path= - List a directory under the endpoint root
pub async fn handle_list(
    id: &str,
    query: Option<&str>,
    manager: Arc<EndpointManager>,
) -> Response<Full<Bytes>> {
    let sub_path = query_param(query, "path").unwrap_or_default();
    let (root, dir) = match locate(&manager, id, &sub_path).await {
        Ok(located) => located,
        Err(resp) => return resp,
    };

    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) => return io_error_response(&e, &sub_path),
    };

    let mut files = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => return io_error_response(&e, &sub_path),
        };
        // Entries that vanish mid-listing are skipped.
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        files.push(FileInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            size: metadata.len(),
            is_dir: metadata.is_dir(),
            mod_time: format_mod_time(&metadata),
            path: relative_to(&root, &entry.path()),
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));

    json_response(
        StatusCode::OK,
        &FileListing {
            files,
            current_path: sub_path,
            root_dir: root.to_string_lossy().into_owned(),
        },
    )
}

/// GET /api/mocks/:id/files/*path - Download one file as an attachment
pub async fn handle_download(
    id: &str,
    raw_path: &str,
    manager: Arc<EndpointManager>,
) -> Response<Full<Bytes>> {
    let file_path = match decode_segment(raw_path) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let (_, target) = match locate(&manager, id, &file_path).await {
        Ok(located) => located,
        Err(resp) => return resp,
    };

    match tokio::fs::metadata(&target).await {
        Ok(metadata) if metadata.is_dir() => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "is_directory",
                &format!("Cannot download a directory: {file_path}"),
            )
        }
        Ok(_) => {}
        Err(e) => return io_error_response(&e, &file_path),
    }

    let contents = match tokio::fs::read(&target).await {
        Ok(contents) => contents,
        Err(e) => return io_error_response(&e, &file_path),
    };
    let filename = target
        .file_name()
        .map(|n| n.to_string_lossy().replace('"', ""))
        .unwrap_or_default();

    build_response_with_headers(
        StatusCode::OK,
        [
            ("Content-Type", "application/octet-stream".to_string()),
            (
                "Content-Disposition",
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        contents,
    )
}

fn too_large(size: u64) -> Response<Full<Bytes>> {
    error_response(
        StatusCode::BAD_REQUEST,
        "file_too_large",
        &format!(
            "File size exceeds 100MB limit (size: {:.2} MB)",
            size as f64 / (1024.0 * 1024.0)
        ),
    )
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// POST /api/mocks/:id/files?path=&name= - Store the request body as a file
///
/// `path` is the target directory (default: the root) and `name` the file
/// name. Missing directories are created.
pub async fn handle_upload(
    id: &str,
    query: Option<&str>,
    headers: &HeaderMap,
    body: Incoming,
    manager: Arc<EndpointManager>,
) -> Response<Full<Bytes>> {
    let upload_dir = query_param(query, "path").unwrap_or_default();
    let Some(filename) = query_param(query, "name").filter(|n| !n.is_empty()) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "No file uploaded: the 'name' query parameter is required",
        );
    };

    let (root, target) = match locate(&manager, id, &format!("{upload_dir}/{filename}")).await {
        Ok(located) => located,
        Err(resp) => return resp,
    };
    if target == root {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Upload target resolves to the endpoint root",
        );
    }

    if let Some(size) = declared_length(headers) {
        if size > MAX_UPLOAD_SIZE as u64 {
            return too_large(size);
        }
    }
    let contents = match Limited::new(body, MAX_UPLOAD_SIZE).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return too_large(MAX_UPLOAD_SIZE as u64 + 1)
        }
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                &format!("Failed to read request body: {e}"),
            )
        }
    };

    let relative = relative_to(&root, &target);
    if let Some(parent) = target.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return io_error_response(&e, &relative);
        }
    }
    if let Err(e) = tokio::fs::write(&target, &contents).await {
        return io_error_response(&e, &relative);
    }

    info!(
        "Uploaded {} ({} bytes) to endpoint {}",
        relative,
        contents.len(),
        id
    );
    json_response(
        StatusCode::OK,
        &UploadResponse {
            message: "File uploaded successfully".to_string(),
            filename: target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(filename),
            size: contents.len() as u64,
            path: relative,
        },
    )
}

/// DELETE /api/mocks/:id/files/*path - Remove a file or a whole directory
pub async fn handle_delete(
    id: &str,
    raw_path: &str,
    manager: Arc<EndpointManager>,
) -> Response<Full<Bytes>> {
    let file_path = match decode_segment(raw_path) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let (root, target) = match locate(&manager, id, &file_path).await {
        Ok(located) => located,
        Err(resp) => return resp,
    };
    if target == root {
        return error_response(
            StatusCode::FORBIDDEN,
            "access_denied",
            "The endpoint root cannot be deleted",
        );
    }

    let removed = match tokio::fs::metadata(&target).await {
        Ok(metadata) if metadata.is_dir() => tokio::fs::remove_dir_all(&target).await,
        Ok(_) => tokio::fs::remove_file(&target).await,
        Err(e) => return io_error_response(&e, &file_path),
    };
    if let Err(e) = removed {
        return io_error_response(&e, &file_path);
    }

    info!("Deleted {} from endpoint {}", file_path, id);
    json_response(
        StatusCode::OK,
        &DeleteResponse {
            message: "File deleted successfully".to_string(),
            path: normalize_virtual(&file_path)
                .map(|p| p.trim_start_matches('/').to_string())
                .unwrap_or(file_path),
        },
    )
}
