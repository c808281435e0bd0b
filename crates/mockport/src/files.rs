//! File-root boundary for FTP/SFTP endpoints.
//!
//! Client supplied paths are always interpreted relative to an endpoint's root
//! directory. Resolution is purely lexical: `.` is dropped, `..` pops one
//! component, and popping past the root is rejected.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("path '{0}' escapes the endpoint root")]
pub struct PathEscapeError(pub String);

/// Normalize a client path into its canonical virtual form (`/`, `/a/b`).
pub fn normalize_virtual(path: &str) -> Result<String, PathEscapeError> {
    let mut parts: Vec<String> = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(PathEscapeError(path.to_string()));
                }
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    Ok(format!("/{}", parts.join("/")))
}

/// Resolve `relative` inside `root`, rejecting anything that would land outside it.
pub fn resolve_in_root(root: &Path, relative: &str) -> Result<PathBuf, PathEscapeError> {
    let virtual_path = normalize_virtual(relative)?;
    let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
    let trimmed = virtual_path.trim_start_matches('/');
    if trimmed.is_empty() {
        Ok(root)
    } else {
        Ok(root.join(trimmed))
    }
}
