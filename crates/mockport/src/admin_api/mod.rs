//! Admin REST API for mock endpoint management.
//!
//! This module provides a small JSON API for:
//! - Creating, updating, deleting, and listing mock endpoints
//! - Browsing, uploading, downloading and deleting files under FTP/SFTP roots
//! - A health check
//!
//! Every response carries permissive CORS headers.
//!
//! The API listens on a configurable port (default: 8080).

mod handlers;
mod router;
mod server;
mod types;

pub use server::AdminApiServer;
