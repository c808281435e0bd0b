//! mockport: fake HTTP, HTTPS, TCP, FTP and SFTP endpoints with a managed lifecycle.
//!
//! The [`endpoint::EndpointManager`] owns every endpoint definition, starts the
//! matching protocol server for each one, and keeps the set on disk so it comes
//! back after a restart.

pub mod admin_api;
pub mod charset;
pub mod config;
pub mod endpoint;
pub mod files;
pub mod server;
pub mod store;

pub use config::Settings;
pub use endpoint::{EndpointError, EndpointManager};
