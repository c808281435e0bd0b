//! Type definitions for mock endpoints.
//!
//! This module contains the persisted endpoint definition, the request types used to
//! create and update endpoints, and the small enums shared by the protocol engines.

use crate::config::Settings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default FTP/SFTP username and password applied when a create request leaves them blank.
pub const DEFAULT_FILE_USER: &str = "admin";
pub const DEFAULT_FILE_PASSWORD: &str = "admin";

// ============================================================================
// Enums
// ============================================================================

/// Protocol served by an endpoint. Immutable once the endpoint exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Tcp,
    Ftp,
    Sftp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Tcp => "tcp",
            Protocol::Ftp => "ftp",
            Protocol::Sftp => "sftp",
        }
    }

    /// FTP and SFTP endpoints expose a directory on disk.
    pub fn has_file_root(&self) -> bool {
        matches!(self, Protocol::Ftp | Protocol::Sftp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "tcp" => Ok(Protocol::Tcp),
            "ftp" => Ok(Protocol::Ftp),
            "sftp" => Ok(Protocol::Sftp),
            _ => Err(s.to_string()),
        }
    }
}

/// Charset the static response body is encoded with before it goes on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Charset {
    #[default]
    #[serde(rename = "UTF-8")]
    Utf8,
    #[serde(rename = "GBK")]
    Gbk,
}

impl Charset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Gbk => "GBK",
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// FTP data connection negotiation style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FtpMode {
    Active,
    #[default]
    Passive,
}

/// Lifecycle status of an endpoint definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    #[default]
    Stopped,
    Running,
}

// ============================================================================
// Endpoint Definition
// ============================================================================

/// Persisted configuration of one mock endpoint.
///
/// Fields that do not apply to the endpoint's protocol stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDefinition {
    pub id: String,
    pub name: String,
    pub protocol: Protocol,
    pub port: u16,

    // HTTP / HTTPS / TCP
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub charset: Charset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,

    // FTP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ftp_mode: Option<FtpMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ftp_root_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ftp_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ftp_pass: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ftp_passive_port_range: Option<String>,

    // SFTP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sftp_root_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sftp_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sftp_pass: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sftp_host_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sftp_private_key: Option<String>,

    /// Runtime status. Always re-derived on load by attempting a start.
    #[serde(default)]
    pub status: EndpointStatus,
}

impl EndpointDefinition {
    /// Build a stopped definition from a create request, filling protocol defaults.
    pub(crate) fn from_request(
        id: String,
        protocol: Protocol,
        req: CreateEndpointRequest,
        settings: &Settings,
    ) -> Self {
        let mut definition = Self {
            id,
            name: req.name,
            protocol,
            port: req.port,
            content: req.content,
            charset: req.charset,
            path: non_empty(req.path),
            method: non_empty(req.method),
            cert_file: non_empty(req.cert_file),
            key_file: non_empty(req.key_file),
            ftp_mode: req.ftp_mode,
            ftp_root_dir: non_empty(req.ftp_root_dir),
            ftp_user: non_empty(req.ftp_user),
            ftp_pass: non_empty(req.ftp_pass),
            ftp_passive_port_range: non_empty(req.ftp_passive_port_range),
            sftp_root_dir: non_empty(req.sftp_root_dir),
            sftp_user: non_empty(req.sftp_user),
            sftp_pass: non_empty(req.sftp_pass),
            sftp_host_key: non_empty(req.sftp_host_key),
            sftp_private_key: non_empty(req.sftp_private_key),
            status: EndpointStatus::Stopped,
        };
        definition.apply_protocol_defaults(settings);
        definition
    }

    /// Fill in the defaults FTP and SFTP endpoints need to come up.
    pub(crate) fn apply_protocol_defaults(&mut self, settings: &Settings) {
        match self.protocol {
            Protocol::Ftp => {
                self.ftp_mode.get_or_insert(FtpMode::Passive);
                self.ftp_root_dir
                    .get_or_insert_with(|| settings.default_ftp_root(self.port).display().to_string());
                self.ftp_user
                    .get_or_insert_with(|| DEFAULT_FILE_USER.to_string());
                self.ftp_pass
                    .get_or_insert_with(|| DEFAULT_FILE_PASSWORD.to_string());
            }
            Protocol::Sftp => {
                self.sftp_root_dir.get_or_insert_with(|| {
                    settings.default_sftp_root(self.port).display().to_string()
                });
                self.sftp_user
                    .get_or_insert_with(|| DEFAULT_FILE_USER.to_string());
                self.sftp_pass
                    .get_or_insert_with(|| DEFAULT_FILE_PASSWORD.to_string());
            }
            Protocol::Http | Protocol::Https | Protocol::Tcp => {}
        }
    }

    /// Apply the non-empty fields of an update. Protocol, port and id never change.
    pub(crate) fn apply_update(&mut self, req: UpdateEndpointRequest) {
        fn set(field: &mut Option<String>, value: Option<String>) {
            if let Some(v) = non_empty(value) {
                *field = Some(v);
            }
        }

        if let Some(name) = non_empty(req.name) {
            self.name = name;
        }
        if let Some(content) = non_empty(req.content) {
            self.content = content;
        }
        if let Some(charset) = req.charset {
            self.charset = charset;
        }
        set(&mut self.path, req.path);
        set(&mut self.method, req.method);
        set(&mut self.cert_file, req.cert_file);
        set(&mut self.key_file, req.key_file);
        if let Some(mode) = req.ftp_mode {
            self.ftp_mode = Some(mode);
        }
        set(&mut self.ftp_root_dir, req.ftp_root_dir);
        set(&mut self.ftp_user, req.ftp_user);
        set(&mut self.ftp_pass, req.ftp_pass);
        set(&mut self.ftp_passive_port_range, req.ftp_passive_port_range);
        set(&mut self.sftp_root_dir, req.sftp_root_dir);
        set(&mut self.sftp_user, req.sftp_user);
        set(&mut self.sftp_pass, req.sftp_pass);
        set(&mut self.sftp_host_key, req.sftp_host_key);
        set(&mut self.sftp_private_key, req.sftp_private_key);
    }

    pub fn is_running(&self) -> bool {
        self.status == EndpointStatus::Running
    }

    /// Configured root directory for FTP/SFTP endpoints.
    pub fn file_root(&self) -> Option<&str> {
        match self.protocol {
            Protocol::Ftp => self.ftp_root_dir.as_deref(),
            Protocol::Sftp => self.sftp_root_dir.as_deref(),
            _ => None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

// ============================================================================
// Request Types
// ============================================================================

/// Request to create a new endpoint.
///
/// `protocol` stays a string so unknown protocols surface as a typed error from the manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateEndpointRequest {
    pub name: String,
    pub port: u16,
    pub protocol: String,
    pub content: String,
    pub charset: Charset,
    pub path: Option<String>,
    pub method: Option<String>,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub ftp_mode: Option<FtpMode>,
    pub ftp_root_dir: Option<String>,
    pub ftp_user: Option<String>,
    pub ftp_pass: Option<String>,
    pub ftp_passive_port_range: Option<String>,
    pub sftp_root_dir: Option<String>,
    pub sftp_user: Option<String>,
    pub sftp_pass: Option<String>,
    pub sftp_host_key: Option<String>,
    pub sftp_private_key: Option<String>,
}

impl CreateEndpointRequest {
    pub fn new(name: impl Into<String>, protocol: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            protocol: protocol.into(),
            port,
            ..Default::default()
        }
    }
}

/// Partial update. Absent or empty values leave the current value unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateEndpointRequest {
    pub name: Option<String>,
    pub content: Option<String>,
    pub charset: Option<Charset>,
    pub path: Option<String>,
    pub method: Option<String>,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub ftp_mode: Option<FtpMode>,
    pub ftp_root_dir: Option<String>,
    pub ftp_user: Option<String>,
    pub ftp_pass: Option<String>,
    pub ftp_passive_port_range: Option<String>,
    pub sftp_root_dir: Option<String>,
    pub sftp_user: Option<String>,
    pub sftp_pass: Option<String>,
    pub sftp_host_key: Option<String>,
    pub sftp_private_key: Option<String>,
}
