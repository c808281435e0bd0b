//! Runtime settings shared by the manager, the store and the protocol engines.
//!
//! Everything on disk lives under one data directory:
//!
//! ```text
//! <data_dir>/config/mocks.yaml          persisted endpoint definitions
//! <data_dir>/ftp_data/port_<port>/      default FTP root
//! <data_dir>/sftp_data/port_<port>/     default SFTP root
//! <data_dir>/sftp_keys/host_key_<port>  generated SFTP host keys
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Grace period granted to in-flight HTTP and FTP sessions when an endpoint stops.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// How long a TCP endpoint waits for the client's first bytes before answering anyway.
pub const DEFAULT_TCP_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Host every endpoint listener binds to unless overridden.
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub bind_host: String,
    pub grace_period: Duration,
    pub tcp_read_timeout: Duration,
}

impl Settings {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            bind_host: DEFAULT_BIND_HOST.to_string(),
            grace_period: DEFAULT_GRACE_PERIOD,
            tcp_read_timeout: DEFAULT_TCP_READ_TIMEOUT,
        }
    }

    pub fn with_bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// YAML file holding every endpoint definition.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("config").join("mocks.yaml")
    }

    pub fn default_ftp_root(&self, port: u16) -> PathBuf {
        self.data_dir.join("ftp_data").join(format!("port_{port}"))
    }

    pub fn default_sftp_root(&self, port: u16) -> PathBuf {
        self.data_dir.join("sftp_data").join(format!("port_{port}"))
    }

    /// Where a generated SFTP host key for `port` is kept between restarts.
    pub fn host_key_path(&self, port: u16) -> PathBuf {
        self.data_dir
            .join("sftp_keys")
            .join(format!("host_key_{port}"))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(".")
    }
}
