//! SFTP endpoint server.
//!
//! An SSH server (russh) that accepts password logins for one account and only
//! serves the `sftp` subsystem on session channels. File operations are
//! handled by [`fs::SftpSession`] scoped to the endpoint root.

mod fs;
mod host_key;

pub use host_key::load_or_generate_host_key;

use super::{network, AcceptLoop, ProtocolServer, ServerError};
use crate::config::Settings;
use crate::endpoint::{EndpointDefinition, Protocol, DEFAULT_FILE_PASSWORD, DEFAULT_FILE_USER};
use async_trait::async_trait;
use fs::SftpSession;
use russh::server::{Auth, Msg, Session};
use russh::{Channel, ChannelId, MethodKind, MethodSet};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SUBSYSTEM_SFTP: &str = "sftp";

/// Login accepted by an SFTP endpoint.
#[derive(Clone)]
struct Account {
    user: String,
    pass: String,
}

/// Per-connection SSH handler.
struct SshSession {
    account: Arc<Account>,
    root: PathBuf,
    port: u16,
    channels: HashMap<ChannelId, Channel<Msg>>,
}

impl SshSession {
    /// Only session channels are served; the open is answered with a failure.
    fn refuse_channel(&self, kind: &str) -> bool {
        debug!(
            "Refusing {} channel on port {}: unknown channel type",
            kind, self.port
        );
        false
    }
}

impl russh::server::Handler for SshSession {
    type Error = russh::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if user == self.account.user && password == self.account.pass {
            debug!("SFTP login for '{}' on port {}", user, self.port);
            Ok(Auth::Accept)
        } else {
            debug!("SFTP login rejected for '{}' on port {}", user, self.port);
            Ok(Auth::reject())
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn channel_open_x11(
        &mut self,
        _channel: Channel<Msg>,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(self.refuse_channel("x11"))
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        _channel: Channel<Msg>,
        _host_to_connect: &str,
        _port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(self.refuse_channel("direct-tcpip"))
    }

    async fn channel_open_forwarded_tcpip(
        &mut self,
        _channel: Channel<Msg>,
        _host_to_connect: &str,
        _port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(self.refuse_channel("forwarded-tcpip"))
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let channel = match self.channels.remove(&channel_id) {
            Some(channel) if name == SUBSYSTEM_SFTP => channel,
            other => {
                if let Some(channel) = other {
                    self.channels.insert(channel_id, channel);
                }
                debug!("Refusing subsystem '{}' on port {}", name, self.port);
                session.channel_failure(channel_id)?;
                return Ok(());
            }
        };

        session.channel_success(channel_id)?;
        russh_sftp::server::run(channel.into_stream(), SftpSession::new(self.root.clone())).await;
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        session.close(channel)?;
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.channels.remove(&channel);
        Ok(())
    }
}

pub struct SftpServer {
    host: String,
    port: u16,
    root: PathBuf,
    account: Arc<Account>,
    /// Explicit key file; otherwise the per-port generated key is used.
    host_key: Option<PathBuf>,
    generated_key_path: PathBuf,
    running: Option<AcceptLoop>,
}

impl SftpServer {
    pub fn new(definition: &EndpointDefinition, settings: &Settings) -> Self {
        let root = definition
            .sftp_root_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| settings.default_sftp_root(definition.port));
        Self {
            host: settings.bind_host.clone(),
            port: definition.port,
            root: std::path::absolute(&root).unwrap_or(root),
            account: Arc::new(Account {
                user: definition
                    .sftp_user
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FILE_USER.to_string()),
                pass: definition
                    .sftp_pass
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FILE_PASSWORD.to_string()),
            }),
            host_key: definition
                .sftp_host_key
                .as_ref()
                .or(definition.sftp_private_key.as_ref())
                .map(PathBuf::from),
            generated_key_path: settings.host_key_path(definition.port),
            running: None,
        }
    }

    fn ssh_config(key: russh::keys::PrivateKey) -> russh::server::Config {
        russh::server::Config {
            keys: vec![key],
            methods: MethodSet::from(&[MethodKind::Password][..]),
            auth_rejection_time: Duration::from_secs(1),
            auth_rejection_time_initial: Some(Duration::ZERO),
            inactivity_timeout: Some(Duration::from_secs(3600)),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ProtocolServer for SftpServer {
    async fn start(&mut self) -> Result<(), ServerError> {
        if self.running.is_some() {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| ServerError::RootDir {
                path: self.root.clone(),
                source,
            })?;

        let configured = self.host_key.clone();
        let generated = self.generated_key_path.clone();
        let key = tokio::task::spawn_blocking(move || {
            load_or_generate_host_key(configured.as_deref(), &generated)
        })
        .await
        .map_err(|e| ServerError::Task(e.to_string()))??;
        let config = Arc::new(Self::ssh_config(key));

        let listener = network::bind(&self.host, self.port).await?;
        info!(
            "sftp endpoint listening on {}:{} (root: {:?})",
            self.host, self.port, self.root
        );

        let account = Arc::clone(&self.account);
        let root = self.root.clone();
        let port = self.port;
        self.running = Some(AcceptLoop::spawn(
            listener,
            Protocol::Sftp,
            port,
            move |stream, peer, _shutdown| {
                let config = Arc::clone(&config);
                let handler = SshSession {
                    account: Arc::clone(&account),
                    root: root.clone(),
                    port,
                    channels: HashMap::new(),
                };
                async move {
                    let session = match russh::server::run_stream(config, stream, handler).await {
                        Ok(session) => session,
                        Err(e) => {
                            warn!("SSH handshake with {} failed on port {}: {}", peer, port, e);
                            return;
                        }
                    };
                    if let Err(e) = session.await {
                        debug!("SSH session with {} on port {} ended: {}", peer, port, e);
                    }
                }
            },
        ));
        Ok(())
    }

    /// Sessions already established keep running until their clients disconnect.
    async fn stop(&mut self) -> Result<(), ServerError> {
        if let Some(running) = self.running.take() {
            running.close_listener().await?;
            info!("sftp endpoint on port {} stopped", self.port);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(AcceptLoop::is_running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_private_key_used_when_host_key_absent() {
        let mut definition = crate::endpoint::tests::definition(Protocol::Sftp, 2222);
        definition.sftp_private_key = Some("/keys/id_rsa".to_string());
        let server = SftpServer::new(&definition, &Settings::new("/data"));
        assert_eq!(server.host_key, Some(PathBuf::from("/keys/id_rsa")));
        assert_eq!(
            server.generated_key_path,
            PathBuf::from("/data/sftp_keys/host_key_2222")
        );

        definition.sftp_host_key = Some("/keys/host".to_string());
        let server = SftpServer::new(&definition, &Settings::new("/data"));
        assert_eq!(server.host_key, Some(PathBuf::from("/keys/host")));
    }

    #[tokio::test]
    async fn test_serves_ssh_banner() {
        let dir = tempfile::tempdir().unwrap();
        let held = network::create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let port = held.local_addr().unwrap().port();
        drop(held);

        let settings = Settings::new(dir.path()).with_bind_host("127.0.0.1");
        let mut definition = crate::endpoint::tests::definition(Protocol::Sftp, port);
        definition.apply_protocol_defaults(&settings);

        let mut server = SftpServer::new(&definition, &settings);
        server.start().await.unwrap();
        assert!(server.is_running());
        assert!(settings.host_key_path(port).exists());
        assert!(settings.default_sftp_root(port).is_dir());

        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        let mut banner = [0u8; 8];
        stream.read_exact(&mut banner).await.unwrap();
        assert_eq!(&banner, b"SSH-2.0-");

        server.stop().await.unwrap();
        assert!(!server.is_running());
    }
}
