//! FTP endpoint server backed by libunftp and its filesystem storage backend.

use super::{network, ProtocolServer, ServerError};
use crate::config::Settings;
use crate::endpoint::{EndpointDefinition, FtpMode, DEFAULT_FILE_PASSWORD, DEFAULT_FILE_USER};
use async_trait::async_trait;
use libunftp::auth::{AuthenticationError, Authenticator, Credentials, DefaultUser};
use libunftp::options::{ActivePassiveMode, Shutdown};
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use unftp_sbe_fs::ServerExt;

/// Passive data ports used when none (or a malformed range) is configured.
pub const DEFAULT_PASSIVE_PORTS: RangeInclusive<u16> = 50000..=50100;

const GREETING: &str = "Welcome to the mockport FTP server";

/// Parse a `"min-max"` passive port range, falling back to [`DEFAULT_PASSIVE_PORTS`].
pub fn parse_passive_range(spec: Option<&str>) -> RangeInclusive<u16> {
    let parsed = spec.and_then(|spec| {
        let (min, max) = spec.split_once('-')?;
        let min: u16 = min.trim().parse().ok()?;
        let max: u16 = max.trim().parse().ok()?;
        (min > 0 && max > min).then_some(min..=max)
    });
    parsed.unwrap_or(DEFAULT_PASSIVE_PORTS)
}

/// Single static credential pair.
struct StaticAuthenticator {
    user: String,
    pass: String,
}

impl fmt::Debug for StaticAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticAuthenticator")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Authenticator<DefaultUser> for StaticAuthenticator {
    async fn authenticate(
        &self,
        username: &str,
        creds: &Credentials,
    ) -> Result<DefaultUser, AuthenticationError> {
        if username != self.user {
            return Err(AuthenticationError::BadUser);
        }
        match creds.password.as_deref() {
            Some(password) if password == self.pass => Ok(DefaultUser),
            _ => Err(AuthenticationError::BadPassword),
        }
    }
}

struct RunningFtp {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
    alive: Arc<AtomicBool>,
}

pub struct FtpServer {
    host: String,
    port: u16,
    root: PathBuf,
    user: String,
    pass: String,
    mode: FtpMode,
    passive_ports: RangeInclusive<u16>,
    grace_period: Duration,
    running: Option<RunningFtp>,
}

impl FtpServer {
    pub fn new(definition: &EndpointDefinition, settings: &Settings) -> Self {
        let root = definition
            .ftp_root_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| settings.default_ftp_root(definition.port));
        Self {
            host: settings.bind_host.clone(),
            port: definition.port,
            root: std::path::absolute(&root).unwrap_or(root),
            user: definition
                .ftp_user
                .clone()
                .unwrap_or_else(|| DEFAULT_FILE_USER.to_string()),
            pass: definition
                .ftp_pass
                .clone()
                .unwrap_or_else(|| DEFAULT_FILE_PASSWORD.to_string()),
            mode: definition.ftp_mode.unwrap_or_default(),
            passive_ports: parse_passive_range(definition.ftp_passive_port_range.as_deref()),
            grace_period: settings.grace_period,
            running: None,
        }
    }

    fn active_passive_mode(&self) -> ActivePassiveMode {
        match self.mode {
            FtpMode::Passive => ActivePassiveMode::PassiveOnly,
            // Passive stays available so clients that insist on PASV still work.
            FtpMode::Active => ActivePassiveMode::ActiveAndPassive,
        }
    }
}

#[async_trait]
impl ProtocolServer for FtpServer {
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

        // Probe the port so bind conflicts surface here rather than in the background task.
        let addr = network::resolve(&self.host, self.port)
            .await
            .map_err(|source| ServerError::Bind {
                addr: format!("{}:{}", self.host, self.port),
                source,
            })?;
        drop(
            network::create_listener(addr).map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?,
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let grace_period = self.grace_period;
        let passive_end = self.passive_ports.end().saturating_add(1);

        let server = libunftp::Server::with_fs(self.root.clone())
            .authenticator(Arc::new(StaticAuthenticator {
                user: self.user.clone(),
                pass: self.pass.clone(),
            }))
            .greeting(GREETING)
            .passive_ports(*self.passive_ports.start()..passive_end)
            .active_passive_mode(self.active_passive_mode())
            .shutdown_indicator(async move {
                let _ = shutdown_rx.await;
                Shutdown::new().grace_period(grace_period)
            })
            .build()
            .map_err(|e| ServerError::Ftp(e.to_string()))?;

        let alive = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn({
            let alive = Arc::clone(&alive);
            let port = self.port;
            async move {
                match server.listen(addr.to_string()).await {
                    Ok(()) => debug!("FTP listener on port {} exited", port),
                    Err(e) => error!("FTP server error on port {}: {}", port, e),
                }
                alive.store(false, Ordering::SeqCst);
            }
        });

        info!(
            "ftp endpoint listening on {} (mode: {:?}, root: {:?})",
            addr, self.mode, self.root
        );
        self.running = Some(RunningFtp {
            shutdown_tx,
            task,
            alive,
        });
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ServerError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        let _ = running.shutdown_tx.send(());
        let deadline = self.grace_period + Duration::from_secs(1);
        wait_for_exit(running.task, deadline, self.port).await
    }

    fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| r.alive.load(Ordering::SeqCst))
    }
}

/// Wait for the engine task to finish; abort it if the deadline passes so the port is released.
async fn wait_for_exit(
    mut task: JoinHandle<()>,
    deadline: Duration,
    port: u16,
) -> Result<(), ServerError> {
    match tokio::time::timeout(deadline, &mut task).await {
        Ok(Ok(())) => {
            info!("ftp endpoint on port {} stopped", port);
            Ok(())
        }
        Ok(Err(e)) => Err(ServerError::Task(e.to_string())),
        Err(_) => {
            warn!("ftp endpoint on port {} did not stop in time, aborting", port);
            task.abort();
            Err(ServerError::ShutdownTimeout(deadline))
        }
    }
}
