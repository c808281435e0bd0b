//! mockport - mock endpoint server
//!
//! # Usage
//!
//! ```bash
//! # Admin API on :8080, state under the current directory
//! mockport
//!
//! # Custom admin port and data directory
//! mockport --port 9090 --data-dir /var/lib/mockport
//! ```

use anyhow::Context;
use clap::Parser;
use mockport::admin_api::AdminApiServer;
use mockport::config::DEFAULT_BIND_HOST;
use mockport::{EndpointManager, Settings};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mockport")]
#[command(author, version, about = "Lightweight mock server for HTTP, TCP, FTP and SFTP")]
struct Args {
    /// Admin API port
    #[arg(
        short,
        long,
        default_value = "8080",
        env = "MOCKPORT_PORT",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    port: u16,

    /// Directory holding the endpoint store, FTP/SFTP roots and host keys
    #[arg(short, long, default_value = ".", env = "MOCKPORT_DATA_DIR")]
    data_dir: PathBuf,

    /// Host every mock endpoint binds to
    #[arg(short, long, default_value = DEFAULT_BIND_HOST)]
    bind: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let settings = Settings::new(&args.data_dir).with_bind_host(args.bind);
    let manager = Arc::new(
        EndpointManager::open(settings)
            .await
            .with_context(|| format!("failed to load endpoints from {:?}", args.data_dir))?,
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!(
        "Starting mockport v{} on http://localhost:{}",
        env!("CARGO_PKG_VERSION"),
        args.port
    );
    let server = AdminApiServer::new(addr, Arc::clone(&manager));

    let result = tokio::select! {
        res = server.run() => res,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };
    if let Err(e) = &result {
        error!("Admin API failed: {}", e);
    }

    manager.shutdown().await;
    result
}
