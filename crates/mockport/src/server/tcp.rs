//! Raw TCP endpoint server: read once, answer with the fixed body, close.

use super::{network, AcceptLoop, ProtocolServer, ServerError};
use crate::charset::{self, CharsetError};
use crate::config::Settings;
use crate::endpoint::{EndpointDefinition, Protocol};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

const READ_BUFFER_SIZE: usize = 1024;

pub struct TcpServer {
    host: String,
    port: u16,
    body: Arc<Result<Bytes, CharsetError>>,
    read_timeout: Duration,
    running: Option<AcceptLoop>,
}

impl TcpServer {
    pub fn new(definition: &EndpointDefinition, settings: &Settings) -> Self {
        Self {
            host: settings.bind_host.clone(),
            port: definition.port,
            body: Arc::new(charset::encode(&definition.content, definition.charset).map(Bytes::from)),
            read_timeout: settings.tcp_read_timeout,
            running: None,
        }
    }
}

#[async_trait]
impl ProtocolServer for TcpServer {
    async fn start(&mut self) -> Result<(), ServerError> {
        if self.running.is_some() {
            return Ok(());
        }

        let listener = network::bind(&self.host, self.port).await?;
        info!("tcp endpoint listening on {}:{}", self.host, self.port);

        let body = Arc::clone(&self.body);
        let read_timeout = self.read_timeout;
        let port = self.port;
        self.running = Some(AcceptLoop::spawn(
            listener,
            Protocol::Tcp,
            port,
            move |stream, _peer, _shutdown| {
                let body = Arc::clone(&body);
                async move { handle_connection(stream, body, read_timeout, port).await }
            },
        ));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ServerError> {
        if let Some(running) = self.running.take() {
            running.shutdown().await?;
            info!("tcp endpoint on port {} stopped", self.port);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(AcceptLoop::is_running)
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    body: Arc<Result<Bytes, CharsetError>>,
    read_timeout: Duration,
    port: u16,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    match tokio::time::timeout(read_timeout, stream.read(&mut buf)).await {
        Ok(Ok(n)) => debug!("Read {} bytes on tcp port {}", n, port),
        Ok(Err(e)) => debug!("TCP read error on port {}: {}", port, e),
        Err(_) => debug!("TCP read timed out on port {}", port),
    }

    let body = match body.as_ref() {
        Ok(body) => body,
        Err(e) => {
            warn!("Charset conversion error on port {}: {}", port, e);
            return;
        }
    };

    if let Err(e) = stream.write_all(body).await {
        debug!("TCP write error on port {}: {}", port, e);
        return;
    }
    let _ = stream.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Charset;

    #[tokio::test]
    async fn test_answers_and_closes() {
        let held = network::create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let port = held.local_addr().unwrap().port();
        drop(held);

        let mut definition = crate::endpoint::tests::definition(Protocol::Tcp, port);
        definition.content = "hello tcp".to_string();
        definition.charset = Charset::Utf8;
        let settings = Settings::default().with_bind_host("127.0.0.1");

        let mut server = TcpServer::new(&definition, &settings);
        server.start().await.unwrap();
        assert!(server.is_running());

        let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"hello tcp");

        server.stop().await.unwrap();
        assert!(!server.is_running());
        assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
    }

    #[tokio::test]
    async fn test_start_on_taken_port_fails() {
        let held = network::create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let port = held.local_addr().unwrap().port();

        let definition = crate::endpoint::tests::definition(Protocol::Tcp, port);
        let settings = Settings::default().with_bind_host("127.0.0.1");
        let mut server = TcpServer::new(&definition, &settings);
        assert!(matches!(
            server.start().await,
            Err(ServerError::Bind { .. })
        ));
        assert!(!server.is_running());
    }
}
