//! HTTP and HTTPS endpoint server.
//!
//! Each endpoint serves a single route with a fixed body. Routes ending in `/`
//! match their whole subtree; anything else must match exactly.

use super::tls::create_tls_acceptor;
use super::{network, AcceptLoop, ProtocolServer, ServerError};
use crate::charset::{self, CharsetError};
use crate::config::Settings;
use crate::endpoint::{Charset, EndpointDefinition, Protocol};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Request matching and the pre-encoded response of one HTTP endpoint.
#[derive(Debug)]
pub struct HttpRoute {
    path: String,
    method: Option<String>,
    charset: Charset,
    body: Result<Bytes, CharsetError>,
}

impl HttpRoute {
    pub fn new(path: Option<&str>, method: Option<&str>, content: &str, charset: Charset) -> Self {
        let path = match path {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => "/".to_string(),
        };
        Self {
            path,
            method: method.filter(|m| !m.is_empty()).map(str::to_string),
            charset,
            body: charset::encode(content, charset).map(Bytes::from),
        }
    }

    pub fn matches_path(&self, request_path: &str) -> bool {
        if self.path.ends_with('/') {
            request_path.starts_with(&self.path)
        } else {
            request_path == self.path
        }
    }

    /// Produce the response for a request line.
    pub fn respond(&self, method: &Method, request_path: &str) -> Response<Full<Bytes>> {
        if !self.matches_path(request_path) {
            return plain(StatusCode::NOT_FOUND, "404 page not found\n");
        }

        if let Some(allowed) = &self.method {
            if !allowed.eq_ignore_ascii_case(method.as_str()) {
                return plain(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed\n");
            }
        }

        match &self.body {
            Ok(body) => {
                let mut response = Response::new(Full::new(body.clone()));
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static(charset::content_type(self.charset)),
                );
                response
            }
            Err(_) => plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error\n"),
        }
    }
}

fn plain(status: StatusCode, text: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(text.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Static responder for `http` and `https` endpoints.
pub struct HttpServer {
    protocol: Protocol,
    host: String,
    port: u16,
    cert_file: Option<String>,
    key_file: Option<String>,
    route: Arc<HttpRoute>,
    grace_period: Duration,
    running: Option<AcceptLoop>,
}

impl HttpServer {
    pub fn new(definition: &EndpointDefinition, settings: &Settings) -> Self {
        Self {
            protocol: definition.protocol,
            host: settings.bind_host.clone(),
            port: definition.port,
            cert_file: definition.cert_file.clone(),
            key_file: definition.key_file.clone(),
            route: Arc::new(HttpRoute::new(
                definition.path.as_deref(),
                definition.method.as_deref(),
                &definition.content,
                definition.charset,
            )),
            grace_period: settings.grace_period,
            running: None,
        }
    }

    fn tls_acceptor(&self) -> Result<Option<tokio_rustls::TlsAcceptor>, ServerError> {
        if self.protocol != Protocol::Https {
            return Ok(None);
        }
        match (self.cert_file.as_deref(), self.key_file.as_deref()) {
            (Some(cert), Some(key)) => create_tls_acceptor(cert, key).map(Some),
            _ => Err(ServerError::Tls(
                "certificate or key file not specified".to_string(),
            )),
        }
    }
}

#[async_trait]
impl ProtocolServer for HttpServer {
    async fn start(&mut self) -> Result<(), ServerError> {
        if self.running.is_some() {
            return Ok(());
        }

        let acceptor = self.tls_acceptor()?;
        if let Err(e) = &self.route.body {
            warn!("Endpoint on port {} will answer 500: {}", self.port, e);
        }

        let listener = network::bind(&self.host, self.port).await?;
        info!(
            "{} endpoint listening on {}:{} (route {})",
            self.protocol, self.host, self.port, self.route.path
        );

        let route = Arc::clone(&self.route);
        let grace_period = self.grace_period;
        let port = self.port;
        self.running = Some(AcceptLoop::spawn(
            listener,
            self.protocol,
            port,
            move |stream, peer, shutdown| {
                let route = Arc::clone(&route);
                let acceptor = acceptor.clone();
                async move {
                    match acceptor {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(tls) => {
                                serve_connection(tls, route, shutdown, grace_period, port).await
                            }
                            Err(e) => {
                                debug!("TLS handshake with {} failed on port {}: {}", peer, port, e)
                            }
                        },
                        None => serve_connection(stream, route, shutdown, grace_period, port).await,
                    }
                }
            },
        ));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ServerError> {
        if let Some(running) = self.running.take() {
            running.shutdown().await?;
            info!("{} endpoint on port {} stopped", self.protocol, self.port);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(AcceptLoop::is_running)
    }
}

/// Serve one HTTP/1 connection until the client leaves or the endpoint stops.
///
/// On stop the connection finishes its in-flight request, bounded by `grace_period`.
async fn serve_connection<I>(
    io: I,
    route: Arc<HttpRoute>,
    shutdown: CancellationToken,
    grace_period: Duration,
    port: u16,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req: Request<Incoming>| {
        let route = Arc::clone(&route);
        async move { Ok::<_, Infallible>(route.respond(req.method(), req.uri().path())) }
    });

    let conn = http1::Builder::new().serve_connection(TokioIo::new(io), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.cancelled() => {
            conn.as_mut().graceful_shutdown();
            match tokio::time::timeout(grace_period, conn.as_mut()).await {
                Ok(result) => result,
                Err(_) => {
                    debug!("Connection on port {} dropped after grace period", port);
                    Ok(())
                }
            }
        }
    };

    if let Err(e) = result {
        debug!("Connection error on port {}: {}", port, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(response: Response<Full<Bytes>>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_exact_route() {
        let route = HttpRoute::new(Some("/ping"), None, "pong", Charset::Utf8);
        let response = route.respond(&Method::GET, "/ping");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=UTF-8"
        );
        assert_eq!(body_of(response).await, Bytes::from_static(b"pong"));

        assert_eq!(
            route.respond(&Method::GET, "/ping/extra").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(route.respond(&Method::GET, "/").status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_subtree_route() {
        let route = HttpRoute::new(Some("/api/"), None, "ok", Charset::Utf8);
        assert!(route.matches_path("/api/"));
        assert!(route.matches_path("/api/users/1"));
        assert!(!route.matches_path("/api"));
        assert!(!route.matches_path("/other"));
    }

    #[test]
    fn test_default_route_matches_everything() {
        let route = HttpRoute::new(None, None, "ok", Charset::Utf8);
        assert!(route.matches_path("/"));
        assert!(route.matches_path("/anything/at/all"));
    }

    #[test]
    fn test_method_filter() {
        let route = HttpRoute::new(Some("/submit"), Some("POST"), "ok", Charset::Utf8);
        assert_eq!(route.respond(&Method::POST, "/submit").status(), StatusCode::OK);
        assert_eq!(
            route.respond(&Method::GET, "/submit").status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[tokio::test]
    async fn test_gbk_body() {
        let route = HttpRoute::new(Some("/"), None, "中文", Charset::Gbk);
        let response = route.respond(&Method::GET, "/");
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=GBK"
        );
        assert_eq!(body_of(response).await.as_ref(), &[0xD6, 0xD0, 0xCE, 0xC4]);
    }

    #[test]
    fn test_unencodable_body_is_500() {
        let route = HttpRoute::new(Some("/"), None, "😀", Charset::Gbk);
        assert_eq!(
            route.respond(&Method::GET, "/").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_https_without_certificate_fails_to_start() {
        let mut definition = crate::endpoint::tests::definition(Protocol::Https, 1);
        definition.cert_file = None;
        let mut server = HttpServer::new(&definition, &Settings::default());
        let err = server.start().await.unwrap_err();
        assert!(matches!(err, ServerError::Tls(_)));
        assert!(!server.is_running());
    }
}
