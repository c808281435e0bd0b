//! Route dispatch logic for the Admin API.

use crate::admin_api::handlers::{files, mocks, system};
use crate::admin_api::types::{collect_body, error_response, not_found, preflight, with_cors};
use crate::endpoint::EndpointManager;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::debug;

const MOCKS_PATH: &str = "/api/mocks";

/// Parsed admin route
#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    /// GET /health
    Health,
    /// GET/POST /api/mocks
    Mocks,
    /// GET/PUT/DELETE /api/mocks/:id
    Mock(&'a str),
    /// GET/POST /api/mocks/:id/files
    Files(&'a str),
    /// GET/DELETE /api/mocks/:id/files/*path
    File(&'a str, &'a str),
}

impl<'a> Route<'a> {
    fn parse(path: &'a str) -> Option<Self> {
        if path == "/health" {
            return Some(Route::Health);
        }
        let rest = path.strip_prefix(MOCKS_PATH)?;
        match rest.trim_end_matches('/') {
            "" => Some(Route::Mocks),
            rest => {
                let rest = rest.strip_prefix('/')?;
                let Some((id, tail)) = rest.split_once('/') else {
                    return Some(Route::Mock(rest));
                };
                match tail.strip_prefix("files")? {
                    "" => Some(Route::Files(id)),
                    file => file.strip_prefix('/').map(|file| Route::File(id, file)),
                }
            }
        }
    }
}

/// Main request router
pub async fn route_request(
    req: Request<Incoming>,
    manager: Arc<EndpointManager>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|s| s.to_string());

    debug!("Admin API: {} {}", method, path);

    if method == Method::OPTIONS {
        return Ok(preflight());
    }

    let Some(route) = Route::parse(&path) else {
        return Ok(with_cors(not_found()));
    };

    let response = match (&method, route) {
        (&Method::GET, Route::Health) => system::handle_health(),
        (&Method::GET, Route::Mocks) => mocks::handle_list(manager).await,
        (&Method::POST, Route::Mocks) => match collect_body(req).await {
            Ok(body) => mocks::handle_create(body, manager).await,
            Err(e) => error_response(StatusCode::BAD_REQUEST, "invalid_request", &e),
        },
        (&Method::GET, Route::Mock(id)) => mocks::handle_get(id, manager).await,
        (&Method::PUT, Route::Mock(id)) => match collect_body(req).await {
            Ok(body) => mocks::handle_update(id, body, manager).await,
            Err(e) => error_response(StatusCode::BAD_REQUEST, "invalid_request", &e),
        },
        (&Method::DELETE, Route::Mock(id)) => mocks::handle_delete(id, manager).await,
        (&Method::GET, Route::Files(id)) => {
            files::handle_list(id, query.as_deref(), manager).await
        }
        (&Method::POST, Route::Files(id)) => {
            let (parts, body) = req.into_parts();
            files::handle_upload(id, query.as_deref(), &parts.headers, body, manager).await
        }
        (&Method::GET, Route::File(id, file)) => files::handle_download(id, file, manager).await,
        (&Method::DELETE, Route::File(id, file)) => files::handle_delete(id, file, manager).await,
        _ => error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            &format!("{method} not allowed on {path}"),
        ),
    };
    Ok(with_cors(response))
}
