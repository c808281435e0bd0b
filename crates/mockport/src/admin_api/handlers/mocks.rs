//! Mock endpoint CRUD handlers.

use crate::admin_api::types::*;
use crate::endpoint::{CreateEndpointRequest, EndpointManager, UpdateEndpointRequest};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use std::sync::Arc;
use tracing::warn;

/// POST /api/mocks - Create and start a mock endpoint
pub async fn handle_create(body: Bytes, manager: Arc<EndpointManager>) -> Response<Full<Bytes>> {
    let req: CreateEndpointRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                &format!("Invalid endpoint JSON: {e}"),
            )
        }
    };

    match manager.create(req).await {
        Ok(definition) => json_response(StatusCode::CREATED, &definition),
        Err(e) => {
            warn!("Create failed: {}", e);
            endpoint_error_response(&e)
        }
    }
}

/// GET /api/mocks - List all mock endpoints
pub async fn handle_list(manager: Arc<EndpointManager>) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &manager.list().await)
}

/// GET /api/mocks/:id - Get a single mock endpoint
pub async fn handle_get(id: &str, manager: Arc<EndpointManager>) -> Response<Full<Bytes>> {
    match manager.get(id).await {
        Ok(definition) => json_response(StatusCode::OK, &definition),
        Err(e) => endpoint_error_response(&e),
    }
}

/// PUT /api/mocks/:id - Update a mock endpoint, restarting it if running
pub async fn handle_update(
    id: &str,
    body: Bytes,
    manager: Arc<EndpointManager>,
) -> Response<Full<Bytes>> {
    let req: UpdateEndpointRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                &format!("Invalid update JSON: {e}"),
            )
        }
    };

    match manager.update(id, req).await {
        Ok(definition) => json_response(StatusCode::OK, &definition),
        Err(e) => {
            warn!("Update of {} failed: {}", id, e);
            endpoint_error_response(&e)
        }
    }
}

/// DELETE /api/mocks/:id - Stop and remove a mock endpoint
pub async fn handle_delete(id: &str, manager: Arc<EndpointManager>) -> Response<Full<Bytes>> {
    match manager.delete(id).await {
        Ok(()) => json_response(
            StatusCode::OK,
            &MessageResponse {
                message: "Mock endpoint deleted".to_string(),
            },
        ),
        Err(e) => endpoint_error_response(&e),
    }
}
