//! Response helpers and error mapping for the Admin API.

use crate::endpoint::EndpointError;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{
    HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN,
};
use hyper::{Request, Response, StatusCode};
use serde::Serialize;

/// Error body returned by every failing admin call
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Body returned by a successful delete
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// HTTP status for an endpoint error kind.
pub fn status_for(err: &EndpointError) -> StatusCode {
    match err {
        EndpointError::NotFound(_) => StatusCode::NOT_FOUND,
        EndpointError::PortInUse(_) => StatusCode::CONFLICT,
        EndpointError::InvalidPort(_)
        | EndpointError::UnsupportedProtocol(_)
        | EndpointError::NoFileRoot(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// =============================================================================
// Response helper functions
// =============================================================================

/// Create a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
    build_response_with_headers(status, [("Content-Type", "application/json")], json)
}

/// Build an HTTP response with headers.
///
/// Falls back to a bare 500 if the builder rejects the inputs.
pub fn build_response_with_headers(
    status: StatusCode,
    headers: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    for (key, value) in headers {
        builder = builder.header(key.as_ref(), value.as_ref());
    }
    builder.body(Full::new(body.into())).unwrap_or_else(|_| {
        let mut response = Response::new(Full::new(Bytes::from("Internal Server Error")));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

/// Create an error response with an explicit kind
pub fn error_response(status: StatusCode, kind: &str, message: &str) -> Response<Full<Bytes>> {
    let error = ErrorResponse {
        error: kind.to_string(),
        message: message.to_string(),
    };
    json_response(status, &error)
}

/// Render an endpoint error with its kind and mapped status
pub fn endpoint_error_response(err: &EndpointError) -> Response<Full<Bytes>> {
    error_response(status_for(err), err.kind(), &err.to_string())
}

/// Create a not found response
pub fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "not_found", "Not Found")
}

const CORS_HEADERS: [(HeaderName, &str); 3] = [
    (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, PUT, DELETE, OPTIONS"),
    (ACCESS_CONTROL_ALLOW_HEADERS, "Origin, Content-Type, Accept"),
];

/// Add the CORS headers every admin response carries
pub fn with_cors(mut response: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    let headers = response.headers_mut();
    for (name, value) in CORS_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    response
}

/// Answer a CORS preflight request
pub fn preflight() -> Response<Full<Bytes>> {
    with_cors(build_response_with_headers(
        StatusCode::NO_CONTENT,
        [("Access-Control-Max-Age", "43200")],
        Bytes::new(),
    ))
}

/// Collect request body into bytes
pub async fn collect_body(req: Request<Incoming>) -> Result<Bytes, String> {
    use http_body_util::BodyExt;
    req.collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| format!("Failed to read request body: {e}"))
}
