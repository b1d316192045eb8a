//! Stable JSON error envelope for gateway-generated responses.
//!
//! Every policy rejection and infrastructure failure the gateway produces
//! uses the same `{code, message, detail}` body so clients can branch on the
//! numeric code without parsing prose. Upstream responses pass through
//! untouched; only the gateway's own responses are built here.
use axum::{
    body::Body,
    http::{StatusCode, header},
    response::Response,
};
use serde::Serialize;

/// Stable gateway error codes. The first three digits follow the HTTP status
/// family; the suffix disambiguates causes sharing a status.
pub mod code {
    pub const INVALID_INPUT: u32 = 40001;
    pub const UNAUTHORIZED: u32 = 40100;
    pub const ACCESS_TOKEN_EXPIRED: u32 = 40102;
    pub const FORBIDDEN: u32 = 40300;
    pub const NOT_FOUND: u32 = 40400;
    pub const RATE_LIMITED: u32 = 42900;
    pub const BAD_GATEWAY: u32 = 50201;
    /// The timeout envelope carries the HTTP status itself as its code.
    pub const REQUEST_TIMEOUT: u32 = 504;
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: u32,
    message: &'a str,
    detail: &'a str,
}

fn json_response(status: StatusCode, body: String) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

/// Build an error envelope response.
pub fn error_response(status: StatusCode, code: u32, message: &str, detail: &str) -> Response<Body> {
    let body = ErrorBody {
        code,
        message,
        detail,
    };
    // ErrorBody serialization cannot fail; fall back to a bare body anyway.
    let payload = serde_json::to_string(&body)
        .unwrap_or_else(|_| format!(r#"{{"code":{code},"message":"{message}","detail":""}}"#));
    json_response(status, payload)
}

/// The panic envelope intentionally carries only a message, mirroring the
/// deployment this gateway replaced.
pub fn panic_response() -> Response<Body> {
    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        r#"{"message":"服务器故障，请稍后再试."}"#.to_string(),
    )
}

/// Liveness payload served on `GET /health`.
pub fn health_response() -> Response<Body> {
    json_response(StatusCode::OK, r#"{"status":"healthy"}"#.to_string())
}
