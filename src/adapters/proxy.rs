//! Reverse-proxy forwarder.
//!
//! Rewrites the matched request onto its service's upstream origin: the
//! service prefix is stripped exactly once, the query string is preserved,
//! `X-Forwarded-Host` records the inbound host and the `Host` header is
//! replaced with the target authority by the client adapter. Everything
//! else the client sent — `Authorization`, the stamped `X-User-*` headers,
//! the request id — passes through untouched. Upstream failures become a
//! stable 502 envelope; the gateway never retries.
use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderName, HeaderValue, StatusCode, Uri, header},
    response::Response,
};

use crate::{
    core::gateway::{self, ServiceRoute},
    metrics,
    ports::http_client::HttpClient,
    response::{code, error_response},
    tracing_setup::TraceContext,
};

pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// How long the upstream round trip took, attached to the response so the
/// access log can subtract it from the total.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpstreamLatency(pub Duration);

/// Per-process forwarder shared by every service handler.
pub struct Forwarder {
    client: Arc<dyn HttpClient>,
}

impl Forwarder {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }

    /// Forward `req` to the service's upstream and return its response.
    pub async fn forward(&self, service: &ServiceRoute, mut req: Request<Body>) -> Response<Body> {
        let sub_path = gateway::sub_path(&service.config.prefix, req.uri().path());

        let target = match build_target_uri(service, &sub_path, req.uri().query()) {
            Ok(uri) => uri,
            Err(err) => {
                tracing::error!(
                    error = %err,
                    upstream = %service.upstream.origin(),
                    path = %sub_path,
                    "failed to build upstream URI"
                );
                return bad_gateway();
            }
        };

        let inbound_host = req.headers().get(header::HOST).cloned().or_else(|| {
            req.uri()
                .authority()
                .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
        });
        if let Some(host) = inbound_host {
            req.headers_mut().insert(X_FORWARDED_HOST, host);
        }

        if let Some(trace) = req.extensions().get::<TraceContext>().cloned() {
            if let Ok(value) = HeaderValue::from_str(&trace.to_traceparent()) {
                req.headers_mut().insert("traceparent", value);
            }
        }

        *req.uri_mut() = target;

        let upstream = service.upstream.origin();
        let start = tokio::time::Instant::now();
        match self.client.send_request(req).await {
            Ok(mut response) => {
                let elapsed = start.elapsed();
                metrics::record_upstream(&upstream, response.status().as_u16(), elapsed);
                tracing::debug!(
                    upstream = %upstream,
                    status = response.status().as_u16(),
                    upstream_latency_ms = elapsed.as_millis() as u64,
                    "upstream response"
                );
                response.extensions_mut().insert(UpstreamLatency(elapsed));
                response
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    upstream = %upstream,
                    path = %sub_path,
                    "upstream round trip failed"
                );
                bad_gateway()
            }
        }
    }
}

fn build_target_uri(
    service: &ServiceRoute,
    sub_path: &str,
    query: Option<&str>,
) -> Result<Uri, axum::http::uri::InvalidUri> {
    let origin = service.upstream.origin();
    match query {
        Some(q) => format!("{origin}{sub_path}?{q}").parse(),
        None => format!("{origin}{sub_path}").parse(),
    }
}

fn bad_gateway() -> Response<Body> {
    error_response(
        StatusCode::BAD_GATEWAY,
        code::BAD_GATEWAY,
        "Bad Gateway",
        "下游服务不可用",
    )
}
