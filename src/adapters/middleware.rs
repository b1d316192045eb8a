//! Request-pipeline middleware for the gateway.
//!
//! Each stage is an `axum::middleware::from_fn` function taking the next
//! handler, so stages compose in a fixed order without any shared globals:
//! panic recovery → tracing span → request id → access log → deadline →
//! rate limit → CORS → dispatch. Stages that reject write the stable error
//! envelope and never call the rest of the chain.
use std::{net::IpAddr, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::Response,
};
use futures_util::FutureExt;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    adapters::proxy::UpstreamLatency,
    config::models::CorsConfig,
    core::rate_limiter::RateLimiterMap,
    metrics, response,
    response::code,
    tracing_setup::{self, TraceContext},
};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Ambient per-request values threaded through the pipeline via request
/// extensions. The principal, when present, travels as its own extension.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// Derive the client IP, honoring proxy headers before the socket peer.
/// Values that fail IP parsing collapse to the literal "invalid_ip" so
/// garbage senders still share one rate bucket.
pub fn client_ip<B>(req: &Request<B>) -> String {
    let from_headers = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| {
            req.headers()
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
        });

    if let Some(raw) = from_headers {
        return match raw.parse::<IpAddr>() {
            Ok(ip) => ip.to_string(),
            Err(_) => "invalid_ip".to_string(),
        };
    }

    req.extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "invalid_ip".to_string())
}

/// Outermost stage: catch panics from anything below so one bad request can
/// never take the process down.
pub async fn recovery_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let ip = client_ip(&req);

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let (payload_type, message) = panic_payload(&panic);
            tracing::error!(
                error = %message,
                error_type = payload_type,
                stack = %std::backtrace::Backtrace::force_capture(),
                path = %path,
                method = %method,
                client_ip = %ip,
                "panic recovered in request handler"
            );
            response::panic_response()
        }
    }
}

fn panic_payload(panic: &(dyn std::any::Any + Send)) -> (&'static str, String) {
    if let Some(s) = panic.downcast_ref::<&str>() {
        ("&str", (*s).to_string())
    } else if let Some(s) = panic.downcast_ref::<String>() {
        ("String", s.clone())
    } else {
        ("unknown", "non-string panic payload".to_string())
    }
}

/// Tracing settings shared with the middleware as axum state.
#[derive(Debug, Clone)]
pub struct TracerState {
    pub enabled: bool,
    pub service_name: String,
}

/// When tracing is enabled, continue the inbound trace (or start a fresh
/// one) and run the rest of the pipeline inside the server span.
pub async fn tracing_middleware(
    State(state): State<TracerState>,
    mut req: Request,
    next: Next,
) -> Response {
    if !state.enabled {
        return next.run(req).await;
    }

    let trace = req
        .headers()
        .get("traceparent")
        .and_then(|v| v.to_str().ok())
        .and_then(TraceContext::parse)
        .map(|inbound| inbound.child())
        .unwrap_or_else(TraceContext::new_root);

    let span = tracing_setup::create_request_span(
        &state.service_name,
        req.method().as_str(),
        req.uri().path(),
        &trace,
    );
    req.extensions_mut().insert(trace);

    next.run(req).instrument(span).await
}

/// Reuse the caller's `X-Request-Id` or mint a fresh UUIDv4, then mirror the
/// id into the forwarded request and the response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if request_id.is_empty() {
        tracing::warn!("request id still empty after generation");
    }

    let header_value = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = &header_value {
        req.headers_mut().insert(X_REQUEST_ID, value.clone());
    }
    req.extensions_mut().insert(RequestContext {
        request_id: request_id.clone(),
    });

    let mut response = next.run(req).await;

    if let Some(value) = header_value {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}

/// Log one line per request with the id, outcome and latency split. The
/// upstream share of the latency comes back from the forwarder as a
/// response extension, so the gateway-only portion can be derived.
pub async fn access_log_middleware(req: Request, next: Next) -> Response {
    let start = tokio::time::Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let ip = client_ip(&req);
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let request_id = match req.extensions().get::<RequestContext>() {
        Some(ctx) => ctx.request_id.clone(),
        None => {
            tracing::warn!("request id missing from request context");
            "unknown".to_string()
        }
    };

    let response = next.run(req).await;

    let total_latency = start.elapsed();
    let upstream_latency = response
        .extensions()
        .get::<UpstreamLatency>()
        .map(|l| l.0)
        .unwrap_or_default();
    let gateway_latency = total_latency.saturating_sub(upstream_latency);
    let status = response.status().as_u16();

    metrics::record_request(status, total_latency);
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status,
        client_ip = %ip,
        user_agent = %user_agent,
        total_latency_ms = total_latency.as_millis() as u64,
        gateway_latency_ms = gateway_latency.as_millis() as u64,
        "http request"
    );

    response
}

/// Bound the whole remaining pipeline, upstream round trip included. When
/// the deadline fires the inner future is dropped, which cancels any
/// in-flight upstream call; its late bytes go nowhere.
pub async fn deadline_middleware(
    State(timeout): State<Duration>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();

    match tokio::time::timeout(timeout, next.run(req)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(path = %path, timeout_ms = timeout.as_millis() as u64, "request deadline exceeded");
            response::error_response(
                StatusCode::GATEWAY_TIMEOUT,
                code::REQUEST_TIMEOUT,
                "Request Timeout",
                "请求超时，请稍后重试",
            )
        }
    }
}

/// Per-IP token-bucket check. Over-limit requests get a 429 with a
/// `Retry-After` hint of one refill interval. `/health` stays reachable for
/// probes no matter how noisy a client is.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiterMap>>,
    req: Request,
    next: Next,
) -> Response {
    if req.uri().path() == "/health" {
        return next.run(req).await;
    }

    let ip = client_ip(&req);
    if !limiter.allow(&ip).await {
        tracing::warn!(client_ip = %ip, path = %req.uri().path(), "rate limit exceeded");
        metrics::record_rate_limited();

        let mut response = response::error_response(
            StatusCode::TOO_MANY_REQUESTS,
            code::RATE_LIMITED,
            "Too Many Requests",
            "请求频率超出限制，请稍后重试",
        );
        if let Ok(value) = HeaderValue::from_str(&limiter.retry_after_secs()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return response;
    }

    next.run(req).await
}

/// Build the CORS layer from configuration, falling back to the defaults
/// the original deployment shipped with when a field is empty. Invalid
/// entries are skipped with a warning rather than failing startup.
pub fn cors_layer(cfg: &CorsConfig) -> CorsLayer {
    let mut layer = CorsLayer::new();

    if cfg.allow_origins.iter().any(|o| o == "*") {
        layer = layer.allow_origin(Any);
    } else if !cfg.allow_origins.is_empty() {
        let origins: Vec<HeaderValue> = cfg
            .allow_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "skipping unparseable CORS origin");
                    None
                }
            })
            .collect();
        layer = layer.allow_origin(AllowOrigin::list(origins));
    }

    let methods: Vec<Method> = if cfg.allow_methods.is_empty() {
        vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ]
    } else {
        cfg.allow_methods
            .iter()
            .filter_map(|m| match m.parse() {
                Ok(method) => Some(method),
                Err(_) => {
                    tracing::warn!(method = %m, "skipping unparseable CORS method");
                    None
                }
            })
            .collect()
    };
    layer = layer.allow_methods(methods);

    let headers: Vec<HeaderName> = if cfg.allow_headers.is_empty() {
        vec![
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ]
    } else {
        cfg.allow_headers
            .iter()
            .filter_map(|h| match h.parse() {
                Ok(name) => Some(name),
                Err(_) => {
                    tracing::warn!(header = %h, "skipping unparseable CORS header");
                    None
                }
            })
            .collect()
    };
    layer = layer.allow_headers(headers);

    if cfg.allow_credentials {
        layer = layer.allow_credentials(true);
    }

    let max_age = if cfg.max_age_seconds == 0 {
        12 * 60 * 60
    } else {
        cfg.max_age_seconds
    };
    layer.max_age(Duration::from_secs(max_age))
}

#[cfg(test)]
mod tests {
    use axum::{Router, body::Body, middleware, routing::get};
    use tower::ServiceExt; // for oneshot

    use super::*;
    use crate::config::models::RateLimitConfig;

    fn ok_router() -> Router {
        Router::new().route("/", get(|| async { "ok" }))
    }

    fn request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_request_id_generated_and_echoed() {
        let app = ok_router().layer(middleware::from_fn(request_id_middleware));

        let response = app.oneshot(request("/")).await.unwrap();
        let id = response.headers().get(&X_REQUEST_ID).unwrap();
        assert!(Uuid::parse_str(id.to_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_request_id_reused_when_present() {
        let app = ok_router().layer(middleware::from_fn(request_id_middleware));

        let req = Request::builder()
            .uri("/")
            .header(&X_REQUEST_ID, "req-abc-123")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(
            response.headers().get(&X_REQUEST_ID).unwrap(),
            "req-abc-123"
        );
    }

    async fn boom_handler() -> &'static str {
        panic!("kaboom")
    }

    #[tokio::test]
    async fn test_recovery_turns_panic_into_500_and_keeps_serving() {
        let app = Router::new()
            .route("/boom", get(boom_handler))
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn(recovery_middleware));

        let response = app.clone().oneshot(request("/boom")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        // The router keeps answering after a panic.
        let response = app.oneshot(request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_deadline_returns_504() {
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .layer(middleware::from_fn_with_state(
                Duration::from_millis(50),
                deadline_middleware,
            ));

        let response = app.oneshot(request("/slow")).await.unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_with_retry_after() {
        let limiter = Arc::new(
            RateLimiterMap::new(&RateLimitConfig {
                capacity: 1,
                refill_interval: "1s".to_string(),
                cleanup_interval: "10s".to_string(),
                idle_timeout: "60s".to_string(),
            })
            .unwrap(),
        );
        let app = ok_router().layer(middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));

        let with_ip = |uri: &str| {
            Request::builder()
                .uri(uri)
                .header("x-forwarded-for", "1.2.3.4")
                .body(Body::empty())
                .unwrap()
        };

        let response = app.clone().oneshot(with_ip("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(with_ip("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "1.0");
    }

    #[tokio::test]
    async fn test_rate_limit_exempts_health() {
        let limiter = Arc::new(
            RateLimiterMap::new(&RateLimitConfig {
                capacity: 1,
                refill_interval: "1s".to_string(),
                cleanup_interval: "10s".to_string(),
                idle_timeout: "60s".to_string(),
            })
            .unwrap(),
        );
        let app = Router::new()
            .route("/health", get(|| async { "healthy" }))
            .layer(middleware::from_fn_with_state(
                limiter,
                rate_limit_middleware,
            ));

        for _ in 0..5 {
            let response = app.clone().oneshot(request("/health")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let req = Request::builder()
            .uri("/")
            .header("x-forwarded-for", "9.8.7.6, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req), "9.8.7.6");
    }

    #[test]
    fn test_client_ip_garbage_collapses_to_invalid() {
        let req = Request::builder()
            .uri("/")
            .header("x-forwarded-for", "not-an-ip")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&req), "invalid_ip");
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let cfg = CorsConfig {
            allow_origins: vec!["https://app.example.com".to_string()],
            ..CorsConfig::default()
        };
        let app = ok_router().layer(cors_layer(&cfg));

        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/")
            .header(header::ORIGIN, "https://app.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();

        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "https://app.example.com"
        );
        assert!(
            response
                .headers()
                .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS)
        );
    }
}
