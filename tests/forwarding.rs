//! Forwarding-behavior tests: prefix stripping, query preservation, the
//! request deadline, upstream failure mapping and the rate-limit stage,
//! all through the assembled router.
use std::{net::SocketAddr, time::Duration};

use axum::{
    Router,
    body::Body,
    extract::Request,
    http::{StatusCode, header},
    response::Response,
    routing::get,
};
use http_body_util::BodyExt;
use portico::{
    adapters::build_gateway,
    config::models::{GatewayConfig, JwtConfig, RateLimitConfig, Scheme, ServiceConfig},
};
use tower::ServiceExt;

/// Backend that echoes path+query and has one deliberately slow endpoint.
async fn spawn_backend() -> SocketAddr {
    let app = Router::new()
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "finally"
            }),
        )
        .fallback(|req: Request<Body>| async move {
            let path = req.uri().path().to_string();
            let query = req.uri().query().unwrap_or("").to_string();
            axum::Json(serde_json::json!({ "path": path, "query": query }))
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn service(prefix: &str, backend: SocketAddr, public_paths: &[&str]) -> ServiceConfig {
    ServiceConfig {
        name: "api".to_string(),
        prefix: prefix.to_string(),
        host: Some(backend.ip().to_string()),
        port: Some(backend.port()),
        service_name: None,
        namespace: None,
        scheme: Scheme::Http,
        public_paths: public_paths.iter().map(|p| p.to_string()).collect(),
        routes: Vec::new(),
    }
}

fn base_config(services: Vec<ServiceConfig>) -> GatewayConfig {
    GatewayConfig {
        jwt: JwtConfig {
            secret_key: "forwarding-secret".to_string(),
            issuer: "auth-service".to_string(),
        },
        services,
        ..GatewayConfig::default()
    }
}

async fn get_uri(router: Router, uri: &str) -> Response<Body> {
    router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_prefix_stripped_exactly_once() {
    let backend = spawn_backend().await;
    let config = base_config(vec![service("/api/v1", backend, &["/users/:id", "/"])]);
    let (router, _) = build_gateway(&config, None).unwrap();

    let response = get_uri(router, "/api/v1/users/42").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["path"], "/users/42");
}

#[tokio::test]
async fn test_bare_prefix_forwards_as_root() {
    let backend = spawn_backend().await;
    let config = base_config(vec![service("/api/v1", backend, &["/users/:id", "/"])]);
    let (router, _) = build_gateway(&config, None).unwrap();

    let response = get_uri(router, "/api/v1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["path"], "/");
}

#[tokio::test]
async fn test_query_string_preserved() {
    let backend = spawn_backend().await;
    let config = base_config(vec![service("/api", backend, &["/search"])]);
    let (router, _) = build_gateway(&config, None).unwrap();

    let response = get_uri(router, "/api/search?q=rust&page=2").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["path"], "/search");
    assert_eq!(body["query"], "q=rust&page=2");
}

#[tokio::test]
async fn test_deadline_wins_over_slow_upstream() {
    let backend = spawn_backend().await;
    let mut config = base_config(vec![service("/api", backend, &["/slow"])]);
    config.request_timeout = "200ms".to_string();
    let (router, _) = build_gateway(&config, None).unwrap();

    let start = std::time::Instant::now();
    let response = get_uri(router, "/api/slow").await;
    let elapsed = start.elapsed();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    // 504 must land close to the deadline, not after the 5 s upstream.
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
    let body = body_json(response).await;
    assert_eq!(body["code"], 504);
    assert_eq!(body["message"], "Request Timeout");
    assert_eq!(body["detail"], "请求超时，请稍后重试");
}

#[tokio::test]
async fn test_unreachable_upstream_is_502_envelope() {
    // Reserve a port, then free it so nothing is listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);

    let config = base_config(vec![service("/api", dead, &["/ping"])]);
    let (router, _) = build_gateway(&config, None).unwrap();

    let response = get_uri(router, "/api/ping").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["code"], 50201);
    assert_eq!(body["message"], "Bad Gateway");
    assert_eq!(body["detail"], "下游服务不可用");
}

#[tokio::test]
async fn test_rate_limit_through_pipeline() {
    let backend = spawn_backend().await;
    let mut config = base_config(vec![service("/api", backend, &["/ping"])]);
    config.rate_limit = RateLimitConfig {
        capacity: 2,
        refill_interval: "1s".to_string(),
        cleanup_interval: "5m".to_string(),
        idle_timeout: "10m".to_string(),
    };
    let (router, _) = build_gateway(&config, None).unwrap();

    let from_ip = |ip: &str| {
        Request::builder()
            .uri("/api/ping")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..2 {
        let response = router.clone().oneshot(from_ip("1.2.3.4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = router.clone().oneshot(from_ip("1.2.3.4")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "1.0");

    // Exhausting 1.2.3.4 never affects another client.
    let response = router.oneshot(from_ip("5.6.7.8")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_longest_prefix_selects_most_specific_service() {
    let backend_a = spawn_backend().await;
    let backend_b = spawn_backend().await;

    let mut general = service("/api", backend_a, &["/{rest}", "/"]);
    general.name = "general".to_string();
    let mut admin = service("/api/admin", backend_b, &["/{rest}", "/"]);
    admin.name = "admin".to_string();

    let config = base_config(vec![general, admin]);
    let (router, _) = build_gateway(&config, None).unwrap();

    // /api/admin/stats lands on the admin service with its prefix stripped.
    let response = get_uri(router.clone(), "/api/admin/stats").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["path"], "/stats");

    // /api/other stays on the general service.
    let response = get_uri(router, "/api/other").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["path"], "/other");
}
