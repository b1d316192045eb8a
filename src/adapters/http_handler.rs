//! Per-service request dispatch and router assembly.
//!
//! `GatewayHandler` is the decision point every request reaches after the
//! pipeline: resolve the owning service by longest prefix, classify the
//! sub-path as public or private, run auth and authorization for private
//! routes, then hand the request to the forwarder. `build_gateway` wires
//! the handler, the health endpoint and the middleware stack into the
//! final axum `Router`.
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::Request,
    http::StatusCode,
    middleware,
    response::Response,
    routing::{any, get},
};
use eyre::Result;

use crate::{
    adapters::{
        auth,
        http_client::HttpClientAdapter,
        middleware::{self as gateway_middleware, TracerState},
        proxy::Forwarder,
    },
    config::models::GatewayConfig,
    core::{
        gateway::{self, GatewayService},
        rate_limiter::RateLimiterMap,
        route_match,
        token::TokenVerifier,
    },
    ports::http_client::HttpClient,
    response::{self, code, error_response},
};

/// Request handler shared by every service route.
pub struct GatewayHandler {
    gateway: GatewayService,
    verifier: TokenVerifier,
    forwarder: Forwarder,
}

impl GatewayHandler {
    pub fn new(gateway: GatewayService, verifier: TokenVerifier, client: Arc<dyn HttpClient>) -> Self {
        Self {
            gateway,
            verifier,
            forwarder: Forwarder::new(client),
        }
    }

    /// Decide and forward one request. The router only sends paths under a
    /// registered prefix here, but resolution stays defensive anyway.
    pub async fn dispatch(&self, mut req: Request) -> Response<Body> {
        let Some(service) = self.gateway.find_service(req.uri().path()) else {
            return service_not_found();
        };

        let sub_path = gateway::sub_path(&service.config.prefix, req.uri().path());
        let method = req.method().as_str().to_string();

        // Public paths bypass auth entirely; on overlap, public wins.
        if service.is_public(&sub_path) {
            tracing::debug!(service = %service.config.name, path = %sub_path, "public path");
            return self.forwarder.forward(service, req).await;
        }

        if route_match::best_match(&service.config.routes, &sub_path, &method).is_none() {
            return error_response(
                StatusCode::NOT_FOUND,
                code::NOT_FOUND,
                "Not Found",
                "路径未定义或无权访问",
            );
        }

        let principal = match auth::authenticate(&self.verifier, &mut req) {
            Ok(principal) => principal,
            Err(response) => return response,
        };

        if let Err(response) = auth::authorize(service, &sub_path, &method, &principal) {
            return response;
        }

        self.forwarder.forward(service, req).await
    }
}

async fn health() -> Response<Body> {
    response::health_response()
}

fn service_not_found() -> Response<Body> {
    error_response(
        StatusCode::NOT_FOUND,
        code::NOT_FOUND,
        "Not Found",
        "服务未找到",
    )
}

/// Assemble the full gateway: routing table, dispatcher, middleware stack.
///
/// Returns the router plus the rate-limiter handle so the caller can run
/// the sweeper alongside the server. The default upstream client is used
/// unless `client` overrides it (tests inject doubles this way).
pub fn build_gateway(
    config: &GatewayConfig,
    client: Option<Arc<dyn HttpClient>>,
) -> Result<(Router, Arc<RateLimiterMap>)> {
    let gateway_service = GatewayService::new(config)?;
    let client: Arc<dyn HttpClient> = match client {
        Some(client) => client,
        None => Arc::new(HttpClientAdapter::new()?),
    };
    let handler = Arc::new(GatewayHandler::new(
        gateway_service,
        TokenVerifier::new(&config.jwt),
        client,
    ));
    let limiter = Arc::new(RateLimiterMap::new(&config.rate_limit)?);

    let make_dispatch_route = || {
        let handler = handler.clone();
        any(move |req: Request| {
            let handler = handler.clone();
            async move { handler.dispatch(req).await }
        })
    };

    // Each service owns its exact prefix and everything below it, so both
    // /foo and /foo/bar reach the same decision point.
    let mut router = Router::new().route("/health", get(health));
    for service in handler.gateway.services() {
        router = router
            .route(&service.config.prefix, make_dispatch_route())
            .route(
                &format!("{}/{{*action}}", service.config.prefix),
                make_dispatch_route(),
            );
    }

    let tracer_state = TracerState {
        enabled: config.tracer.enabled,
        service_name: config.tracer.service_name.clone(),
    };
    let request_timeout = config.request_timeout()?;

    // Layers run top-down from the last `.layer(...)` call, so this reads
    // bottom-up: recovery is outermost, CORS sits just before dispatch.
    let router = router
        .fallback(|| async { service_not_found() })
        .layer(gateway_middleware::cors_layer(&config.cors))
        .layer(middleware::from_fn_with_state(
            limiter.clone(),
            gateway_middleware::rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            request_timeout,
            gateway_middleware::deadline_middleware,
        ))
        .layer(middleware::from_fn(
            gateway_middleware::access_log_middleware,
        ))
        .layer(middleware::from_fn(
            gateway_middleware::request_id_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            tracer_state,
            gateway_middleware::tracing_middleware,
        ))
        .layer(middleware::from_fn(
            gateway_middleware::recovery_middleware,
        ));

    Ok((router, limiter))
}
