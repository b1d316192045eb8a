//! Portico - an authenticating, rate-limiting reverse proxy.
//!
//! Portico is a single-ingress API gateway: it terminates client HTTP,
//! enforces cross-cutting policy and forwards requests to statically
//! configured backend services selected by longest URL-prefix match. This
//! library exposes the building blocks so the gateway can be embedded or
//! composed inside a larger application.
//!
//! # Features
//! - Longest-prefix service routing with public/private path classification
//! - Scored best-match resolution over private route rules (method + path
//!   with `:param` / `{param}` wildcard segments)
//! - Bearer-token verification (HMAC JWT) with platform and account-status
//!   invariants, and per-route allowed-role authorization
//! - Per-client-IP token-bucket rate limiting with background eviction of
//!   idle buckets
//! - Composable request pipeline: panic recovery, trace-context
//!   propagation, request ids, access logging, per-request deadline, CORS
//! - Reverse-proxy forwarding with prefix stripping, `Host` rewriting and a
//!   stable JSON error envelope on upstream failure
//! - Graceful shutdown with a bounded drain window
//!
//! # Quick Example
//! ```no_run
//! use portico::{adapters::build_gateway, config::loader::load_config};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg = load_config("config/gateway.yaml")?;
//! let (router, limiter) = build_gateway(&cfg, None)?;
//! let _sweeper = limiter.spawn_sweeper();
//! let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
//! axum::serve(listener, router.into_make_service_with_connect_info::<std::net::SocketAddr>()).await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters**
//! (implementations) while keeping policy logic inside `core`. Routing
//! tables are immutable after startup; the only shared mutable state is the
//! rate-bucket map, a concurrent `scc::HashMap` with per-bucket mutexes.
//!
//! # Error Handling
//! Application-level fallible APIs return `eyre::Result<T>`; closed domain
//! failures (token verification, upstream round trips, config validation)
//! use dedicated `thiserror` enums. Client-visible failures always carry
//! the `{code, message, detail}` envelope.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod response;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the types the binary crate wires together.
pub use crate::{
    adapters::{GatewayHandler, HttpClientAdapter, build_gateway},
    core::{GatewayService, Principal, RateLimiterMap, TokenVerifier},
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
