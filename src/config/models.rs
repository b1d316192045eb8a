//! Configuration data structures for the gateway.
//!
//! These types map directly to YAML (also JSON / TOML) configuration files.
//! They are intentionally serde‑friendly and include defaults so that minimal
//! configs remain concise. Durations are humantime strings ("10s", "5m") and
//! are parsed once at validation / startup time.
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::principal::Role;

fn default_request_timeout() -> String {
    "10s".to_string()
}

fn default_shutdown_grace() -> String {
    "5s".to_string()
}

/// Top-level gateway configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Address the gateway listens on, e.g. "0.0.0.0:8080".
    pub listen_addr: String,
    /// Per-request deadline covering the whole pipeline including the
    /// upstream round trip.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
    /// How long in-flight connections may drain after a shutdown signal.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: String,
    #[serde(default)]
    pub log: LogConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub tracer: TracerConfig,
    /// Downstream services, matched by longest URL path prefix.
    pub services: Vec<ServiceConfig>,
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Result<Duration> {
        humantime::parse_duration(&self.request_timeout)
            .with_context(|| format!("invalid request_timeout '{}'", self.request_timeout))
    }

    pub fn shutdown_grace(&self) -> Result<Duration> {
        humantime::parse_duration(&self.shutdown_grace)
            .with_context(|| format!("invalid shutdown_grace '{}'", self.shutdown_grace))
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            request_timeout: default_request_timeout(),
            shutdown_grace: default_shutdown_grace(),
            log: LogConfig::default(),
            jwt: JwtConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cors: CorsConfig::default(),
            tracer: TracerConfig::default(),
            services: Vec::new(),
        }
    }
}

/// Structured logging configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, e.g. "info" or "portico=debug,info".
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Access-token verification settings. The gateway only verifies tokens;
/// issuance lives elsewhere.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct JwtConfig {
    /// Symmetric HMAC secret shared with the token issuer.
    pub secret_key: String,
    /// Expected `iss` claim.
    pub issuer: String,
}

fn default_capacity() -> u32 {
    100
}

fn default_refill_interval() -> String {
    "1s".to_string()
}

fn default_cleanup_interval() -> String {
    "5m".to_string()
}

fn default_idle_timeout() -> String {
    "10m".to_string()
}

/// Per-client-IP token-bucket settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Bucket capacity; new buckets start full.
    pub capacity: u32,
    /// One token is accrued per elapsed interval.
    pub refill_interval: String,
    /// How often the background sweeper scans for idle buckets.
    pub cleanup_interval: String,
    /// Buckets untouched for longer than this are evicted by the sweeper.
    pub idle_timeout: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_interval: default_refill_interval(),
            cleanup_interval: default_cleanup_interval(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

/// Cross-origin resource sharing settings. Empty method / header lists fall
/// back to the defaults the original deployment shipped with.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub allow_credentials: bool,
    /// Preflight cache lifetime in seconds; 0 means the 12 h default.
    pub max_age_seconds: u64,
}

/// Distributed tracing settings. The gateway propagates W3C trace context;
/// exporter wiring is left to the embedding environment.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TracerConfig {
    pub enabled: bool,
    /// Identity used to name the server span.
    pub service_name: String,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "portico-gateway".to_string(),
        }
    }
}

/// Upstream protocol selector.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

/// One downstream backend service.
///
/// Addressing is either direct (`host` + `port`) or by cluster DNS
/// (`service_name` + optional `namespace`, resolved as
/// `{service_name}.{namespace}.svc.cluster.local`).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceConfig {
    pub name: String,
    /// URL path prefix owned by this service, e.g. "/user".
    pub prefix: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub scheme: Scheme,
    /// Sub-path patterns (relative to `prefix`) that bypass auth entirely.
    #[serde(default)]
    pub public_paths: Vec<String>,
    /// Private route rules; requests matching none of them are rejected.
    #[serde(default)]
    pub routes: Vec<RouteRule>,
}

/// A protected endpoint: path pattern, method set and permitted roles.
///
/// Path segments beginning with `:` or `{` match any single non-empty
/// request segment; an empty `methods` list matches every method.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RouteRule {
    pub path: String,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub allowed_roles: Vec<Role>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_yaml<T: serde::de::DeserializeOwned>(yaml: &str) -> T {
        config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_minimal_config_deserializes_with_defaults() {
        let yaml = r#"
listen_addr: "127.0.0.1:9000"
jwt:
  secret_key: "s3cret"
  issuer: "auth-service"
services:
  - name: "user"
    prefix: "/user"
    host: "127.0.0.1"
    port: 8081
"#;
        let cfg: GatewayConfig = from_yaml(yaml);
        assert_eq!(cfg.listen_addr, "127.0.0.1:9000");
        assert_eq!(cfg.request_timeout().unwrap(), Duration::from_secs(10));
        assert_eq!(cfg.rate_limit.capacity, 100);
        assert_eq!(cfg.services.len(), 1);
        assert_eq!(cfg.services[0].scheme, Scheme::Http);
        assert!(cfg.services[0].public_paths.is_empty());
    }

    #[test]
    fn test_route_rule_roles_parse() {
        let yaml = r#"
name: "post"
prefix: "/post"
service_name: "post-service"
namespace: "prod"
routes:
  - path: "/posts/:id"
    methods: ["GET", "DELETE"]
    allowed_roles: ["admin", "user"]
"#;
        let svc: ServiceConfig = from_yaml(yaml);
        assert_eq!(svc.routes[0].allowed_roles, vec![Role::Admin, Role::User]);
        assert_eq!(svc.routes[0].methods, vec!["GET", "DELETE"]);
    }
}
