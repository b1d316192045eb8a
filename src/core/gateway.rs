//! Core gateway routing table.
//!
//! The `GatewayService` turns the immutable startup configuration into a
//! resolved service table: each downstream service paired with its upstream
//! origin (direct `host:port` or cluster DNS name). It provides
//! longest‑prefix service lookup, sub-path computation and the public-path
//! check. This layer deliberately avoids I/O and only manipulates in‑memory
//! data so it remains fast and easily testable in isolation.
use std::sync::Arc;

use eyre::Result;
use thiserror::Error;

use crate::{
    config::models::{GatewayConfig, Scheme, ServiceConfig},
    core::route_match,
};

/// Errors raised while resolving a service's upstream address.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UpstreamError {
    #[error("service '{0}' needs either host+port or service_name")]
    MissingAddress(String),
}

/// Resolved upstream origin for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl Upstream {
    /// Resolve the addressing block of a service config.
    ///
    /// When `service_name` is set the host becomes the cluster-internal DNS
    /// name `{service_name}.{namespace}.svc.cluster.local` (namespace
    /// defaults to "default", port to 80). Otherwise `host` and `port` are
    /// both required.
    pub fn from_service(svc: &ServiceConfig) -> Result<Self, UpstreamError> {
        if let Some(service_name) = svc.service_name.as_deref().filter(|s| !s.is_empty()) {
            let namespace = svc
                .namespace
                .as_deref()
                .filter(|s| !s.is_empty())
                .unwrap_or("default");
            return Ok(Self {
                scheme: svc.scheme,
                host: format!("{service_name}.{namespace}.svc.cluster.local"),
                port: svc.port.unwrap_or(80),
            });
        }

        match (svc.host.as_deref().filter(|s| !s.is_empty()), svc.port) {
            (Some(host), Some(port)) => Ok(Self {
                scheme: svc.scheme,
                host: host.to_string(),
                port,
            }),
            _ => Err(UpstreamError::MissingAddress(svc.name.clone())),
        }
    }

    /// `host:port`, suitable for the `Host` header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `scheme://host:port`, the base of every forwarded URI.
    pub fn origin(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// One configured service with its resolved upstream.
pub struct ServiceRoute {
    pub config: ServiceConfig,
    pub upstream: Upstream,
}

impl ServiceRoute {
    /// Whether `sub_path` matches any of the service's public patterns.
    /// Public paths bypass authentication and authorization entirely.
    pub fn is_public(&self, sub_path: &str) -> bool {
        self.config
            .public_paths
            .iter()
            .any(|pattern| route_match::match_pattern(pattern, sub_path))
    }
}

/// Immutable routing table built once before the server starts accepting.
pub struct GatewayService {
    services: Vec<Arc<ServiceRoute>>,
}

impl GatewayService {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let mut services = Vec::with_capacity(config.services.len());
        for svc in &config.services {
            let upstream = Upstream::from_service(svc)?;
            tracing::info!(
                service = %svc.name,
                prefix = %svc.prefix,
                upstream = %upstream.origin(),
                "configured service route"
            );
            services.push(Arc::new(ServiceRoute {
                config: svc.clone(),
                upstream,
            }));
        }
        Ok(Self { services })
    }

    /// Longest‑prefix match to find the owning service for a request path.
    pub fn find_service(&self, path: &str) -> Option<&Arc<ServiceRoute>> {
        self.services
            .iter()
            .filter(|svc| path.starts_with(&svc.config.prefix))
            .max_by_key(|svc| svc.config.prefix.len())
    }

    pub fn services(&self) -> &[Arc<ServiceRoute>] {
        &self.services
    }
}

/// Strip the service prefix from a request path, exactly once, and normalize
/// the remainder so it always starts with `/` (empty becomes `/`).
pub fn sub_path(prefix: &str, path: &str) -> String {
    let rest = path.strip_prefix(prefix).unwrap_or(path);
    if rest.is_empty() {
        "/".to_string()
    } else if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{rest}")
    }
}
