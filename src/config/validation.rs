use std::{collections::HashSet, net::SocketAddr};

use crate::{
    config::models::{GatewayConfig, RouteRule, ServiceConfig},
    core::gateway::Upstream,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Service conflict detected: {message}")]
    ServiceConflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator. Collects every problem it can find so
/// operators fix a config in one pass instead of replaying startup failures.
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        for (field, value) in [
            ("request_timeout", &config.request_timeout),
            ("shutdown_grace", &config.shutdown_grace),
            ("rate_limit.refill_interval", &config.rate_limit.refill_interval),
            ("rate_limit.cleanup_interval", &config.rate_limit.cleanup_interval),
            ("rate_limit.idle_timeout", &config.rate_limit.idle_timeout),
        ] {
            if let Err(e) = Self::validate_duration(field, value) {
                errors.push(e);
            }
        }

        if config.jwt.secret_key.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "jwt.secret_key".to_string(),
            });
        }
        if config.jwt.issuer.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "jwt.issuer".to_string(),
            });
        }

        if config.rate_limit.capacity == 0 {
            errors.push(ValidationError::InvalidField {
                field: "rate_limit.capacity".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if config.cors.allow_credentials
            && config.cors.allow_origins.iter().any(|o| o == "*")
        {
            errors.push(ValidationError::InvalidField {
                field: "cors.allow_origins".to_string(),
                message: "wildcard origin cannot be combined with allow_credentials".to_string(),
            });
        }

        if config.services.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "services".to_string(),
            });
        } else {
            let mut seen_prefixes = HashSet::new();
            for svc in &config.services {
                if let Err(mut service_errors) = Self::validate_service(svc) {
                    errors.append(&mut service_errors);
                }
                if !seen_prefixes.insert(svc.prefix.clone()) {
                    errors.push(ValidationError::ServiceConflict {
                        message: format!("duplicate service prefix '{}'", svc.prefix),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:8080' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_duration(field: &str, value: &str) -> ValidationResult<()> {
        match humantime::parse_duration(value) {
            Ok(d) if d.is_zero() => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: "duration must be greater than 0".to_string(),
            }),
            Ok(_) => Ok(()),
            Err(e) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("invalid duration '{value}': {e}"),
            }),
        }
    }

    fn validate_service(svc: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if svc.name.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "services[].name".to_string(),
            });
        }

        if svc.prefix.is_empty() || !svc.prefix.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("service '{}' prefix", svc.name),
                message: "prefix must be non-empty and start with '/'".to_string(),
            });
        }

        if let Err(e) = Upstream::from_service(svc) {
            errors.push(ValidationError::InvalidField {
                field: format!("service '{}' addressing", svc.name),
                message: e.to_string(),
            });
        }

        for public_path in &svc.public_paths {
            if !public_path.starts_with('/') {
                errors.push(ValidationError::InvalidField {
                    field: format!("service '{}' public_paths", svc.name),
                    message: format!("public path '{public_path}' must start with '/'"),
                });
            }
        }

        for route in &svc.routes {
            if let Err(e) = Self::validate_route(&svc.name, route) {
                errors.push(e);
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn validate_route(service_name: &str, route: &RouteRule) -> ValidationResult<()> {
        if !route.path.starts_with('/') {
            return Err(ValidationError::InvalidField {
                field: format!("service '{service_name}' route '{}'", route.path),
                message: "route paths must start with '/'".to_string(),
            });
        }
        if route.allowed_roles.is_empty() {
            return Err(ValidationError::InvalidField {
                field: format!("service '{service_name}' route '{}'", route.path),
                message: "a private route must allow at least one role".to_string(),
            });
        }
        Ok(())
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        let messages: Vec<String> = errors.iter().map(|e| format!("  • {e}")).collect();
        format!(
            "Found {} configuration error(s):\n{}",
            errors.len(),
            messages.join("\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::models::{JwtConfig, Scheme},
        core::principal::Role,
    };

    fn valid_config() -> GatewayConfig {
        GatewayConfig {
            listen_addr: "127.0.0.1:8080".to_string(),
            jwt: JwtConfig {
                secret_key: "s3cret".to_string(),
                issuer: "auth-service".to_string(),
            },
            services: vec![ServiceConfig {
                name: "user".to_string(),
                prefix: "/user".to_string(),
                host: Some("127.0.0.1".to_string()),
                port: Some(8081),
                service_name: None,
                namespace: None,
                scheme: Scheme::Http,
                public_paths: vec!["/register".to_string()],
                routes: vec![RouteRule {
                    path: "/profile".to_string(),
                    methods: vec!["GET".to_string()],
                    allowed_roles: vec![Role::User, Role::Admin],
                }],
            }],
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(GatewayConfigValidator::validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_invalid_listen_address() {
        let mut cfg = valid_config();
        cfg.listen_addr = "not-an-address".to_string();
        assert!(GatewayConfigValidator::validate(&cfg).is_err());
    }

    #[test]
    fn test_missing_jwt_secret() {
        let mut cfg = valid_config();
        cfg.jwt.secret_key.clear();
        assert!(GatewayConfigValidator::validate(&cfg).is_err());
    }

    #[test]
    fn test_no_services_rejected() {
        let mut cfg = valid_config();
        cfg.services.clear();
        assert!(GatewayConfigValidator::validate(&cfg).is_err());
    }

    #[test]
    fn test_duplicate_prefix_rejected() {
        let mut cfg = valid_config();
        let dup = cfg.services[0].clone();
        cfg.services.push(dup);
        assert!(GatewayConfigValidator::validate(&cfg).is_err());
    }

    #[test]
    fn test_prefix_must_start_with_slash() {
        let mut cfg = valid_config();
        cfg.services[0].prefix = "user".to_string();
        assert!(GatewayConfigValidator::validate(&cfg).is_err());
    }

    #[test]
    fn test_missing_addressing_rejected() {
        let mut cfg = valid_config();
        cfg.services[0].host = None;
        cfg.services[0].service_name = None;
        assert!(GatewayConfigValidator::validate(&cfg).is_err());
    }

    #[test]
    fn test_route_without_roles_rejected() {
        let mut cfg = valid_config();
        cfg.services[0].routes[0].allowed_roles.clear();
        assert!(GatewayConfigValidator::validate(&cfg).is_err());
    }

    #[test]
    fn test_bad_duration_rejected() {
        let mut cfg = valid_config();
        cfg.rate_limit.refill_interval = "soon".to_string();
        assert!(GatewayConfigValidator::validate(&cfg).is_err());
    }

    #[test]
    fn test_wildcard_origin_with_credentials_rejected() {
        let mut cfg = valid_config();
        cfg.cors.allow_origins = vec!["*".to_string()];
        cfg.cors.allow_credentials = true;
        assert!(GatewayConfigValidator::validate(&cfg).is_err());
    }

    #[test]
    fn test_reports_all_errors_at_once() {
        let mut cfg = valid_config();
        cfg.listen_addr = "bogus".to_string();
        cfg.jwt.issuer.clear();
        let err = GatewayConfigValidator::validate(&cfg).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("2 configuration error(s)"));
    }
}
