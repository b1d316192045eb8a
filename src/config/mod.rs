pub mod loader;
pub mod models;
pub mod validation;

pub use models::{GatewayConfig, RouteRule, ServiceConfig};
pub use validation::GatewayConfigValidator;
