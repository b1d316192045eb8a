pub mod auth;
pub mod http_client;
pub mod http_handler;
pub mod middleware;
pub mod proxy;

/// Re-export commonly used types from adapters
pub use http_client::HttpClientAdapter;
pub use http_handler::{GatewayHandler, build_gateway};
pub use proxy::Forwarder;
