pub mod gateway;
pub mod principal;
pub mod rate_limiter;
pub mod route_match;
pub mod token;

pub use gateway::{GatewayService, ServiceRoute};
pub use principal::Principal;
pub use rate_limiter::RateLimiterMap;
pub use token::TokenVerifier;
