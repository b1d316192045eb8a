//! Bearer-token verification.
//!
//! The gateway only verifies access tokens; it never issues or refreshes
//! them. Verification enforces the HMAC signature, the configured issuer and
//! a mandatory future expiry, then applies the semantic invariants: the
//! account must be active and the platform claim must be a recognized value.
//! Library errors are folded into [`AuthError`] so callers pick an HTTP
//! status from the classification instead of leaking parser internals.
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::models::JwtConfig,
    core::principal::{Platform, Principal, Role, UserStatus},
};

/// Classified verification failures. The dispatcher maps each variant to a
/// response status; the raw cause stays in the logs.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    #[error("access token expired")]
    TokenExpired,

    #[error("access token malformed")]
    TokenMalformed,

    #[error("access token signature invalid")]
    SignatureInvalid,

    #[error("access token claims invalid")]
    ClaimsInvalid,

    #[error("user status is not active")]
    InvalidStatus,

    #[error("unrecognized platform claim")]
    InvalidPlatform,

    #[error("token verification failed: {0}")]
    Other(String),
}

/// Claim set carried by access tokens. `status` and `platform` arrive as
/// strings and are parsed after signature checks so their failures classify
/// separately from decode errors.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub role: Role,
    pub status: String,
    pub platform: String,
    pub exp: u64,
    pub iss: String,
}

/// Stateless verifier configured once at startup and shared by reference.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(cfg: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Any HMAC variant signed with the shared secret is acceptable.
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.set_issuer(&[cfg.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        Self {
            decoding_key: DecodingKey::from_secret(cfg.secret_key.as_bytes()),
            validation,
        }
    }

    /// Verify a raw token string and produce the authenticated principal.
    pub fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        if token.is_empty() {
            return Err(AuthError::TokenMalformed);
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(classify_decode_error)?;
        let claims = data.claims;

        let status: UserStatus = claims
            .status
            .parse()
            .map_err(|_| AuthError::InvalidStatus)?;
        if status != UserStatus::Active {
            return Err(AuthError::InvalidStatus);
        }

        let platform: Platform = claims
            .platform
            .parse()
            .map_err(|_| AuthError::InvalidPlatform)?;

        Ok(Principal {
            user_id: claims.user_id,
            role: claims.role,
            status,
            platform,
        })
    }
}

fn classify_decode_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => AuthError::TokenMalformed,
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName => AuthError::SignatureInvalid,
        ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::ImmatureSignature
        | ErrorKind::MissingRequiredClaim(_) => AuthError::ClaimsInvalid,
        _ => AuthError::Other(err.to_string()),
    }
}
