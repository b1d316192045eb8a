//! Authentication and authorization stages for private routes.
//!
//! `authenticate` owns the whole §credential story: extract the bearer
//! token, verify it, enforce the platform invariant, stamp the `X-User-*`
//! headers for the upstream and stash the principal in the request
//! extensions. `authorize` then re-resolves the matched route rule and
//! checks the role set. Both short-circuit with a finished envelope
//! response, which keeps the dispatcher a straight-line decision.
use axum::{
    body::Body,
    extract::Request,
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};

use crate::{
    core::{
        gateway::ServiceRoute,
        principal::{Platform, Principal},
        route_match,
        token::{AuthError, TokenVerifier},
    },
    response::{code, error_response},
};

pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_USER_ROLE: HeaderName = HeaderName::from_static("x-user-role");
pub const X_USER_STATUS: HeaderName = HeaderName::from_static("x-user-status");
pub const X_PLATFORM: HeaderName = HeaderName::from_static("x-platform");

/// Extract the token from an `Authorization: Bearer <token>` header.
/// The scheme comparison is case-insensitive.
fn bearer_token(header_value: &str) -> Option<&str> {
    let mut parts = header_value.splitn(2, ' ');
    let scheme = parts.next()?;
    let token = parts.next()?.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Determine which platform this request claims to come from.
///
/// The `X-Platform` header wins; a present-but-invalid header is rejected
/// rather than silently falling back. Without the header the path prefix
/// decides. Neither available is a client error.
fn expected_platform(req: &Request<Body>) -> Result<Platform, Response<Body>> {
    if let Some(value) = req.headers().get(&X_PLATFORM) {
        let raw = value.to_str().unwrap_or("");
        return raw.parse::<Platform>().map_err(|_| {
            error_response(
                StatusCode::BAD_REQUEST,
                code::INVALID_INPUT,
                "Bad Request",
                &format!("无效的 X-Platform 值: {raw}"),
            )
        });
    }

    let path = req.uri().path();
    if path.starts_with("/wechat") {
        Ok(Platform::Wechat)
    } else if path.starts_with("/web") {
        Ok(Platform::Web)
    } else if path.starts_with("/app") {
        Ok(Platform::App)
    } else {
        Err(error_response(
            StatusCode::BAD_REQUEST,
            code::INVALID_INPUT,
            "Bad Request",
            "无法确定预期平台，缺少 X-Platform 请求头或路径前缀",
        ))
    }
}

/// Run the full authentication stage, mutating the request on success.
pub fn authenticate(
    verifier: &TokenVerifier,
    req: &mut Request<Body>,
) -> Result<Principal, Response<Body>> {
    let Some(authorization) = req.headers().get(header::AUTHORIZATION) else {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            code::UNAUTHORIZED,
            "Unauthorized",
            "缺少或不正确的令牌",
        ));
    };

    let token = authorization
        .to_str()
        .ok()
        .and_then(bearer_token)
        .ok_or_else(|| {
            error_response(
                StatusCode::UNAUTHORIZED,
                code::UNAUTHORIZED,
                "Unauthorized",
                "令牌格式错误",
            )
        })?;

    let principal = verifier.verify(token).map_err(|err| {
        tracing::warn!(error = %err, "access token rejected");
        match err {
            AuthError::TokenExpired => error_response(
                StatusCode::UNAUTHORIZED,
                code::ACCESS_TOKEN_EXPIRED,
                "Unauthorized",
                "访问令牌已过期",
            ),
            AuthError::TokenMalformed
            | AuthError::SignatureInvalid
            | AuthError::ClaimsInvalid
            | AuthError::InvalidPlatform => error_response(
                StatusCode::UNAUTHORIZED,
                code::UNAUTHORIZED,
                "Unauthorized",
                "无效令牌",
            ),
            AuthError::InvalidStatus => error_response(
                StatusCode::FORBIDDEN,
                code::FORBIDDEN,
                "Forbidden",
                "用户已被拉黑",
            ),
            _ => error_response(
                StatusCode::UNAUTHORIZED,
                code::UNAUTHORIZED,
                "Unauthorized",
                "令牌验证失败",
            ),
        }
    })?;

    let expected = expected_platform(req)?;
    if principal.platform != expected {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            code::FORBIDDEN,
            "Forbidden",
            "平台不匹配",
        ));
    }

    stamp_principal_headers(req, &principal);
    req.extensions_mut().insert(principal.clone());

    Ok(principal)
}

fn stamp_principal_headers(req: &mut Request<Body>, principal: &Principal) {
    let headers = req.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&principal.user_id) {
        headers.insert(X_USER_ID, value);
    }
    if let Ok(value) = HeaderValue::from_str(&principal.role.to_string()) {
        headers.insert(X_USER_ROLE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&principal.status.to_string()) {
        headers.insert(X_USER_STATUS, value);
    }
    if let Ok(value) = HeaderValue::from_str(&principal.platform.to_string()) {
        headers.insert(X_PLATFORM, value);
    }
}

/// Authorization stage: the matched rule's allowed-role set must contain
/// the principal's role.
pub fn authorize(
    service: &ServiceRoute,
    sub_path: &str,
    method: &str,
    principal: &Principal,
) -> Result<(), Response<Body>> {
    let Some(rule) = route_match::best_match(&service.config.routes, sub_path, method) else {
        // The dispatcher already found a rule; if it vanished between the
        // two lookups the safe answer is still a refusal.
        return Err(error_response(
            StatusCode::FORBIDDEN,
            code::FORBIDDEN,
            "Forbidden",
            "无权访问该路径或路径未定义",
        ));
    };

    if rule.allowed_roles.contains(&principal.role) {
        Ok(())
    } else {
        tracing::warn!(
            user_id = %principal.user_id,
            role = %principal.role,
            path = %sub_path,
            "role not permitted for route"
        );
        Err(error_response(
            StatusCode::FORBIDDEN,
            code::FORBIDDEN,
            "Forbidden",
            "权限不足",
        ))
    }
}
