//! Identity tags carried by verified credentials.
//!
//! `Role`, `UserStatus` and `Platform` are closed enumerations shared by the
//! configuration (allowed-role lists), the token verifier (claim parsing) and
//! the dispatcher (platform matching, header stamping). They serialize as
//! lowercase strings in both config files and token claims.
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role tag granted to a user and checked against a route's allowed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
    Guest,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::User => write!(f, "user"),
            Role::Guest => write!(f, "guest"),
        }
    }
}

/// Account lifecycle state. Only `Active` principals pass verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Blacklisted,
}

#[derive(Debug, Error)]
#[error("unrecognized user status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for UserStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "blacklisted" => Ok(UserStatus::Blacklisted),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserStatus::Active => write!(f, "active"),
            UserStatus::Blacklisted => write!(f, "blacklisted"),
        }
    }
}

/// Client platform a credential was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Web,
    Wechat,
    App,
}

#[derive(Debug, Error)]
#[error("unrecognized platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(Platform::Web),
            "wechat" => Ok(Platform::Wechat),
            "app" => Ok(Platform::App),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Web => write!(f, "web"),
            Platform::Wechat => write!(f, "wechat"),
            Platform::App => write!(f, "app"),
        }
    }
}

/// Authenticated identity derived from a verified access token.
///
/// Inserted into the request extensions by the auth stage and stamped onto
/// the forwarded request as `X-User-*` headers.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
    pub status: UserStatus,
    pub platform: Platform,
}
