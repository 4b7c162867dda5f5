//! Session credential lookup and cookie headers.
//!
//! A token can arrive in the session cookie or in an `Authorization: Bearer`
//! header. The cookie wins when both are present.

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use std::fmt;

/// Where a session token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Cookie,
    Bearer,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cookie => write!(f, "cookie"),
            Self::Bearer => write!(f, "bearer"),
        }
    }
}

/// Find the session token, cookie first, then the bearer header.
pub fn extract_token<'a>(
    headers: &'a HeaderMap,
    cookie_name: &str,
) -> Option<(&'a str, CredentialSource)> {
    cookie_value(headers, cookie_name)
        .map(|token| (token, CredentialSource::Cookie))
        .or_else(|| bearer_token(headers).map(|token| (token, CredentialSource::Bearer)))
}

/// Value of a named cookie across all `Cookie` headers. Empty values count
/// as absent.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Builder for the session `Set-Cookie` header.
#[derive(Debug, Clone)]
pub struct SetCookie {
    name: String,
    value: String,
    path: String,
    max_age_secs: u64,
    http_only: bool,
}

impl SetCookie {
    /// Session cookie holding `token` for `max_age_secs`.
    pub fn session(name: impl Into<String>, token: impl Into<String>, max_age_secs: u64) -> Self {
        Self {
            name: name.into(),
            value: token.into(),
            path: "/".to_string(),
            max_age_secs,
            http_only: true,
        }
    }

    /// Cookie that clears the session on the client.
    pub fn removal(name: impl Into<String>) -> Self {
        Self::session(name, "", 0)
    }

    pub fn to_header_value(&self) -> String {
        let mut parts = vec![format!("{}={}", self.name, self.value)];
        if self.http_only {
            parts.push("HttpOnly".to_string());
        }
        parts.push(format!("Path={}", self.path));
        parts.push(format!("Max-Age={}", self.max_age_secs));
        parts.join("; ")
    }

    pub fn to_header(&self) -> Result<HeaderValue, axum::http::header::InvalidHeaderValue> {
        HeaderValue::from_str(&self.to_header_value())
    }
}
