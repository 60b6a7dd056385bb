use axum::http::{
    header::{COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use time::Duration;

use crate::auth::dto::TokenPair;
use crate::auth::tokens::TokenIssuer;
use crate::errors::ApiError;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

fn session_cookie(name: &str, value: &str, max_age: Duration) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!(
        "{name}={value}; HttpOnly; Secure; SameSite=None; Path=/; Max-Age={}",
        max_age.whole_seconds().max(0)
    ))
    .map_err(|e| ApiError::internal("failed to build session cookie", e))
}

/// `Set-Cookie` headers carrying both session tokens.
pub fn session_headers(tokens: &TokenIssuer, pair: &TokenPair) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.append(
        SET_COOKIE,
        session_cookie(ACCESS_COOKIE, &pair.access_token, tokens.access_ttl())?,
    );
    headers.append(
        SET_COOKIE,
        session_cookie(REFRESH_COOKIE, &pair.refresh_token, tokens.refresh_ttl())?,
    );
    Ok(headers)
}

/// `Set-Cookie` headers expiring both session cookies.
pub fn cleared_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.append(
        SET_COOKIE,
        HeaderValue::from_static("accessToken=; HttpOnly; Secure; SameSite=None; Path=/; Max-Age=0"),
    );
    headers.append(
        SET_COOKIE,
        HeaderValue::from_static("refreshToken=; HttpOnly; Secure; SameSite=None; Path=/; Max-Age=0"),
    );
    headers
}

/// Value of the named cookie from any `Cookie` header of the request.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
