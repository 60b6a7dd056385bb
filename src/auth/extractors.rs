use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;
use uuid::Uuid;

use crate::auth::cookies::{read_cookie, ACCESS_COOKIE};
use crate::auth::tokens::TokenIssuer;
use crate::errors::ApiError;

/// Id of the caller, taken from a valid access token in the `accessToken`
/// cookie or the `Authorization: Bearer` header.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<TokenIssuer>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tokens = Arc::<TokenIssuer>::from_ref(state);

        let bearer = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|auth| {
                auth.strip_prefix("Bearer ")
                    .or_else(|| auth.strip_prefix("bearer "))
            })
            .map(|token| token.trim().to_string());

        let token = read_cookie(&parts.headers, ACCESS_COOKIE)
            .or(bearer)
            .ok_or_else(|| ApiError::auth("unauthorized request"))?;

        let user_id = tokens.verify_access(&token).map_err(|e| {
            warn!(error = %e, "access token rejected");
            ApiError::auth("invalid access token")
        })?;

        Ok(AuthUser(user_id))
    }
}
