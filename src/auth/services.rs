//! Registration, login, session refresh, password and profile flows.
//!
//! Every function takes the shared [`AppState`] and returns an [`ApiError`]
//! kind on failure. Collaborator errors are logged and replaced with a stable
//! message, except in [`refresh_access_token`] which reports them as auth
//! failures carrying the underlying message.

use std::future::Future;

use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::dto::{
    AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RegisterFields,
    ResetPasswordRequest, TokenPair, UpdateAccountRequest,
};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::repo::StoreError;
use crate::auth::repo_types::{ImageSlot, NewUser, PublicUser};
use crate::auth::tokens::TokenError;
use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;
use crate::storage::Upload;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trimmed value, or `None` when absent or blank.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Passwords are taken verbatim; only an all-blank value counts as missing.
fn present_password(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Bounds a collaborator call by the configured timeout.
async fn bounded<T>(
    state: &AppState,
    call: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    tokio::time::timeout(state.config.collaborator_timeout, call)
        .await
        .context("collaborator call timed out")?
}

/// Signs a fresh access/refresh pair and stores the refresh token, replacing
/// whatever was stored before.
async fn issue_session(state: &AppState, user_id: Uuid) -> anyhow::Result<TokenPair> {
    let access_token = state.tokens.sign_access(user_id)?;
    let refresh_token = state.tokens.sign_refresh(user_id)?;
    state
        .users
        .set_refresh_token(user_id, Some(&refresh_token))
        .await
        .context("persist refresh token")?;
    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

pub async fn register(
    state: &AppState,
    fields: RegisterFields,
    avatar: Option<Upload>,
    cover_image: Option<Upload>,
) -> ApiResult<PublicUser> {
    let (Some(username), Some(email), Some(password), Some(fullname)) = (
        present(&fields.username),
        present(&fields.email),
        present_password(&fields.password),
        present(&fields.fullname),
    ) else {
        return Err(ApiError::validation("all fields are required"));
    };

    let username = normalize(username);
    let email = normalize(email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::validation("invalid email"));
    }

    let existing = state
        .users
        .find_by_username_or_email(Some(&username), Some(&email))
        .await
        .map_err(|e| ApiError::internal("failed to register user", e))?;
    if existing.is_some() {
        warn!(username = %username, email = %email, "user already exists");
        return Err(ApiError::conflict(
            "user with email or username already exists",
        ));
    }

    let avatar = avatar.ok_or_else(|| ApiError::validation("avatar file is required"))?;
    let avatar_url = bounded(state, state.storage.upload("avatars", avatar))
        .await
        .map_err(|e| {
            warn!(error = %e, "avatar upload failed");
            ApiError::validation("avatar file is required")
        })?;

    let cover_image_url = match cover_image {
        Some(cover) => match bounded(state, state.storage.upload("covers", cover)).await {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "cover image upload failed; registering without it");
                String::new()
            }
        },
        None => String::new(),
    };

    let password_hash =
        hash_password(password).map_err(|e| ApiError::internal("failed to register user", e))?;

    let created = state
        .users
        .create(NewUser {
            username,
            email,
            fullname: fullname.to_string(),
            password_hash,
            avatar_url,
            cover_image_url,
        })
        .await
        .map_err(|e| match e {
            StoreError::Duplicate => {
                ApiError::conflict("user with email or username already exists")
            }
            StoreError::Backend(e) => ApiError::internal("failed to register user", e),
        })?;

    let user = state
        .users
        .find_by_id(created.id)
        .await
        .map_err(|e| ApiError::internal("failed to register user", e))?
        .ok_or_else(|| {
            ApiError::internal("failed to register user", "created user could not be read back")
        })?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user.into())
}

pub async fn login(state: &AppState, request: LoginRequest) -> ApiResult<AuthResponse> {
    let username = present(&request.username).map(normalize);
    let email = present(&request.email).map(normalize);
    if username.is_none() && email.is_none() {
        return Err(ApiError::validation("username or email is required"));
    }
    let password = present_password(&request.password)
        .ok_or_else(|| ApiError::validation("password is required"))?;

    let user = state
        .users
        .find_by_username_or_email(username.as_deref(), email.as_deref())
        .await
        .map_err(|e| ApiError::internal("failed to log in", e))?
        .ok_or_else(|| ApiError::not_found("user does not exist"))?;

    if !verify_password(password, &user.password_hash) {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::auth("invalid credentials"));
    }

    let tokens = issue_session(state, user.id)
        .await
        .map_err(|e| ApiError::internal("failed to generate access or refresh token", e))?;

    info!(user_id = %user.id, "user logged in");
    Ok(AuthResponse {
        user: user.into(),
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    })
}

pub async fn logout(state: &AppState, user_id: Uuid) -> ApiResult<()> {
    state
        .users
        .set_refresh_token(user_id, None)
        .await
        .map_err(|e| ApiError::internal("failed to log out", e))?;
    info!(user_id = %user_id, "user logged out");
    Ok(())
}

/// Rotates the session for the holder of a valid, current refresh token.
///
/// Two concurrent calls presenting the same token can both pass the equality
/// check before either stores its replacement. Both get a pair; the last write
/// wins and the other caller's refresh token stops working on its next use.
pub async fn refresh_access_token(
    state: &AppState,
    presented: Option<String>,
) -> ApiResult<TokenPair> {
    let presented = present(&presented).ok_or_else(|| ApiError::auth("unauthorized request"))?;

    let user_id = state.tokens.verify_refresh(presented).map_err(|e| match e {
        TokenError::Expired => ApiError::auth("refresh token expired"),
        _ => ApiError::auth("invalid refresh token"),
    })?;

    let user = state
        .users
        .find_by_id(user_id)
        .await
        .map_err(|e| ApiError::auth(e.to_string()))?
        .ok_or_else(|| ApiError::auth("invalid refresh token"))?;

    if user.refresh_token.as_deref() != Some(presented) {
        warn!(user_id = %user.id, "refresh token does not match stored token");
        return Err(ApiError::auth("refresh token is expired or used"));
    }

    let tokens = issue_session(state, user.id).await.map_err(|e| {
        warn!(error = %e, user_id = %user.id, "refresh rotation failed");
        ApiError::auth(e.to_string())
    })?;

    info!(user_id = %user.id, "access token refreshed");
    Ok(tokens)
}

pub async fn forgot_password(state: &AppState, request: ForgotPasswordRequest) -> ApiResult<()> {
    let email = present(&request.email)
        .map(normalize)
        .ok_or_else(|| ApiError::validation("email is required"))?;

    let user = state
        .users
        .find_by_username_or_email(None, Some(&email))
        .await
        .map_err(|e| ApiError::internal("failed to start password reset", e))?
        .ok_or_else(|| ApiError::not_found("user does not exist"))?;

    let reset = state.tokens.issue_reset_token();
    state
        .users
        .set_reset_token(user.id, Some((&reset.token, reset.expires_at)))
        .await
        .map_err(|e| ApiError::internal("failed to start password reset", e))?;

    bounded(
        state,
        state.mailer.send_password_reset(&user.email, &reset.token),
    )
    .await
    .map_err(|e| ApiError::internal("failed to send verification mail", e))?;

    info!(user_id = %user.id, "password reset requested");
    Ok(())
}

pub async fn reset_password(
    state: &AppState,
    token: &str,
    request: ResetPasswordRequest,
) -> ApiResult<()> {
    let password = present_password(&request.password)
        .ok_or_else(|| ApiError::validation("password is required"))?;
    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::auth("invalid or expired token"));
    }

    let user = state
        .users
        .find_by_reset_token(token)
        .await
        .map_err(|e| ApiError::internal("failed to reset password", e))?
        .ok_or_else(|| ApiError::auth("invalid or expired token"))?;

    let live = user
        .reset_token_expiry
        .is_some_and(|expiry| expiry > OffsetDateTime::now_utc());
    if !live {
        if let Err(e) = state.users.set_reset_token(user.id, None).await {
            warn!(error = %e, user_id = %user.id, "failed to clear expired reset token");
        }
        return Err(ApiError::auth("invalid or expired token"));
    }

    let password_hash =
        hash_password(password).map_err(|e| ApiError::internal("failed to reset password", e))?;
    let consumed = state
        .users
        .complete_password_reset(user.id, token, &password_hash)
        .await
        .map_err(|e| ApiError::internal("failed to reset password", e))?;
    if !consumed {
        warn!(user_id = %user.id, "reset token consumed by a concurrent reset");
        return Err(ApiError::auth("invalid or expired token"));
    }

    info!(user_id = %user.id, "password reset completed");
    Ok(())
}

pub async fn change_password(
    state: &AppState,
    user_id: Uuid,
    request: ChangePasswordRequest,
) -> ApiResult<()> {
    let (Some(old_password), Some(new_password)) = (
        present_password(&request.old_password),
        present_password(&request.new_password),
    ) else {
        return Err(ApiError::validation("old and new password are required"));
    };

    let user = state
        .users
        .find_by_id(user_id)
        .await
        .map_err(|e| ApiError::internal("failed to change password", e))?
        .ok_or_else(|| ApiError::not_found("user does not exist"))?;

    if !verify_password(old_password, &user.password_hash) {
        warn!(user_id = %user.id, "change password with wrong old password");
        return Err(ApiError::auth("invalid old password"));
    }

    let password_hash = hash_password(new_password)
        .map_err(|e| ApiError::internal("failed to change password", e))?;
    state
        .users
        .set_password_hash(user.id, &password_hash)
        .await
        .map_err(|e| ApiError::internal("failed to change password", e))?;

    info!(user_id = %user.id, "password changed");
    Ok(())
}

pub async fn current_user(state: &AppState, user_id: Uuid) -> ApiResult<PublicUser> {
    state
        .users
        .find_by_id(user_id)
        .await
        .map_err(|e| ApiError::internal("failed to fetch user", e))?
        .map(PublicUser::from)
        .ok_or_else(|| ApiError::not_found("user does not exist"))
}

pub async fn update_account(
    state: &AppState,
    user_id: Uuid,
    request: UpdateAccountRequest,
) -> ApiResult<PublicUser> {
    let (Some(fullname), Some(email)) = (present(&request.fullname), present(&request.email))
    else {
        return Err(ApiError::validation("fullname and email are required"));
    };
    let email = normalize(email);
    if !is_valid_email(&email) {
        return Err(ApiError::validation("invalid email"));
    }

    let user = state
        .users
        .update_details(user_id, fullname, &email)
        .await
        .map_err(|e| match e {
            StoreError::Duplicate => ApiError::conflict("email is already in use"),
            StoreError::Backend(e) => ApiError::internal("failed to update account details", e),
        })?
        .ok_or_else(|| ApiError::not_found("user does not exist"))?;

    info!(user_id = %user.id, "account details updated");
    Ok(user.into())
}

pub async fn update_image(
    state: &AppState,
    user_id: Uuid,
    slot: ImageSlot,
    upload: Option<Upload>,
) -> ApiResult<PublicUser> {
    let (label, folder) = match slot {
        ImageSlot::Avatar => ("avatar", "avatars"),
        ImageSlot::CoverImage => ("cover image", "covers"),
    };
    let upload = upload.ok_or_else(|| ApiError::validation(format!("{label} file is missing")))?;

    let url = bounded(state, state.storage.upload(folder, upload))
        .await
        .map_err(|e| ApiError::internal(format!("error while uploading {label}"), e))?;

    let user = state
        .users
        .set_image_url(user_id, slot, &url)
        .await
        .map_err(|e| ApiError::internal(format!("failed to update {label}"), e))?
        .ok_or_else(|| ApiError::not_found("user does not exist"))?;

    info!(user_id = %user.id, slot = ?slot, "user image updated");
    Ok(user.into())
}
