use std::collections::HashMap;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        cookies::{cleared_headers, read_cookie, session_headers, REFRESH_COOKIE},
        dto::{
            AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest,
            RefreshRequest, RegisterFields, ResetPasswordRequest, TokenPair,
            UpdateAccountRequest,
        },
        extractors::AuthUser,
        repo_types::{ImageSlot, PublicUser},
        services,
    },
    errors::{ApiError, ApiResponse, ApiResult},
    state::AppState,
    storage::Upload,
};

const JSON_BODY_LIMIT: usize = 16 * 1024;
const UPLOAD_BODY_LIMIT: usize = 10 * 1024 * 1024;

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh-token", post(refresh_token))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password/:token", post(reset_password))
        .route("/change-password", post(change_password))
        .route("/current-user", get(current_user))
        .route("/update-account", patch(update_account))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
}

pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/avatar", patch(update_avatar))
        .route("/cover-image", patch(update_cover_image))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::validation(format!("invalid request body: {}", e.body_text())))
}

/// Text fields and non-empty files of a multipart form, by field name.
#[derive(Default)]
struct Form {
    text: HashMap<String, String>,
    files: HashMap<String, Upload>,
}

async fn read_form(mut multipart: Multipart) -> ApiResult<Form> {
    let malformed = |e: axum::extract::multipart::MultipartError| {
        ApiError::validation(format!("malformed form data: {}", e.body_text()))
    };

    let mut form = Form::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if field.file_name().is_some() {
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field.bytes().await.map_err(malformed)?;
            if !data.is_empty() {
                form.files.insert(
                    name,
                    Upload {
                        body: data,
                        content_type,
                    },
                );
            }
        } else {
            let value = field.text().await.map_err(malformed)?;
            form.text.insert(name, value);
        }
    }
    Ok(form)
}

#[instrument(skip(state, multipart))]
pub async fn register(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<ApiResponse<PublicUser>>)> {
    let mut form = read_form(multipart).await?;
    let fields = RegisterFields {
        username: form.text.remove("username"),
        email: form.text.remove("email"),
        password: form.text.remove("password"),
        fullname: form.text.remove("fullname"),
    };
    let avatar = form.files.remove("avatar");
    let cover_image = form.files.remove("coverImage");

    let user = services::register(&state, fields, avatar, cover_image).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(user, "user registered successfully")),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<(HeaderMap, Json<ApiResponse<AuthResponse>>)> {
    let response = services::login(&state, body(payload)?).await?;
    let headers = session_headers(
        &state.tokens,
        &TokenPair {
            access_token: response.access_token.clone(),
            refresh_token: response.refresh_token.clone(),
        },
    )?;
    Ok((
        headers,
        Json(ApiResponse::ok(response, "user logged in successfully")),
    ))
}

#[instrument(skip(state))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<(HeaderMap, Json<ApiResponse<()>>)> {
    services::logout(&state, user_id).await?;
    Ok((cleared_headers(), Json(ApiResponse::empty("user logged out"))))
}

#[instrument(skip(state, headers, payload))]
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Option<Json<RefreshRequest>>,
) -> ApiResult<(HeaderMap, Json<ApiResponse<TokenPair>>)> {
    let presented = read_cookie(&headers, REFRESH_COOKIE)
        .or_else(|| payload.and_then(|Json(request)| request.refresh_token));

    let pair = services::refresh_access_token(&state, presented).await?;
    let headers = session_headers(&state.tokens, &pair)?;
    Ok((headers, Json(ApiResponse::ok(pair, "access token refreshed"))))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<()>>> {
    services::forgot_password(&state, body(payload)?).await?;
    Ok(Json(ApiResponse::empty("password reset mail sent")))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<()>>> {
    services::reset_password(&state, &token, body(payload)?).await?;
    Ok(Json(ApiResponse::empty("password has been reset")))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<()>>> {
    services::change_password(&state, user_id, body(payload)?).await?;
    Ok(Json(ApiResponse::empty("password changed successfully")))
}

#[instrument(skip(state))]
pub async fn current_user(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<ApiResponse<PublicUser>>> {
    let user = services::current_user(&state, user_id).await?;
    Ok(Json(ApiResponse::ok(user, "current user fetched")))
}

#[instrument(skip(state, payload))]
pub async fn update_account(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<UpdateAccountRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<PublicUser>>> {
    let user = services::update_account(&state, user_id, body(payload)?).await?;
    Ok(Json(ApiResponse::ok(user, "account details updated")))
}

#[instrument(skip(state, multipart))]
pub async fn update_avatar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    multipart: Multipart,
) -> ApiResult<Json<ApiResponse<PublicUser>>> {
    let mut form = read_form(multipart).await?;
    let user = services::update_image(
        &state,
        user_id,
        ImageSlot::Avatar,
        form.files.remove("avatar"),
    )
    .await?;
    Ok(Json(ApiResponse::ok(user, "avatar updated")))
}

#[instrument(skip(state, multipart))]
pub async fn update_cover_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    multipart: Multipart,
) -> ApiResult<Json<ApiResponse<PublicUser>>> {
    let mut form = read_form(multipart).await?;
    let user = services::update_image(
        &state,
        user_id,
        ImageSlot::CoverImage,
        form.files.remove("coverImage"),
    )
    .await?;
    Ok(Json(ApiResponse::ok(user, "cover image updated")))
}
