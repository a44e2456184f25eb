//! Authentication route handlers.
//!
//! Phone number + password accounts. A successful login stores a
//! [`CurrentUser`] in the session; the session cookie is the token.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::middleware::{RequireAuth, clear_current_user, set_current_user};
use crate::models::{CurrentUser, User};
use crate::routes::extract::ApiJson;
use crate::services::auth::{AuthError, Registration};
use crate::state::AppState;

// =============================================================================
// Request Types
// =============================================================================

/// Registration request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub password: String,
    pub email: Option<String>,
}

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub phone: String,
    pub password: String,
}

/// Password change request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Reset code request.
#[derive(Debug, Deserialize)]
pub struct ResetCodeRequest {
    pub phone: String,
}

/// Password reset with a code.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub phone: String,
    pub code: String,
    pub new_password: String,
}

/// Session response after login.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: CurrentUser,
}

/// Generic acknowledgement.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub ok: bool,
}

const ACK: Ack = Ack { ok: true };

// =============================================================================
// Handlers
// =============================================================================

/// POST /api/auth/register
///
/// Creates a `user` account and logs it in.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    let user = state
        .auth()
        .register(Registration {
            first_name: &req.first_name,
            last_name: &req.last_name,
            phone: &req.phone,
            password: &req.password,
            email: req.email.as_deref(),
        })
        .await?;

    let current = CurrentUser::from(&user);
    set_current_user(&session, &current).await?;
    set_sentry_user(&current.id);

    Ok((StatusCode::CREATED, Json(SessionResponse { user: current })))
}

/// POST /api/auth/login
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<SessionResponse>> {
    let user = state.auth().login(&req.phone, &req.password).await?;

    let current = CurrentUser::from(&user);
    set_current_user(&session, &current).await?;
    set_sentry_user(&current.id);
    add_breadcrumb("auth", "Logged in", None);
    tracing::info!(user_id = %current.id, role = %current.role, "User logged in");

    Ok(Json(SessionResponse { user: current }))
}

/// POST /api/auth/logout
pub async fn logout(session: Session) -> Result<Json<Ack>> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(Json(ACK))
}

/// GET /api/auth/me
///
/// Fresh account details for the logged-in user.
pub async fn me(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<Json<User>> {
    Ok(Json(state.auth().get_user(current.id).await?))
}

/// POST /api/auth/change-password
#[instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<Json<Ack>> {
    state
        .auth()
        .change_password(current.id, &req.current_password, &req.new_password)
        .await
        .map_err(|e| match e {
            AuthError::InvalidCredentials => {
                AppError::Validation("current password is incorrect".into())
            }
            other => other.into(),
        })?;
    Ok(Json(ACK))
}

/// POST /api/auth/forgot-password/request
///
/// Always answers the same way for well-formed numbers.
#[instrument(skip_all)]
pub async fn request_reset_code(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResetCodeRequest>,
) -> Result<Json<Ack>> {
    state.auth().request_password_reset(&req.phone).await?;
    Ok(Json(ACK))
}

/// POST /api/auth/forgot-password
#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> Result<Json<Ack>> {
    state
        .auth()
        .reset_password(&req.phone, &req.code, &req.new_password)
        .await?;
    Ok(Json(ACK))
}
