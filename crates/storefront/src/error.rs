//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Errors become a JSON body
//! of the form `{"error": {"kind": "...", "message": "..."}}`; server-side
//! failures are captured to Sentry before responding.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::cart::CartError;
use crate::services::catalog::CatalogError;
use crate::services::images::ImageError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or invalid input.
    #[error("{0}")]
    Validation(String),

    /// Referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Unique or referential constraint, or a stale write.
    #[error("{0}")]
    Conflict(String),

    /// No valid session.
    #[error("{0}")]
    Unauthenticated(String),

    /// Valid session, insufficient role.
    #[error("{0}")]
    Forbidden(String),

    /// Too many requests.
    #[error("too many requests")]
    RateLimited,

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(RepositoryError),

    /// Any other dependency failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error kind as exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Authentication,
    Authorization,
    Upstream,
    RateLimited,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    kind: ErrorKind,
    message: &'a str,
}

impl AppError {
    /// Client-facing kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unauthenticated(_) => ErrorKind::Authentication,
            Self::Forbidden(_) => ErrorKind::Authorization,
            Self::RateLimited => ErrorKind::RateLimited,
            Self::Database(_) | Self::Internal(_) => ErrorKind::Upstream,
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(self, Self::Database(_) | Self::Internal(_)) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind(),
                message: &message,
            },
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => Self::NotFound("not found".into()),
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Database(other),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidPhone(_)
            | AuthError::InvalidEmail(_)
            | AuthError::MissingField(_)
            | AuthError::WeakPassword(_)
            | AuthError::InvalidResetCode => Self::Validation(e.to_string()),
            AuthError::InvalidCredentials => Self::Unauthenticated("invalid credentials".into()),
            AuthError::UserNotFound => Self::Unauthenticated("account no longer exists".into()),
            AuthError::UserAlreadyExists => {
                Self::Conflict("an account with this phone number already exists".into())
            }
            AuthError::Repository(e) => e.into(),
            AuthError::Sms(_) | AuthError::PasswordHash => Self::Internal(e.to_string()),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Validation(msg) => Self::Validation(msg),
            CatalogError::NotFound(_) => Self::NotFound(e.to_string()),
            CatalogError::Conflict(msg) => Self::Conflict(msg),
            CatalogError::Repository(e) => e.into(),
        }
    }
}

impl From<CartError> for AppError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::ProductNotFound | CartError::LineNotFound | CartError::OrderNotFound => {
                Self::NotFound(e.to_string())
            }
            CartError::EmptyCart | CartError::Amount(_) => Self::Validation(e.to_string()),
            CartError::InvalidTransition(msg) | CartError::Conflict(msg) => Self::Conflict(msg),
            CartError::Repository(e) => e.into(),
        }
    }
}

impl From<ImageError> for AppError {
    fn from(e: ImageError) -> Self {
        if e.is_client_error() {
            Self::Validation(e.to_string())
        } else {
            Self::Internal(e.to_string())
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(e: tower_sessions::session::Error) -> Self {
        Self::Internal(format!("session error: {e}"))
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(
            get_status(AppError::Validation("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Conflict("test".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::Unauthenticated("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Forbidden("test".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::RateLimited),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let (status, body) = body_json(AppError::Conflict("still referenced".into())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["kind"], "conflict");
        assert_eq!(body["error"]["message"], "still referenced");
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let (_, body) = body_json(AppError::Internal("connection refused".into())).await;
        assert_eq!(body["error"]["kind"], "upstream");
        assert_eq!(body["error"]["message"], "Internal server error");
    }

    #[test]
    fn test_auth_errors_map_to_kinds() {
        assert_eq!(
            AppError::from(AuthError::InvalidCredentials).kind(),
            ErrorKind::Authentication
        );
        assert_eq!(
            AppError::from(AuthError::UserAlreadyExists).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            AppError::from(AuthError::InvalidResetCode).kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_cart_total_out_of_range_is_validation() {
        let err = AppError::from(CartError::Amount(partyrent_core::PriceError::Overflow));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_catalog_conflict_maps_to_conflict() {
        let err = AppError::from(CatalogError::Conflict("in use".into()));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
