//! Admin user management commands.
//!
//! # Usage
//!
//! ```bash
//! # Create a new admin account
//! pr-cli admin create -p "+15551234567" -f Ada -l Lovelace
//!
//! # Grant the admin role to an existing account
//! pr-cli admin promote -p "+15551234567"
//! ```
//!
//! The password is read from `PARTYRENT_ADMIN_PASSWORD`, never from argv.

use partyrent_core::{PhoneNumber, UserRole};
use partyrent_storefront::db::RepositoryError;
use partyrent_storefront::services::auth::{AuthError, AuthService, Registration};
use partyrent_storefront::services::sms::LogSmsSender;
use partyrent_storefront::state::Stores;
use thiserror::Error;

use super::{ConnectError, connect};

/// Environment variable holding the new admin's password.
const PASSWORD_ENV: &str = "PARTYRENT_ADMIN_PASSWORD";

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("No user with phone number {0}")]
    UserNotFound(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Create a new admin account.
///
/// # Errors
///
/// Returns `AdminError` if the password is missing, the input fails
/// validation, or the phone number is already registered.
pub async fn create_user(
    phone: &str,
    first_name: &str,
    last_name: &str,
    email: Option<&str>,
) -> Result<(), AdminError> {
    let pool = connect().await?;
    let password =
        std::env::var(PASSWORD_ENV).map_err(|_| AdminError::MissingEnvVar(PASSWORD_ENV))?;

    let stores = Stores::postgres(&pool);
    let auth = AuthService::new(
        stores.users.as_ref(),
        stores.reset_codes.as_ref(),
        &LogSmsSender,
    );

    let user = auth
        .register_with_role(
            Registration {
                first_name,
                last_name,
                phone,
                password: &password,
                email,
            },
            UserRole::Admin,
        )
        .await?;

    tracing::info!(
        "Admin user created successfully! ID: {}, Phone: {}",
        user.id,
        user.phone
    );
    Ok(())
}

/// Grant the admin role to an existing account.
///
/// # Errors
///
/// Returns `AdminError` if the phone number is invalid or unknown.
pub async fn promote(phone: &str) -> Result<(), AdminError> {
    let phone = PhoneNumber::parse(phone).map_err(|e| AdminError::InvalidPhone(e.to_string()))?;
    let pool = connect().await?;
    let stores = Stores::postgres(&pool);

    let user = stores
        .users
        .get_by_phone(&phone)
        .await?
        .ok_or_else(|| AdminError::UserNotFound(phone.to_string()))?;

    if user.role.is_admin() {
        tracing::info!("{} is already an admin", user.phone);
        return Ok(());
    }

    let user = stores.users.set_role(user.id, UserRole::Admin).await?;
    tracing::info!("Promoted {} (ID {}) to admin", user.phone, user.id);
    Ok(())
}
