//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::sms::SmsError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid phone number format.
    #[error("invalid phone number: {0}")]
    InvalidPhone(#[from] partyrent_core::PhoneError),

    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] partyrent_core::EmailError),

    /// A required field is blank.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// User not found.
    #[error("user not found")]
    UserNotFound,

    /// User already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Reset code is wrong, expired, or already used.
    #[error("invalid or expired reset code")]
    InvalidResetCode,

    /// The reset code could not be delivered.
    #[error("sms delivery failed: {0}")]
    Sms(#[from] SmsError),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
