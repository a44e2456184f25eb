//! Authentication service.
//!
//! Phone number and password accounts with Argon2id hashes, plus
//! SMS-code password reset.

mod error;

pub use error::AuthError;

use std::sync::LazyLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use rand::Rng;
use tracing::instrument;

use partyrent_core::{Email, PhoneNumber, UserId, UserRole};

use crate::db::{NewUser, RepositoryError, ResetCodeStore, UserStore};
use crate::models::user::User;
use crate::services::sms::SmsSender;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// How long a reset code stays valid.
const RESET_CODE_TTL_MINUTES: i64 = 10;

/// Hash checked against when the phone number has no account, so that
/// unknown numbers cost the same Argon2 work as known ones.
static DECOY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("partyrent decoy password").ok());

/// Registration form, before validation.
#[derive(Debug, Clone)]
pub struct Registration<'r> {
    pub first_name: &'r str,
    pub last_name: &'r str,
    pub phone: &'r str,
    pub password: &'r str,
    pub email: Option<&'r str>,
}

/// Authentication service.
///
/// Handles registration, login, password changes and password reset.
pub struct AuthService<'a> {
    users: &'a dyn UserStore,
    reset_codes: &'a dyn ResetCodeStore,
    sms: &'a dyn SmsSender,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(
        users: &'a dyn UserStore,
        reset_codes: &'a dyn ResetCodeStore,
        sms: &'a dyn SmsSender,
    ) -> Self {
        Self {
            users,
            reset_codes,
            sms,
        }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Register a new user with role `user`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidPhone` / `InvalidEmail` / `MissingField` /
    /// `WeakPassword` for bad input, and `AuthError::UserAlreadyExists` if the
    /// normalized phone number is already registered.
    #[instrument(skip_all)]
    pub async fn register(&self, form: Registration<'_>) -> Result<User, AuthError> {
        self.register_with_role(form, UserRole::User).await
    }

    /// Register a user with an explicit role. Used by operator tooling.
    ///
    /// # Errors
    ///
    /// Same as [`AuthService::register`].
    pub async fn register_with_role(
        &self,
        form: Registration<'_>,
        role: UserRole,
    ) -> Result<User, AuthError> {
        let phone = PhoneNumber::parse(form.phone)?;
        let first_name = required(form.first_name, "first name")?;
        let last_name = required(form.last_name, "last name")?;
        let email = form
            .email
            .filter(|e| !e.trim().is_empty())
            .map(Email::parse)
            .transpose()?;

        validate_password(form.password)?;
        let password_hash = hash_password(form.password)?;

        let user = self
            .users
            .create(NewUser {
                phone,
                first_name,
                last_name,
                email,
                password_hash,
                role,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Login with phone number and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the phone/password is wrong.
    #[instrument(skip_all)]
    pub async fn login(&self, phone: &str, password: &str) -> Result<User, AuthError> {
        let phone = PhoneNumber::parse(phone).map_err(|_| AuthError::InvalidCredentials)?;

        let Some((user, password_hash)) = self.users.get_credentials_by_phone(&phone).await? else {
            if let Some(decoy) = DECOY_HASH.as_deref() {
                let _ = verify_password(password, decoy);
            }
            return Err(AuthError::InvalidCredentials);
        };

        verify_password(password, &password_hash)?;

        Ok(user)
    }

    /// Change the password of a logged-in user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if `current` is wrong and
    /// `AuthError::WeakPassword` if `new` is too short.
    #[instrument(skip(self, current, new))]
    pub async fn change_password(
        &self,
        user_id: UserId,
        current: &str,
        new: &str,
    ) -> Result<(), AuthError> {
        let user = self.get_user(user_id).await?;
        let (_, password_hash) = self
            .users
            .get_credentials_by_phone(&user.phone)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        verify_password(current, &password_hash)?;
        validate_password(new)?;

        self.users
            .update_password_hash(user_id, &hash_password(new)?)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Password Reset
    // =========================================================================

    /// Send a reset code to the phone number.
    ///
    /// Unknown numbers get the same `Ok(())` so callers cannot probe which
    /// numbers have accounts.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidPhone` for malformed input and
    /// `AuthError::Sms` if delivery fails.
    #[instrument(skip_all)]
    pub async fn request_password_reset(&self, phone: &str) -> Result<(), AuthError> {
        let phone = PhoneNumber::parse(phone)?;

        if self.users.get_by_phone(&phone).await?.is_none() {
            tracing::debug!("Password reset requested for unknown phone");
            let _ = hash_password(&generate_reset_code());
            return Ok(());
        }

        let code = generate_reset_code();
        let expires_at = Utc::now() + Duration::minutes(RESET_CODE_TTL_MINUTES);
        self.reset_codes
            .put(&phone, &hash_password(&code)?, expires_at)
            .await?;

        self.sms
            .send(
                &phone,
                &format!(
                    "Your Partyrent reset code is {code}. It expires in {RESET_CODE_TTL_MINUTES} minutes."
                ),
            )
            .await?;
        Ok(())
    }

    /// Set a new password using a reset code. The code is consumed whether
    /// or not it matches.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidResetCode` if the code is wrong, expired or
    /// already used, and `AuthError::WeakPassword` if `new` is too short.
    #[instrument(skip_all)]
    pub async fn reset_password(
        &self,
        phone: &str,
        code: &str,
        new: &str,
    ) -> Result<(), AuthError> {
        let phone = PhoneNumber::parse(phone)?;
        validate_password(new)?;

        let (code_hash, expires_at) = self
            .reset_codes
            .take(&phone)
            .await?
            .ok_or(AuthError::InvalidResetCode)?;

        if expires_at < Utc::now() {
            return Err(AuthError::InvalidResetCode);
        }
        verify_password(code.trim(), &code_hash).map_err(|_| AuthError::InvalidResetCode)?;

        let user = self
            .users
            .get_by_phone(&phone)
            .await?
            .ok_or(AuthError::InvalidResetCode)?;
        self.users
            .update_password_hash(user.id, &hash_password(new)?)
            .await?;

        tracing::info!(user_id = %user.id, "Password reset");
        Ok(())
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}

/// Trim and require a non-empty value.
fn required(value: &str, field: &'static str) -> Result<String, AuthError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AuthError::MissingField(field));
    }
    Ok(trimmed.to_owned())
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Six random digits.
fn generate_reset_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000_u32))
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}
