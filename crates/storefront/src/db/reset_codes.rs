//! Password reset code repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use partyrent_core::PhoneNumber;

use super::{RepositoryError, ResetCodeStore};

/// `PostgreSQL`-backed [`ResetCodeStore`].
#[derive(Clone)]
pub struct ResetCodeRepository {
    pool: PgPool,
}

impl ResetCodeRepository {
    /// Create a new reset code repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResetCodeStore for ResetCodeRepository {
    async fn put(
        &self,
        phone: &PhoneNumber,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO shop.password_reset_codes (phone, code_hash, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (phone) DO UPDATE
            SET code_hash = EXCLUDED.code_hash,
                expires_at = EXCLUDED.expires_at,
                created_at = now()
            ",
        )
        .bind(phone)
        .bind(code_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn take(
        &self,
        phone: &PhoneNumber,
    ) -> Result<Option<(String, DateTime<Utc>)>, RepositoryError> {
        let row = sqlx::query_as::<_, (String, DateTime<Utc>)>(
            r"
            DELETE FROM shop.password_reset_codes
            WHERE phone = $1
            RETURNING code_hash, expires_at
            ",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
