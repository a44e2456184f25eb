//! Order repository: active carts and finalized order history.
//!
//! Lines are stored as a JSONB array on the order row, so a cart write is a
//! single-row update guarded by the order's `version`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use partyrent_core::{Order, OrderId, OrderLine, OrderStatus, Price, UserId};

use super::{
    CustomerSnapshot, OrderFilter, OrderStore, Page, Paged, RepositoryError, unique_violation,
};

const ORDER_COLUMNS: &str = "id, user_id, customer_name, customer_phone, customer_email, \
     lines, total, status, finalized, version, created_at, updated_at, finalized_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: UserId,
    customer_name: String,
    customer_phone: String,
    customer_email: Option<String>,
    lines: Json<Vec<OrderLine>>,
    total: Price,
    status: OrderStatus,
    finalized: bool,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    finalized_at: Option<DateTime<Utc>>,
}

impl From<OrderRow> for Order {
    fn from(r: OrderRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            customer_name: r.customer_name,
            customer_phone: r.customer_phone,
            customer_email: r.customer_email,
            lines: r.lines.0,
            total: r.total,
            status: r.status,
            finalized: r.finalized,
            version: r.version,
            created_at: r.created_at,
            updated_at: r.updated_at,
            finalized_at: r.finalized_at,
        }
    }
}

/// `PostgreSQL`-backed [`OrderStore`].
#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Tell "missing" apart from "changed under us" after a guarded update
    /// matched no row.
    async fn stale_or_missing(&self, id: OrderId) -> RepositoryError {
        match self.get(id).await {
            Ok(Some(_)) => RepositoryError::Conflict(format!("order {id} was modified")),
            Ok(None) => RepositoryError::NotFound,
            Err(e) => e,
        }
    }
}

async fn insert_cart(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    name: &str,
    phone: &str,
    email: Option<&str>,
) -> Result<Order, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        r"
        INSERT INTO shop.orders (user_id, customer_name, customer_phone, customer_email)
        VALUES ($1, $2, $3, $4)
        RETURNING {ORDER_COLUMNS}
        "
    ))
    .bind(user_id)
    .bind(name)
    .bind(phone)
    .bind(email)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| unique_violation(e, "active cart"))?;

    Ok(row.into())
}

#[async_trait]
impl OrderStore for OrderRepository {
    async fn load_active(&self, user_id: UserId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.orders WHERE user_id = $1 AND NOT finalized"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Order::from))
    }

    async fn create_active(&self, customer: &CustomerSnapshot) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let order = insert_cart(
            &mut tx,
            customer.user_id,
            &customer.name,
            &customer.phone,
            customer.email.as_deref(),
        )
        .await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn save_lines(
        &self,
        id: OrderId,
        lines: &[OrderLine],
        total: Price,
        expected_version: i32,
    ) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            UPDATE shop.orders
            SET lines = $2, total = $3, version = version + 1, updated_at = now()
            WHERE id = $1 AND version = $4 AND NOT finalized
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(Json(lines))
        .bind(total)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(r.into()),
            None => Err(self.stale_or_missing(id).await),
        }
    }

    async fn finalize(
        &self,
        id: OrderId,
        expected_version: i32,
    ) -> Result<(Order, Order), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            UPDATE shop.orders
            SET finalized = true, status = 'pending', finalized_at = now(),
                version = version + 1, updated_at = now()
            WHERE id = $1 AND version = $2 AND NOT finalized
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(expected_version)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(self.stale_or_missing(id).await);
        };
        let finalized = Order::from(row);

        let cart = insert_cart(
            &mut tx,
            finalized.user_id,
            &finalized.customer_name,
            &finalized.customer_phone,
            finalized.customer_email.as_deref(),
        )
        .await?;

        tx.commit().await?;
        Ok((finalized, cart))
    }

    async fn return_to_cart(
        &self,
        source: OrderId,
        cart: OrderId,
        cart_version: i32,
    ) -> Result<(Order, Order), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let cancelled = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            UPDATE shop.orders
            SET status = 'cancelled', version = version + 1, updated_at = now()
            WHERE id = $1 AND finalized AND status = 'pending'
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(source)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(cancelled) = cancelled.map(Order::from) else {
            tx.rollback().await?;
            return Err(match self.get(source).await? {
                Some(_) => RepositoryError::Conflict(format!("order {source} is not pending")),
                None => RepositoryError::NotFound,
            });
        };

        let updated = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            UPDATE shop.orders
            SET lines = $2, total = $3, version = version + 1, updated_at = now()
            WHERE id = $1 AND version = $4 AND NOT finalized
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(cart)
        .bind(Json(&cancelled.lines))
        .bind(cancelled.total)
        .bind(cart_version)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(updated) = updated else {
            tx.rollback().await?;
            return Err(self.stale_or_missing(cart).await);
        };

        tx.commit().await?;
        Ok((cancelled, updated.into()))
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM shop.orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Order::from))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM shop.orders
            WHERE user_id = $1 AND finalized
            ORDER BY finalized_at DESC, id DESC
            "
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Order::from).collect())
    }

    async fn list_finalized(
        &self,
        filter: OrderFilter,
        page: Page,
    ) -> Result<Paged<Order>, RepositoryError> {
        let total: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM shop.orders
            WHERE finalized
              AND ($1::shop.order_status IS NULL OR status = $1)
              AND ($2::INTEGER IS NULL OR user_id = $2)
            ",
        )
        .bind(filter.status)
        .bind(filter.user_id)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM shop.orders
            WHERE finalized
              AND ($1::shop.order_status IS NULL OR status = $1)
              AND ($2::INTEGER IS NULL OR user_id = $2)
            ORDER BY finalized_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "
        ))
        .bind(filter.status)
        .bind(filter.user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Paged {
            items: rows.into_iter().map(Order::from).collect(),
            total,
            page,
        })
    }

    async fn set_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            UPDATE shop.orders
            SET status = $3, version = version + 1, updated_at = now()
            WHERE id = $1 AND finalized AND status = $2
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(r.into()),
            None => Err(self.stale_or_missing(id).await),
        }
    }

    async fn pending_submission(
        &self,
        user_id: UserId,
    ) -> Result<Option<OrderId>, RepositoryError> {
        let id = sqlx::query_scalar::<_, OrderId>(
            r"
            SELECT id FROM shop.orders
            WHERE user_id = $1 AND finalized AND status = 'pending'
            ORDER BY finalized_at, id
            LIMIT 1
            ",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }
}
