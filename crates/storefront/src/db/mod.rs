//! Persistence ports and their `PostgreSQL` implementations.
//!
//! # Schema: `shop`
//!
//! ## Tables
//!
//! - `users` - Accounts, keyed by normalized phone number
//! - `category_groups` / `category_items` - Catalog tree
//! - `products` - Rentable products, each linked to one category item
//! - `orders` - Active carts (`finalized = false`, at most one per user) and
//!   finalized order history; lines are stored as JSONB
//! - `password_reset_codes` - Pending reset codes (hashed)
//! - `tower_sessions.session` - Session storage, owned by `tower-sessions-sqlx-store`
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p partyrent-cli -- migrate
//! ```
//!
//! Every port also has an in-process implementation in [`memory`], used by
//! tests and local demos.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use partyrent_core::{
    CategoryGroup, CategoryGroupId, CategoryItem, CategoryItemId, CategoryRef, Dimensions, Email,
    Order, OrderId, OrderLine, OrderStatus, PhoneNumber, Price, Product, ProductId, UserId,
    UserRole,
};

use crate::models::user::User;

pub mod catalog;
pub mod memory;
pub mod orders;
pub mod reset_codes;
pub mod users;

pub use catalog::CatalogRepository;
pub use memory::MemoryStore;
pub use orders::OrderRepository;
pub use reset_codes::ResetCodeRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation or stale write.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map a unique violation to `Conflict`, anything else to `Database`.
pub(crate) fn unique_violation(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(e)
}

/// Map a foreign key violation to `Conflict`, anything else to `Database`.
pub(crate) fn still_referenced(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_foreign_key_violation()
    {
        return RepositoryError::Conflict(format!("{what} is still referenced"));
    }
    RepositoryError::Database(e)
}

/// Map a foreign key violation on insert to `NotFound` (the parent row is
/// gone), anything else to `Database`.
pub(crate) fn missing_parent(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_foreign_key_violation()
    {
        return RepositoryError::NotFound;
    }
    RepositoryError::Database(e)
}

// =============================================================================
// Inputs
// =============================================================================

/// Fields for a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub phone: PhoneNumber,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<Email>,
    pub password_hash: String,
    pub role: UserRole,
}

/// Writable fields of a category group.
#[derive(Debug, Clone)]
pub struct GroupInput {
    pub title: String,
    pub border_color: Option<String>,
}

/// Writable fields of a category item.
#[derive(Debug, Clone)]
pub struct ItemInput {
    pub title: String,
    pub image: Option<String>,
}

/// Writable fields of a product. `category.title` is the snapshot to store.
#[derive(Debug, Clone)]
pub struct ProductInput {
    pub name: String,
    pub price: Price,
    pub thumbnail: Option<String>,
    pub image: Option<String>,
    pub category: CategoryRef,
    pub description: String,
    pub dimensions: Dimensions,
    pub stock: i32,
}

/// Product listing filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ProductFilter {
    pub category_id: Option<CategoryItemId>,
}

/// Customer details copied onto every order the user creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerSnapshot {
    pub user_id: UserId,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

impl From<&User> for CustomerSnapshot {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            name: user.display_name(),
            phone: user.phone.to_string(),
            email: user.email.clone(),
        }
    }
}

/// Finalized-order listing filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub user_id: Option<UserId>,
}

/// One-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    /// Largest page size a caller may request.
    pub const MAX_PER_PAGE: u32 = 100;

    /// Build a page request, clamping to `1..` and `1..=MAX_PER_PAGE`.
    #[must_use]
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    /// Rows to skip.
    #[must_use]
    pub fn offset(self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }

    /// Rows to return.
    #[must_use]
    pub fn limit(self) -> i64 {
        i64::from(self.per_page)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

/// A page of results plus the unpaged total.
#[derive(Debug, Clone)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: Page,
}

// =============================================================================
// Ports
// =============================================================================

/// Account storage.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user. `Conflict` if the phone number is taken.
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError>;

    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    async fn get_by_phone(&self, phone: &PhoneNumber) -> Result<Option<User>, RepositoryError>;

    /// User plus password hash, for login.
    async fn get_credentials_by_phone(
        &self,
        phone: &PhoneNumber,
    ) -> Result<Option<(User, String)>, RepositoryError>;

    /// `NotFound` if the user does not exist.
    async fn update_password_hash(&self, id: UserId, hash: &str) -> Result<(), RepositoryError>;

    /// `NotFound` if the user does not exist.
    async fn set_role(&self, id: UserId, role: UserRole) -> Result<User, RepositoryError>;
}

/// Category and product storage.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All groups with their items, ordered by id and item position.
    async fn list_groups(&self) -> Result<Vec<CategoryGroup>, RepositoryError>;

    async fn get_group(
        &self,
        id: CategoryGroupId,
    ) -> Result<Option<CategoryGroup>, RepositoryError>;

    async fn create_group(&self, input: GroupInput) -> Result<CategoryGroup, RepositoryError>;

    async fn update_group(
        &self,
        id: CategoryGroupId,
        input: GroupInput,
    ) -> Result<CategoryGroup, RepositoryError>;

    /// `Conflict` if the group still owns items.
    async fn delete_group(&self, id: CategoryGroupId) -> Result<(), RepositoryError>;

    async fn get_item(&self, id: CategoryItemId) -> Result<Option<CategoryItem>, RepositoryError>;

    /// Append an item to the end of a group. `NotFound` if the group is missing.
    async fn create_item(
        &self,
        group_id: CategoryGroupId,
        input: ItemInput,
    ) -> Result<CategoryItem, RepositoryError>;

    /// `NotFound` unless the item exists within `group_id`.
    async fn update_item(
        &self,
        group_id: CategoryGroupId,
        id: CategoryItemId,
        input: ItemInput,
    ) -> Result<CategoryItem, RepositoryError>;

    /// `NotFound` unless the item exists within `group_id`; `Conflict` if a
    /// product references it.
    async fn delete_item(
        &self,
        group_id: CategoryGroupId,
        id: CategoryItemId,
    ) -> Result<CategoryItem, RepositoryError>;

    async fn count_products_for_item(&self, id: CategoryItemId) -> Result<i64, RepositoryError>;

    /// Whether any product or category item still points at an image.
    async fn image_in_use(&self, reference: &str) -> Result<bool, RepositoryError>;

    async fn list_products(&self, filter: ProductFilter) -> Result<Vec<Product>, RepositoryError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    async fn create_product(&self, input: ProductInput) -> Result<Product, RepositoryError>;

    async fn update_product(
        &self,
        id: ProductId,
        input: ProductInput,
    ) -> Result<Product, RepositoryError>;

    /// Returns the deleted product so its images can be cleaned up.
    async fn delete_product(&self, id: ProductId) -> Result<Product, RepositoryError>;
}

/// Order storage. The active cart is the user's single unfinalized order.
///
/// Every write takes the version the caller last saw and fails with
/// `Conflict` when it no longer matches.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// The user's unfinalized order, if any.
    async fn load_active(&self, user_id: UserId) -> Result<Option<Order>, RepositoryError>;

    /// Create an empty unfinalized order. `Conflict` if one already exists.
    async fn create_active(&self, customer: &CustomerSnapshot) -> Result<Order, RepositoryError>;

    /// Replace the lines and total of an unfinalized order.
    async fn save_lines(
        &self,
        id: OrderId,
        lines: &[OrderLine],
        total: Price,
        expected_version: i32,
    ) -> Result<Order, RepositoryError>;

    /// Mark the order finalized with status `pending` and create a fresh
    /// empty cart for the same user, in one transaction.
    ///
    /// Returns `(finalized, new_cart)`.
    async fn finalize(
        &self,
        id: OrderId,
        expected_version: i32,
    ) -> Result<(Order, Order), RepositoryError>;

    /// Copy lines and total of a finalized `pending` order into the cart and
    /// mark the source `cancelled`, in one transaction.
    ///
    /// Returns `(cancelled_source, cart)`.
    async fn return_to_cart(
        &self,
        source: OrderId,
        cart: OrderId,
        cart_version: i32,
    ) -> Result<(Order, Order), RepositoryError>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// The user's finalized orders, newest first.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Finalized orders across all users, newest first.
    async fn list_finalized(
        &self,
        filter: OrderFilter,
        page: Page,
    ) -> Result<Paged<Order>, RepositoryError>;

    /// Move a finalized order from `from` to `to`. `Conflict` if its status
    /// is no longer `from`.
    async fn set_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Order, RepositoryError>;

    /// Oldest finalized order of the user still waiting in `pending`.
    async fn pending_submission(
        &self,
        user_id: UserId,
    ) -> Result<Option<OrderId>, RepositoryError>;
}

/// Password reset code storage. One live code per phone number.
#[async_trait]
pub trait ResetCodeStore: Send + Sync {
    /// Store a code hash, replacing any previous code for the phone.
    async fn put(
        &self,
        phone: &PhoneNumber,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Remove and return the code hash and its expiry.
    async fn take(
        &self,
        phone: &PhoneNumber,
    ) -> Result<Option<(String, DateTime<Utc>)>, RepositoryError>;
}
