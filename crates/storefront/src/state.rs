//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StorefrontConfig;
use crate::db::{
    CatalogRepository, CatalogStore, MemoryStore, OrderRepository, OrderStore,
    ResetCodeRepository, ResetCodeStore, UserRepository, UserStore,
};
use crate::services::auth::AuthService;
use crate::services::cart::CartService;
use crate::services::catalog::CatalogService;
use crate::services::images::{ImageStore, LocalImageStore};
use crate::services::sms::{LogSmsSender, SmsSender};

/// The persistence ports the handlers need.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub orders: Arc<dyn OrderStore>,
    pub reset_codes: Arc<dyn ResetCodeStore>,
}

impl Stores {
    /// `PostgreSQL` repositories sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            users: Arc::new(UserRepository::new(pool.clone())),
            catalog: Arc::new(CatalogRepository::new(pool.clone())),
            orders: Arc::new(OrderRepository::new(pool.clone())),
            reset_codes: Arc::new(ResetCodeRepository::new(pool.clone())),
        }
    }

    /// One in-memory store behind every port.
    #[must_use]
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            users: store.clone(),
            catalog: store.clone(),
            orders: store.clone(),
            reset_codes: store,
        }
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the stores, services and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    stores: Stores,
    catalog: CatalogService,
    images: Arc<dyn ImageStore>,
    sms: Arc<dyn SmsSender>,
    pool: Option<PgPool>,
}

impl AppState {
    /// Production state: `PostgreSQL` stores, images on local disk, SMS to
    /// the log.
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Self {
        let images: Arc<dyn ImageStore> = Arc::new(LocalImageStore::new(&config.upload_dir));
        Self::from_parts(
            config,
            Stores::postgres(&pool),
            images,
            Arc::new(LogSmsSender),
            Some(pool),
        )
    }

    /// Assemble state from explicit parts. Tests use this with
    /// [`Stores::memory`].
    #[must_use]
    pub fn from_parts(
        config: StorefrontConfig,
        stores: Stores,
        images: Arc<dyn ImageStore>,
        sms: Arc<dyn SmsSender>,
        pool: Option<PgPool>,
    ) -> Self {
        let catalog = CatalogService::new(stores.catalog.clone(), images.clone());
        Self {
            inner: Arc::new(AppStateInner {
                config,
                stores,
                catalog,
                images,
                sms,
                pool,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    /// Cached catalog access.
    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn images(&self) -> &dyn ImageStore {
        self.inner.images.as_ref()
    }

    /// Database pool, when running against `PostgreSQL`.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    /// Authentication service over this state's stores.
    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(
            self.inner.stores.users.as_ref(),
            self.inner.stores.reset_codes.as_ref(),
            self.inner.sms.as_ref(),
        )
    }

    /// Cart service over this state's stores.
    #[must_use]
    pub fn carts(&self) -> CartService<'_> {
        CartService::new(
            self.inner.stores.orders.as_ref(),
            self.inner.stores.catalog.as_ref(),
            self.inner.config.block_cart_while_pending,
        )
    }
}
