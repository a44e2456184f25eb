//! Catalog reads and admin writes.
//!
//! Reads are cached with `moka` (5-minute TTL). Any write clears the whole
//! cache and bumps a generation counter; a read that overlapped a write is
//! not left in the cache. Delete-time reference checks always go to the
//! store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use partyrent_core::{
    CategoryGroup, CategoryGroupId, CategoryItem, CategoryItemId, CategoryRef, Dimensions, Price,
    Product, ProductId,
};

use crate::db::{
    CatalogStore, GroupInput, ItemInput, ProductFilter, ProductInput, RepositoryError,
};
use crate::services::images::{ImageError, ImageStore};

/// Errors from catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("repository error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for CatalogError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => Self::NotFound("record"),
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Repository(other),
        }
    }
}

/// Cache key for catalog reads.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
enum CacheKey {
    Groups,
    Products(ProductFilter),
    Product(ProductId),
}

/// Cached value types.
#[derive(Debug, Clone)]
enum CacheValue {
    Groups(Arc<Vec<CategoryGroup>>),
    Products(Arc<Vec<Product>>),
    Product(Arc<Product>),
}

// =============================================================================
// Drafts (unvalidated admin input)
// =============================================================================

/// Category group fields as submitted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDraft {
    #[serde(default)]
    pub title: String,
    pub border_color: Option<String>,
}

/// Category item fields as submitted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDraft {
    #[serde(default)]
    pub title: String,
    pub image: Option<String>,
}

/// Product fields as submitted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    #[serde(default)]
    pub name: String,
    pub price: Option<Decimal>,
    pub thumbnail: Option<String>,
    pub image: Option<String>,
    pub category_id: Option<CategoryItemId>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dimensions: Dimensions,
    #[serde(default)]
    pub stock: i32,
}

// =============================================================================
// CatalogService
// =============================================================================

/// Catalog access for handlers.
///
/// Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct CatalogService {
    inner: Arc<CatalogServiceInner>,
}

struct CatalogServiceInner {
    store: Arc<dyn CatalogStore>,
    images: Arc<dyn ImageStore>,
    cache: Cache<CacheKey, CacheValue>,
    /// Incremented by every write.
    generation: AtomicU64,
}

impl CatalogService {
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>, images: Arc<dyn ImageStore>) -> Self {
        let cache = Cache::builder()
            .max_capacity(100)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self {
            inner: Arc::new(CatalogServiceInner {
                store,
                images,
                cache,
                generation: AtomicU64::new(0),
            }),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// All category groups with their items.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the store fails.
    pub async fn groups(&self) -> Result<Arc<Vec<CategoryGroup>>, CatalogError> {
        if let Some(CacheValue::Groups(groups)) = self.inner.cache.get(&CacheKey::Groups).await {
            return Ok(groups);
        }

        let generation = self.generation();
        let groups = Arc::new(self.inner.store.list_groups().await?);
        self.remember(
            CacheKey::Groups,
            CacheValue::Groups(Arc::clone(&groups)),
            generation,
        )
        .await;
        Ok(groups)
    }

    /// Products, optionally restricted to one category item.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the store fails.
    pub async fn products(&self, filter: ProductFilter) -> Result<Arc<Vec<Product>>, CatalogError> {
        let key = CacheKey::Products(filter);
        if let Some(CacheValue::Products(products)) = self.inner.cache.get(&key).await {
            return Ok(products);
        }

        let generation = self.generation();
        let products = Arc::new(self.inner.store.list_products(filter).await?);
        self.remember(key, CacheValue::Products(Arc::clone(&products)), generation)
            .await;
        Ok(products)
    }

    /// One product.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if there is no such product.
    pub async fn product(&self, id: ProductId) -> Result<Arc<Product>, CatalogError> {
        let key = CacheKey::Product(id);
        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&key).await {
            return Ok(product);
        }

        let generation = self.generation();
        let product = Arc::new(
            self.inner
                .store
                .get_product(id)
                .await?
                .ok_or(CatalogError::NotFound("product"))?,
        );
        self.remember(key, CacheValue::Product(Arc::clone(&product)), generation)
            .await;
        Ok(product)
    }

    // =========================================================================
    // Groups
    // =========================================================================

    /// # Errors
    ///
    /// Returns `CatalogError::Validation` for a blank title.
    #[instrument(skip(self, draft))]
    pub async fn create_group(&self, draft: GroupDraft) -> Result<CategoryGroup, CatalogError> {
        let input = validate_group(draft)?;
        let group = self.inner.store.create_group(input).await?;
        self.invalidate().await;
        tracing::info!(group_id = %group.id, "Category group created");
        Ok(group)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::Validation` for a blank title and
    /// `CatalogError::NotFound` for an unknown group.
    #[instrument(skip(self, draft))]
    pub async fn update_group(
        &self,
        id: CategoryGroupId,
        draft: GroupDraft,
    ) -> Result<CategoryGroup, CatalogError> {
        let input = validate_group(draft)?;
        let group = self
            .inner
            .store
            .update_group(id, input)
            .await
            .map_err(not_found("category group"))?;
        self.invalidate().await;
        Ok(group)
    }

    /// Delete an empty group.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Conflict` while the group still has items.
    #[instrument(skip(self))]
    pub async fn delete_group(&self, id: CategoryGroupId) -> Result<(), CatalogError> {
        let group = self
            .inner
            .store
            .get_group(id)
            .await?
            .ok_or(CatalogError::NotFound("category group"))?;

        if !group.items.is_empty() {
            return Err(CatalogError::Conflict(format!(
                "category group still has {} item(s); delete them first",
                group.items.len()
            )));
        }

        self.inner
            .store
            .delete_group(id)
            .await
            .map_err(not_found("category group"))?;
        self.invalidate().await;
        tracing::info!(group_id = %id, "Category group deleted");
        Ok(())
    }

    // =========================================================================
    // Items
    // =========================================================================

    /// Append an item to a group.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for an unknown group.
    #[instrument(skip(self, draft))]
    pub async fn create_item(
        &self,
        group_id: CategoryGroupId,
        draft: ItemDraft,
    ) -> Result<CategoryItem, CatalogError> {
        let input = validate_item(draft)?;
        let item = self
            .inner
            .store
            .create_item(group_id, input)
            .await
            .map_err(not_found("category group"))?;
        self.invalidate().await;
        Ok(item)
    }

    /// Update an item. Products linked to it get the new title.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` unless the item belongs to `group_id`.
    #[instrument(skip(self, draft))]
    pub async fn update_item(
        &self,
        group_id: CategoryGroupId,
        id: CategoryItemId,
        draft: ItemDraft,
    ) -> Result<CategoryItem, CatalogError> {
        let input = validate_item(draft)?;
        let previous = self.item_in_group(group_id, id).await?;

        let item = self
            .inner
            .store
            .update_item(group_id, id, input)
            .await
            .map_err(not_found("category item"))?;
        self.invalidate().await;

        if previous.image != item.image {
            self.cleanup(previous.image.as_deref()).await;
        }
        Ok(item)
    }

    /// Delete an item nothing references.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Conflict` while a product uses the item.
    #[instrument(skip(self))]
    pub async fn delete_item(
        &self,
        group_id: CategoryGroupId,
        id: CategoryItemId,
    ) -> Result<(), CatalogError> {
        self.item_in_group(group_id, id).await?;

        let products = self.inner.store.count_products_for_item(id).await?;
        if products > 0 {
            return Err(CatalogError::Conflict(format!(
                "category item is used by {products} product(s); move or delete them first"
            )));
        }

        let item = self
            .inner
            .store
            .delete_item(group_id, id)
            .await
            .map_err(not_found("category item"))?;
        self.invalidate().await;
        tracing::info!(item_id = %id, "Category item deleted");

        self.cleanup(item.image.as_deref()).await;
        Ok(())
    }

    async fn item_in_group(
        &self,
        group_id: CategoryGroupId,
        id: CategoryItemId,
    ) -> Result<CategoryItem, CatalogError> {
        self.inner
            .store
            .get_item(id)
            .await?
            .filter(|item| item.group_id == group_id)
            .ok_or(CatalogError::NotFound("category item"))
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// # Errors
    ///
    /// Returns `CatalogError::Validation` for missing or invalid fields,
    /// including an unknown category item.
    #[instrument(skip(self, draft))]
    pub async fn create_product(&self, draft: ProductDraft) -> Result<Product, CatalogError> {
        let input = self.validate_product(draft).await?;
        let product = self.inner.store.create_product(input).await?;
        self.invalidate().await;
        tracing::info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    /// # Errors
    ///
    /// Same as [`CatalogService::create_product`], plus
    /// `CatalogError::NotFound` for an unknown product.
    #[instrument(skip(self, draft))]
    pub async fn update_product(
        &self,
        id: ProductId,
        draft: ProductDraft,
    ) -> Result<Product, CatalogError> {
        let previous = self
            .inner
            .store
            .get_product(id)
            .await?
            .ok_or(CatalogError::NotFound("product"))?;
        let input = self.validate_product(draft).await?;

        let product = self
            .inner
            .store
            .update_product(id, input)
            .await
            .map_err(not_found("product"))?;
        self.invalidate().await;

        for old in previous.images() {
            if !product.images().any(|current| current == old) {
                self.cleanup(Some(old)).await;
            }
        }
        Ok(product)
    }

    /// Delete a product and its images.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for an unknown product.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<(), CatalogError> {
        let product = self
            .inner
            .store
            .delete_product(id)
            .await
            .map_err(not_found("product"))?;
        self.invalidate().await;
        tracing::info!(product_id = %id, "Product deleted");

        for reference in product.images() {
            self.cleanup(Some(reference)).await;
        }
        Ok(())
    }

    async fn validate_product(&self, draft: ProductDraft) -> Result<ProductInput, CatalogError> {
        let name = required(&draft.name, "name")?;
        let price = draft
            .price
            .ok_or_else(|| CatalogError::Validation("price is required".into()))
            .and_then(|amount| {
                Price::unit(amount).map_err(|e| CatalogError::Validation(e.to_string()))
            })?;
        let category_id = draft
            .category_id
            .ok_or_else(|| CatalogError::Validation("categoryId is required".into()))?;
        if !draft.dimensions.is_valid() {
            return Err(CatalogError::Validation(format!(
                "dimensions must be between 0 and {} with at most {} decimal places",
                Dimensions::max_value(),
                Dimensions::SCALE
            )));
        }
        if draft.stock < 0 {
            return Err(CatalogError::Validation("stock cannot be negative".into()));
        }

        let item = self
            .inner
            .store
            .get_item(category_id)
            .await?
            .ok_or_else(|| CatalogError::Validation(format!("unknown category {category_id}")))?;

        Ok(ProductInput {
            name,
            price,
            thumbnail: non_blank(draft.thumbnail),
            image: non_blank(draft.image),
            category: CategoryRef {
                id: item.id,
                title: item.title,
            },
            description: draft.description.trim().to_owned(),
            dimensions: draft.dimensions,
            stock: draft.stock,
        })
    }

    // =========================================================================
    // Housekeeping
    // =========================================================================

    /// Drop every cached read.
    pub async fn invalidate(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }

    fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Cache a value read at `generation`. If a write happened since, the
    /// entry is dropped again so the stale read cannot outlive that write.
    async fn remember(&self, key: CacheKey, value: CacheValue, generation: u64) {
        self.inner.cache.insert(key, value).await;
        if self.generation() != generation {
            self.inner.cache.invalidate(&key).await;
        }
    }

    /// Remove an image once nothing references it. Failures are logged
    /// and otherwise ignored.
    async fn cleanup(&self, reference: Option<&str>) {
        let Some(reference) = reference else {
            return;
        };
        match self.inner.store.image_in_use(reference).await {
            Ok(false) => {}
            Ok(true) => {
                tracing::debug!(%reference, "Image still referenced, keeping it");
                return;
            }
            Err(e) => {
                tracing::warn!(
                    %reference,
                    error = %e,
                    "Could not check image references, keeping it"
                );
                return;
            }
        }
        match self.inner.images.delete(reference).await {
            Ok(()) => tracing::debug!(%reference, "Image removed"),
            Err(ImageError::InvalidReference(_)) => {
                tracing::debug!(%reference, "Image is not a local upload, leaving it");
            }
            Err(e) => tracing::warn!(%reference, error = %e, "Failed to remove image"),
        }
    }
}

/// Map `RepositoryError::NotFound` to a named `CatalogError::NotFound`.
fn not_found(what: &'static str) -> impl Fn(RepositoryError) -> CatalogError {
    move |e| match e {
        RepositoryError::NotFound => CatalogError::NotFound(what),
        other => other.into(),
    }
}

fn required(value: &str, field: &str) -> Result<String, CatalogError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_owned())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn validate_group(draft: GroupDraft) -> Result<GroupInput, CatalogError> {
    Ok(GroupInput {
        title: required(&draft.title, "title")?,
        border_color: non_blank(draft.border_color),
    })
}

fn validate_item(draft: ItemDraft) -> Result<ItemInput, CatalogError> {
    Ok(ItemInput {
        title: required(&draft.title, "title")?,
        image: non_blank(draft.image),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::services::images::LocalImageStore;

    fn service() -> CatalogService {
        let store = Arc::new(MemoryStore::new());
        let images = Arc::new(LocalImageStore::new(std::env::temp_dir().join("partyrent-test")));
        CatalogService::new(store, images)
    }

    fn group(title: &str) -> GroupDraft {
        GroupDraft {
            title: title.into(),
            border_color: None,
        }
    }

    fn item(title: &str) -> ItemDraft {
        ItemDraft {
            title: title.into(),
            image: None,
        }
    }

    fn product(name: &str, category_id: CategoryItemId) -> ProductDraft {
        ProductDraft {
            name: name.into(),
            price: Some(Decimal::from(1000)),
            thumbnail: None,
            image: None,
            category_id: Some(category_id),
            description: String::new(),
            dimensions: Dimensions::default(),
            stock: 3,
        }
    }

    #[tokio::test]
    async fn test_delete_referenced_item_conflicts() {
        let catalog = service();
        let g = catalog.create_group(group("Furniture")).await.unwrap();
        let i = catalog.create_item(g.id, item("Chairs")).await.unwrap();
        catalog.create_product(product("Chair", i.id)).await.unwrap();

        let err = catalog.delete_item(g.id, i.id).await.unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));

        let groups = catalog.groups().await.unwrap();
        assert_eq!(groups[0].items.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_group_with_items_conflicts() {
        let catalog = service();
        let g = catalog.create_group(group("Furniture")).await.unwrap();
        catalog.create_item(g.id, item("Tables")).await.unwrap();

        assert!(matches!(
            catalog.delete_group(g.id).await,
            Err(CatalogError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_write_invalidates_cached_reads() {
        let catalog = service();
        assert!(catalog.groups().await.unwrap().is_empty());

        catalog.create_group(group("Lighting")).await.unwrap();
        assert_eq!(catalog.groups().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_product_validation() {
        let catalog = service();
        let g = catalog.create_group(group("Furniture")).await.unwrap();
        let i = catalog.create_item(g.id, item("Chairs")).await.unwrap();

        let mut draft = product("  ", i.id);
        assert!(matches!(
            catalog.create_product(draft.clone()).await,
            Err(CatalogError::Validation(_))
        ));

        draft.name = "Chair".into();
        draft.price = Some(Decimal::NEGATIVE_ONE);
        assert!(matches!(
            catalog.create_product(draft.clone()).await,
            Err(CatalogError::Validation(_))
        ));

        draft.price = Some(Decimal::ONE);
        draft.category_id = Some(CategoryItemId::new(999));
        assert!(matches!(
            catalog.create_product(draft).await,
            Err(CatalogError::Validation(_))
        ));

        assert!(catalog.products(ProductFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_product_price_and_dimensions_must_fit_storage() {
        let catalog = service();
        let g = catalog.create_group(group("Tents")).await.unwrap();
        let i = catalog.create_item(g.id, item("Marquees")).await.unwrap();

        let mut draft = product("Marquee", i.id);
        draft.price = Some(Decimal::MAX);
        assert!(matches!(
            catalog.create_product(draft.clone()).await,
            Err(CatalogError::Validation(_))
        ));

        draft.price = Some(Decimal::new(4_505, 3));
        assert!(matches!(
            catalog.create_product(draft.clone()).await,
            Err(CatalogError::Validation(_))
        ));

        draft.price = Some(Price::max_unit_amount());
        draft.dimensions.length = Dimensions::max_value() + Decimal::ONE;
        assert!(matches!(
            catalog.create_product(draft.clone()).await,
            Err(CatalogError::Validation(_))
        ));

        draft.dimensions = Dimensions::default();
        let p = catalog.create_product(draft).await.unwrap();
        assert_eq!(p.price.amount(), Price::max_unit_amount());
    }

    #[tokio::test]
    async fn test_read_overlapping_a_write_is_not_cached() {
        let catalog = service();

        // A read starts, then a write lands before the read caches its result.
        let generation = catalog.generation();
        let stale = Arc::new(catalog.inner.store.list_groups().await.unwrap());
        catalog.create_group(group("Tents")).await.unwrap();
        catalog
            .remember(CacheKey::Groups, CacheValue::Groups(stale), generation)
            .await;

        assert_eq!(catalog.groups().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shared_image_survives_until_last_reference_goes() {
        let dir = std::env::temp_dir().join(format!("partyrent-test-{}", uuid::Uuid::new_v4()));
        let images = Arc::new(LocalImageStore::new(&dir));
        let catalog = CatalogService::new(Arc::new(MemoryStore::new()), Arc::clone(&images) as _);
        let reference = images.put(vec![1, 2, 3], "jpg").await.unwrap();
        let file = dir.join(reference.trim_start_matches("/uploads/"));

        let g = catalog.create_group(group("Furniture")).await.unwrap();
        let i = catalog.create_item(g.id, item("Chairs")).await.unwrap();
        let mut draft = product("Chair", i.id);
        draft.image = Some(reference.clone());
        let first = catalog.create_product(draft.clone()).await.unwrap();
        let second = catalog.create_product(draft.clone()).await.unwrap();

        catalog.delete_product(first.id).await.unwrap();
        assert!(file.exists());

        draft.image = None;
        catalog.update_product(second.id, draft).await.unwrap();
        assert!(!file.exists());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_item_rename_updates_product_snapshot() {
        let catalog = service();
        let g = catalog.create_group(group("Furniture")).await.unwrap();
        let i = catalog.create_item(g.id, item("Chairs")).await.unwrap();
        let p = catalog.create_product(product("Chair", i.id)).await.unwrap();
        assert_eq!(p.category.title, "Chairs");

        catalog.update_item(g.id, i.id, item("Seating")).await.unwrap();
        let p = catalog.product(p.id).await.unwrap();
        assert_eq!(p.category.title, "Seating");
    }

    #[tokio::test]
    async fn test_item_must_belong_to_group() {
        let catalog = service();
        let a = catalog.create_group(group("A")).await.unwrap();
        let b = catalog.create_group(group("B")).await.unwrap();
        let i = catalog.create_item(a.id, item("Chairs")).await.unwrap();

        assert!(matches!(
            catalog.delete_item(b.id, i.id).await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_products_filtered_by_category() {
        let catalog = service();
        let g = catalog.create_group(group("Furniture")).await.unwrap();
        let chairs = catalog.create_item(g.id, item("Chairs")).await.unwrap();
        let tables = catalog.create_item(g.id, item("Tables")).await.unwrap();
        catalog.create_product(product("Chair", chairs.id)).await.unwrap();
        catalog.create_product(product("Table", tables.id)).await.unwrap();

        let only_tables = catalog
            .products(ProductFilter {
                category_id: Some(tables.id),
            })
            .await
            .unwrap();
        assert_eq!(only_tables.len(), 1);
        assert_eq!(only_tables[0].name, "Table");
    }
}
