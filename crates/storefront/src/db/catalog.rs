//! Catalog repository: category groups, items and products.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;

use partyrent_core::{
    CategoryGroup, CategoryGroupId, CategoryItem, CategoryItemId, CategoryRef, Dimensions, Price,
    Product, ProductId,
};

use super::{
    CatalogStore, GroupInput, ItemInput, ProductFilter, ProductInput, RepositoryError,
    missing_parent, still_referenced,
};

const ITEM_COLUMNS: &str = "id, group_id, title, image, position";

const PRODUCT_COLUMNS: &str = "id, name, price, thumbnail, image, category_item_id, \
     category_title, description, length, width, height, weight, stock";

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: CategoryGroupId,
    title: String,
    border_color: Option<String>,
}

impl GroupRow {
    fn with_items(self, items: Vec<CategoryItem>) -> CategoryGroup {
        CategoryGroup {
            id: self.id,
            title: self.title,
            border_color: self.border_color,
            items,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: CategoryItemId,
    group_id: CategoryGroupId,
    title: String,
    image: Option<String>,
    position: i32,
}

impl From<ItemRow> for CategoryItem {
    fn from(r: ItemRow) -> Self {
        Self {
            id: r.id,
            group_id: r.group_id,
            title: r.title,
            image: r.image,
            position: r.position,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    price: Price,
    thumbnail: Option<String>,
    image: Option<String>,
    category_item_id: CategoryItemId,
    category_title: String,
    description: String,
    length: Decimal,
    width: Decimal,
    height: Decimal,
    weight: Decimal,
    stock: i32,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            price: r.price,
            thumbnail: r.thumbnail,
            image: r.image,
            category: CategoryRef {
                id: r.category_item_id,
                title: r.category_title,
            },
            description: r.description,
            dimensions: Dimensions {
                length: r.length,
                width: r.width,
                height: r.height,
                weight: r.weight,
            },
            stock: r.stock,
        }
    }
}

/// `PostgreSQL`-backed [`CatalogStore`].
#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    /// Create a new catalog repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn items_for_group(
        &self,
        group_id: CategoryGroupId,
    ) -> Result<Vec<CategoryItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM shop.category_items WHERE group_id = $1 \
             ORDER BY position, id"
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CategoryItem::from).collect())
    }
}

#[async_trait]
impl CatalogStore for CatalogRepository {
    async fn list_groups(&self) -> Result<Vec<CategoryGroup>, RepositoryError> {
        let groups = sqlx::query_as::<_, GroupRow>(
            "SELECT id, title, border_color FROM shop.category_groups ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let items = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM shop.category_items ORDER BY group_id, position, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut by_group: HashMap<CategoryGroupId, Vec<CategoryItem>> = HashMap::new();
        for item in items {
            by_group.entry(item.group_id).or_default().push(item.into());
        }

        Ok(groups
            .into_iter()
            .map(|g| {
                let items = by_group.remove(&g.id).unwrap_or_default();
                g.with_items(items)
            })
            .collect())
    }

    async fn get_group(
        &self,
        id: CategoryGroupId,
    ) -> Result<Option<CategoryGroup>, RepositoryError> {
        let row = sqlx::query_as::<_, GroupRow>(
            "SELECT id, title, border_color FROM shop.category_groups WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(group) = row else {
            return Ok(None);
        };
        let items = self.items_for_group(group.id).await?;
        Ok(Some(group.with_items(items)))
    }

    async fn create_group(&self, input: GroupInput) -> Result<CategoryGroup, RepositoryError> {
        let row = sqlx::query_as::<_, GroupRow>(
            r"
            INSERT INTO shop.category_groups (title, border_color)
            VALUES ($1, $2)
            RETURNING id, title, border_color
            ",
        )
        .bind(&input.title)
        .bind(&input.border_color)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.with_items(Vec::new()))
    }

    async fn update_group(
        &self,
        id: CategoryGroupId,
        input: GroupInput,
    ) -> Result<CategoryGroup, RepositoryError> {
        let row = sqlx::query_as::<_, GroupRow>(
            r"
            UPDATE shop.category_groups SET title = $2, border_color = $3
            WHERE id = $1
            RETURNING id, title, border_color
            ",
        )
        .bind(id)
        .bind(&input.title)
        .bind(&input.border_color)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let items = self.items_for_group(row.id).await?;
        Ok(row.with_items(items))
    }

    async fn delete_group(&self, id: CategoryGroupId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.category_groups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| still_referenced(e, "category group"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get_item(&self, id: CategoryItemId) -> Result<Option<CategoryItem>, RepositoryError> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM shop.category_items WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CategoryItem::from))
    }

    async fn create_item(
        &self,
        group_id: CategoryGroupId,
        input: ItemInput,
    ) -> Result<CategoryItem, RepositoryError> {
        // Position is computed in the same statement so concurrent appends
        // at worst tie, and ties fall back to id order.
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            r"
            INSERT INTO shop.category_items (group_id, title, image, position)
            SELECT g.id, $2, $3,
                   COALESCE((SELECT MAX(position) + 1 FROM shop.category_items WHERE group_id = g.id), 0)
            FROM shop.category_groups g
            WHERE g.id = $1
            RETURNING {ITEM_COLUMNS}
            "
        ))
        .bind(group_id)
        .bind(&input.title)
        .bind(&input.image)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    async fn update_item(
        &self,
        group_id: CategoryGroupId,
        id: CategoryItemId,
        input: ItemInput,
    ) -> Result<CategoryItem, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ItemRow>(&format!(
            r"
            UPDATE shop.category_items SET title = $3, image = $4
            WHERE id = $1 AND group_id = $2
            RETURNING {ITEM_COLUMNS}
            "
        ))
        .bind(id)
        .bind(group_id)
        .bind(&input.title)
        .bind(&input.image)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        // Keep the denormalized title on products in step
        sqlx::query(
            r"
            UPDATE shop.products SET category_title = $2, updated_at = now()
            WHERE category_item_id = $1 AND category_title <> $2
            ",
        )
        .bind(id)
        .bind(&input.title)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn delete_item(
        &self,
        group_id: CategoryGroupId,
        id: CategoryItemId,
    ) -> Result<CategoryItem, RepositoryError> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            r"
            DELETE FROM shop.category_items
            WHERE id = $1 AND group_id = $2
            RETURNING {ITEM_COLUMNS}
            "
        ))
        .bind(id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| still_referenced(e, "category item"))?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    async fn count_products_for_item(&self, id: CategoryItemId) -> Result<i64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM shop.products WHERE category_item_id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn image_in_use(&self, reference: &str) -> Result<bool, RepositoryError> {
        let in_use: bool = sqlx::query_scalar(
            r"
            SELECT EXISTS (SELECT 1 FROM shop.products WHERE thumbnail = $1 OR image = $1)
                OR EXISTS (SELECT 1 FROM shop.category_items WHERE image = $1)
            ",
        )
        .bind(reference)
        .fetch_one(&self.pool)
        .await?;
        Ok(in_use)
    }

    async fn list_products(&self, filter: ProductFilter) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            SELECT {PRODUCT_COLUMNS} FROM shop.products
            WHERE ($1::INTEGER IS NULL OR category_item_id = $1)
            ORDER BY id
            "
        ))
        .bind(filter.category_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM shop.products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Product::from))
    }

    async fn create_product(&self, input: ProductInput) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            INSERT INTO shop.products
                (name, price, thumbnail, image, category_item_id, category_title,
                 description, length, width, height, weight, stock)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(&input.name)
        .bind(input.price)
        .bind(&input.thumbnail)
        .bind(&input.image)
        .bind(input.category.id)
        .bind(&input.category.title)
        .bind(&input.description)
        .bind(input.dimensions.length)
        .bind(input.dimensions.width)
        .bind(input.dimensions.height)
        .bind(input.dimensions.weight)
        .bind(input.stock)
        .fetch_one(&self.pool)
        .await
        .map_err(missing_parent)?;

        Ok(row.into())
    }

    async fn update_product(
        &self,
        id: ProductId,
        input: ProductInput,
    ) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            UPDATE shop.products SET
                name = $2, price = $3, thumbnail = $4, image = $5,
                category_item_id = $6, category_title = $7, description = $8,
                length = $9, width = $10, height = $11, weight = $12, stock = $13,
                updated_at = now()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&input.name)
        .bind(input.price)
        .bind(&input.thumbnail)
        .bind(&input.image)
        .bind(input.category.id)
        .bind(&input.category.title)
        .bind(&input.description)
        .bind(input.dimensions.length)
        .bind(input.dimensions.width)
        .bind(input.dimensions.height)
        .bind(input.dimensions.weight)
        .bind(input.stock)
        .fetch_optional(&self.pool)
        .await
        .map_err(missing_parent)?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    async fn delete_product(&self, id: ProductId) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "DELETE FROM shop.products WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }
}
