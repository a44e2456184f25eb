//! Catalog route handlers.
//!
//! Reads are public. Writes require the admin role and go through
//! [`CatalogService`](crate::services::catalog::CatalogService), which
//! validates input and refuses deletes that would orphan records.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tracing::instrument;

use partyrent_core::{CategoryGroup, CategoryGroupId, CategoryItem, CategoryItemId, Product, ProductId};

use crate::db::ProductFilter;
use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::routes::extract::{ApiJson, ApiPath, ApiQuery};
use crate::services::catalog::{GroupDraft, ItemDraft, ProductDraft};
use crate::state::AppState;

/// Product listing query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductsQuery {
    pub category_id: Option<CategoryItemId>,
}

// =============================================================================
// Public reads
// =============================================================================

/// GET /api/categories
pub async fn list_categories(State(state): State<AppState>) -> Result<Json<Arc<Vec<CategoryGroup>>>> {
    Ok(Json(state.catalog().groups().await?))
}

/// GET /api/products?categoryId=
pub async fn list_products(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ProductsQuery>,
) -> Result<Json<Arc<Vec<Product>>>> {
    let filter = ProductFilter {
        category_id: query.category_id,
    };
    Ok(Json(state.catalog().products(filter).await?))
}

/// GET /api/products/{id}
pub async fn show_product(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<Json<Arc<Product>>> {
    Ok(Json(state.catalog().product(id).await?))
}

// =============================================================================
// Admin: groups
// =============================================================================

/// POST /api/categories
#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn create_group(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiJson(draft): ApiJson<GroupDraft>,
) -> Result<(StatusCode, Json<CategoryGroup>)> {
    let group = state.catalog().create_group(draft).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// PUT /api/categories/{id}
#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn update_group(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<CategoryGroupId>,
    ApiJson(draft): ApiJson<GroupDraft>,
) -> Result<Json<CategoryGroup>> {
    Ok(Json(state.catalog().update_group(id, draft).await?))
}

/// DELETE /api/categories/{id}
#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn delete_group(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<CategoryGroupId>,
) -> Result<StatusCode> {
    state.catalog().delete_group(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Admin: items
// =============================================================================

/// POST /api/categories/{id}/items
#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn create_item(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(group_id): ApiPath<CategoryGroupId>,
    ApiJson(draft): ApiJson<ItemDraft>,
) -> Result<(StatusCode, Json<CategoryItem>)> {
    let item = state.catalog().create_item(group_id, draft).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// PUT /api/categories/{id}/items/{itemId}
#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn update_item(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath((group_id, item_id)): ApiPath<(CategoryGroupId, CategoryItemId)>,
    ApiJson(draft): ApiJson<ItemDraft>,
) -> Result<Json<CategoryItem>> {
    Ok(Json(
        state.catalog().update_item(group_id, item_id, draft).await?,
    ))
}

/// DELETE /api/categories/{id}/items/{itemId}
#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn delete_item(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath((group_id, item_id)): ApiPath<(CategoryGroupId, CategoryItemId)>,
) -> Result<StatusCode> {
    state.catalog().delete_item(group_id, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Admin: products
// =============================================================================

/// POST /api/products
#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn create_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiJson(draft): ApiJson<ProductDraft>,
) -> Result<(StatusCode, Json<Product>)> {
    let product = state.catalog().create_product(draft).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /api/products/{id}
#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn update_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(draft): ApiJson<ProductDraft>,
) -> Result<Json<Product>> {
    Ok(Json(state.catalog().update_product(id, draft).await?))
}

/// DELETE /api/products/{id}
#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn delete_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<StatusCode> {
    state.catalog().delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
