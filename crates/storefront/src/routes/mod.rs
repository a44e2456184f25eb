//! HTTP route handlers for the storefront API.
//!
//! # Route Structure
//!
//! ```text
//! # Auth (rate limited per IP)
//! POST   /api/auth/register
//! POST   /api/auth/login
//! POST   /api/auth/logout
//! GET    /api/auth/me
//! POST   /api/auth/change-password
//! POST   /api/auth/forgot-password/request
//! POST   /api/auth/forgot-password
//!
//! # Catalog (reads public, writes admin-only)
//! GET    /api/categories
//! POST   /api/categories
//! PUT    /api/categories/{id}
//! DELETE /api/categories/{id}
//! POST   /api/categories/{id}/items
//! PUT    /api/categories/{id}/items/{itemId}
//! DELETE /api/categories/{id}/items/{itemId}
//! GET    /api/products?categoryId=
//! POST   /api/products
//! GET    /api/products/{id}
//! PUT    /api/products/{id}
//! DELETE /api/products/{id}
//!
//! # Cart (requires auth)
//! GET    /api/cart
//! POST   /api/cart/items
//! PUT    /api/cart/items/{productId}
//! DELETE /api/cart/items/{productId}
//!
//! # Orders (requires auth)
//! POST   /api/orders
//! GET    /api/orders?userId=
//! GET    /api/orders/{id}
//! POST   /api/orders/{id}/return-to-cart
//!
//! # Admin
//! GET    /api/admin/orders?status=&userId=&page=&perPage=
//! PATCH  /api/admin/orders/{id}
//! POST   /api/upload?resize=true|false
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod extract;
pub mod health;
pub mod orders;
pub mod upload;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::map_response,
    routing::{get, patch, post, put},
};

use crate::config::StorefrontConfig;
use crate::middleware::{auth_rate_limiter, rate_limited_as_json};
use crate::services::images::MAX_UPLOAD_BYTES;
use crate::state::AppState;

/// Room for multipart boundaries and headers around the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create the auth routes router.
pub fn auth_routes(config: &StorefrontConfig) -> Router<AppState> {
    let router = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/change-password", post(auth::change_password))
        .route("/forgot-password/request", post(auth::request_reset_code))
        .route("/forgot-password", post(auth::reset_password));

    if config.rate_limit {
        router
            .layer(auth_rate_limiter())
            .layer(map_response(rate_limited_as_json))
    } else {
        router
    }
}

/// Create the catalog routes router.
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/categories",
            get(catalog::list_categories).post(catalog::create_group),
        )
        .route(
            "/categories/{id}",
            put(catalog::update_group).delete(catalog::delete_group),
        )
        .route("/categories/{id}/items", post(catalog::create_item))
        .route(
            "/categories/{id}/items/{item_id}",
            put(catalog::update_item).delete(catalog::delete_item),
        )
        .route(
            "/products",
            get(catalog::list_products).post(catalog::create_product),
        )
        .route(
            "/products/{id}",
            get(catalog::show_product)
                .put(catalog::update_product)
                .delete(catalog::delete_product),
        )
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/items", post(cart::add_item))
        .route(
            "/items/{product_id}",
            put(cart::update_item).delete(cart::remove_item),
        )
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::list).post(orders::submit))
        .route("/{id}", get(orders::show))
        .route("/{id}/return-to-cart", post(orders::return_to_cart))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(admin::list_orders))
        .route("/orders/{id}", patch(admin::update_order_status))
}

/// Create all `/api` routes.
pub fn routes(config: &StorefrontConfig) -> Router<AppState> {
    let api = Router::new()
        .nest("/auth", auth_routes(config))
        .merge(catalog_routes())
        .nest("/cart", cart_routes())
        .nest("/orders", order_routes())
        .nest("/admin", admin_routes())
        .route(
            "/upload",
            post(upload::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD)),
        );

    Router::new().nest("/api", api)
}
