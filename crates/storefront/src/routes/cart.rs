//! Cart route handlers.
//!
//! The cart is the logged-in user's single unfinalized order. Each request
//! opens a cart session, applies one mutation, and returns the saved cart.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use partyrent_core::{Order, OrderId, ProductId, Quantity, UserId};

use crate::db::CustomerSnapshot;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::RequireAuth;
use crate::routes::extract::{ApiJson, ApiPath};
use crate::services::cart::{AddOutcome, CartSession};
use crate::state::AppState;

/// Add-to-cart request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: ProductId,
}

/// Quantity update. Values below 1 are treated as 1.
#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

/// Cart plus an optional notice for the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub cart: Order,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<CartWarning>,
}

/// Non-fatal notice attached to a cart response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartWarning {
    pub code: &'static str,
    pub message: String,
    pub pending_order_id: OrderId,
}

impl CartResponse {
    fn of(session: CartSession<'_>) -> Json<Self> {
        Json(Self {
            cart: session.into_cart(),
            warning: None,
        })
    }
}

/// Customer details for a user's orders.
///
/// # Errors
///
/// Returns `AppError::Unauthenticated` if the account has been removed.
pub(crate) async fn customer_for(state: &AppState, user_id: UserId) -> Result<CustomerSnapshot> {
    let user = state
        .stores()
        .users
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("account no longer exists".into()))?;
    Ok(CustomerSnapshot::from(&user))
}

/// GET /api/cart
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<Json<CartResponse>> {
    let customer = customer_for(&state, current.id).await?;
    let session = state.carts().start(&customer).await?;
    Ok(CartResponse::of(session))
}

/// POST /api/cart/items
#[instrument(skip_all, fields(user_id = %current.id))]
pub async fn add_item(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiJson(req): ApiJson<AddItemRequest>,
) -> Result<Json<CartResponse>> {
    let customer = customer_for(&state, current.id).await?;
    let mut session = state.carts().start(&customer).await?;

    let warning = match session.add_item(req.product_id).await? {
        AddOutcome::Added => {
            let product_id = req.product_id.to_string();
            add_breadcrumb("cart", "Added to cart", Some(&[("product_id", product_id.as_str())]));
            None
        }
        AddOutcome::Blocked { pending_order_id } => Some(CartWarning {
            code: "pending_order",
            message: format!(
                "order {pending_order_id} is still awaiting processing; \
                 return it to the cart or wait before adding more items"
            ),
            pending_order_id,
        }),
    };

    Ok(Json(CartResponse {
        cart: session.into_cart(),
        warning,
    }))
}

/// PUT /api/cart/items/{productId}
#[instrument(skip_all, fields(user_id = %current.id))]
pub async fn update_item(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiPath(product_id): ApiPath<ProductId>,
    ApiJson(req): ApiJson<UpdateQuantityRequest>,
) -> Result<Json<CartResponse>> {
    let customer = customer_for(&state, current.id).await?;
    let mut session = state.carts().start(&customer).await?;
    session
        .update_quantity(product_id, Quantity::coerce(req.quantity))
        .await?;
    Ok(CartResponse::of(session))
}

/// DELETE /api/cart/items/{productId}
#[instrument(skip_all, fields(user_id = %current.id))]
pub async fn remove_item(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiPath(product_id): ApiPath<ProductId>,
) -> Result<Json<CartResponse>> {
    let customer = customer_for(&state, current.id).await?;
    let mut session = state.carts().start(&customer).await?;
    session.remove_item(product_id).await?;
    Ok(CartResponse::of(session))
}
