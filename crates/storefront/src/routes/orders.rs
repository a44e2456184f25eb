//! Order route handlers: checkout, history, and return-to-cart.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use partyrent_core::{Order, OrderId, UserId};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::RequireAuth;
use crate::models::CurrentUser;
use crate::routes::cart::customer_for;
use crate::routes::extract::{ApiPath, ApiQuery};
use crate::state::AppState;

/// Order history query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersQuery {
    pub user_id: Option<UserId>,
}

/// The submitted order and the fresh cart that replaced it.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub order: Order,
    pub cart: Order,
}

/// The cancelled order and the cart now holding its lines.
#[derive(Debug, Serialize)]
pub struct ReturnResponse {
    pub order: Order,
    pub cart: Order,
}

/// Load a finalized order visible to `viewer`. Other users' orders look
/// missing unless the viewer is an admin.
async fn visible_order(state: &AppState, viewer: &CurrentUser, id: OrderId) -> Result<Order> {
    state
        .stores()
        .orders
        .get(id)
        .await?
        .filter(|o| o.finalized && (o.user_id == viewer.id || viewer.role.is_admin()))
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))
}

/// POST /api/orders
///
/// Submit the active cart.
#[instrument(skip_all, fields(user_id = %current.id))]
pub async fn submit(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
) -> Result<(StatusCode, Json<SubmitResponse>)> {
    let customer = customer_for(&state, current.id).await?;
    let mut session = state.carts().start(&customer).await?;

    if session.cart().is_empty() {
        return Err(AppError::Validation("cannot submit an empty cart".into()));
    }

    let order = session.finalize().await?;
    let order_id = order.id.to_string();
    add_breadcrumb("orders", "Order submitted", Some(&[("order_id", order_id.as_str())]));

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            order,
            cart: session.into_cart(),
        }),
    ))
}

/// GET /api/orders?userId=
///
/// The caller's submitted orders, newest first. Admins may pass any
/// `userId`.
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiQuery(query): ApiQuery<OrdersQuery>,
) -> Result<Json<Vec<Order>>> {
    let user_id = query.user_id.unwrap_or(current.id);
    if user_id != current.id && !current.role.is_admin() {
        return Err(AppError::Forbidden(
            "cannot list another user's orders".into(),
        ));
    }
    Ok(Json(state.stores().orders.list_for_user(user_id).await?))
}

/// GET /api/orders/{id}
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(visible_order(&state, &current, id).await?))
}

/// POST /api/orders/{id}/return-to-cart
///
/// Cancel a pending order and put its lines back into its owner's cart.
/// Admins may do this for any user.
#[instrument(skip_all, fields(user_id = %current.id, order_id = %id))]
pub async fn return_to_cart(
    State(state): State<AppState>,
    RequireAuth(current): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<ReturnResponse>> {
    let order = visible_order(&state, &current, id).await?;
    let owner = customer_for(&state, order.user_id).await.map_err(|e| match e {
        AppError::Unauthenticated(_) => AppError::NotFound("order owner no longer exists".into()),
        other => other,
    })?;

    let mut session = state.carts().start(&owner).await?;
    let cancelled = session.return_to_cart(id).await?;

    Ok(Json(ReturnResponse {
        order: cancelled,
        cart: session.into_cart(),
    }))
}
