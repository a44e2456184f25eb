//! Admin order management.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use partyrent_core::{Order, OrderId, OrderStatus, UserId};

use crate::db::{OrderFilter, Page};
use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::routes::extract::{ApiJson, ApiPath, ApiQuery};
use crate::services::cart::change_status;
use crate::state::AppState;

/// Admin order listing query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOrdersQuery {
    pub status: Option<OrderStatus>,
    pub user_id: Option<UserId>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// One page of submitted orders.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersPage {
    pub orders: Vec<Order>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

/// Status change request.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

/// GET /api/admin/orders?status=&userId=&page=&perPage=
pub async fn list_orders(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    ApiQuery(query): ApiQuery<AdminOrdersQuery>,
) -> Result<Json<OrdersPage>> {
    let default = Page::default();
    let page = Page::new(
        query.page.unwrap_or(default.page),
        query.per_page.unwrap_or(default.per_page),
    );
    let filter = OrderFilter {
        status: query.status,
        user_id: query.user_id,
    };

    let result = state.stores().orders.list_finalized(filter, page).await?;
    Ok(Json(OrdersPage {
        orders: result.items,
        total: result.total,
        page: result.page.page,
        per_page: result.page.per_page,
    }))
}

/// PATCH /api/admin/orders/{orderId}
#[instrument(skip_all, fields(admin_id = %admin.id, order_id = %id))]
pub async fn update_order_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<OrderId>,
    ApiJson(req): ApiJson<StatusRequest>,
) -> Result<Json<Order>> {
    let order = change_status(state.stores().orders.as_ref(), id, req.status).await?;
    Ok(Json(order))
}
