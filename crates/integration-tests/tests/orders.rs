//! Cart mutations, checkout, return-to-cart, and admin order handling.

use partyrent_core::{Order, OrderStatus, Price, ProductId, Quantity};
use partyrent_integration_tests::{TestApp, body, expect_error};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

fn price(s: &str) -> Price {
    Price::parse(s).expect("valid price")
}

async fn add(app: &TestApp, client: &Client, product_id: ProductId) -> Value {
    let resp = client
        .post(app.url("/api/cart/items"))
        .json(&json!({ "productId": product_id }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);
    body(resp).await
}

fn cart_of(response: &Value) -> Order {
    serde_json::from_value(response["cart"].clone()).expect("cart body")
}

#[tokio::test]
async fn test_cart_totals_follow_mutations() {
    let app = TestApp::spawn().await;
    let (_, a) = app.seed_product("Dance floor", "1000").await;
    let (_, b) = app.seed_product("Fog machine", "500").await;
    let client = app.customer("+15550001111").await;

    add(&app, &client, a.id).await;
    add(&app, &client, a.id).await;
    let cart = cart_of(&add(&app, &client, b.id).await);

    assert_eq!(cart.lines.len(), 2);
    assert_eq!(cart.line(a.id).expect("line a").quantity.get(), 2);
    assert_eq!(cart.total, price("2500"));

    let resp = client
        .delete(app.url(&format!("/api/cart/items/{}", a.id)))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);
    let cart = cart_of(&body(resp).await);
    assert!(cart.line(a.id).is_none());
    assert_eq!(cart.total, price("500"));
}

#[tokio::test]
async fn test_quantity_below_one_is_clamped() {
    let app = TestApp::spawn().await;
    let (_, p) = app.seed_product("Speaker", "75").await;
    let client = app.customer("+15550001112").await;
    add(&app, &client, p.id).await;

    for (quantity, expected) in [(4, 4), (0, 1), (-3, 1)] {
        let resp = client
            .put(app.url(&format!("/api/cart/items/{}", p.id)))
            .json(&json!({ "quantity": quantity }))
            .send()
            .await
            .expect("request");
        assert_eq!(resp.status(), StatusCode::OK);
        let cart = cart_of(&body(resp).await);
        assert_eq!(cart.line(p.id).expect("line").quantity.get(), expected);
    }
}

#[tokio::test]
async fn test_huge_quantities_stay_in_range() {
    let app = TestApp::spawn().await;
    let (_, marquee) = app.seed_product("Marquee", "99999999.99").await;
    let (_, ballroom) = app.seed_product("Ballroom", "99999999.99").await;
    let client = app.customer("+15550001120").await;
    add(&app, &client, marquee.id).await;
    add(&app, &client, ballroom.id).await;

    let resp = client
        .put(app.url(&format!("/api/cart/items/{}", marquee.id)))
        .json(&json!({ "quantity": 9_999_999_999_i64 }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);
    let cart = cart_of(&body(resp).await);
    assert_eq!(cart.line(marquee.id).expect("line").quantity, Quantity::MAX);

    // Two full lines at the top unit price exceed the largest order total.
    let resp = client
        .put(app.url(&format!("/api/cart/items/{}", ballroom.id)))
        .json(&json!({ "quantity": 9_999_999_999_i64 }))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::BAD_REQUEST, "validation").await;

    let cart: Value = body(
        client
            .get(app.url("/api/cart"))
            .send()
            .await
            .expect("request"),
    )
    .await;
    let cart = cart_of(&cart);
    assert_eq!(cart.line(ballroom.id).expect("line").quantity.get(), 1);
}

#[tokio::test]
async fn test_out_of_range_price_is_rejected() {
    let app = TestApp::spawn().await;
    let (item, _) = app.seed_product("Tent", "300").await;
    let admin = app.admin().await;

    for price in ["79228162514264337593543950335", "100000000", "4.505"] {
        let resp = admin
            .post(app.url("/api/products"))
            .json(&json!({ "name": "Gold tent", "price": price, "categoryId": item.id }))
            .send()
            .await
            .expect("request");
        expect_error(resp, StatusCode::BAD_REQUEST, "validation").await;
    }
}

#[tokio::test]
async fn test_updating_absent_line_is_not_found() {
    let app = TestApp::spawn().await;
    let (_, p) = app.seed_product("Speaker", "75").await;
    let client = app.customer("+15550001113").await;

    let resp = client
        .put(app.url(&format!("/api/cart/items/{}", p.id)))
        .json(&json!({ "quantity": 2 }))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::NOT_FOUND, "not_found").await;
}

#[tokio::test]
async fn test_cart_requires_login() {
    let app = TestApp::spawn().await;
    let resp = TestApp::client()
        .get(app.url("/api/cart"))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::UNAUTHORIZED, "authentication").await;
}

#[tokio::test]
async fn test_submit_empty_cart_is_rejected() {
    let app = TestApp::spawn().await;
    let client = app.customer("+15550001114").await;
    let resp = client
        .post(app.url("/api/orders"))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::BAD_REQUEST, "validation").await;
}

#[tokio::test]
async fn test_checkout_pending_guard_and_return_to_cart() {
    let app = TestApp::spawn().await;
    let (_, tent) = app.seed_product("Tent", "300").await;
    let client = app.customer("+15550001115").await;
    add(&app, &client, tent.id).await;

    // Submit.
    let resp = client
        .post(app.url("/api/orders"))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let submitted: Value = body(resp).await;
    let order: Order = serde_json::from_value(submitted["order"].clone()).expect("order");
    let fresh: Order = serde_json::from_value(submitted["cart"].clone()).expect("cart");
    assert!(order.finalized);
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total, price("300"));
    assert!(fresh.is_empty());
    assert!(!fresh.finalized);

    // Adding while the order is pending only warns.
    let response = add(&app, &client, tent.id).await;
    assert_eq!(response["warning"]["code"], "pending_order");
    assert_eq!(
        response["warning"]["pendingOrderId"].as_i64(),
        Some(i64::from(order.id.as_i32()))
    );
    assert!(cart_of(&response).is_empty());

    // History.
    let history: Vec<Order> = body(
        client
            .get(app.url("/api/orders"))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, order.id);

    // Return the order to the cart.
    let resp = client
        .post(app.url(&format!("/api/orders/{}/return-to-cart", order.id)))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);
    let returned: Value = body(resp).await;
    let cancelled: Order = serde_json::from_value(returned["order"].clone()).expect("order");
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    let cart = cart_of(&returned);
    assert_eq!(cart.line(tent.id).expect("line").quantity.get(), 1);
    assert_eq!(cart.total, price("300"));

    // Nothing is pending any more.
    let response = add(&app, &client, tent.id).await;
    assert!(response.get("warning").is_none());
    assert_eq!(cart_of(&response).total, price("600"));
}

#[tokio::test]
async fn test_pending_guard_disabled_by_config() {
    let app = TestApp::spawn_with(|c| c.block_cart_while_pending = false).await;
    let (_, p) = app.seed_product("Heater", "40").await;
    let client = app.customer("+15550001116").await;
    add(&app, &client, p.id).await;
    let resp = client
        .post(app.url("/api/orders"))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::CREATED);

    let response = add(&app, &client, p.id).await;
    assert!(response.get("warning").is_none());
    assert_eq!(cart_of(&response).lines.len(), 1);
}

#[tokio::test]
async fn test_orders_are_private() {
    let app = TestApp::spawn().await;
    let (_, p) = app.seed_product("Bar cart", "60").await;
    let owner = app.customer("+15550001117").await;
    let other = app.customer("+15550001118").await;
    add(&app, &owner, p.id).await;

    let submitted: Value = body(
        owner
            .post(app.url("/api/orders"))
            .send()
            .await
            .expect("request"),
    )
    .await;
    let order_id = submitted["order"]["id"].as_i64().expect("order id");
    let owner_id = submitted["order"]["userId"].as_i64().expect("user id");

    let resp = other
        .get(app.url(&format!("/api/orders/{order_id}")))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::NOT_FOUND, "not_found").await;

    let resp = other
        .post(app.url(&format!("/api/orders/{order_id}/return-to-cart")))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::NOT_FOUND, "not_found").await;

    let resp = other
        .get(app.url(&format!("/api/orders?userId={owner_id}")))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::FORBIDDEN, "authorization").await;

    let admin = app.admin().await;
    let history: Vec<Order> = body(
        admin
            .get(app.url(&format!("/api/orders?userId={owner_id}")))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_admin_status_transitions() {
    let app = TestApp::spawn().await;
    let (_, p) = app.seed_product("Projector", "120").await;
    let client = app.customer("+15550001119").await;
    add(&app, &client, p.id).await;
    let submitted: Value = body(
        client
            .post(app.url("/api/orders"))
            .send()
            .await
            .expect("request"),
    )
    .await;
    let order_id = submitted["order"]["id"].as_i64().expect("order id");
    let path = format!("/api/admin/orders/{order_id}");

    let resp = client
        .patch(app.url(&path))
        .json(&json!({ "status": "processing" }))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::FORBIDDEN, "authorization").await;

    let admin = app.admin().await;

    let page: Value = body(
        admin
            .get(app.url("/api/admin/orders?status=pending"))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["page"], 1);
    assert_eq!(page["perPage"], 20);
    assert_eq!(page["orders"][0]["id"], order_id);

    let resp = admin
        .patch(app.url(&path))
        .json(&json!({ "status": "processing" }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);
    let order: Order = body(resp).await;
    assert_eq!(order.status, OrderStatus::Processing);

    // Processing orders cannot go back to the cart or back to pending.
    let resp = client
        .post(app.url(&format!("/api/orders/{order_id}/return-to-cart")))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::CONFLICT, "conflict").await;

    let resp = admin
        .patch(app.url(&path))
        .json(&json!({ "status": "pending" }))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::CONFLICT, "conflict").await;

    let resp = admin
        .patch(app.url(&path))
        .json(&json!({ "status": "shipped" }))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::BAD_REQUEST, "validation").await;

    let page: Value = body(
        admin
            .get(app.url("/api/admin/orders?status=pending"))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::spawn().await;
    let client = TestApp::client();

    let resp = client.get(app.url("/health")).send().await.expect("request");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.expect("body"), "ok");

    let resp = client
        .get(app.url("/health/ready"))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);
}
