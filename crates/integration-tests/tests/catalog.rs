//! Catalog reads, admin writes, referential integrity, and image upload.

use std::io::Cursor;

use image::{ImageFormat, RgbImage};
use partyrent_core::{CategoryGroup, Product};
use partyrent_integration_tests::{TestApp, body, expect_error};
use reqwest::{StatusCode, multipart};
use serde_json::{Value, json};

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    RgbImage::new(width, height)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode png");
    bytes
}

#[tokio::test]
async fn test_public_reads() {
    let app = TestApp::spawn().await;
    let (item, product) = app.seed_product("Folding chair", "4.50").await;
    app.seed_product("Round table", "12.00").await;
    let client = TestApp::client();

    let groups: Vec<CategoryGroup> = body(
        client
            .get(app.url("/api/categories"))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(groups.len(), 2);

    let filtered: Vec<Product> = body(
        client
            .get(app.url(&format!("/api/products?categoryId={}", item.id)))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(filtered, vec![product.clone()]);

    let shown: Product = body(
        client
            .get(app.url(&format!("/api/products/{}", product.id)))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(shown.category.title, "Folding chair item");
}

#[tokio::test]
async fn test_missing_product_is_not_found() {
    let app = TestApp::spawn().await;
    let resp = TestApp::client()
        .get(app.url("/api/products/999"))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::NOT_FOUND, "not_found").await;
}

#[tokio::test]
async fn test_malformed_path_is_validation_error() {
    let app = TestApp::spawn().await;
    let resp = TestApp::client()
        .get(app.url("/api/products/not-a-number"))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::BAD_REQUEST, "validation").await;
}

#[tokio::test]
async fn test_writes_require_admin() {
    let app = TestApp::spawn().await;
    let draft = json!({ "title": "Tents" });

    let resp = TestApp::client()
        .post(app.url("/api/categories"))
        .json(&draft)
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::UNAUTHORIZED, "authentication").await;

    let customer = app.customer("+15551112222").await;
    let resp = customer
        .post(app.url("/api/categories"))
        .json(&draft)
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::FORBIDDEN, "authorization").await;

    let admin = app.admin().await;
    let resp = admin
        .post(app.url("/api/categories"))
        .json(&draft)
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let group: CategoryGroup = body(resp).await;
    assert_eq!(group.title, "Tents");
}

#[tokio::test]
async fn test_admin_catalog_crud_and_integrity() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;

    let group: CategoryGroup = body(
        admin
            .post(app.url("/api/categories"))
            .json(&json!({ "title": "Decor", "borderColor": "#2a9d8f" }))
            .send()
            .await
            .expect("request"),
    )
    .await;

    let resp = admin
        .post(app.url(&format!("/api/categories/{}/items", group.id)))
        .json(&json!({ "title": "Balloons" }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let item: Value = body(resp).await;
    let item_id = item["id"].as_i64().expect("item id");

    let resp = admin
        .post(app.url("/api/products"))
        .json(&json!({
            "name": "Balloon arch",
            "price": "80.00",
            "categoryId": item_id,
            "stock": 3,
        }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let product: Product = body(resp).await;

    // The item is still referenced by a product.
    let resp = admin
        .delete(app.url(&format!("/api/categories/{}/items/{item_id}", group.id)))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::CONFLICT, "conflict").await;

    // The group still has an item.
    let resp = admin
        .delete(app.url(&format!("/api/categories/{}", group.id)))
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::CONFLICT, "conflict").await;

    let resp = admin
        .put(app.url(&format!("/api/products/{}", product.id)))
        .json(&json!({
            "name": "Balloon arch XL",
            "price": "95.00",
            "categoryId": item_id,
            "stock": 3,
        }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Product = body(resp).await;
    assert_eq!(updated.name, "Balloon arch XL");

    for path in [
        format!("/api/products/{}", product.id),
        format!("/api/categories/{}/items/{item_id}", group.id),
        format!("/api/categories/{}", group.id),
    ] {
        let resp = admin.delete(app.url(&path)).send().await.expect("request");
        assert_eq!(resp.status(), StatusCode::NO_CONTENT, "DELETE {path}");
    }

    let groups: Vec<CategoryGroup> = body(
        TestApp::client()
            .get(app.url("/api/categories"))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert!(groups.is_empty());
}

#[tokio::test]
async fn test_product_validation_error_body() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;

    let resp = admin
        .post(app.url("/api/products"))
        .json(&json!({ "name": "No price" }))
        .send()
        .await
        .expect("request");
    let message = expect_error(resp, StatusCode::BAD_REQUEST, "validation").await;
    assert!(message.contains("price"), "message: {message}");

    let resp = admin
        .post(app.url("/api/products"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::BAD_REQUEST, "validation").await;
}

#[tokio::test]
async fn test_upload_resizes_and_serves_image() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;

    let form = multipart::Form::new().part(
        "file",
        multipart::Part::bytes(png(2400, 600))
            .file_name("banner.png")
            .mime_str("image/png")
            .expect("mime"),
    );
    let resp = admin
        .post(app.url("/api/upload"))
        .multipart(form)
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let uploaded: Value = body(resp).await;
    let reference = uploaded["reference"].as_str().expect("reference");
    assert!(reference.starts_with("/uploads/"));
    assert!(reference.ends_with(".jpg"));

    let resp = TestApp::client()
        .get(app.url(reference))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.bytes().await.expect("image bytes");
    let stored = image::load_from_memory(&bytes).expect("decode stored image");
    assert_eq!((stored.width(), stored.height()), (1200, 300));
}

#[tokio::test]
async fn test_upload_without_resize_keeps_original() {
    let app = TestApp::spawn().await;
    let admin = app.admin().await;
    let original = png(40, 20);

    let form = multipart::Form::new().part(
        "file",
        multipart::Part::bytes(original.clone()).file_name("icon.png"),
    );
    let resp = admin
        .post(app.url("/api/upload?resize=false"))
        .multipart(form)
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let uploaded: Value = body(resp).await;
    let reference = uploaded["reference"].as_str().expect("reference");
    assert!(reference.ends_with(".png"));

    let file_name = reference.trim_start_matches("/uploads/");
    let on_disk = std::fs::read(app.upload_dir().join(file_name)).expect("stored file");
    assert_eq!(on_disk, original);
}

#[tokio::test]
async fn test_upload_rejects_non_image_and_non_admin() {
    let app = TestApp::spawn().await;

    let customer = app.customer("+15553334444").await;
    let form = multipart::Form::new().part("file", multipart::Part::bytes(png(10, 10)));
    let resp = customer
        .post(app.url("/api/upload"))
        .multipart(form)
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::FORBIDDEN, "authorization").await;

    let admin = app.admin().await;
    let form = multipart::Form::new().part("file", multipart::Part::text("plain text"));
    let resp = admin
        .post(app.url("/api/upload"))
        .multipart(form)
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::BAD_REQUEST, "validation").await;

    let form = multipart::Form::new().text("other", "field");
    let resp = admin
        .post(app.url("/api/upload"))
        .multipart(form)
        .send()
        .await
        .expect("request");
    expect_error(resp, StatusCode::BAD_REQUEST, "validation").await;
}
