//! Integration tests for Partyrent.
//!
//! Each test spawns the full storefront router on an ephemeral port, backed
//! by the in-memory stores, an in-memory session store, a temporary upload
//! directory, and an SMS outbox. No database is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p partyrent-integration-tests
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower_sessions::MemoryStore as SessionMemoryStore;

use partyrent_core::{CategoryItem, Dimensions, Product, UserRole};
use partyrent_storefront::{
    build_router,
    config::StorefrontConfig,
    middleware::create_session_layer,
    services::auth::Registration,
    services::catalog::{GroupDraft, ItemDraft, ProductDraft},
    services::images::LocalImageStore,
    services::sms::OutboxSmsSender,
    state::{AppState, Stores},
};

/// Password used for every test account.
pub const PASSWORD: &str = "correct horse battery";

/// A running storefront.
pub struct TestApp {
    pub base_url: String,
    pub state: AppState,
    pub sms: Arc<OutboxSmsSender>,
    uploads: TempDir,
}

impl TestApp {
    /// Spawn with the pending-order cart guard on.
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn after adjusting the default test configuration.
    pub async fn spawn_with(configure: impl FnOnce(&mut StorefrontConfig)) -> Self {
        let uploads = tempfile::tempdir().expect("Failed to create upload dir");
        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Listener has no address");

        let mut config = StorefrontConfig {
            database_url: "postgres://unused".to_owned().into(),
            host: addr.ip(),
            port: addr.port(),
            base_url: format!("http://{addr}")
                .parse()
                .expect("Test base URL is valid"),
            upload_dir: uploads.path().to_path_buf(),
            rate_limit: false,
            block_cart_while_pending: true,
            sentry_dsn: None,
            sentry_environment: None,
        };
        configure(&mut config);

        let sms = Arc::new(OutboxSmsSender::new());
        let state = AppState::from_parts(
            config.clone(),
            Stores::memory(),
            Arc::new(LocalImageStore::new(&config.upload_dir)),
            sms.clone(),
            None,
        );

        let app = build_router(state.clone())
            .layer(create_session_layer(SessionMemoryStore::default(), &config));

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("Test server failed");
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            sms,
            uploads,
        }
    }

    /// Absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Directory holding uploaded images.
    pub fn upload_dir(&self) -> PathBuf {
        self.uploads.path().to_path_buf()
    }

    /// A client that keeps the session cookie.
    pub fn client() -> Client {
        Client::builder()
            .cookie_store(true)
            .build()
            .expect("Failed to create HTTP client")
    }

    /// Register a customer over HTTP and return the logged-in client.
    pub async fn customer(&self, phone: &str) -> Client {
        let client = Self::client();
        let resp = client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "firstName": "Test",
                "lastName": "Customer",
                "phone": phone,
                "password": PASSWORD,
            }))
            .send()
            .await
            .expect("Register request failed");
        assert_eq!(resp.status(), StatusCode::CREATED);
        client
    }

    /// Create the admin account directly and log it in over HTTP. Call once
    /// per app.
    pub async fn admin(&self) -> Client {
        let phone = "+15550000001";
        self.state
            .auth()
            .register_with_role(
                Registration {
                    first_name: "Shop",
                    last_name: "Admin",
                    phone,
                    password: PASSWORD,
                    email: None,
                },
                UserRole::Admin,
            )
            .await
            .expect("Failed to create admin");

        let client = Self::client();
        let resp = client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "phone": phone, "password": PASSWORD }))
            .send()
            .await
            .expect("Login request failed");
        assert_eq!(resp.status(), StatusCode::OK);
        client
    }

    /// Create a group, an item, and one product priced `price`.
    pub async fn seed_product(&self, name: &str, price: &str) -> (CategoryItem, Product) {
        let catalog = self.state.catalog();
        let group = catalog
            .create_group(GroupDraft {
                title: format!("{name} group"),
                border_color: None,
            })
            .await
            .expect("Failed to create group");
        let item = catalog
            .create_item(
                group.id,
                ItemDraft {
                    title: format!("{name} item"),
                    image: None,
                },
            )
            .await
            .expect("Failed to create item");
        let product = catalog
            .create_product(ProductDraft {
                name: name.to_owned(),
                price: Some(price.parse().expect("Test price is a decimal")),
                thumbnail: None,
                image: None,
                category_id: Some(item.id),
                description: String::new(),
                dimensions: Dimensions::default(),
                stock: 10,
            })
            .await
            .expect("Failed to create product");
        (item, product)
    }
}

/// Parse a response body, panicking with the body text on failure.
pub async fn body<T: DeserializeOwned>(resp: Response) -> T {
    let text = resp.text().await.expect("Failed to read body");
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("unexpected body {text}: {e}"))
}

/// Assert the JSON error body and return its message.
pub async fn expect_error(resp: Response, status: StatusCode, kind: &str) -> String {
    assert_eq!(resp.status(), status);
    let value: Value = body(resp).await;
    assert_eq!(value["error"]["kind"], kind, "error body: {value}");
    value["error"]["message"]
        .as_str()
        .expect("error message is a string")
        .to_owned()
}
