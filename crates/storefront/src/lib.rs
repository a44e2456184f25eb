//! Partyrent storefront library.
//!
//! JSON API for browsing the rental catalog, managing a cart, submitting
//! orders, and administering the catalog and order queue. The binary in
//! `main.rs` adds the `PostgreSQL` session store, Sentry, and the TCP
//! listener; tests drive [`build_router`] directly.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::{Router, extract::Request, routing::get};
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::services::images::UPLOAD_URL_PREFIX;
use crate::state::AppState;

/// Build the application router without a session layer.
///
/// The caller must add a `tower_sessions::SessionManagerLayer` (see
/// [`middleware::create_session_layer`]) for the auth extractors to work.
pub fn build_router(state: AppState) -> Router {
    let uploads = ServeDir::new(&state.config().upload_dir);

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            request_id = tracing::field::Empty,
        )
    });

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/health/ready", get(routes::health::readiness))
        .merge(routes::routes(state.config()))
        .nest_service(UPLOAD_URL_PREFIX, uploads)
        .layer(
            ServiceBuilder::new()
                .layer(trace)
                .layer(axum::middleware::from_fn(middleware::request_id_middleware))
                .layer(axum::middleware::from_fn(
                    middleware::security_headers_middleware,
                )),
        )
        .with_state(state)
}
