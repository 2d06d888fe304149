//! JSON HTTP API.

mod auth;
mod handlers;
mod json;
#[cfg(test)]
mod tests;

pub use auth::USER_ID_HEADER;

use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, patch, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::db::Database;
use crate::watcher::StockWatcher;

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub watcher: StockWatcher,
}

/// Build the axum router (separated for testing).
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/products",
            get(handlers::list_products).post(handlers::create_product),
        )
        .route(
            "/api/products/:id",
            get(handlers::get_product)
                .patch(handlers::update_product)
                .delete(handlers::delete_product),
        )
        .route(
            "/api/products/:id/stock-alert",
            post(handlers::subscribe_stock_alert).delete(handlers::unsubscribe_stock_alert),
        )
        .route("/api/stock-alerts", get(handlers::my_stock_alerts))
        .route("/api/users", post(handlers::register_user))
        .route("/api/users/me", get(handlers::me))
        .route("/api/users/me/email", put(handlers::update_my_email))
        .route(
            "/api/orders",
            get(handlers::list_orders).post(handlers::create_order),
        )
        .route("/api/orders/:id", get(handlers::get_order))
        .route("/api/orders/:id/status", patch(handlers::update_order_status))
        .route(
            "/api/contact",
            get(handlers::list_contact_messages).post(handlers::create_contact_message),
        )
        .route("/api/contact/:id/status", patch(handlers::update_contact_status))
        .route("/api/newsletter", post(handlers::newsletter_signup))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(state: AppState, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "storefront API listening");
    axum::serve(listener, router(state)).await
}
