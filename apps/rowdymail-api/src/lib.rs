//! RowdyMail API Server
//!
//! REST surface over `rowdymail-core`:
//!
//! - Inbound mail webhooks (JSON forwarder, ImprovMX multipart)
//! - Mailbox provider proxy (`/api/emails`)
//! - Disposable address and stored message management
//! - Background expiry sweep
//!
//! The binary adds per-IP rate limiting on top of [`router`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use rowdymail_core::AddressService;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use state::AppState;

/// All routes with tracing and CORS, bound to `state`
pub fn router(state: Arc<AppState>) -> Router {
    // CORS configuration for web clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Inbound webhooks carry attachments inline
    let webhooks = Router::new()
        .route(
            "/api/webhook/email",
            get(handlers::webhook::email_status).post(handlers::webhook::receive_json),
        )
        .route(
            "/api/webhook/improvmx",
            get(handlers::webhook::improvmx_status).post(handlers::webhook::receive_improvmx),
        )
        .layer(DefaultBodyLimit::max(state.max_body_bytes));

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        .merge(webhooks)
        // Provider proxy
        .route(
            "/api/emails",
            get(handlers::emails::list).post(handlers::emails::dispatch),
        )
        // Addresses
        .route(
            "/api/addresses",
            get(handlers::addresses::list).post(handlers::addresses::create),
        )
        .route("/api/addresses/stats", get(handlers::addresses::stats))
        .route("/api/addresses/:id", delete(handlers::addresses::deactivate))
        .route(
            "/api/addresses/:id/messages",
            get(handlers::addresses::address_messages),
        )
        // Stored messages
        .route("/api/messages", get(handlers::addresses::user_messages))
        .route("/api/messages/:id", delete(handlers::addresses::delete_message))
        .route("/api/messages/:id/read", post(handlers::addresses::mark_read))
        // Maintenance
        .route("/api/maintenance/cleanup", post(handlers::addresses::cleanup))
        // Add middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Deactivate expired addresses every `period`
///
/// The first sweep runs immediately. Abort the handle to stop it.
pub fn spawn_cleanup_sweep(addresses: AddressService, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match addresses.cleanup_expired().await {
                Ok(count) => info!(count, "Expiry sweep complete"),
                Err(e) => warn!(error = %e, "Expiry sweep failed"),
            }
        }
    })
}
