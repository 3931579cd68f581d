//! KYC Registry
//!
//! Confidential KYC submission and review: one record per identity, encrypted
//! fields stored as relayer handles, and an owner-controlled
//! Pending → Verified / Rejected workflow.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod registry;
pub mod services;

pub use handlers::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))

        // KYC records
        .route("/api/v1/kyc", post(handlers::submit_kyc))
        .route("/api/v1/kyc/:address", get(handlers::get_kyc_status))
        .route("/api/v1/kyc/:address/data", get(handlers::get_kyc_data))
        .route("/api/v1/kyc/:address/verify", post(handlers::verify_kyc))
        .route("/api/v1/kyc/:address/reject", post(handlers::reject_kyc))

        // Registry-wide views and administration
        .route("/api/v1/registry/pending-count", get(handlers::pending_count))
        .route("/api/v1/registry/users", get(handlers::registered_users))
        .route(
            "/api/v1/registry/owner",
            get(handlers::get_owner).post(handlers::transfer_ownership),
        )
        .route("/api/v1/registry/events", get(handlers::list_events))

        // Decryption and documents
        .route("/api/v1/decrypt", post(handlers::decrypt))
        .route("/api/v1/documents", post(handlers::upload_document))
        .route("/api/v1/documents/:cid", get(handlers::get_document))
        .route("/api/v1/relayer/encrypt", post(handlers::relayer_encrypt))

        // State
        .with_state(state)

        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
