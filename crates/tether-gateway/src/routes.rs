//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use tether_connections::ConnectionService;

use crate::handlers::{connections, health, webhooks};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Broker (webhook secret)
/// - `POST /v1/webhooks/connections` - Ingest a connection notification
///
/// ## Users (API key)
/// - `GET /v1/users` - List users with connections
/// - `GET /v1/users/:user_id/credentials` - Resolve search credentials
/// - `GET /v1/users/:user_id/connections` - List connections
/// - `DELETE /v1/users/:user_id/connections/:app` - Disconnect an app
/// - `POST /v1/users/:user_id/connect` - Create a connect link
/// - `POST /v1/users/:user_id/broker-login` - Record a broker sign-in
pub fn create_router<C>(state: GatewayState<C>) -> Router
where
    C: ConnectionService + 'static,
{
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);
    let state = Arc::new(state);

    Router::new()
        // Health (public)
        .route("/health", get(health::health))
        // Broker notifications
        .route(
            "/v1/webhooks/connections",
            post(webhooks::ingest_connection::<C>),
        )
        // Users
        .route("/v1/users", get(connections::list_owners::<C>))
        .route(
            "/v1/users/:user_id/credentials",
            get(connections::get_credentials::<C>),
        )
        .route(
            "/v1/users/:user_id/connections",
            get(connections::list_connections::<C>),
        )
        .route(
            "/v1/users/:user_id/connections/:app",
            delete(connections::disconnect_app::<C>),
        )
        .route(
            "/v1/users/:user_id/connect",
            post(connections::create_connect_link::<C>),
        )
        .route(
            "/v1/users/:user_id/broker-login",
            post(connections::record_broker_login::<C>),
        )
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(RequestBodyLimitLayer::new(max_body_bytes))
                .layer(TimeoutLayer::new(Duration::from_secs(
                    request_timeout_seconds,
                ))),
        )
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
