//! HTTP gateway for tether.
//!
//! This crate exposes the connection service over HTTP:
//!
//! - Broker webhook ingestion, guarded by a shared secret
//! - Credential resolution, disconnection, and connection listing per user
//! - Connect-link creation and broker sign-in bookkeeping
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether_broker::{BrokerConfig, HttpBrokerClient};
//! use tether_connections::{
//!     ConnectionManager, ConnectionsConfig, InMemoryConnectionCache, NoopSearchBackend,
//! };
//! use tether_gateway::{create_router, GatewayConfig, GatewayState};
//! use tether_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/tether")?);
//! let manager = Arc::new(ConnectionManager::new(
//!     store,
//!     Arc::new(InMemoryConnectionCache::new()),
//!     Arc::new(HttpBrokerClient::new(BrokerConfig::default())),
//!     Arc::new(NoopSearchBackend::new()),
//!     ConnectionsConfig::default(),
//! ));
//!
//! let state = GatewayState::new(manager, GatewayConfig::default());
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod routes;
pub mod state;

pub use auth::{ApiCaller, WebhookSender};
pub use config::GatewayConfig;
pub use error::ApiError;
pub use extract::JsonBody;
pub use routes::create_router;
pub use state::GatewayState;
