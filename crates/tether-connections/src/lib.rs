//! Connection and credential resolution for tether.
//!
//! This crate owns the business logic: recording connections reported by
//! the authorization broker, disconnecting apps across every system that
//! knows about them, and resolving the credentials an outbound search call
//! needs.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Gateway (HTTP)                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ConnectionManager                         │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐   │
//! │  │  Ingestion  │ │ Disconnect  │ │ Credential Resolver │   │
//! │  │  Pipeline   │ │ Workflow    │ │ (ordered tiers)     │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌──────────────┬────┴─────────┬──────────────┐
//!          ▼              ▼              ▼              ▼
//!    ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//!    │  Store   │   │  Cache   │   │  Broker  │   │  Search  │
//!    │ (RocksDB)│   │ (memory) │   │  (REST)  │   │  (REST)  │
//!    └──────────┘   └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether_broker::{BrokerConfig, HttpBrokerClient};
//! use tether_connections::{
//!     ConnectionManager, ConnectionService, ConnectionsConfig, InMemoryConnectionCache,
//!     NoopSearchBackend,
//! };
//! use tether_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/tether")?);
//! let manager = ConnectionManager::new(
//!     store,
//!     Arc::new(InMemoryConnectionCache::new()),
//!     Arc::new(HttpBrokerClient::new(BrokerConfig::default())),
//!     Arc::new(NoopSearchBackend::new()),
//!     ConnectionsConfig::default(),
//! );
//!
//! let bundle = manager.resolve_credentials(&"U1".parse()?, None).await;
//! println!("{:?} via {:?}", bundle.account_ids, bundle.auth_source);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cache;
mod disconnect;
pub mod error;
pub mod ingestion;
pub mod resolver;
pub mod search_client;
pub mod service;
pub mod types;

pub use cache::{CacheSource, CachedConnection, ConnectionCache, InMemoryConnectionCache};
pub use error::{ConnectionError, Result};
pub use resolver::{CredentialResolver, ResolveRequest, ResolverTier};
pub use search_client::{HttpSearchBackend, NoopSearchBackend, SearchBackend};
pub use service::{ConnectionManager, ConnectionService};
pub use types::{
    AuthSource, ConnectLink, ConnectionQuality, ConnectionsConfig, CredentialBundle,
    DisconnectOutcome, DisconnectResult, IngestReceipt, StoredConnection,
};

// Re-export commonly used types from dependencies for convenience
pub use tether_core::{AccountId, AppName, ExternalUserId, UserId};
pub use tether_store::{ConnectionRecord, User};
