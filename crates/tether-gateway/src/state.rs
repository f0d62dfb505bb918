//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use tether_connections::ConnectionService;

use crate::config::GatewayConfig;

/// Shared application state for the gateway.
pub struct GatewayState<C>
where
    C: ConnectionService,
{
    /// The connection service behind every route.
    pub connections: Arc<C>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<C> GatewayState<C>
where
    C: ConnectionService,
{
    /// Create a new gateway state.
    #[must_use]
    pub fn new(connections: Arc<C>, config: GatewayConfig) -> Self {
        Self {
            connections,
            config,
        }
    }
}

impl<C> Clone for GatewayState<C>
where
    C: ConnectionService,
{
    fn clone(&self) -> Self {
        Self {
            connections: Arc::clone(&self.connections),
            config: self.config.clone(),
        }
    }
}
