//! Request authentication extractors.
//!
//! Two shared secrets guard the gateway: an API key for the user routes and a
//! webhook secret for broker notifications. Each check is skipped when its
//! secret is not configured.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use tether_connections::ConnectionService;

use crate::error::ApiError;
use crate::state::GatewayState;

/// Header carrying the webhook shared secret.
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// Compare two secrets without leaking the position of the first mismatch.
///
/// Both sides are hashed first; `blake3::Hash` equality is constant time.
#[must_use]
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    blake3::hash(presented.as_bytes()) == blake3::hash(expected.as_bytes())
}

/// A caller that presented the configured API key.
///
/// Validates the `Authorization: Bearer <key>` header. Requests pass through
/// untouched when no API key is configured.
#[derive(Debug, Clone, Copy)]
pub struct ApiCaller;

impl<C> FromRequestParts<Arc<GatewayState<C>>> for ApiCaller
where
    C: ConnectionService + 'static,
{
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<GatewayState<C>>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let Some(expected) = state.config.api_key.as_deref() else {
                return Ok(ApiCaller);
            };

            let token = parts
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .ok_or(ApiError::Unauthorized)?;

            if secrets_match(token, expected) {
                Ok(ApiCaller)
            } else {
                tracing::debug!("Rejected request with invalid API key");
                Err(ApiError::Unauthorized)
            }
        })
    }
}

/// A webhook delivery that carried the configured shared secret.
#[derive(Debug, Clone, Copy)]
pub struct WebhookSender;

impl<C> FromRequestParts<Arc<GatewayState<C>>> for WebhookSender
where
    C: ConnectionService + 'static,
{
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<GatewayState<C>>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let Some(expected) = state.config.webhook_secret.as_deref() else {
                return Ok(WebhookSender);
            };

            let presented = parts
                .headers
                .get(WEBHOOK_SECRET_HEADER)
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            if secrets_match(presented, expected) {
                Ok(WebhookSender)
            } else {
                tracing::warn!("Rejected webhook with invalid secret");
                Err(ApiError::Unauthorized)
            }
        })
    }
}
