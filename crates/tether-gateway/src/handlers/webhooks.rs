//! Broker notification endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::Value;

use tether_connections::{ConnectionService, IngestReceipt};

use crate::auth::WebhookSender;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::GatewayState;

/// Ingest a connection notification from the broker.
///
/// Responds 200 once the mandatory fields are present, even when the store
/// rejected the write; the receipt reports what actually happened. Missing
/// fields produce a 400 listing every absent field, and a body that is not
/// JSON gets a plain `bad_request`.
///
/// ```text
/// POST /v1/webhooks/connections
/// {"event": "CONNECTION_SUCCESS", "external_user_id": "U1",
///  "app": "drive", "account_id": "A1"}
///
/// Response: 200 OK
/// {"status": "stored", "owner": "U1", "app": "drive", "accountId": "A1", ...}
/// ```
pub async fn ingest_connection<C>(
    State(state): State<Arc<GatewayState<C>>>,
    _sender: WebhookSender,
    JsonBody(payload): JsonBody<Value>,
) -> Result<Json<IngestReceipt>, ApiError>
where
    C: ConnectionService + 'static,
{
    let receipt = state.connections.ingest(&payload).await.map_err(|e| {
        tracing::warn!(error = %e, "Rejected connection notification");
        ApiError::from(e)
    })?;

    Ok(Json(receipt))
}
