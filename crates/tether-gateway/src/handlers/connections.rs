//! User connection endpoints.
//!
//! Credential resolution, disconnection, listing, connect links, and broker
//! sign-in bookkeeping, all keyed by the chat-platform user id in the path.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tether_connections::{
    AccountId, AppName, ConnectLink, ConnectionRecord, ConnectionService, CredentialBundle,
    DisconnectOutcome, ExternalUserId, User, UserId,
};
use tether_store::ConnectionStatus;

use crate::auth::ApiCaller;
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::state::GatewayState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query parameters for credential resolution.
#[derive(Debug, Default, Deserialize)]
pub struct CredentialsQuery {
    /// Caller-supplied email hint.
    #[serde(default)]
    pub email: Option<String>,
}

/// One connected app.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedAppResponse {
    /// Normalized app name.
    pub app: AppName,
    /// Broker account id.
    pub account_id: AccountId,
    /// When the app was connected.
    pub connected_at: DateTime<Utc>,
}

/// Response for the connection listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionsResponse {
    /// Owner of the connections.
    pub user_id: UserId,
    /// Record status.
    pub status: ConnectionStatus,
    /// Last-known account email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_email: Option<String>,
    /// Connected apps in connection order.
    pub apps: Vec<ConnectedAppResponse>,
}

impl From<ConnectionRecord> for ConnectionsResponse {
    fn from(record: ConnectionRecord) -> Self {
        let apps = record
            .links()
            .iter()
            .map(|link| ConnectedAppResponse {
                app: link.app_name.clone(),
                account_id: link.account_id.clone(),
                connected_at: link.connected_at,
            })
            .collect();

        Self {
            user_id: record.owner,
            status: record.status,
            account_email: record.account_email,
            apps,
        }
    }
}

/// Response for the owner listing.
#[derive(Debug, Serialize)]
pub struct OwnersResponse {
    /// Every user with a connection record.
    pub owners: Vec<UserId>,
}

/// Request body for recording a broker sign-in.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerLoginBody {
    /// The broker's id for the signed-in user.
    pub external_user_id: String,
    /// Email reported by the broker.
    #[serde(default)]
    pub email: Option<String>,
}

/// Response for a recorded broker sign-in.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    /// User id.
    pub user_id: UserId,
    /// Known email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Broker id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_user_id: Option<ExternalUserId>,
    /// First seen.
    pub created_at: DateTime<Utc>,
    /// Last broker sign-in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            email: user.email,
            external_user_id: user.broker_external_id,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Resolve the credentials for an outbound search call.
///
/// Always answers 200; degraded results show in `authSource` and
/// `connectionQuality`.
///
/// ```text
/// GET /v1/users/U1/credentials?email=someone@example.com
/// ```
pub async fn get_credentials<C>(
    State(state): State<Arc<GatewayState<C>>>,
    _caller: ApiCaller,
    Path(user_id): Path<String>,
    Query(query): Query<CredentialsQuery>,
) -> Result<Json<CredentialBundle>, ApiError>
where
    C: ConnectionService + 'static,
{
    let user_id: UserId = user_id.parse()?;
    let bundle = state
        .connections
        .resolve_credentials(&user_id, query.email.as_deref())
        .await;

    tracing::debug!(
        user_id = %user_id,
        auth_source = ?bundle.auth_source,
        accounts = bundle.account_ids.len(),
        "Resolved credentials"
    );

    Ok(Json(bundle))
}

/// Disconnect one app.
///
/// The body is always a disconnect result. The status code separates a
/// completed or no-op disconnect (200) from a lookup failure (503) and a
/// broker-side or cleanup failure (502).
pub async fn disconnect_app<C>(
    State(state): State<Arc<GatewayState<C>>>,
    _caller: ApiCaller,
    Path((user_id, app)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ConnectionService + 'static,
{
    let user_id: UserId = user_id.parse()?;
    let app: AppName = app.parse()?;

    let result = state.connections.disconnect(&user_id, &app).await;
    let status = match result.outcome {
        DisconnectOutcome::Disconnected | DisconnectOutcome::NotConnected => StatusCode::OK,
        DisconnectOutcome::LookupFailed => StatusCode::SERVICE_UNAVAILABLE,
        DisconnectOutcome::FailedAtBroker | DisconnectOutcome::FailedAfterBroker => {
            StatusCode::BAD_GATEWAY
        }
    };

    Ok((status, Json(result)))
}

/// List the user's stored connections.
pub async fn list_connections<C>(
    State(state): State<Arc<GatewayState<C>>>,
    _caller: ApiCaller,
    Path(user_id): Path<String>,
) -> Result<Json<ConnectionsResponse>, ApiError>
where
    C: ConnectionService + 'static,
{
    let user_id: UserId = user_id.parse()?;
    let record = state.connections.list_connections(&user_id).await?;
    Ok(Json(ConnectionsResponse::from(record)))
}

/// List every user with a connection record.
///
/// ```text
/// GET /v1/users
///
/// Response: 200 OK
/// {"owners": ["U1", "U2"]}
/// ```
pub async fn list_owners<C>(
    State(state): State<Arc<GatewayState<C>>>,
    _caller: ApiCaller,
) -> Result<Json<OwnersResponse>, ApiError>
where
    C: ConnectionService + 'static,
{
    let mut owners = state.connections.list_owners().await?;
    owners.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    Ok(Json(OwnersResponse { owners }))
}

/// Create a broker connect link so the user can authorize another app.
pub async fn create_connect_link<C>(
    State(state): State<Arc<GatewayState<C>>>,
    _caller: ApiCaller,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ConnectionService + 'static,
{
    let user_id: UserId = user_id.parse()?;
    let link: ConnectLink = state.connections.create_connect_link(&user_id).await?;
    Ok((StatusCode::CREATED, Json(link)))
}

/// Record that the user signed in at the broker.
pub async fn record_broker_login<C>(
    State(state): State<Arc<GatewayState<C>>>,
    _caller: ApiCaller,
    Path(user_id): Path<String>,
    JsonBody(body): JsonBody<BrokerLoginBody>,
) -> Result<Json<UserResponse>, ApiError>
where
    C: ConnectionService + 'static,
{
    let user_id: UserId = user_id.parse()?;
    let external_user_id: ExternalUserId = body.external_user_id.parse()?;

    let user = state
        .connections
        .record_broker_login(&user_id, &external_user_id, body.email.as_deref())
        .await?;

    Ok(Json(UserResponse::from(user)))
}
