//! Tether Gateway - HTTP API for connection ingestion and credential resolution
//!
//! This is the main entry point for the gateway service. All configuration
//! comes from environment variables.
//!
//! # Broker Authentication
//!
//! Set `BROKER_CLIENT_ID` and `BROKER_CLIENT_SECRET` to use OAuth client
//! credentials; otherwise `BROKER_API_KEY` is sent as a bearer token.
//!
//! # Search Backend
//!
//! Set `SEARCH_BASE_URL` to keep the search backend in sync with connections.
//! If not set, sync and forget calls are skipped.

use std::str::FromStr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether_broker::{BrokerConfig, BrokerCredentials, HttpBrokerClient};
use tether_connections::{
    AccountId, ConnectionManager, ConnectionsConfig, HttpSearchBackend, InMemoryConnectionCache,
    NoopSearchBackend, SearchBackend, UserId,
};
use tether_gateway::self_test::spawn_self_test;
use tether_gateway::{create_router, GatewayConfig, GatewayState};
use tether_store::RocksStore;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(name: &str, default: T) -> Result<T, BoxError>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_opt(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| -> BoxError { format!("invalid {name}: {e}").into() }),
        None => Ok(default),
    }
}

fn broker_credentials() -> BrokerCredentials {
    match (env_opt("BROKER_CLIENT_ID"), env_opt("BROKER_CLIENT_SECRET")) {
        (Some(client_id), Some(client_secret)) => BrokerCredentials::ClientCredentials {
            client_id,
            client_secret,
        },
        _ => {
            let api_key = env_opt("BROKER_API_KEY").unwrap_or_default();
            if api_key.is_empty() {
                tracing::warn!("No broker credentials set - broker calls will be rejected");
            }
            BrokerCredentials::ApiKey(api_key)
        }
    }
}

fn default_account_ids() -> Result<Vec<AccountId>, BoxError> {
    let Some(raw) = env_opt("DEFAULT_ACCOUNT_IDS") else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<AccountId>()
                .map_err(|e| -> BoxError {
                    format!("invalid DEFAULT_ACCOUNT_IDS entry {id:?}: {e}").into()
                })
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tether=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tether Gateway");

    // Load configuration from environment
    let data_dir = env_or("DATA_DIR", "/data/tether");
    let search_base_url = env_opt("SEARCH_BASE_URL");

    let gateway_config = GatewayConfig {
        listen_addr: env_or("LISTEN_ADDR", "0.0.0.0:8080"),
        webhook_secret: env_opt("WEBHOOK_SECRET"),
        api_key: env_opt("API_KEY"),
        self_test_delay_seconds: env_parse("SELF_TEST_DELAY_SECONDS", 5)?,
        ..GatewayConfig::default()
    };

    let broker_config = BrokerConfig {
        base_url: env_or("BROKER_BASE_URL", "http://localhost:8090"),
        project_id: env_or("BROKER_PROJECT_ID", "default"),
        credentials: broker_credentials(),
        timeout_seconds: env_parse("BROKER_TIMEOUT_SECONDS", 10)?,
    };

    let connections_config = ConnectionsConfig {
        default_external_user_id: env_or("DEFAULT_EXTERNAL_USER_ID", "default"),
        default_email: env_opt("DEFAULT_EMAIL"),
        default_account_ids: default_account_ids()?,
        broker_timeout_seconds: broker_config.timeout_seconds,
        ..ConnectionsConfig::default()
    };

    tracing::info!(
        gateway = ?gateway_config,
        data_dir = %data_dir,
        broker_base_url = %broker_config.base_url,
        broker_project_id = %broker_config.project_id,
        search_base_url = ?search_base_url,
        default_accounts = connections_config.default_account_ids.len(),
        "Gateway configuration loaded"
    );

    // Initialize RocksDB store
    tracing::info!(path = %data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&data_dir)?);

    let search: Arc<dyn SearchBackend> = match search_base_url {
        Some(url) => {
            tracing::info!(search_base_url = %url, "Search backend sync enabled");
            Arc::new(HttpSearchBackend::new(url))
        }
        None => {
            tracing::warn!("No SEARCH_BASE_URL set - running without search backend sync");
            Arc::new(NoopSearchBackend::new())
        }
    };

    let self_test_user = connections_config
        .default_external_user_id
        .parse::<UserId>();

    let manager = Arc::new(ConnectionManager::new(
        store,
        Arc::new(InMemoryConnectionCache::new()),
        Arc::new(HttpBrokerClient::new(broker_config)),
        search,
        connections_config,
    ));
    tracing::info!("Connection service initialized");

    match self_test_user {
        Ok(user_id) => {
            // Detached; the task logs its own result.
            drop(spawn_self_test(
                Arc::clone(&manager),
                user_id,
                gateway_config.self_test_delay(),
            ));
        }
        Err(e) => tracing::warn!(error = %e, "Skipping self-test: invalid default identity"),
    }

    let listen_addr = gateway_config.listen_addr.clone();
    let state = GatewayState::new(manager, gateway_config);
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
