//! Tether CLI - operator tooling for the tether gateway.
//!
//! This is the entry point for the `tetherctl` binary.

mod client;
mod types;

use clap::{Parser, Subcommand};

use client::GatewayClient;
use types::{BrokerLoginRequest, ConnectionNotification};

/// Tether CLI - inspect and manage user connections.
#[derive(Parser, Debug)]
#[command(name = "tetherctl")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Gateway URL.
    #[arg(long, env = "TETHER_GATEWAY", default_value = "http://localhost:8080")]
    gateway: String,

    /// API key for the user routes.
    #[arg(long, env = "TETHER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Print raw JSON instead of a summary.
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the gateway is up.
    Health,

    /// List the users that have connected apps.
    Owners,

    /// List a user's connected apps.
    Connections {
        /// Chat-platform user id.
        user_id: String,
    },

    /// Show the credentials a search for this user would use.
    Credentials {
        /// Chat-platform user id.
        user_id: String,
        /// Email hint to pass along.
        #[arg(long)]
        email: Option<String>,
    },

    /// Disconnect an app from a user.
    Disconnect {
        /// Chat-platform user id.
        user_id: String,
        /// App name, e.g. `google_drive`.
        app: String,
    },

    /// Create a connect link so the user can authorize an app.
    Connect {
        /// Chat-platform user id.
        user_id: String,
    },

    /// Record that a user signed in at the broker.
    BrokerLogin {
        /// Chat-platform user id.
        user_id: String,
        /// The broker's id for the user.
        external_user_id: String,
        /// Email reported by the broker.
        #[arg(long)]
        email: Option<String>,
    },

    /// Deliver a connection notification by hand.
    Ingest {
        /// Owning user.
        #[arg(long)]
        owner: String,
        /// App name.
        #[arg(long)]
        app: String,
        /// Broker account id.
        #[arg(long)]
        account: String,
        /// Account email.
        #[arg(long)]
        email: Option<String>,
        /// Event type.
        #[arg(long, default_value = "CONNECTION_SUCCESS")]
        event: String,
        /// Webhook shared secret.
        #[arg(long, env = "TETHER_WEBHOOK_SECRET", hide_env_values = true)]
        webhook_secret: Option<String>,
    },
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.debug {
        tracing_subscriber::fmt()
            .with_env_filter("tether_cli=debug,warn")
            .with_writer(std::io::stderr)
            .init();
    }

    let client = GatewayClient::new(&args.gateway, args.api_key.clone())?;
    tracing::debug!(gateway = %client.base_url(), command = ?args.command, "Running command");

    run(&client, args.command, args.json).await
}

async fn run(client: &GatewayClient, command: Command, json: bool) -> anyhow::Result<()> {
    match command {
        Command::Health => {
            let health = client.health().await?;
            println!("{} (v{})", health.status, health.version);
        }

        Command::Owners => {
            let owners = client.owners().await?;
            if json {
                return print_json(&owners);
            }
            if owners.owners.is_empty() {
                println!("no users have connected apps");
            }
            for owner in &owners.owners {
                println!("{owner}");
            }
        }

        Command::Connections { user_id } => {
            let connections = client.connections(&user_id).await?;
            if json {
                return print_json(&connections);
            }
            if connections.apps.is_empty() {
                println!("{user_id} has no connected apps");
            }
            for app in &connections.apps {
                println!(
                    "{:<24} {:<28} {}",
                    app.app,
                    app.account_id,
                    app.connected_at.format("%Y-%m-%d %H:%M")
                );
            }
        }

        Command::Credentials { user_id, email } => {
            let bundle = client.credentials(&user_id, email.as_deref()).await?;
            if json {
                return print_json(&bundle);
            }
            println!("source:   {} ({})", bundle.auth_source, bundle.connection_quality);
            println!("identity: {}", bundle.external_user_id);
            println!("email:    {}", bundle.user_email.as_deref().unwrap_or("-"));
            println!("dynamic:  {}", bundle.dynamic);
            println!("accounts: {}", bundle.account_ids.join(", "));
        }

        Command::Disconnect { user_id, app } => {
            let result = client.disconnect(&user_id, &app).await?;
            if json {
                print_json(&result)?;
            } else {
                println!("{}", result.message);
                println!("{} app(s) still connected", result.remaining_connections);
            }
            if !result.success && result.outcome != "not-connected" {
                anyhow::bail!("disconnect did not complete ({})", result.outcome);
            }
        }

        Command::Connect { user_id } => {
            let link = client.connect_link(&user_id).await?;
            if json {
                return print_json(&link);
            }
            println!("{}", link.connect_url);
            println!("expires {}", link.expires_at.format("%Y-%m-%d %H:%M UTC"));
        }

        Command::BrokerLogin {
            user_id,
            external_user_id,
            email,
        } => {
            let request = BrokerLoginRequest {
                external_user_id,
                email,
            };
            let user = client.broker_login(&user_id, &request).await?;
            if json {
                return print_json(&user);
            }
            println!(
                "{} linked to broker id {}",
                user.user_id,
                user.external_user_id.as_deref().unwrap_or("-")
            );
        }

        Command::Ingest {
            owner,
            app,
            account,
            email,
            event,
            webhook_secret,
        } => {
            let notification = ConnectionNotification {
                event,
                external_user_id: owner,
                app,
                account_id: account,
                email,
            };
            let receipt = client
                .ingest(&notification, webhook_secret.as_deref())
                .await?;
            match (receipt.app, receipt.persisted) {
                (Some(app), Some(false)) => {
                    println!("{}: {app} (cached only, store write failed)", receipt.status);
                }
                (Some(app), _) => println!("{}: {app}", receipt.status),
                _ => println!("{}", receipt.status),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_disconnect() {
        let args = Args::try_parse_from(["tetherctl", "disconnect", "U1", "google_drive"]).unwrap();
        match args.command {
            Command::Disconnect { user_id, app } => {
                assert_eq!(user_id, "U1");
                assert_eq!(app, "google_drive");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let args = Args::try_parse_from([
            "tetherctl",
            "--gateway",
            "http://gw:9000",
            "credentials",
            "U1",
            "--email",
            "a@example.com",
            "--json",
        ])
        .unwrap();
        assert!(args.json);
        assert_eq!(args.gateway, "http://gw:9000");
        assert!(matches!(
            args.command,
            Command::Credentials { email: Some(ref e), .. } if e == "a@example.com"
        ));
    }

    #[test]
    fn ingest_defaults_to_success_event() {
        let args = Args::try_parse_from([
            "tetherctl", "ingest", "--owner", "U1", "--app", "drive", "--account", "A1",
        ])
        .unwrap();
        match args.command {
            Command::Ingest { event, .. } => assert_eq!(event, "CONNECTION_SUCCESS"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_owners() {
        let args = Args::try_parse_from(["tetherctl", "owners", "--json"]).unwrap();
        assert!(args.json);
        assert!(matches!(args.command, Command::Owners));
    }

    #[test]
    fn broker_login_requires_external_id() {
        assert!(Args::try_parse_from(["tetherctl", "broker-login", "U1"]).is_err());
    }
}
