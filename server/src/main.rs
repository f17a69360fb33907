use clap::Parser;
use log::{error, info};
use server::api::{self, ApiState, ApiTokens};
use server::catalog::load_catalog;
use server::store::{Database, RetryPolicy};
use server::sweeper::spawn_retry_sweeper;
use server::{DeliveryConfig, DeliveryOrchestrator, RconClient, SecretStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP address to bind to
    #[arg(short = 'H', long, env = "DELIVERY_HOST", default_value = "127.0.0.1")]
    host: String,

    /// HTTP port to listen on
    #[arg(short, long, env = "DELIVERY_PORT", default_value = "8080")]
    port: u16,

    /// SQLite database file
    #[arg(short, long, env = "DELIVERY_DATABASE", default_value = "data/delivery.db")]
    database: PathBuf,

    /// JSON object mapping server id or name to its RCON password
    #[arg(long, env = "RCON_PASSWORDS", default_value = "{}", hide_env_values = true)]
    rcon_passwords: String,

    /// Token the game-side listener sends in x-listener-token
    #[arg(long, env = "LISTENER_SECRET_TOKEN", hide_env_values = true)]
    listener_token: Option<String>,

    /// Bearer token for delivery and queue endpoints
    #[arg(long, env = "DELIVERY_ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,

    /// Connect and read timeout for one RCON command
    #[arg(long, env = "RCON_TIMEOUT_MS", default_value = "5000")]
    rcon_timeout_ms: u64,

    /// Attempts before a queued delivery is given up
    #[arg(long, env = "DELIVERY_MAX_ATTEMPTS", default_value = "5")]
    max_attempts: i64,

    /// Most candidate servers tried per delivery
    #[arg(long, env = "DELIVERY_MAX_CANDIDATES", default_value = "8")]
    max_candidates: usize,

    /// Retry sweeper period in seconds (0 disables it)
    #[arg(long, env = "DELIVERY_SWEEP_INTERVAL_SECS", default_value = "0")]
    sweep_interval_secs: u64,

    /// Catalog JSON upserted at start-up
    #[arg(long, env = "DELIVERY_CATALOG")]
    catalog: Option<PathBuf>,
}

impl Args {
    fn delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            rcon_timeout: Duration::from_millis(self.rcon_timeout_ms),
            max_candidates: self.max_candidates.max(1),
            retry: RetryPolicy {
                max_attempts: self.max_attempts.max(1),
                ..RetryPolicy::default()
            },
            sweep_interval: (self.sweep_interval_secs > 0)
                .then(|| Duration::from_secs(self.sweep_interval_secs)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.delivery_config();
    info!("Starting delivery server with {:?}", config);

    let db = Database::open(&args.database).await?;
    if let Some(path) = &args.catalog {
        load_catalog(&db, path).await?;
    }

    let secrets = Arc::new(SecretStore::from_json(&args.rcon_passwords));
    info!("Loaded RCON credentials for {} servers", secrets.len());

    let transport = Arc::new(RconClient::new(config.rcon_timeout));
    let sweep_interval = config.sweep_interval;
    let orchestrator = DeliveryOrchestrator::new(db, transport, secrets, config);

    let tokens = ApiTokens {
        admin: args.admin_token.clone(),
        listener: args.listener_token.clone(),
    };
    tokens.warn_if_open();

    let app = api::router(ApiState::new(orchestrator.clone()), tokens);
    let address = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Listening on {}", address);

    let sweeper = sweep_interval.map(|period| spawn_retry_sweeper(orchestrator, period));

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!("HTTP server failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    if let Some(handle) = sweeper {
        handle.abort();
    }

    Ok(())
}
