use clap::{Parser, Subcommand};
use client::DeliveryClient;
use log::info;
use shared::{DeliveryMode, DeliveryStatus};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the delivery server
    #[arg(short = 's', long, env = "DELIVERY_URL", default_value = "http://127.0.0.1:8080")]
    server: String,

    /// Bearer token for delivery and queue endpoints
    #[arg(long, env = "DELIVERY_ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,

    /// Token for presence endpoints
    #[arg(long, env = "LISTENER_SECRET_TOKEN", hide_env_values = true)]
    listener_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deliver a paid order
    Deliver { order_id: String },
    /// Retry an order, including one that already failed
    Retry { order_id: String },
    /// Report a player joining a server
    Join {
        player: String,
        /// Free-text server name, as the game side reports it
        #[arg(long)]
        server: Option<String>,
        /// RFC 3339 event time (defaults to now on the server)
        #[arg(long)]
        at: Option<String>,
    },
    /// Report a player leaving
    Leave {
        player: String,
        #[arg(long)]
        at: Option<String>,
    },
    /// List queue entries
    Queue {
        /// Only entries with this status
        #[arg(long)]
        status: Option<DeliveryStatus>,
    },
    /// Force a queue entry to delivered or failed
    Resolve {
        order_id: String,
        status: DeliveryStatus,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    info!("Using delivery server at {}", args.server);
    let client = DeliveryClient::new(&args.server, args.admin_token, args.listener_token);

    let output = match args.command {
        Command::Deliver { order_id } => {
            serde_json::to_value(client.deliver(&order_id, DeliveryMode::Deliver).await?)?
        }
        Command::Retry { order_id } => {
            serde_json::to_value(client.deliver(&order_id, DeliveryMode::Retry).await?)?
        }
        Command::Join { player, server, at } => {
            client.join(&player, server.as_deref(), at.as_deref()).await?
        }
        Command::Leave { player, at } => client.leave(&player, at.as_deref()).await?,
        Command::Queue { status } => client.queue(status).await?,
        Command::Resolve { order_id, status } => client.resolve(&order_id, status).await?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
