//! Minimal RCON server for trying deliveries by hand.
//!
//! Accepts one password, echoes every command back and can be told to fail
//! commands containing a given substring.

use clap::Parser;
use log::{info, warn};
use shared::{Packet, AUTH_REJECTED_ID, SERVERDATA_AUTH, SERVERDATA_EXECCOMMAND, SERVERDATA_RESPONSE_VALUE, SIZE_PREFIX_LEN};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "25575")]
    port: u16,

    /// Password clients must authenticate with
    #[arg(long, env = "MOCK_RCON_PASSWORD", default_value = "password")]
    password: String,

    /// Drop the connection instead of answering commands containing this
    #[arg(long)]
    fail_on: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Arc::new(Args::parse());
    let address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&address).await?;
    info!("Mock RCON server listening on {}", address);

    loop {
        let (stream, peer) = listener.accept().await?;
        info!("Connection from {}", peer);
        let args = Arc::clone(&args);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &args).await {
                warn!("Connection from {} ended: {}", peer, e);
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, args: &Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut authed = false;

    loop {
        let mut prefix = [0u8; SIZE_PREFIX_LEN];
        if stream.read_exact(&mut prefix).await.is_err() {
            return Ok(());
        }
        let size = Packet::parse_size(i32::from_le_bytes(prefix))?;
        let mut payload = vec![0u8; size];
        stream.read_exact(&mut payload).await?;
        let packet = Packet::decode_payload(&payload)?;

        let reply = match packet.kind {
            SERVERDATA_AUTH => {
                authed = packet.body == args.password;
                let id = if authed { packet.id } else { AUTH_REJECTED_ID };
                info!("Auth {}", if authed { "accepted" } else { "rejected" });
                Packet::new(id, SERVERDATA_EXECCOMMAND, "")
            }
            SERVERDATA_EXECCOMMAND if authed => {
                info!("Command: {}", packet.body);
                if let Some(needle) = args.fail_on.as_deref() {
                    if packet.body.contains(needle) {
                        warn!("Failing command on request");
                        return Ok(());
                    }
                }
                Packet::new(packet.id, SERVERDATA_RESPONSE_VALUE, format!("Executed: {}", packet.body))
            }
            _ => Packet::new(AUTH_REJECTED_ID, SERVERDATA_RESPONSE_VALUE, ""),
        };

        stream.write_all(&reply.encode()).await?;
    }
}
