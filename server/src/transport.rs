//! Remote command transport.
//!
//! One attempt is one TCP connection: authenticate, send a single command,
//! read a single response, close. The [`CommandTransport`] trait is the seam
//! the orchestrator talks to, so tests can swap the socket for a script.

use async_trait::async_trait;
use log::{debug, info, warn};
use rand::Rng;
use shared::{Packet, SERVERDATA_RESPONSE_VALUE, SIZE_PREFIX_LEN};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};

use crate::error::TransportError;
use crate::store::RemoteServer;

#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Runs `command` on `server` and returns the peer's textual reply.
    async fn execute(
        &self,
        server: &RemoteServer,
        secret: &str,
        command: &str,
    ) -> Result<String, TransportError>;
}

/// TCP implementation of [`CommandTransport`].
#[derive(Debug, Clone)]
pub struct RconClient {
    timeout: Duration,
}

impl RconClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandTransport for RconClient {
    async fn execute(
        &self,
        server: &RemoteServer,
        secret: &str,
        command: &str,
    ) -> Result<String, TransportError> {
        let address = server.address();
        let started = Instant::now();
        let deadline = started + self.timeout;
        debug!("Connecting to RCON server {} at {}", server.name, address);

        let stream = match timeout_at(deadline, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!("RCON connect to {} failed: {}", address, e);
                return Err(TransportError::Connection(format!("{}: {}", address, e)));
            }
            Err(_) => {
                warn!("RCON connect to {} timed out", address);
                return Err(TransportError::Timeout {
                    elapsed: started.elapsed(),
                });
            }
        };

        let (auth_id, command_id) = request_ids();

        // Connect and exchange share one deadline. Dropping the exchange
        // future on timeout drops the stream with it.
        let exchanged = exchange(stream, auth_id, command_id, secret, command);
        match timeout_at(deadline, exchanged).await {
            Ok(Ok(response)) => {
                info!(
                    "RCON command on {} succeeded in {}ms",
                    server.name,
                    started.elapsed().as_millis()
                );
                Ok(response)
            }
            Ok(Err(e)) => {
                warn!("RCON command on {} failed: {}", server.name, e);
                Err(e)
            }
            Err(_) => {
                warn!("RCON exchange with {} timed out", server.name);
                Err(TransportError::Timeout {
                    elapsed: started.elapsed(),
                })
            }
        }
    }
}

/// Two distinct positive request ids for one attempt.
fn request_ids() -> (i32, i32) {
    let mut rng = rand::thread_rng();
    let auth_id = rng.gen_range(1..i32::MAX);
    let mut command_id = rng.gen_range(1..i32::MAX);
    if command_id == auth_id {
        command_id = auth_id.wrapping_add(1).max(1);
    }
    (auth_id, command_id)
}

/// Authenticates and runs one command over an already-open stream, then
/// shuts the stream down whatever the outcome.
pub async fn exchange<S>(
    mut stream: S,
    auth_id: i32,
    command_id: i32,
    secret: &str,
    command: &str,
) -> Result<String, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = authenticate_and_run(&mut stream, auth_id, command_id, secret, command).await;
    let _ = stream.shutdown().await;
    result
}

async fn authenticate_and_run<S>(
    stream: &mut S,
    auth_id: i32,
    command_id: i32,
    secret: &str,
    command: &str,
) -> Result<String, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&Packet::auth(auth_id, secret).encode()).await?;
    stream.flush().await?;

    let mut reply = read_packet(stream).await?;
    // Some servers send an empty value packet ahead of the real auth answer.
    if reply.kind == SERVERDATA_RESPONSE_VALUE && reply.id == auth_id && reply.body.is_empty() {
        reply = read_packet(stream).await?;
    }
    if reply.is_auth_rejection() {
        return Err(TransportError::Auth);
    }

    stream.write_all(&Packet::command(command_id, command).encode()).await?;
    stream.flush().await?;

    let response = read_packet(stream).await?;
    Ok(response.body)
}

/// Reads exactly one length-prefixed frame.
pub async fn read_packet<S>(stream: &mut S) -> Result<Packet, TransportError>
where
    S: AsyncRead + Unpin,
{
    let mut prefix = [0u8; SIZE_PREFIX_LEN];
    let got = read_full(stream, &mut prefix).await?;
    if got < SIZE_PREFIX_LEN {
        return Err(shared::FrameError::Truncated {
            expected: SIZE_PREFIX_LEN,
            actual: got,
        }
        .into());
    }

    let size = Packet::parse_size(i32::from_le_bytes(prefix))?;
    let mut payload = vec![0u8; size];
    let got = read_full(stream, &mut payload).await?;
    if got < size {
        return Err(shared::FrameError::Truncated {
            expected: size,
            actual: got,
        }
        .into());
    }

    Ok(Packet::decode_payload(&payload)?)
}

/// Fills `buf` until it is full or the peer closes; returns bytes read.
async fn read_full<S>(stream: &mut S, buf: &mut [u8]) -> Result<usize, TransportError>
where
    S: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{FrameError, AUTH_REJECTED_ID, SERVERDATA_EXECCOMMAND};
    use tokio_test::io::Builder;

    fn frame(id: i32, kind: i32, body: &str) -> Vec<u8> {
        Packet::new(id, kind, body).encode()
    }

    #[tokio::test]
    async fn test_exchange_success() {
        let stream = Builder::new()
            .write(&Packet::auth(11, "secret").encode())
            .read(&frame(11, SERVERDATA_EXECCOMMAND, ""))
            .write(&Packet::command(12, "say hi").encode())
            .read(&frame(12, SERVERDATA_RESPONSE_VALUE, "said hi"))
            .build();

        let reply = exchange(stream, 11, 12, "secret", "say hi").await.unwrap();
        assert_eq!(reply, "said hi");
    }

    #[tokio::test]
    async fn test_exchange_auth_rejected() {
        let stream = Builder::new()
            .write(&Packet::auth(11, "wrong").encode())
            .read(&frame(AUTH_REJECTED_ID, SERVERDATA_EXECCOMMAND, ""))
            .build();

        let err = exchange(stream, 11, 12, "wrong", "say hi").await.unwrap_err();
        assert!(matches!(err, TransportError::Auth));
    }

    #[tokio::test]
    async fn test_exchange_skips_empty_value_before_auth() {
        let stream = Builder::new()
            .write(&Packet::auth(5, "secret").encode())
            .read(&frame(5, SERVERDATA_RESPONSE_VALUE, ""))
            .read(&frame(5, SERVERDATA_EXECCOMMAND, ""))
            .write(&Packet::command(6, "list").encode())
            .read(&frame(6, SERVERDATA_RESPONSE_VALUE, "There are 0 players"))
            .build();

        let reply = exchange(stream, 5, 6, "secret", "list").await.unwrap();
        assert_eq!(reply, "There are 0 players");
    }

    #[tokio::test]
    async fn test_exchange_truncated_response() {
        let full = frame(12, SERVERDATA_RESPONSE_VALUE, "partial output");
        let stream = Builder::new()
            .write(&Packet::auth(11, "secret").encode())
            .read(&frame(11, SERVERDATA_EXECCOMMAND, ""))
            .write(&Packet::command(12, "list").encode())
            .read(&full[..9])
            .build();

        let err = exchange(stream, 11, 12, "secret", "list").await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Frame(FrameError::Truncated { actual: 5, .. })
        ));
    }

    #[tokio::test]
    async fn test_read_packet_rejects_bad_size() {
        let mut stream = Builder::new().read(&(-4i32).to_le_bytes()).build();
        let err = read_packet(&mut stream).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Frame(FrameError::InvalidLength(-4))
        ));
    }

    #[tokio::test]
    async fn test_read_packet_across_chunks() {
        let bytes = frame(3, SERVERDATA_RESPONSE_VALUE, "chunked");
        let mut stream = Builder::new().read(&bytes[..2]).read(&bytes[2..7]).read(&bytes[7..]).build();

        let packet = read_packet(&mut stream).await.unwrap();
        assert_eq!(packet, Packet::new(3, SERVERDATA_RESPONSE_VALUE, "chunked"));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let server = RemoteServer {
            id: "s1".to_string(),
            name: "survival-1".to_string(),
            host: "127.0.0.1".to_string(),
            port: i64::from(port),
            mode: "survival".to_string(),
            enabled: true,
            priority: 0,
        };
        let client = RconClient::new(Duration::from_millis(500));
        let err = client.execute(&server, "secret", "list").await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Connection(_) | TransportError::Timeout { .. }
        ));
    }

    #[tokio::test]
    async fn test_silent_peer_is_cut_off_within_one_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let server = RemoteServer {
            id: "s1".to_string(),
            name: "survival-1".to_string(),
            host: "127.0.0.1".to_string(),
            port: i64::from(port),
            mode: "survival".to_string(),
            enabled: true,
            priority: 0,
        };
        let budget = Duration::from_millis(300);
        let started = std::time::Instant::now();
        let err = RconClient::new(budget)
            .execute(&server, "secret", "list")
            .await
            .unwrap_err();
        let took = started.elapsed();

        match err {
            TransportError::Timeout { elapsed } => assert!(elapsed <= took),
            other => panic!("expected timeout, got {other}"),
        }
        assert!(took >= budget);
        assert!(took < budget * 2, "call took {took:?}");
    }

    #[test]
    fn test_request_ids_are_positive_and_distinct() {
        for _ in 0..100 {
            let (a, b) = request_ids();
            assert!(a > 0 && b > 0);
            assert_ne!(a, b);
        }
    }
}
