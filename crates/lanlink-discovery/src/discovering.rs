use std::net::SocketAddr;
use std::time::Duration;

use lanlink_core::{LanlinkError, Result};
use tokio::net::TcpStream;

use crate::client::UdpDiscoveryClient;

const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Resolves a service name to a TCP endpoint and connects to it.
///
/// One discovery exchange is performed; the first reply wins and is parsed
/// as an ASCII decimal TCP port. The connection then goes to the replying
/// host on that port. The exchange retries indefinitely, so callers that
/// want an overall deadline should wrap [`connect`](Self::connect) in
/// `tokio::time::timeout`.
pub struct DiscoveringTcpSocket {
    identifier: String,
    udp_port: u16,
    retry_interval: Duration,
    target: Option<SocketAddr>,
}

impl DiscoveringTcpSocket {
    pub fn new(identifier: impl Into<String>, udp_port: u16) -> Self {
        Self {
            identifier: identifier.into(),
            udp_port,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            target: None,
        }
    }

    /// Overrides the retransmit cadence of the discovery exchange.
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Sends discovery requests to a unicast address instead of the
    /// limited broadcast.
    pub fn with_target(mut self, target: SocketAddr) -> Self {
        self.target = Some(target);
        self
    }

    /// Discovers the service and connects to the advertised endpoint.
    pub async fn connect(&self) -> Result<TcpStream> {
        let (reply, sender) = self.discover().await?;
        let port = parse_port(&reply)?;
        let endpoint = SocketAddr::new(sender.ip(), port);

        TcpStream::connect(endpoint)
            .await
            .map_err(|e| LanlinkError::Connection(format!("connect to {endpoint}: {e}")))
    }

    /// Blocking variant of [`connect`](Self::connect), built by driving the
    /// asynchronous one on a throwaway current-thread runtime.
    pub fn connect_blocking(&self) -> Result<std::net::TcpStream> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let stream = runtime.block_on(self.connect())?;
        let stream = stream.into_std()?;
        stream.set_nonblocking(false)?;
        Ok(stream)
    }

    async fn discover(&self) -> Result<(Vec<u8>, SocketAddr)> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        let mut reply_tx = Some(reply_tx);

        let mut client = UdpDiscoveryClient::new(
            self.identifier.clone(),
            self.retry_interval,
            self.udp_port,
            move |reply, sender| {
                if let Some(tx) = reply_tx.take() {
                    let _ = tx.send((reply.to_vec(), sender));
                }
                true
            },
        );
        if let Some(target) = self.target {
            client.set_target(target);
        }
        client.start().await?;

        let outcome = reply_rx
            .await
            .map_err(|_| LanlinkError::Connection("discovery exchange aborted".into()));
        client.shutdown().await;
        outcome
    }
}

fn parse_port(reply: &[u8]) -> Result<u16> {
    let text = std::str::from_utf8(reply)
        .map_err(|_| LanlinkError::InvalidDiscoveryReply("non-UTF-8 reply".into()))?;
    text.parse::<u16>()
        .map_err(|_| LanlinkError::InvalidDiscoveryReply(text.to_string()))
}
