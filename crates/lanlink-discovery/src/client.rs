use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use lanlink_core::{LanlinkError, Result};
use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::server::MAX_DATAGRAM_SIZE;

/// Completion predicate invoked for every reply datagram.
///
/// Returning `true` ends the exchange; returning `false` keeps listening
/// (further replies from other servers remain deliverable) without
/// resetting the retry timer.
pub type ReplyHandler = Box<dyn FnMut(&[u8], SocketAddr) -> bool + Send>;

/// Broadcasts a service identifier and collects replies with bounded retry.
///
/// The request is re-sent every `retry_interval` until the handler accepts
/// a reply or [`stop`](Self::stop) is called. The first send happens
/// immediately on [`start`](Self::start).
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use lanlink_discovery::UdpDiscoveryClient;
///
/// # async fn run() -> lanlink_core::Result<()> {
/// let mut client = UdpDiscoveryClient::new(
///     "database",
///     Duration::from_millis(500),
///     54321,
///     |reply, sender| {
///         println!("{} replied: {}", sender, String::from_utf8_lossy(reply));
///         true // done after the first reply
///     },
/// );
/// client.start().await?;
/// # Ok(())
/// # }
/// ```
pub struct UdpDiscoveryClient {
    identifier: String,
    retry_interval: Duration,
    target: SocketAddr,
    handler: Option<ReplyHandler>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl UdpDiscoveryClient {
    pub fn new(
        identifier: impl Into<String>,
        retry_interval: Duration,
        port: u16,
        handler: impl FnMut(&[u8], SocketAddr) -> bool + Send + 'static,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            retry_interval,
            target: SocketAddr::from((Ipv4Addr::BROADCAST, port)),
            handler: Some(Box::new(handler)),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Overrides the request destination.
    ///
    /// The default is the limited-broadcast address on the configured port;
    /// a unicast target reaches a known server directly.
    pub fn set_target(&mut self, target: SocketAddr) {
        self.target = target;
    }

    /// The identifier this client searches for.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Begins the exchange: sends the first request and arms the receive
    /// and retry machinery.
    pub async fn start(&mut self) -> Result<()> {
        let handler = self.handler.take().ok_or(LanlinkError::AlreadyStarted)?;

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|e| LanlinkError::Bind(format!("udp 0.0.0.0:0: {e}")))?;
        socket.set_broadcast(true)?;

        self.tasks.spawn(exchange(
            socket,
            self.identifier.clone(),
            self.target,
            self.retry_interval,
            handler,
            self.cancel.clone(),
        ));
        Ok(())
    }

    /// Cancels pending I/O and the retry timer.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Cancels the exchange and waits for the task to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }
}

impl Drop for UdpDiscoveryClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn exchange(
    socket: UdpSocket,
    identifier: String,
    target: SocketAddr,
    retry_interval: Duration,
    mut handler: ReplyHandler,
    cancel: CancellationToken,
) {
    // The first tick completes immediately, producing the initial request.
    // Replies do not feed the timer, so a handler that declines a reply
    // leaves the retransmit cadence untouched.
    let mut ticker = tokio::time::interval(retry_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut buf = [0u8; MAX_DATAGRAM_SIZE];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(error) = socket.send_to(identifier.as_bytes(), target).await {
                    warn!(%error, %identifier, %target, "discovery request send failed");
                }
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, sender)) => {
                    if handler(&buf[..len], sender) {
                        debug!(%identifier, from = %sender, "discovery exchange complete");
                        break;
                    }
                }
                Err(error) => warn!(%error, %identifier, "discovery reply receive failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_target_is_broadcast() {
        let client = UdpDiscoveryClient::new("svc", Duration::from_millis(100), 54321, |_, _| true);
        assert_eq!(
            client.target,
            SocketAddr::from((Ipv4Addr::BROADCAST, 54321))
        );
        assert_eq!(client.identifier(), "svc");
    }

    #[test]
    fn test_set_target_overrides_destination() {
        let mut client =
            UdpDiscoveryClient::new("svc", Duration::from_millis(100), 54321, |_, _| true);
        let unicast = SocketAddr::from((Ipv4Addr::LOCALHOST, 54321));
        client.set_target(unicast);
        assert_eq!(client.target, unicast);
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let mut client =
            UdpDiscoveryClient::new("svc", Duration::from_millis(100), 0, |_, _| true);
        client.set_target(SocketAddr::from((Ipv4Addr::LOCALHOST, 1)));
        client.start().await.unwrap();
        assert!(matches!(
            client.start().await,
            Err(LanlinkError::AlreadyStarted)
        ));
        client.shutdown().await;
    }
}
