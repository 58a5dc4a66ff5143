use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use lanlink_core::{LanlinkError, Result};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::discoverable::Discoverable;

/// Upper bound on discovery request and reply payloads.
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Multiplexes any number of named services over one UDP socket.
///
/// Each received datagram's payload is interpreted as a service identifier.
/// A registered identifier gets exactly one reply datagram, unicast back to
/// the request's source; anything else is dropped silently so several
/// servers can share a subnet without colliding.
///
/// Registration happens before [`start`](Self::start); the service map is
/// read-only once the receive loop is running.
///
/// # Example
///
/// ```no_run
/// use lanlink_discovery::{Discoverable, UdpDiscoveryServer};
///
/// # async fn run() -> lanlink_core::Result<()> {
/// let mut server = UdpDiscoveryServer::bind(54321).await?;
/// server.add_discoverable(Discoverable::new("database", || "127.0.0.1:5432".into()));
/// server.start();
/// # Ok(())
/// # }
/// ```
pub struct UdpDiscoveryServer {
    socket: Arc<UdpSocket>,
    port: u16,
    services: HashMap<String, Discoverable>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl UdpDiscoveryServer {
    /// Binds the discovery socket on all interfaces.
    ///
    /// Bind failures surface here, synchronously, rather than from the
    /// receive loop.
    pub async fn bind(port: u16) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map_err(|e| LanlinkError::Bind(format!("udp 0.0.0.0:{port}: {e}")))?;
        let port = socket.local_addr()?.port();

        Ok(Self {
            socket: Arc::new(socket),
            port,
            services: HashMap::new(),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    /// The bound discovery port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Registers a service; a later registration of the same identifier
    /// overwrites the earlier one.
    pub fn add_discoverable(&mut self, discoverable: Discoverable) {
        self.services
            .insert(discoverable.identifier().to_string(), discoverable);
    }

    /// Arms the perpetual receive loop.
    ///
    /// Services registered after this call are not seen by the running
    /// loop.
    pub fn start(&self) {
        let socket = self.socket.clone();
        let services = self.services.clone();
        let cancel = self.cancel.clone();
        self.tasks.spawn(serve(socket, services, cancel));
    }

    /// Cancels the receive loop without waiting for it to finish.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Cancels the receive loop and waits for it to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }
}

impl Drop for UdpDiscoveryServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn serve(
    socket: Arc<UdpSocket>,
    services: HashMap<String, Discoverable>,
    cancel: CancellationToken,
) {
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];
    loop {
        let (len, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok(value) => value,
                Err(error) => {
                    warn!(%error, "discovery receive failed");
                    continue;
                }
            },
        };

        // An identifier that is not valid UTF-8 cannot match any registered
        // service, so it falls through to the silent-drop path.
        let Ok(identifier) = std::str::from_utf8(&buf[..len]) else {
            debug!(from = %peer, "dropping non-UTF-8 discovery request");
            continue;
        };

        match services.get(identifier) {
            Some(service) => {
                let reply = service.reply();
                debug!(identifier, from = %peer, "serving discovery request");
                if let Err(error) = socket.send_to(reply.as_bytes(), peer).await {
                    warn!(%error, identifier, "failed to send discovery reply");
                }
            }
            None => {
                debug!(identifier, from = %peer, "unknown service, dropping request");
            }
        }
    }
    debug!("discovery server stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = UdpDiscoveryServer::bind(0).await.unwrap();
        assert!(server.port() > 0);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = UdpDiscoveryServer::bind(0).await.unwrap();
        let second = UdpDiscoveryServer::bind(first.port()).await;
        assert!(matches!(second, Err(LanlinkError::Bind(_))));
    }

    #[tokio::test]
    async fn test_reregistration_overwrites() {
        let mut server = UdpDiscoveryServer::bind(0).await.unwrap();
        server.add_discoverable(Discoverable::new("svc", || "old".into()));
        server.add_discoverable(Discoverable::new("svc", || "new".into()));
        assert_eq!(server.services.len(), 1);
        assert_eq!(server.services["svc"].reply(), "new");
    }
}
