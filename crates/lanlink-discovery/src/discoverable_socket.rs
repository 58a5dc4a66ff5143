use std::net::{Ipv4Addr, SocketAddr};

use lanlink_core::{LanlinkError, Result};
use tokio::net::{TcpListener, TcpStream};
use tracing::info;

use crate::discoverable::Discoverable;
use crate::server::UdpDiscoveryServer;

/// A TCP acceptor that advertises its bound port over UDP discovery.
///
/// Binding learns the actual TCP port (a requested port of 0 lets the OS
/// pick one) and registers a [`Discoverable`] whose reply is that port as
/// ASCII decimal, so a [`DiscoveringTcpSocket`](crate::DiscoveringTcpSocket)
/// searching for the same identifier ends up connected here.
pub struct DiscoverableTcpSocket {
    listener: TcpListener,
    tcp_port: u16,
    discovery: UdpDiscoveryServer,
}

impl DiscoverableTcpSocket {
    /// Binds the acceptor and the discovery server and registers the
    /// port-announcing service.
    pub async fn bind(
        identifier: impl Into<String>,
        udp_port: u16,
        tcp_port: u16,
    ) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, tcp_port))
            .await
            .map_err(|e| LanlinkError::Bind(format!("tcp 0.0.0.0:{tcp_port}: {e}")))?;
        let tcp_port = listener.local_addr()?.port();

        let identifier = identifier.into();
        let mut discovery = UdpDiscoveryServer::bind(udp_port).await?;
        discovery.add_discoverable(Discoverable::new(identifier.clone(), move || {
            tcp_port.to_string()
        }));

        info!(%identifier, tcp_port, udp_port = discovery.port(), "discoverable socket bound");
        Ok(Self {
            listener,
            tcp_port,
            discovery,
        })
    }

    /// Starts answering discovery requests.
    pub fn start(&self) {
        self.discovery.start();
    }

    /// Accepts one incoming TCP connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        Ok(self.listener.accept().await?)
    }

    /// The TCP port this socket is listening on.
    pub fn tcp_port(&self) -> u16 {
        self.tcp_port
    }

    /// The UDP discovery port.
    pub fn udp_port(&self) -> u16 {
        self.discovery.port()
    }

    /// Stops the discovery server and waits for its loop to exit.
    pub async fn shutdown(&self) {
        self.discovery.shutdown().await;
    }
}
