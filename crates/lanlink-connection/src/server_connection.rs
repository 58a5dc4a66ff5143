use std::net::SocketAddr;
use std::sync::{Arc, MutexGuard};

use lanlink_core::{LinearBuffer, Result};
use tokio::net::TcpStream;

use crate::config::ConnectionConfig;
use crate::connection::{ConnectionCore, ConnectionLostCallback, KeepAliveCallback};

/// An accepted connection.
///
/// Constructed by [`TcpServer`](crate::TcpServer) from an already-connected
/// socket and handed to the connection callback; the server keeps no
/// reference afterwards. Activities stay dormant until
/// [`start_monitoring`](Self::start_monitoring) (or one of the individual
/// `start_*` methods) is called, giving the callback a chance to install
/// its own callbacks first.
pub struct TcpServerConnection {
    core: Arc<ConnectionCore>,
    peer: SocketAddr,
}

impl TcpServerConnection {
    pub(crate) fn new(stream: TcpStream, config: &ConnectionConfig) -> Result<Self> {
        let peer = stream.peer_addr()?;
        let core = ConnectionCore::new(config);
        core.attach(stream);
        Ok(Self { core, peer })
    }

    /// The remote endpoint of the accepted socket.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Arms the receive, send and keep-alive activities.
    pub fn start_monitoring(&self) {
        self.core.start_monitoring();
    }

    /// Arms only the receive activity.
    pub fn start_receiving(&self) {
        self.core.start_receiving();
    }

    /// Arms only the send activity.
    pub fn start_sending(&self) {
        self.core.start_sending();
    }

    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    /// Kicks the send activity after bytes were pushed into the send
    /// buffer. A no-op while a send is already in flight.
    pub fn send(&self) {
        self.core.send()
    }

    pub fn send_buffer(&self) -> MutexGuard<'_, LinearBuffer> {
        self.core.send_buffer()
    }

    pub fn receive_buffer(&self) -> MutexGuard<'_, LinearBuffer> {
        self.core.receive_buffer()
    }

    pub fn set_connection_lost_callback(&self, callback: ConnectionLostCallback) {
        self.core.set_connection_lost_callback(callback)
    }

    pub fn set_keep_alive_callback(&self, callback: KeepAliveCallback) {
        self.core.set_keep_alive_callback(callback)
    }

    /// Closes the session without firing the lost callback.
    pub fn disconnect(&self) {
        self.core.disconnect()
    }

    /// Cancels all activity and waits for the in-flight tasks to exit.
    pub async fn shutdown(&self) {
        self.core.shutdown().await
    }
}

impl Drop for TcpServerConnection {
    fn drop(&mut self) {
        self.core.cancel();
    }
}
