use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard};

use lanlink_core::LinearBuffer;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::config::{ClientConfig, RECONNECT_DELAY};
use crate::connection::{ConnectionCore, ConnectionLostCallback, KeepAliveCallback};

/// Connect-initiating connection with auto-reconnect.
///
/// [`connect`](Self::connect) drives the connect attempt on the runtime;
/// while `auto_reconnect` is set, failed attempts are retried on a fixed
/// delay until `max_reconnect_attempts` is exhausted (-1 retries forever).
/// Once connected, the receive, send and keep-alive activities run until
/// the peer goes away or the connection is dropped.
///
/// # Example
///
/// ```no_run
/// use lanlink_connection::{ClientConfig, TcpClientConnection};
///
/// # async fn run() {
/// let remote = "127.0.0.1:9000".parse().unwrap();
/// let client = TcpClientConnection::new(remote, ClientConfig::default());
/// client.set_connection_lost_callback(Box::new(|| println!("lost")));
/// client.connect();
///
/// // ... later: queue bytes and kick the send activity.
/// assert!(client.send_buffer().push(b"hello"));
/// client.send();
/// # }
/// ```
pub struct TcpClientConnection {
    core: Arc<ConnectionCore>,
    remote: SocketAddr,
    auto_reconnect: bool,
    max_reconnect_attempts: i32,
    connecting: Arc<AtomicBool>,
}

impl TcpClientConnection {
    pub fn new(remote: SocketAddr, config: ClientConfig) -> Self {
        Self {
            core: ConnectionCore::new(&config.connection),
            remote,
            auto_reconnect: config.auto_reconnect,
            max_reconnect_attempts: config.max_reconnect_attempts,
            connecting: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The endpoint this client connects to.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Starts the connect driver. A no-op while already connected or while
    /// a connect attempt is in flight.
    pub fn connect(&self) {
        if self.core.is_connected() || self.connecting.swap(true, Ordering::SeqCst) {
            return;
        }
        let core = self.core.clone();
        let remote = self.remote;
        let auto_reconnect = self.auto_reconnect;
        let max_attempts = self.max_reconnect_attempts;
        let lifetime = self.core.lifetime_token();
        let connecting = self.connecting.clone();

        self.core.spawn(async move {
            let mut attempts: i32 = 0;
            loop {
                let connected = tokio::select! {
                    _ = lifetime.cancelled() => break,
                    result = TcpStream::connect(remote) => result,
                };
                match connected {
                    Ok(stream) => {
                        debug!(%remote, "connected");
                        core.attach(stream);
                        core.start_monitoring();
                        break;
                    }
                    Err(error) => {
                        attempts += 1;
                        if !auto_reconnect || (max_attempts >= 0 && attempts >= max_attempts) {
                            warn!(%error, %remote, attempts, "connect failed, giving up");
                            break;
                        }
                        debug!(%error, %remote, attempts, "connect failed, retrying");
                        tokio::select! {
                            _ = lifetime.cancelled() => break,
                            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        }
                    }
                }
            }
            connecting.store(false, Ordering::SeqCst);
        });
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

    /// Closes the current session without firing the lost callback.
    pub fn disconnect(&self) {
        self.core.disconnect()
    }

    /// Cancels all activity and waits for the in-flight tasks to exit.
    pub async fn shutdown(&self) {
        self.core.shutdown().await
    }
}

impl Drop for TcpClientConnection {
    fn drop(&mut self) {
        self.core.cancel();
    }
}
