use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use lanlink_core::{LanlinkError, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::{ConnectionConfig, ServerConfig};
use crate::server_connection::TcpServerConnection;

/// Invoked with a shared reference to every accepted connection.
pub type ConnectionCallback = Arc<dyn Fn(Arc<TcpServerConnection>) + Send + Sync>;

/// Accept loop producing [`TcpServerConnection`]s.
///
/// Each accepted socket is wrapped with the server's default buffer
/// capacities and keep-alive interval and handed to the connection
/// callback; the server holds no reference afterwards. Accept errors other
/// than cancellation are logged and the accept re-armed.
///
/// # Example
///
/// ```no_run
/// use lanlink_connection::{ServerConfig, TcpServer};
///
/// # async fn run() -> lanlink_core::Result<()> {
/// let server = TcpServer::new(ServerConfig::new(0));
/// server.set_connection_callback(|connection| {
///     println!("client from {}", connection.peer_addr());
///     connection.start_monitoring();
/// });
/// server.start().await?;
/// println!("listening on port {}", server.port());
/// # Ok(())
/// # }
/// ```
pub struct TcpServer {
    config: ServerConfig,
    callback: Arc<Mutex<Option<ConnectionCallback>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl TcpServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            callback: Arc::new(Mutex::new(None)),
            local_addr: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Installs the callback invoked for every accepted connection. May be
    /// called before or after [`start`](Self::start).
    pub fn set_connection_callback(
        &self,
        callback: impl Fn(Arc<TcpServerConnection>) + Send + Sync + 'static,
    ) {
        *self.callback.lock().expect("callback mutex poisoned") = Some(Arc::new(callback));
    }

    /// Binds the acceptor and arms the accept loop.
    ///
    /// A configured port of 0 lets the OS assign one; the learned port is
    /// available from [`port`](Self::port) afterwards. Bind failures
    /// surface here.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match self.bind_and_spawn().await {
            Ok(()) => Ok(()),
            Err(error) => {
                self.running.store(false, Ordering::SeqCst);
                Err(error)
            }
        }
    }

    async fn bind_and_spawn(&self) -> Result<()> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, self.config.port))
            .await
            .map_err(|e| LanlinkError::Bind(format!("tcp 0.0.0.0:{}: {e}", self.config.port)))?;
        let addr = listener.local_addr()?;
        *self.local_addr.lock().expect("addr mutex poisoned") = Some(addr);
        info!(%addr, "server listening");

        self.tasks.spawn(accept_loop(
            listener,
            self.callback.clone(),
            self.config.connection.clone(),
            self.cancel.clone(),
            self.running.clone(),
        ));
        Ok(())
    }

    /// Cancels the acceptor and waits for the accept loop to exit.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The bound port, or 0 before [`start`](Self::start).
    pub fn port(&self) -> u16 {
        self.local_addr
            .lock()
            .expect("addr mutex poisoned")
            .map(|addr| addr.port())
            .unwrap_or(0)
    }

    /// The bound address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().expect("addr mutex poisoned")
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    callback: Arc<Mutex<Option<ConnectionCallback>>>,
    config: ConnectionConfig,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                info!(%peer, "accepted connection");
                match TcpServerConnection::new(stream, &config) {
                    Ok(connection) => {
                        let callback = callback
                            .lock()
                            .expect("callback mutex poisoned")
                            .clone();
                        match callback {
                            Some(callback) => (*callback)(Arc::new(connection)),
                            None => warn!(%peer, "no connection callback installed, dropping connection"),
                        }
                    }
                    Err(error) => warn!(%error, %peer, "failed to set up accepted connection"),
                }
            }
            Err(error) => {
                warn!(%error, "accept failed");
            }
        }
    }
    running.store(false, Ordering::SeqCst);
    debug!("server stopped");
}
