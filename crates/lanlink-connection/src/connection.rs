//! Shared connection state machine.
//!
//! A connected session runs three independent activities, each a spawned
//! task holding an `Arc` of the [`ConnectionCore`]:
//!
//! - *receive*: waits for socket readability, then reads straight into the
//!   inbound buffer's write window
//! - *send*: idles until kicked, then drains the outbound buffer's read
//!   window into the socket
//! - *keep-alive*: ticks on a fixed interval and lets the user's callback
//!   decide whether to emit bytes
//!
//! Any activity may terminate the session. The first one to observe a
//! fatal condition flips `connected`, cancels the session token (its
//! siblings then exit silently with operation-aborted semantics) and fires
//! the connection-lost callback exactly once. Buffer locks are never held
//! across an await: readiness is awaited lock-free and the actual transfer
//! uses the socket's non-blocking `try_read`/`try_write` under the lock.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use lanlink_core::LinearBuffer;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::config::ConnectionConfig;

/// Invoked once per transition into the disconnected state.
pub type ConnectionLostCallback = Box<dyn Fn() + Send + Sync>;

/// Invoked on every keep-alive tick; `Some(bytes)` is appended to the
/// outbound buffer as one contiguous commit, `None` does nothing.
pub type KeepAliveCallback = Box<dyn FnMut() -> Option<Vec<u8>> + Send>;

enum ReadOutcome {
    Progress,
    WouldBlock,
    Eof,
    Overrun,
    Error(io::Error),
}

enum WriteOutcome {
    Progress,
    Idle,
    WouldBlock,
    Error(io::Error),
}

enum LossReason {
    Eof,
    Overrun,
    Io(io::Error),
}

impl fmt::Display for LossReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossReason::Eof => write!(f, "end of stream"),
            LossReason::Overrun => write!(f, "receive buffer overrun"),
            LossReason::Io(error) => write!(f, "io error: {error}"),
        }
    }
}

pub(crate) struct ConnectionCore {
    stream: Mutex<Option<Arc<TcpStream>>>,
    receive_buffer: Mutex<LinearBuffer>,
    send_buffer: Mutex<LinearBuffer>,
    keep_alive_interval: Duration,
    send_signal: Notify,
    connected: AtomicBool,
    receiving: AtomicBool,
    sending: AtomicBool,
    keep_alive_active: AtomicBool,
    /// Object-lifetime token; cancelling it tears down every session.
    lifetime: CancellationToken,
    /// Current session token, a child of `lifetime`, replaced per connect.
    session: Mutex<CancellationToken>,
    tasks: TaskTracker,
    on_connection_lost: Mutex<Option<ConnectionLostCallback>>,
    on_keep_alive: Mutex<Option<KeepAliveCallback>>,
}

impl ConnectionCore {
    pub(crate) fn new(config: &ConnectionConfig) -> Arc<Self> {
        let lifetime = CancellationToken::new();
        let session = lifetime.child_token();
        Arc::new(Self {
            stream: Mutex::new(None),
            receive_buffer: Mutex::new(LinearBuffer::new(config.receive_buffer_capacity)),
            send_buffer: Mutex::new(LinearBuffer::new(config.send_buffer_capacity)),
            keep_alive_interval: config.keep_alive_interval,
            send_signal: Notify::new(),
            connected: AtomicBool::new(false),
            receiving: AtomicBool::new(false),
            sending: AtomicBool::new(false),
            keep_alive_active: AtomicBool::new(false),
            lifetime,
            session: Mutex::new(session),
            tasks: TaskTracker::new(),
            on_connection_lost: Mutex::new(None),
            on_keep_alive: Mutex::new(None),
        })
    }

    /// Binds a freshly connected socket to this core, beginning a session.
    pub(crate) fn attach(&self, stream: TcpStream) {
        let session = self.lifetime.child_token();
        *self.session.lock().expect("session mutex poisoned") = session;
        *self.stream.lock().expect("stream mutex poisoned") = Some(Arc::new(stream));
        self.connected.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn receive_buffer(&self) -> MutexGuard<'_, LinearBuffer> {
        self.receive_buffer.lock().expect("receive buffer mutex poisoned")
    }

    pub(crate) fn send_buffer(&self) -> MutexGuard<'_, LinearBuffer> {
        self.send_buffer.lock().expect("send buffer mutex poisoned")
    }

    pub(crate) fn set_connection_lost_callback(&self, callback: ConnectionLostCallback) {
        *self
            .on_connection_lost
            .lock()
            .expect("callback mutex poisoned") = Some(callback);
    }

    pub(crate) fn set_keep_alive_callback(&self, callback: KeepAliveCallback) {
        *self.on_keep_alive.lock().expect("callback mutex poisoned") = Some(callback);
    }

    /// Kicks the send activity. A no-op while a send is already in flight;
    /// from idle it arms one write if the outbound buffer has data.
    pub(crate) fn send(&self) {
        self.send_signal.notify_one();
    }

    pub(crate) fn lifetime_token(&self) -> CancellationToken {
        self.lifetime.clone()
    }

    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(future);
    }

    fn current_session(&self) -> CancellationToken {
        self.session.lock().expect("session mutex poisoned").clone()
    }

    fn current_stream(&self) -> Option<Arc<TcpStream>> {
        self.stream.lock().expect("stream mutex poisoned").clone()
    }

    /// Arms the receive activity for the current session.
    pub(crate) fn start_receiving(self: &Arc<Self>) {
        if !self.is_connected() || self.receiving.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(stream) = self.current_stream() else {
            self.receiving.store(false, Ordering::SeqCst);
            return;
        };
        let session = self.current_session();
        let core = self.clone();
        self.tasks.spawn(async move {
            core.receive_loop(&stream, &session).await;
            core.receiving.store(false, Ordering::SeqCst);
        });
    }

    /// Arms the send activity for the current session.
    pub(crate) fn start_sending(self: &Arc<Self>) {
        if !self.is_connected() || self.sending.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(stream) = self.current_stream() else {
            self.sending.store(false, Ordering::SeqCst);
            return;
        };
        let session = self.current_session();
        let core = self.clone();
        self.tasks.spawn(async move {
            core.send_loop(&stream, &session).await;
            core.sending.store(false, Ordering::SeqCst);
        });
    }

    /// Arms the keep-alive timer for the current session.
    pub(crate) fn start_keep_alive(self: &Arc<Self>) {
        if !self.is_connected() || self.keep_alive_active.swap(true, Ordering::SeqCst) {
            return;
        }
        let session = self.current_session();
        let core = self.clone();
        self.tasks.spawn(async move {
            core.keep_alive_loop(&session).await;
            core.keep_alive_active.store(false, Ordering::SeqCst);
        });
    }

    /// Arms all three activities.
    pub(crate) fn start_monitoring(self: &Arc<Self>) {
        self.start_receiving();
        self.start_sending();
        self.start_keep_alive();
    }

    async fn receive_loop(&self, stream: &TcpStream, session: &CancellationToken) {
        loop {
            tokio::select! {
                _ = session.cancelled() => break,
                ready = stream.readable() => {
                    if let Err(error) = ready {
                        self.handle_loss(LossReason::Io(error));
                        break;
                    }
                    match self.read_once(stream) {
                        ReadOutcome::Progress | ReadOutcome::WouldBlock => {}
                        ReadOutcome::Eof => {
                            self.handle_loss(LossReason::Eof);
                            break;
                        }
                        ReadOutcome::Overrun => {
                            self.handle_loss(LossReason::Overrun);
                            break;
                        }
                        ReadOutcome::Error(error) => {
                            self.handle_loss(LossReason::Io(error));
                            break;
                        }
                    }
                }
            }
        }
    }

    fn read_once(&self, stream: &TcpStream) -> ReadOutcome {
        let mut buffer = self.receive_buffer();
        let window = buffer.write_window();
        if window.is_empty() {
            // The user's drain is lagging; a read cannot be re-armed
            // without silently dropping data.
            return ReadOutcome::Overrun;
        }
        match stream.try_read(window) {
            Ok(0) => ReadOutcome::Eof,
            Ok(n) => {
                buffer.commit(n);
                ReadOutcome::Progress
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => ReadOutcome::WouldBlock,
            Err(error) => ReadOutcome::Error(error),
        }
    }

    async fn send_loop(&self, stream: &TcpStream, session: &CancellationToken) {
        loop {
            let idle = self.send_buffer().is_empty();
            if idle {
                tokio::select! {
                    _ = session.cancelled() => break,
                    _ = self.send_signal.notified() => continue,
                }
            }
            tokio::select! {
                _ = session.cancelled() => break,
                ready = stream.writable() => {
                    if let Err(error) = ready {
                        self.handle_loss(LossReason::Io(error));
                        break;
                    }
                    match self.write_once(stream) {
                        WriteOutcome::Progress | WriteOutcome::Idle | WriteOutcome::WouldBlock => {}
                        WriteOutcome::Error(error) => {
                            self.handle_loss(LossReason::Io(error));
                            break;
                        }
                    }
                }
            }
        }
    }

    fn write_once(&self, stream: &TcpStream) -> WriteOutcome {
        let mut buffer = self.send_buffer();
        let window = buffer.read_window();
        if window.is_empty() {
            return WriteOutcome::Idle;
        }
        match stream.try_write(window) {
            Ok(n) => {
                buffer.consume(n);
                WriteOutcome::Progress
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => WriteOutcome::WouldBlock,
            Err(error) => WriteOutcome::Error(error),
        }
    }

    async fn keep_alive_loop(&self, session: &CancellationToken) {
        let period = self.keep_alive_interval;
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = session.cancelled() => break,
                _ = ticker.tick() => {
                    let payload = {
                        let mut callback = self
                            .on_keep_alive
                            .lock()
                            .expect("callback mutex poisoned");
                        callback.as_mut().and_then(|cb| cb())
                    };
                    let Some(bytes) = payload else { continue };
                    if bytes.is_empty() {
                        continue;
                    }
                    // One contiguous push so keep-alive bytes are never
                    // split between send kicks.
                    if self.send_buffer().push(&bytes) {
                        self.send_signal.notify_one();
                    } else {
                        warn!(len = bytes.len(), "send buffer full, dropping keep-alive payload");
                    }
                }
            }
        }
    }

    fn handle_loss(&self, reason: LossReason) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        let session = self.current_session();
        if session.is_cancelled() {
            // Orderly shutdown raced the I/O completion; stay silent.
            return;
        }
        debug!(%reason, "connection lost");
        session.cancel();
        *self.stream.lock().expect("stream mutex poisoned") = None;
        let callback = self.on_connection_lost.lock().expect("callback mutex poisoned");
        if let Some(callback) = callback.as_ref() {
            callback();
        }
    }

    /// Tears down the current session without firing the lost callback.
    pub(crate) fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.current_session().cancel();
        *self.stream.lock().expect("stream mutex poisoned") = None;
    }

    /// Cancels everything this core ever spawned. Safe to call repeatedly.
    pub(crate) fn cancel(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.lifetime.cancel();
    }

    /// Cancels everything and waits for all activities to exit. Bounded by
    /// one dispatch per in-flight task.
    pub(crate) async fn shutdown(&self) {
        self.cancel();
        *self.stream.lock().expect("stream mutex poisoned") = None;
        self.tasks.close();
        self.tasks.wait().await;
    }
}
