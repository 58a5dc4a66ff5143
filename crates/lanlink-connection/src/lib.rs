//! Lanlink TCP Connection Runtime
//!
//! Long-lived, buffered TCP connections for both ends of a LAN link. A
//! connection delivers a reliable byte pipe plus liveness supervision;
//! there is no framing and no message semantics, users overlay their own
//! protocol on the byte stream.
//!
//! # Architecture
//!
//! Once connected, every connection runs three independent activities as
//! spawned tasks:
//!
//! - **Receive**: reads directly into the write window of the inbound
//!   [`LinearBuffer`](lanlink_core::LinearBuffer); the user drains it via
//!   `receive_buffer()`. Letting the buffer fill up is fatal (overrun).
//! - **Send**: drains the outbound buffer's read window into the socket;
//!   idle until the user pushes bytes and calls `send()`.
//! - **Keep-alive**: a fixed-interval timer whose tick invokes the user's
//!   keep-alive callback; the callback decides whether bytes are emitted.
//!   Liveness is inferred solely from I/O errors, the timer is a send
//!   hook.
//!
//! Any activity may terminate the connection; the lost callback fires at
//! most once per session, and cancellation (explicit disconnect, drop or
//! shutdown) is silent. Dropping a connection cancels its tasks; awaiting
//! `shutdown()` additionally joins them, which is bounded by one dispatch
//! per task.
//!
//! # Components
//!
//! - [`TcpServer`]: accept loop producing [`TcpServerConnection`]s
//! - [`TcpServerConnection`]: accepted, already-connected variant
//! - [`TcpClientConnection`]: connect-initiating variant with fixed-delay
//!   auto-reconnect
//! - [`ConnectionConfig`] / [`ClientConfig`] / [`ServerConfig`]: tuning

pub mod client;
pub mod config;
mod connection;
pub mod server;
pub mod server_connection;

pub use client::TcpClientConnection;
pub use config::{
    ClientConfig, ConnectionConfig, ServerConfig, DEFAULT_BUFFER_CAPACITY,
    DEFAULT_KEEP_ALIVE_INTERVAL, RECONNECT_DELAY,
};
pub use connection::{ConnectionLostCallback, KeepAliveCallback};
pub use server::{ConnectionCallback, TcpServer};
pub use server_connection::TcpServerConnection;
