//! Lanlink UDP Service Discovery
//!
//! A rendezvous mechanism for locating TCP endpoints by logical name on a
//! LAN. Clients broadcast a service identifier as a bare UDP datagram;
//! servers answering to that identifier unicast a reply back to the
//! request's source. There is no header, framing or checksum beyond UDP's
//! own, and payloads are capped at 1024 bytes in both directions.
//!
//! # Components
//!
//! - [`Discoverable`]: a named service advertisement with a
//!   reply-producing function
//! - [`UdpDiscoveryServer`]: listens on one UDP port and dispatches
//!   requests to matching services; unknown identifiers are dropped
//!   silently so multiple servers can share a subnet
//! - [`UdpDiscoveryClient`]: broadcasts requests with bounded retry until
//!   a user handler accepts a reply
//! - [`DiscoveringTcpSocket`] / [`DiscoverableTcpSocket`]: compose the
//!   exchange with TCP connect/accept to yield a connected stream by name
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use lanlink_discovery::{Discoverable, UdpDiscoveryClient, UdpDiscoveryServer};
//!
//! # async fn run() -> lanlink_core::Result<()> {
//! // Server side: advertise where the database lives.
//! let mut server = UdpDiscoveryServer::bind(54321).await?;
//! server.add_discoverable(Discoverable::new("database", || "127.0.0.1:5432".into()));
//! server.start();
//!
//! // Client side: ask the LAN until somebody answers.
//! let mut client = UdpDiscoveryClient::new(
//!     "database",
//!     Duration::from_millis(500),
//!     54321,
//!     |reply, _sender| {
//!         println!("database is at {}", String::from_utf8_lossy(reply));
//!         true
//!     },
//! );
//! client.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod discoverable;
pub mod discoverable_socket;
pub mod discovering;
pub mod server;

pub use client::{ReplyHandler, UdpDiscoveryClient};
pub use discoverable::Discoverable;
pub use discoverable_socket::DiscoverableTcpSocket;
pub use discovering::DiscoveringTcpSocket;
pub use server::{UdpDiscoveryServer, MAX_DATAGRAM_SIZE};
