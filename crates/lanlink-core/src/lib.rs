//! Lanlink Core Primitives
//!
//! This crate provides the data-plane primitives shared by the lanlink
//! toolkit: a zero-copy linear byte buffer, a reflection-free positional
//! serializer that runs over it, and the common error type.
//!
//! # Components
//!
//! - [`LinearBuffer`]: bounded contiguous byte FIFO exposing direct
//!   read/write windows for in-place socket I/O
//! - [`Serializer`] / [`Deserializer`]: positional raw-bytes codec over an
//!   [`Adapter`]
//! - [`LanlinkError`]: shared error taxonomy for the workspace
//!
//! # Example
//!
//! ```
//! use lanlink_core::LinearBuffer;
//!
//! let mut buffer = LinearBuffer::new(4096);
//!
//! // Producer side: copy into the write window, then commit.
//! let window = buffer.write_window();
//! window[..5].copy_from_slice(b"hello");
//! buffer.commit(5);
//!
//! // Consumer side: observe the read window, then consume.
//! assert_eq!(buffer.read_window(), b"hello");
//! buffer.consume(5);
//! assert!(buffer.is_empty());
//! ```

pub mod buffer;
pub mod error;
pub mod serial;

pub use buffer::LinearBuffer;
pub use error::{LanlinkError, Result};
pub use serial::{Adapter, Deserializer, Serializable, Serializer};
