//! Positional raw-bytes codec over a buffer adapter.
//!
//! The serializer copies native-endian bytes of primitives straight into an
//! [`Adapter`] with no framing, no versioning and no endian conversion;
//! both ends are expected to run the same build on the same architecture.
//! Composite types participate by implementing [`Serializable`] and
//! forwarding member by member.
//!
//! A failed write or read makes the remainder of the chain a no-op and
//! leaves the byte counter where it was; callers detect failure by
//! comparing [`Serializer::bytes_written`] (or
//! [`Deserializer::bytes_read`]) against the expected total.
//!
//! # Example
//!
//! ```
//! use lanlink_core::{LinearBuffer, Serializer, Deserializer, Serializable};
//!
//! #[derive(Default, PartialEq, Debug)]
//! struct Sample {
//!     id: u32,
//!     temperature: i16,
//!     active: bool,
//! }
//!
//! impl Serializable for Sample {
//!     fn serialize<A: lanlink_core::Adapter>(&self, ser: &mut Serializer<'_, A>) {
//!         ser.serialize(&self.id).serialize(&self.temperature).serialize(&self.active);
//!     }
//!
//!     fn deserialize<A: lanlink_core::Adapter>(&mut self, de: &mut Deserializer<'_, A>) {
//!         de.deserialize(&mut self.id)
//!             .deserialize(&mut self.temperature)
//!             .deserialize(&mut self.active);
//!     }
//! }
//!
//! let mut buffer = LinearBuffer::new(64);
//! let sample = Sample { id: 42, temperature: -15, active: true };
//! Serializer::new(&mut buffer).serialize(&sample);
//!
//! let mut decoded = Sample::default();
//! Deserializer::new(&mut buffer).deserialize(&mut decoded);
//! assert_eq!(decoded, sample);
//! ```

use crate::buffer::LinearBuffer;

/// Byte-level transport the codec runs over.
pub trait Adapter {
    /// Writes all of `bytes`, or nothing. Returns `false` on failure.
    fn write(&mut self, bytes: &[u8]) -> bool;

    /// Fills all of `out`, or nothing. Returns `false` on failure.
    fn read(&mut self, out: &mut [u8]) -> bool;
}

impl Adapter for LinearBuffer {
    fn write(&mut self, bytes: &[u8]) -> bool {
        self.push(bytes)
    }

    fn read(&mut self, out: &mut [u8]) -> bool {
        if out.len() > self.len() {
            return false;
        }
        out.copy_from_slice(&self.read_window()[..out.len()]);
        self.consume(out.len())
    }
}

/// A value the positional codec knows how to move in both directions.
pub trait Serializable {
    fn serialize<A: Adapter>(&self, ser: &mut Serializer<'_, A>);
    fn deserialize<A: Adapter>(&mut self, de: &mut Deserializer<'_, A>);
}

/// Chainable writer half of the codec.
pub struct Serializer<'a, A: Adapter> {
    adapter: &'a mut A,
    bytes_written: usize,
    failed: bool,
}

impl<'a, A: Adapter> Serializer<'a, A> {
    pub fn new(adapter: &'a mut A) -> Self {
        Self {
            adapter,
            bytes_written: 0,
            failed: false,
        }
    }

    /// Appends one value; chainable.
    pub fn serialize<T: Serializable>(&mut self, value: &T) -> &mut Self {
        value.serialize(self);
        self
    }

    /// Bytes successfully written so far.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// True once any element of the chain has failed.
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Clears the byte counter and the sticky failure flag.
    pub fn reset(&mut self) {
        self.bytes_written = 0;
        self.failed = false;
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        if self.failed {
            return;
        }
        if self.adapter.write(bytes) {
            self.bytes_written += bytes.len();
        } else {
            self.failed = true;
        }
    }
}

/// Chainable reader half of the codec.
pub struct Deserializer<'a, A: Adapter> {
    adapter: &'a mut A,
    bytes_read: usize,
    failed: bool,
}

impl<'a, A: Adapter> Deserializer<'a, A> {
    pub fn new(adapter: &'a mut A) -> Self {
        Self {
            adapter,
            bytes_read: 0,
            failed: false,
        }
    }

    /// Extracts one value; chainable. The target is untouched on failure.
    pub fn deserialize<T: Serializable>(&mut self, value: &mut T) -> &mut Self {
        value.deserialize(self);
        self
    }

    /// Bytes successfully read so far.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// True once any element of the chain has failed.
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Clears the byte counter and the sticky failure flag.
    pub fn reset(&mut self) {
        self.bytes_read = 0;
        self.failed = false;
    }

    fn get_bytes(&mut self, out: &mut [u8]) -> bool {
        if self.failed {
            return false;
        }
        if self.adapter.read(out) {
            self.bytes_read += out.len();
            true
        } else {
            self.failed = true;
            false
        }
    }
}

macro_rules! impl_serializable_primitive {
    ($($ty:ty),* $(,)?) => {$(
        impl Serializable for $ty {
            fn serialize<A: Adapter>(&self, ser: &mut Serializer<'_, A>) {
                ser.put_bytes(&self.to_ne_bytes());
            }

            fn deserialize<A: Adapter>(&mut self, de: &mut Deserializer<'_, A>) {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                if de.get_bytes(&mut raw) {
                    *self = <$ty>::from_ne_bytes(raw);
                }
            }
        }
    )*};
}

impl_serializable_primitive!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl Serializable for bool {
    fn serialize<A: Adapter>(&self, ser: &mut Serializer<'_, A>) {
        ser.put_bytes(&[u8::from(*self)]);
    }

    fn deserialize<A: Adapter>(&mut self, de: &mut Deserializer<'_, A>) {
        let mut raw = [0u8; 1];
        if de.get_bytes(&mut raw) {
            *self = raw[0] != 0;
        }
    }
}

/// Fixed-size arrays forward element by element; there is no length
/// prefix, the arity is part of the type.
impl<T: Serializable, const N: usize> Serializable for [T; N] {
    fn serialize<A: Adapter>(&self, ser: &mut Serializer<'_, A>) {
        for element in self {
            element.serialize(ser);
        }
    }

    fn deserialize<A: Adapter>(&mut self, de: &mut Deserializer<'_, A>) {
        for element in self.iter_mut() {
            element.deserialize(de);
        }
    }
}
