//! Ring Identifier Space
//!
//! 160-bit identifiers on a circular space modulo 2^160. Nodes and keys are
//! hashed into the same space so data placement falls out of identifier
//! ordering alone.
//!
//! ## Mechanism
//! - **Hashing**: `id(key) = sha1(key)`, `id(node) = sha1("address:port")`.
//!   The 20 digest bytes are interpreted big-endian, so lexicographic order
//!   on the bytes matches unsigned integer order.
//! - **Intervals**: routing decisions use [`in_interval`], the clockwise
//!   "strictly after `start`, up to `end`" predicate, which handles the
//!   wrap past zero that makes the space a ring.

#[cfg(test)]
mod tests;

use sha1::{Digest, Sha1};
use std::fmt;

/// Width of the identifier space, and therefore the finger-table size.
pub const ID_BITS: usize = 160;

/// A point on the identifier ring. 20 bytes, big-endian.
///
/// `Ord` is derived on the byte array, which is exactly unsigned integer
/// order for a big-endian encoding.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id([u8; 20]);

impl Id {
    /// Hashes an arbitrary byte string into the identifier space.
    pub fn hash(input: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(input);
        Id(hasher.finalize().into())
    }

    /// Identifier of the node listening on `address:port`.
    pub fn for_endpoint(address: &str, port: u16) -> Self {
        Id::hash(format!("{}:{}", address, port).as_bytes())
    }

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Id(bytes)
    }

    /// Parses a raw 20-byte identifier, as carried in peer RPC frames.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 20] = bytes.try_into().ok()?;
        Some(Id(raw))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Addition of 2^power modulo 2^160, used to compute finger targets.
    pub fn add_pow2(&self, power: usize) -> Id {
        if power >= ID_BITS {
            return *self;
        }
        let mut out = self.0;
        let byte_index = 19 - power / 8;
        let mut sum = out[byte_index] as u16 + (1u16 << (power % 8));
        out[byte_index] = sum as u8;
        let mut i = byte_index;
        // Carry propagation toward the most significant byte. Overflow past
        // byte 0 wraps, which is the mod-2^160 behavior we want.
        while sum > 0xFF && i > 0 {
            i -= 1;
            sum = out[i] as u16 + 1;
            out[i] = sum as u8;
        }
        Id(out)
    }

    /// Abbreviated hex form for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({}..)", self.short())
    }
}

/// Clockwise interval membership on the ring.
///
/// Returns true iff `x` lies strictly after `start` and, depending on
/// `inclusive_end`, up to and including `end` (or strictly before it). When
/// `start == end` the interval is empty unless inclusive and `x == start`.
/// When `start > end` the interval wraps past zero.
pub fn in_interval(x: &Id, start: &Id, end: &Id, inclusive_end: bool) -> bool {
    if start == end {
        return inclusive_end && x == start;
    }
    if start < end {
        x > start && if inclusive_end { x <= end } else { x < end }
    } else {
        x > start || if inclusive_end { x <= end } else { x < end }
    }
}
