//! Local Storage Module
//!
//! Implements the node-local byte-string store that backs both primary
//! ownership and replica copies.
//!
//! ## Core Concepts
//! - **Atomicity**: every operation is atomic with respect to every other;
//!   readers never observe a partial write.
//! - **Snapshots**: bulk reads (`keys`, `snapshot`, `filter`) return owned
//!   copies so callers can perform network I/O while iterating without
//!   keeping the store pinned.

pub mod memory;

#[cfg(test)]
mod tests;
