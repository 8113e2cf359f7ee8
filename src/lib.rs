//! Distributed Key/Value Ring Library
//!
//! This library crate defines the core modules of a distributed in-memory
//! key/value store built on a consistent-hashing ring. It serves as the
//! foundation for the node executable (`main.rs`) and the client tool.
//!
//! ## Architecture Modules
//! The system is composed of the following loosely coupled subsystems:
//!
//! - **`ident`**: The 160-bit identifier space. Key and node hashing (SHA-1),
//!   modular arithmetic, and the clockwise ring-interval predicate that every
//!   routing decision is built on.
//! - **`proto`**: The binary wire protocol shared by the client and peer
//!   paths. Length-prefixed request/response frames with a one-byte opcode.
//! - **`storage`**: The node-local state layer. A thread-safe byte-string
//!   map with snapshot iteration so callers never hold it across network I/O.
//! - **`client`**: The peer RPC client. One short-lived connection per call,
//!   bounded connect and per-operation timeouts, typed failures.
//! - **`replication`**: Write fan-out to a replica set (synchronous or via a
//!   background worker with retry) and the consecutive-failure detector.
//! - **`ring`**: The ring node itself: predecessor/successor/finger state,
//!   lookup, stabilization, failure handling, key transfer, and the client
//!   data operations with ownership routing.
//! - **`server`**: The TCP listener and the request dispatcher that maps
//!   inbound operations onto ring-node methods.

pub mod client;
pub mod ident;
pub mod proto;
pub mod replication;
pub mod ring;
pub mod server;
pub mod storage;
