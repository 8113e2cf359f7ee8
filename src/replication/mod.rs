//! Replication Module
//!
//! Keeps every key redundantly stored on the owner's immediate successors.
//!
//! ## Core Concepts
//! - **Fan-out**: the engine pushes writes and deletes to a supplied replica
//!   set, either synchronously (the caller waits for every attempted write)
//!   or asynchronously through a single background worker with retry.
//! - **Read fallback**: when the primary misses a key, the replica set is
//!   consulted in order until one copy answers.
//! - **Failure detection**: a consecutive-failure counter per peer decides
//!   when a node is suspected and when it is considered failed, which
//!   triggers ring repair and re-replication.

pub mod detector;
pub mod engine;
