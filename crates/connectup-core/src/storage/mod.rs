//! # Storage Module
//!
//! Record storage for ConnectUp using redb.
//!
//! Uses redb embedded database for:
//! - ACID transactions (one write transaction per domain operation)
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Every record kind owns a `u64 -> bytes` table; unique lookups (email,
//! tokens) go through `&str -> u64` index tables.

mod redb_store;

pub use redb_store::*;
