//! # ConnectUp
//!
//! HTTP server, realtime hub and command line for the ConnectUp backend.
//! The binary in `main.rs` is a thin wrapper over [`cli::run`].

pub mod api;
pub mod cli;
pub mod config;
pub mod hub;
pub mod providers;

// Re-export connectup_core for convenience
pub use connectup_core;
