//! # Formats Module
//!
//! Serialization and export formats for ConnectUp records.
//!
//! This module contains:
//! - Record framing for the store (format byte + postcard payload)
//! - CSV rendering for admin exports
//!
//! File and network I/O stay in the app layer; everything here is a pure
//! transformation.

mod csv;
mod record;

pub use csv::*;
pub use record::*;
