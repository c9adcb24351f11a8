//! Repository implementations for database operations

pub mod network;

pub use network::*;
