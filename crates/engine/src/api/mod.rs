//! External API clients

pub mod polymarket;

pub use polymarket::PolymarketDataClient;
