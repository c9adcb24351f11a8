//! Engine error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Leaderboard fetch failed: {0}")]
    Leaderboard(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
