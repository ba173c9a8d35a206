//! Error types for the realtime bus

use thiserror::Error;

/// Realtime bus error
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Subscriber fell behind and missed events
    #[error("Subscriber lagged, {0} events dropped")]
    Lagged(u64),

    /// Bus closed (no broadcaster alive)
    #[error("Bus closed")]
    Closed,
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
