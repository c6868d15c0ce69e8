use thiserror::Error;

/// Errors produced below the tool surface.
///
/// Catalog lookups absorb these into neutral empty results; the query
/// pipeline classifies them into a structured failure payload instead of
/// propagating. Nothing here is ever fatal to the process.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query execution failed: {0}")]
    Backend(String),

    #[error("Query timeout after {0} seconds")]
    Timeout(u64),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
