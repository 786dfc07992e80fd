use thiserror::Error;

/// Main error type for Larder
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, CacheError>;
