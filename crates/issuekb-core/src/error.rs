use thiserror::Error;

/// All the ways the pipeline glue can fail
///
/// Transport failures while crawling never show up here: the crawler logs
/// them and hands back whatever it collected.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Failed to encode artifact: {0}")]
    EncodeError(#[from] rmp_serde::encode::Error),

    #[error("Failed to decode artifact: {0}")]
    DecodeError(#[from] rmp_serde::decode::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
