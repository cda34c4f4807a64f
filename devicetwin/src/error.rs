//! Error types for the device twin library.

use thiserror::Error;

/// Error type for device twin operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Topic matches none of the twin or method patterns.
    #[error("devicetwin: unrecognized topic: {0}")]
    UnrecognizedTopic(String),

    /// Document could not be encoded.
    #[error("devicetwin: encode error: {0}")]
    Encode(String),

    /// Configuration is missing or inconsistent.
    #[error("devicetwin: invalid config: {0}")]
    InvalidConfig(String),

    /// Connection error.
    #[error("devicetwin: connection error: {0}")]
    Connection(String),

    /// Transport is not connected.
    #[error("devicetwin: not connected")]
    NotConnected,

    /// Publish error.
    #[error("devicetwin: publish error: {0}")]
    Publish(String),

    /// Subscribe error.
    #[error("devicetwin: subscribe error: {0}")]
    Subscribe(String),

    /// Client error from rumqttc.
    #[error("mqtt client error: {0}")]
    ClientError(#[from] rumqttc::ClientError),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for device twin operations.
pub type Result<T> = std::result::Result<T, Error>;
