use thiserror::Error;

pub use crate::delivery::DeliveryError;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("A batch is already running")]
    BatchRunning,

    #[error("Transcript not found: {0}")]
    TranscriptNotFound(String),

    #[error("Invalid transcript name: {0}")]
    InvalidTranscriptName(String),

    #[error("Failed to start worker `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
