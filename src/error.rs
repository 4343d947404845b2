use crate::utils::validation::ValidationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Decode error for {file}: {reason}")]
    Decode { file: String, reason: String },

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    #[error("Gate error: {0}")]
    Gate(#[from] GateError),

    #[error("No asset is awaiting submission")]
    NoActiveAsset,

    #[error("Thumbnail was captured for a different asset; capture again before submitting")]
    StaleThumbnail,

    #[error("No thumbnail has been captured")]
    MissingThumbnail,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    #[error("an asset is already resident in the scene")]
    Occupied,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("a submission wait is already outstanding")]
    AlreadyArmed,

    #[error("timed out waiting for submission")]
    TimedOut,

    #[error("wait was cancelled")]
    Cancelled,
}
