#[derive(Debug, thiserror::Error)]
pub enum WallError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Media not found: {0}")]
    NotFound(String),

    #[error("Media sync failed: {0}")]
    SyncError(String),

    #[error("Media unavailable: {0}")]
    MediaUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Coordinator is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, WallError>;
