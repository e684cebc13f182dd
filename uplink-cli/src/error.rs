use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload error: {0}")]
    Upload(#[from] uplink_engine::UploadError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Manifest error: {0}")]
    Manifest(String),
}
