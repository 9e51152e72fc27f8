use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create directory {path}: {message}")]
    CreateDir { path: String, message: String },
    #[error("failed to write {path}: {message}")]
    Write { path: String, message: String },
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error in {path}: {message}")]
    Decode { path: String, message: String },
    #[error("no message at index {0}")]
    MissingMessage(usize),
}
