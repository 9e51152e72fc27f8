use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {message}")]
    Read { path: String, message: String },
    #[error("failed to parse config {path}: {message}")]
    Parse { path: String, message: String },
    #[error("failed to write config: {0}")]
    Write(String),
}
