use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid base url: {0}")]
    Url(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("server returned status {0}")]
    Status(u16),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("model server error: {0}")]
    Remote(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if let Some(status) = e.status() {
            TransportError::Status(status.as_u16())
        } else if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Http(e.to_string())
        }
    }
}
