use thiserror::Error;

pub type Result<T> = std::result::Result<T, CozeError>;

#[derive(Debug, Error)]
pub enum CozeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Stream error: {0}")]
    Stream(String),
}

impl From<reqwest::Error> for CozeError {
    fn from(err: reqwest::Error) -> Self {
        CozeError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for CozeError {
    fn from(err: serde_json::Error) -> Self {
        CozeError::Parse(err.to_string())
    }
}
