/// Failure reported by the host mail client for a single API call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed: {message}")]
pub struct HostError {
    pub operation: String,
    pub message: String,
}

impl HostError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("Host error: {0}")]
    Host(#[from] HostError),
    #[error("Template service error: {0}")]
    TemplateService(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Invalid template URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Unknown signature identifier: {0}")]
    UnknownSignature(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SignatureError>;
