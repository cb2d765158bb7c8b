/// Transport-level failure talking to the upstream service.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Terminal failure of a non-streaming chat request.
///
/// Only these reach the request boundary; everything recoverable is handled
/// inside the pipeline. `Display` doubles as the machine-readable reason
/// string in the error response body.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChatError {
    #[error("upstream_status_{0}")]
    UpstreamStatus(u16),
    #[error("all_attempts_failed: {last}")]
    AllAttemptsFailed { last: String },
    #[error("no_available_credentials: {last}")]
    NoCredentials { last: String },
}

impl ChatError {
    pub fn http_status(&self) -> u16 {
        502
    }

    pub fn reason(&self) -> String {
        self.to_string()
    }
}
