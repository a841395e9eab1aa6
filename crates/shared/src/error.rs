use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("message content is empty after trimming")]
    EmptyContent,
    #[error("message sender is empty")]
    MissingSender,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed channel payload: {0}")]
    MalformedPayload(String),
}

impl DecodeError {
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedPayload(detail.into())
    }
}
