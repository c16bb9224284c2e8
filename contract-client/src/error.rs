use alloy_primitives::TxHash;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ContractError>;

#[derive(Error, Debug)]
pub enum ContractError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Transport error: {0}")]
    Transport(#[from] alloy_transport::TransportError),

    #[error("Transaction reverted: {0}")]
    Reverted(TxHash),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    /// Errors a caller may reasonably retry. The client itself never does.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport(alloy_transport::TransportErrorKind::custom_str(&message.into()))
    }
}
