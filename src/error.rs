//! Gateway error type.

use thiserror::Error;

use crate::rpc::{Code, Status};

/// Everything a guarded gateway operation can fail with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed external input; never reaches the backend.
    #[error("{0}")]
    InvalidArgument(String),

    /// Rejected by the circuit breaker without contacting the backend.
    #[error("circuit breaker is open")]
    BreakerOpen,

    /// The backend call itself failed.
    #[error(transparent)]
    Rpc(#[from] Status),

    /// Unexpected fault inside the gateway.
    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable category reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::BreakerOpen => "BREAKER_OPEN",
            Error::Rpc(status) => status.code.as_str(),
            Error::Internal(_) => "INTERNAL",
        }
    }

    /// Human-readable details without the code prefix.
    pub fn message(&self) -> String {
        match self {
            Error::Rpc(status) => status.message.clone(),
            other => other.to_string(),
        }
    }

    /// Connectivity or deadline failure of a call that was attempted.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Rpc(status) if status.code.is_transport())
    }

    pub fn rpc_code(&self) -> Option<Code> {
        match self {
            Error::Rpc(status) => Some(status.code),
            _ => None,
        }
    }
}
