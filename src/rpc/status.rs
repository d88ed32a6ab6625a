//! RPC status codes and the error type carried by every failed call.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status codes reported by RPC calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Code {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    Unavailable,
    Internal,
    DeadlineExceeded,
    ResourceExhausted,
    Unknown,
}

impl Code {
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::NotFound => "NOT_FOUND",
            Code::AlreadyExists => "ALREADY_EXISTS",
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::Unavailable => "UNAVAILABLE",
            Code::Internal => "INTERNAL",
            Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Code::Unknown => "UNKNOWN",
        }
    }

    /// Connectivity or deadline failures, the only class eligible for retry.
    pub fn is_transport(&self) -> bool {
        matches!(self, Code::Unavailable | Code::DeadlineExceeded)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed RPC call: a code plus human-readable details.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(Code::AlreadyExists, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_class() {
        assert!(Code::Unavailable.is_transport());
        assert!(Code::DeadlineExceeded.is_transport());
        assert!(!Code::NotFound.is_transport());
        assert!(!Code::Internal.is_transport());
    }

    #[test]
    fn codes_use_screaming_snake_case_on_the_wire() {
        let status = Status::not_found("Item not found");
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, r#"{"code":"NOT_FOUND","message":"Item not found"}"#);

        let code: Code = serde_json::from_str(r#""DEADLINE_EXCEEDED""#).unwrap();
        assert_eq!(code, Code::DeadlineExceeded);
        assert_eq!(code.to_string(), "DEADLINE_EXCEEDED");
    }
}
