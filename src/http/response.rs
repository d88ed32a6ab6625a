//! Error responses.
//!
//! # Responsibilities
//! - Map gateway errors to HTTP status codes
//! - Render every failure as `{"error": <message>, "code": <CODE>}`
//!
//! # Design Decisions
//! - Breaker rejections and unreachable backends are 503
//! - Backend timeouts result in 504 Gateway Timeout
//! - Panics become a 500 INTERNAL body instead of a dropped connection
//! - The request deadline renders as 504 DEADLINE_EXCEEDED like any other error

use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    BoxError, Json,
};
use serde::Serialize;
use tower::timeout::error::Elapsed;

use crate::error::Error;
use crate::rpc::{Code, Status};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        Error::BreakerOpen => StatusCode::SERVICE_UNAVAILABLE,
        Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        Error::Rpc(status) => match status.code {
            Code::InvalidArgument => StatusCode::BAD_REQUEST,
            Code::NotFound => StatusCode::NOT_FOUND,
            Code::AlreadyExists => StatusCode::CONFLICT,
            Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Code::Internal | Code::ResourceExhausted | Code::Unknown => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let body = ErrorBody {
            error: self.message(),
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}

/// Response for a handler panic, used by the catch-panic layer.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %details, "Handler panicked");
    Error::Internal("internal server error".to_string()).into_response()
}

/// Error handler for the request deadline layer.
pub async fn timeout_response(err: BoxError) -> Response {
    if err.is::<Elapsed>() {
        tracing::warn!("Request exceeded the gateway deadline");
        Error::Rpc(Status::deadline_exceeded("request timed out")).into_response()
    } else {
        tracing::error!(error = %err, "Unhandled middleware error");
        Error::Internal(err.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (Error::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (Error::BreakerOpen, StatusCode::SERVICE_UNAVAILABLE),
            (Error::from(Status::not_found("x")), StatusCode::NOT_FOUND),
            (Error::from(Status::already_exists("x")), StatusCode::CONFLICT),
            (Error::from(Status::unavailable("x")), StatusCode::SERVICE_UNAVAILABLE),
            (Error::from(Status::deadline_exceeded("x")), StatusCode::GATEWAY_TIMEOUT),
            (Error::from(Status::internal("x")), StatusCode::INTERNAL_SERVER_ERROR),
            (Error::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(status_for(&error), expected, "{error:?}");
        }
    }

    #[tokio::test]
    async fn elapsed_deadline_is_gateway_timeout() {
        let response = timeout_response(Box::new(Elapsed::new())).await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        let response = timeout_response("other".into()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn panic_maps_to_internal() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
