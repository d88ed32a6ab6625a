//! Request identification and input validation.
//!
//! # Responsibilities
//! - Generate a UUID v4 request ID for every request lacking one
//! - Validate request bodies and path parameters before any RPC
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Validation failures are INVALID_ARGUMENT and never reach the backend

use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use serde_json::Value;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::error::Error;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Makes `x-request-id` values from random UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// The request ID header, or `unknown`.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Validated body of `POST /items`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateItem {
    pub name: String,
    pub id: Option<i64>,
}

impl CreateItem {
    /// `{"name": string, "id"?: integer}`; a null `id` means absent.
    pub fn from_json(body: &Value) -> Result<Self, Error> {
        let object = body
            .as_object()
            .ok_or_else(|| Error::InvalidArgument("request body must be a JSON object".into()))?;

        let name = match object.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(_) => return Err(Error::InvalidArgument("'name' must be a string".into())),
            None => return Err(Error::InvalidArgument("missing required field 'name'".into())),
        };

        let id = match object.get("id") {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                value
                    .as_i64()
                    .ok_or_else(|| Error::InvalidArgument("'id' must be an integer".into()))?,
            ),
        };

        Ok(Self { name, id })
    }
}

/// Parse the `{id}` path segment.
pub fn parse_item_id(raw: &str) -> Result<i64, Error> {
    raw.parse::<i64>()
        .map_err(|_| Error::InvalidArgument(format!("invalid item id '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_body_validation() {
        assert_eq!(
            CreateItem::from_json(&json!({"name": "a"})).unwrap(),
            CreateItem { name: "a".into(), id: None }
        );
        assert_eq!(
            CreateItem::from_json(&json!({"name": "a", "id": 7})).unwrap(),
            CreateItem { name: "a".into(), id: Some(7) }
        );
        assert_eq!(
            CreateItem::from_json(&json!({"name": "a", "id": null})).unwrap().id,
            None
        );

        for bad in [
            json!([1, 2]),
            json!({}),
            json!({"name": 3}),
            json!({"name": "a", "id": "7"}),
            json!({"name": "a", "id": 1.5}),
        ] {
            let err = CreateItem::from_json(&bad).unwrap_err();
            assert_eq!(err.code(), "INVALID_ARGUMENT", "{bad}");
        }
    }

    #[test]
    fn item_id_parsing() {
        assert_eq!(parse_item_id("42").unwrap(), 42);
        assert!(matches!(parse_item_id("abc"), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn generated_ids_are_uuids() {
        let request = Request::new(());
        let id = MakeRequestUuid.make_request_id(&request).unwrap();
        let text = id.header_value().to_str().unwrap();
        assert!(Uuid::parse_str(text).is_ok());
    }
}
