//! Remote Operation Results
//!
//! Every remote operation resolves to an [`ApiResult`]: either a
//! [`DataResult`] carrying the payload together with the raw response
//! metadata, or an [`ErrorResult`] carrying a human-readable error. Exactly one
//! variant exists, so callers branch on it before touching data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

//-----------------------------------------------------------------------------
// Response Metadata
//-----------------------------------------------------------------------------

/// Raw response metadata attached by the HTTP client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// HTTP status code
    pub status: u16,

    /// Response headers, lower-cased names
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl ResponseMeta {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

//-----------------------------------------------------------------------------
// Error Payload
//-----------------------------------------------------------------------------

/// Error payload returned by a failed remote operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable message, stored verbatim in transaction state
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Machine-readable error code, when the server sends one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            code: None,
            details: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

//-----------------------------------------------------------------------------
// Result Variants
//-----------------------------------------------------------------------------

/// Successful response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataResult<T> {
    pub data: T,
    pub response: ResponseMeta,
}

/// Failed response. Transport failures carry no response metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResult {
    pub error: ApiError,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseMeta>,
}

/// Discriminated result of a remote operation.
///
/// Serialized untagged, as `{ "data": .., "response": .. }` or
/// `{ "error": .., "response": .. }`, which is the shape the generated API
/// client produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiResult<T> {
    // `Error` is listed first so untagged decoding never mistakes an error
    // payload for data when `T` tolerates a missing field.
    Error(ErrorResult),
    Data(DataResult<T>),
}

impl<T> ApiResult<T> {
    /// Success with a bare 200 response
    pub fn ok(data: T) -> Self {
        Self::with_response(data, ResponseMeta::new(200))
    }

    pub fn with_response(data: T, response: ResponseMeta) -> Self {
        ApiResult::Data(DataResult { data, response })
    }

    /// Failure without response metadata (transport-level)
    pub fn err(message: impl Into<String>) -> Self {
        ApiResult::Error(ErrorResult {
            error: ApiError::new(message),
            response: None,
        })
    }

    /// Failure carrying the server's response
    pub fn err_with_response(error: ApiError, response: ResponseMeta) -> Self {
        ApiResult::Error(ErrorResult {
            error,
            response: Some(response),
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ApiResult::Error(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            ApiResult::Data(result) => Some(&result.data),
            ApiResult::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            ApiResult::Data(_) => None,
            ApiResult::Error(result) => Some(&result.error),
        }
    }

    pub fn response(&self) -> Option<&ResponseMeta> {
        match self {
            ApiResult::Data(result) => Some(&result.response),
            ApiResult::Error(result) => result.response.as_ref(),
        }
    }

    pub fn into_result(self) -> Result<DataResult<T>, ErrorResult> {
        match self {
            ApiResult::Data(result) => Ok(result),
            ApiResult::Error(result) => Err(result),
        }
    }

    /// Map the payload, leaving errors untouched
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResult<U> {
        match self {
            ApiResult::Data(DataResult { data, response }) => ApiResult::Data(DataResult {
                data: f(data),
                response,
            }),
            ApiResult::Error(result) => ApiResult::Error(result),
        }
    }
}

impl<T> From<Result<DataResult<T>, ErrorResult>> for ApiResult<T> {
    fn from(result: Result<DataResult<T>, ErrorResult>) -> Self {
        match result {
            Ok(data) => ApiResult::Data(data),
            Err(error) => ApiResult::Error(error),
        }
    }
}

//-----------------------------------------------------------------------------
// Tests
//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_variant_accessors() {
        let ok: ApiResult<u32> = ApiResult::ok(7);
        assert!(!ok.is_error());
        assert_eq!(ok.data(), Some(&7));
        assert!(ok.error().is_none());
        assert_eq!(ok.response().map(|r| r.status), Some(200));

        let failed: ApiResult<u32> = ApiResult::err("card reader offline");
        assert!(failed.is_error());
        assert!(failed.data().is_none());
        assert_eq!(failed.error().map(|e| e.message.as_str()), Some("card reader offline"));
        assert!(failed.response().is_none());
    }

    #[test]
    fn test_untagged_decoding_prefers_error_shape() {
        let raw = json!({
            "error": { "message": "Member not found", "status": 404 },
            "response": { "status": 404 }
        });
        let decoded: ApiResult<Option<String>> = serde_json::from_value(raw).unwrap();
        let error = decoded.error().unwrap();
        assert_eq!(error.message, "Member not found");
        assert_eq!(error.status, Some(404));

        let raw = json!({ "data": ["m1", "m2"], "response": { "status": 200 } });
        let decoded: ApiResult<Vec<String>> = serde_json::from_value(raw).unwrap();
        assert_eq!(decoded.data().map(Vec::len), Some(2));
    }

    #[test]
    fn test_map_and_into_result() {
        let response = ResponseMeta::new(201).with_header("X-Request-Id", "abc");
        let created = ApiResult::with_response("inv_1".to_string(), response);
        let mapped = created.map(|id| id.len());
        let data = mapped.into_result().unwrap();
        assert_eq!(data.data, 5);
        assert_eq!(
            data.response.headers.get("x-request-id").map(String::as_str),
            Some("abc")
        );
        assert!(data.response.is_success());

        let declined = ApiError::new("Payment declined").with_code("card_declined");
        let failed: ApiResult<String> =
            ApiResult::err_with_response(declined, ResponseMeta::new(402));
        let error = failed.map(|s| s.len()).into_result().unwrap_err();
        assert_eq!(error.error.code.as_deref(), Some("card_declined"));
        assert_eq!(error.response.map(|r| r.status), Some(402));
    }
}
