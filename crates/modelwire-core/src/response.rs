//! Request/response envelope shared by every route.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use crate::error::ApiError;
use crate::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            other => Err(ApiError::BadRequest(format!("Unsupported method: {}", other))),
        }
    }
}

/// Inbound request as handed over by the transport shell.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Raw path, possibly with a query string.
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        ApiRequest {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// The request as echoed back in every response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEcho {
    /// Kept as text so unsupported methods can be echoed too.
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RequestEcho {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        RequestEcho {
            method: method.into(),
            path: path.into(),
            query: None,
            body: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(skip)]
    pub status: u16,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub request: RequestEcho,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApiResponse {
    pub fn ok(request: RequestEcho, outcome: Outcome) -> Self {
        ApiResponse {
            status: 200,
            success: true,
            message: outcome.message,
            error: None,
            request,
            data: outcome.data,
        }
    }

    pub fn fail(request: RequestEcho, err: &ApiError) -> Self {
        ApiResponse {
            status: err.status(),
            success: false,
            message: None,
            error: Some(err.to_string()),
            request,
            data: None,
        }
    }
}

/// Successful handler result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub message: Option<String>,
    pub data: Option<Value>,
}

impl Outcome {
    pub fn data(data: Value) -> Self {
        Outcome {
            message: None,
            data: Some(data),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Outcome {
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Asynchronous step of a deferred handler.
pub type Work = Pin<Box<dyn Future<Output = Result<Value, ApiError>> + Send>>;
/// Runs against the workspace once the work has completed.
pub type Continuation = Box<dyn FnOnce(&mut Workspace, Value) -> Result<Outcome, ApiError> + Send>;

/// What a handler returns: a finished result, or I/O to await first.
pub enum Reply {
    Ready(Result<Outcome, ApiError>),
    Deferred { work: Work, then: Continuation },
}

impl From<Result<Outcome, ApiError>> for Reply {
    fn from(result: Result<Outcome, ApiError>) -> Self {
        Reply::Ready(result)
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Reply::Deferred { .. } => f.write_str("Deferred"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn echo() -> RequestEcho {
        RequestEcho {
            method: "POST".to_string(),
            path: "/api/class/classes".to_string(),
            query: None,
            body: Some(json!({"foo": 1})),
        }
    }

    #[test]
    fn failure_envelope_shape() {
        let err = ApiError::Validation("Unknown field(s): foo. Allowed fields: name".into());
        let response = ApiResponse::fail(echo(), &err);
        assert_eq!(response.status, 400);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "success": false,
                "error": "Unknown field(s): foo. Allowed fields: name",
                "request": {"method": "POST", "path": "/api/class/classes", "body": {"foo": 1}}
            })
        );
    }

    #[test]
    fn success_envelope_carries_data_and_message() {
        let outcome = Outcome::data(json!({"id": "el-3"})).with_message("Created");
        let value = serde_json::to_value(ApiResponse::ok(echo(), outcome)).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["message"], json!("Created"));
        assert_eq!(value["data"]["id"], json!("el-3"));
        assert!(value.get("error").is_none());
    }

    #[test]
    fn methods_parse_case_insensitively() {
        assert_eq!("delete".parse::<Method>().unwrap(), Method::Delete);
        assert!("PATCH".parse::<Method>().is_err());
    }
}
