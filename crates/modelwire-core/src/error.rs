use thiserror::Error;

use crate::graph::HostError;

/// Failure of one request, carried to the response envelope.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// Malformed or disallowed request shape.
    #[error("{0}")]
    Validation(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },
    /// Refused because it would orphan references.
    #[error("{0}")]
    Integrity(String),
    /// The graph's factory rejected an otherwise well-formed request.
    #[error("{0}")]
    Construction(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        ApiError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            ApiError::NotFound { .. } => 404,
            ApiError::PayloadTooLarge { .. } => 413,
            ApiError::Internal(_) => 500,
            other if is_not_found_message(&other.to_string()) => 404,
            _ => 400,
        }
    }
}

/// Matches "<Kind> not found: <id>" anywhere in an error text.
pub fn is_not_found_message(text: &str) -> bool {
    match text.find(" not found: ") {
        Some(at) => {
            let kind = text[..at].rsplit(' ').next().unwrap_or("");
            let id = &text[at + " not found: ".len()..];
            !kind.is_empty() && !id.trim().is_empty()
        }
        None => false,
    }
}

impl From<HostError> for ApiError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Missing { kind, id } => ApiError::not_found(kind, id),
            other => ApiError::Construction(other.to_string()),
        }
    }
}

/// Failure building the route table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("invalid family declaration: {0}")]
    InvalidFamily(String),
    #[error("duplicate family prefix '{0}'")]
    DuplicatePrefix(&'static str),
    #[error("family prefix '{0}' is reserved")]
    ReservedPrefix(&'static str),
    #[error("route collision: {0}")]
    Collision(String),
}

/// Failure loading `config.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config {path}: {message}")]
    Parse { path: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ElementKind;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::Validation("bad".into()).status(), 400);
        assert_eq!(ApiError::not_found("Class", "el-9").status(), 404);
        assert_eq!(ApiError::PayloadTooLarge { limit: 10 }.status(), 413);
        assert_eq!(ApiError::Internal("boom".into()).status(), 500);
        assert_eq!(ApiError::Integrity("Cannot delete".into()).status(), 400);
    }

    #[test]
    fn not_found_text_in_other_variants_maps_to_404() {
        let err = ApiError::Construction("View not found: view-3".into());
        assert_eq!(err.status(), 404);
        assert!(!is_not_found_message("not found: x"));
        assert!(!is_not_found_message("Class not found: "));
    }

    #[test]
    fn host_errors_convert() {
        let missing: ApiError = HostError::missing("Diagram", "el-4").into();
        assert_eq!(missing.to_string(), "Diagram not found: el-4");
        let refused: ApiError = HostError::ViewRequired(ElementKind::Port).into();
        assert!(matches!(refused, ApiError::Construction(_)));
    }
}
