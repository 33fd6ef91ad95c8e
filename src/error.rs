//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

/// Configuration-time failures. Fatal to startup; never produced by request handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("resource '{0}' is already registered")]
    DuplicateResource(String),
    #[error("invalid schema for '{resource}': {reason}")]
    InvalidSchema { resource: String, reason: String },
    #[error("routes are frozen: cannot bind '{0}' after requests have been served")]
    RouteFrozen(String),
    #[error("config load: {0}")]
    Load(String),
}

impl ConfigError {
    pub(crate) fn invalid(resource: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidSchema {
            resource: resource.to_string(),
            reason: reason.into(),
        }
    }
}

/// Stable error kinds exposed on the wire. Clients branch on these, not on messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    UnsupportedOperator,
    UnsupportedSortField,
    Authorization,
    NotFound,
    DuplicateResource,
    InvalidSchema,
    RouteFrozen,
    HookAbort,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::UnsupportedOperator => "UnsupportedOperatorError",
            ErrorKind::UnsupportedSortField => "UnsupportedSortFieldError",
            ErrorKind::Authorization => "AuthorizationError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::DuplicateResource => "DuplicateResourceError",
            ErrorKind::InvalidSchema => "InvalidSchemaError",
            ErrorKind::RouteFrozen => "RouteFrozenError",
            ErrorKind::HookAbort => "HookAbortError",
            ErrorKind::Internal => "InternalError",
        }
    }

    /// Default status for the kind. Hook aborts may override theirs.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::Validation
            | ErrorKind::UnsupportedOperator
            | ErrorKind::UnsupportedSortField
            | ErrorKind::HookAbort => StatusCode::BAD_REQUEST,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::DuplicateResource
            | ErrorKind::InvalidSchema
            | ErrorKind::RouteFrozen
            | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        field: Option<String>,
        message: String,
    },
    #[error("{reason}")]
    UnsupportedOperator {
        field: String,
        operator: String,
        reason: String,
    },
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("field '{0}' is not sortable")]
    UnsupportedSortField(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{resource} '{id}' not found")]
    NotFound { resource: String, id: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{message}")]
    HookAbort {
        status: Option<StatusCode>,
        message: String,
        detail: Option<Value>,
    },
    #[error("internal error")]
    Internal { request_id: Uuid },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            field: None,
            message: message.into(),
        }
    }

    pub fn field(field: &str, message: impl Into<String>) -> Self {
        ApiError::Validation {
            field: Some(field.to_string()),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Validation { .. } | ApiError::PayloadTooLarge { .. } => ErrorKind::Validation,
            ApiError::UnsupportedOperator { .. } => ErrorKind::UnsupportedOperator,
            ApiError::UnsupportedSortField(_) => ErrorKind::UnsupportedSortField,
            ApiError::Authorization(_) => ErrorKind::Authorization,
            ApiError::NotFound { .. } => ErrorKind::NotFound,
            ApiError::Config(ConfigError::DuplicateResource(_)) => ErrorKind::DuplicateResource,
            ApiError::Config(ConfigError::InvalidSchema { .. }) => ErrorKind::InvalidSchema,
            ApiError::Config(ConfigError::RouteFrozen(_)) => ErrorKind::RouteFrozen,
            ApiError::Config(ConfigError::Load(_)) => ErrorKind::Internal,
            ApiError::HookAbort { .. } => ErrorKind::HookAbort,
            ApiError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::HookAbort {
                status: Some(status),
                ..
            } => *status,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            other => other.kind().status(),
        }
    }

    fn detail(&self) -> Option<Value> {
        match self {
            ApiError::Validation { field: Some(f), .. } => Some(json!({ "field": f })),
            ApiError::UnsupportedOperator { field, operator, .. } => {
                Some(json!({ "field": field, "operator": operator }))
            }
            ApiError::UnsupportedSortField(field) => Some(json!({ "field": field })),
            ApiError::PayloadTooLarge { limit } => Some(json!({ "limit": limit })),
            ApiError::HookAbort { detail, .. } => detail.clone(),
            ApiError::Internal { request_id } => Some(json!({ "request_id": request_id.to_string() })),
            _ => None,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind().as_str(),
            message: self.to_string(),
            detail: self.detail(),
        }
    }
}

/// Wire shape of every error response.
#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
