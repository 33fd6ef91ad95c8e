//! Success response shapes of the generated routes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

/// Envelope of a list response.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ListResponse {
    pub items: Vec<Value>,
    pub total_count: u64,
    pub page: u64,
    pub limit: u64,
}

/// What a finished pipeline hands back: a status and a JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutput {
    pub status: StatusCode,
    pub body: Value,
}

impl OperationOutput {
    pub fn ok(body: Value) -> Self {
        OperationOutput {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn created(body: Value) -> Self {
        OperationOutput {
            status: StatusCode::CREATED,
            body,
        }
    }
}

impl IntoResponse for OperationOutput {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
