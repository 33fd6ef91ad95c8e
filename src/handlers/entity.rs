//! Resource handlers: list, read, create, update, delete.
//!
//! Each handler only adapts the HTTP request into an [`OperationInput`]; all behavior lives in
//! the resource's pipeline.

use crate::error::ApiError;
use crate::extractors::MaybePrincipal;
use crate::query::ListQueryParams;
use crate::response::OperationOutput;
use crate::service::OperationInput;
use crate::state::ResourceEndpoint;
use axum::{
    body::Bytes,
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
};
use serde_json::Value;
use std::sync::Arc;

type Endpoint = State<Arc<ResourceEndpoint>>;

fn parse_id(path: Result<Path<String>, PathRejection>) -> Result<String, ApiError> {
    path.map(|Path(id)| id).map_err(|e| ApiError::validation(e.body_text()))
}

/// An empty body reads as `{}`.
fn parse_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::validation(format!("invalid JSON body: {}", e)))
}

pub async fn list(
    State(ep): Endpoint,
    MaybePrincipal(principal): MaybePrincipal,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<OperationOutput, ApiError> {
    ep.mark_served();
    let Query(pairs) = query.map_err(|e| ApiError::validation(e.body_text()))?;
    let params = ListQueryParams::from_pairs(pairs);
    ep.pipeline.run(principal, OperationInput::List(params)).await
}

pub async fn read(
    State(ep): Endpoint,
    MaybePrincipal(principal): MaybePrincipal,
    path: Result<Path<String>, PathRejection>,
) -> Result<OperationOutput, ApiError> {
    ep.mark_served();
    let id = parse_id(path)?;
    ep.pipeline.run(principal, OperationInput::Read { id }).await
}

pub async fn create(
    State(ep): Endpoint,
    MaybePrincipal(principal): MaybePrincipal,
    body: Bytes,
) -> Result<OperationOutput, ApiError> {
    ep.mark_served();
    let body = parse_body(&body)?;
    ep.pipeline.run(principal, OperationInput::Create { body }).await
}

pub async fn update(
    State(ep): Endpoint,
    MaybePrincipal(principal): MaybePrincipal,
    path: Result<Path<String>, PathRejection>,
    body: Bytes,
) -> Result<OperationOutput, ApiError> {
    ep.mark_served();
    let id = parse_id(path)?;
    let body = parse_body(&body)?;
    ep.pipeline.run(principal, OperationInput::Update { id, body }).await
}

pub async fn delete(
    State(ep): Endpoint,
    MaybePrincipal(principal): MaybePrincipal,
    path: Result<Path<String>, PathRejection>,
) -> Result<OperationOutput, ApiError> {
    ep.mark_served();
    let id = parse_id(path)?;
    ep.pipeline.run(principal, OperationInput::Delete { id }).await
}
