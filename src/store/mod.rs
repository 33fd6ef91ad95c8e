//! Persistence collaborator: the capability the pipeline needs from a store, plus adapters.
//!
//! Every request runs inside one [`PersistenceSession`]; the pipeline commits it on success and
//! rolls it back on error. Dropping an unfinished session must roll it back.

mod memory;
mod postgres;
pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::config::{PrimaryKey, ResourceSchema};
use crate::query::QueryPlan;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub type Entity = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    Check,
    NotNull,
}

impl ConstraintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::Check => "check",
            ConstraintKind::NotNull => "not null",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("entity not found")]
    NotFound,
    /// `detail` is for logs only; it never reaches a response body.
    #[error("{} constraint violated: {detail}", .kind.as_str())]
    Constraint { kind: ConstraintKind, detail: String },
    #[error("backend: {0}")]
    Backend(String),
}

/// One page of a list query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    pub rows: Vec<Entity>,
    /// Rows matching the filters, ignoring pagination.
    pub total_count: u64,
}

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn PersistenceSession>, PersistenceError>;
}

#[async_trait]
pub trait PersistenceSession: Send {
    async fn execute(&mut self, schema: &ResourceSchema, plan: QueryPlan) -> Result<Page, PersistenceError>;

    async fn get(&mut self, schema: &ResourceSchema, key: &PrimaryKey) -> Result<Option<Entity>, PersistenceError>;

    /// Insert a validated payload. Sequence-generated fields are absent and assigned here.
    async fn create(&mut self, schema: &ResourceSchema, payload: Entity) -> Result<Entity, PersistenceError>;

    /// Apply a partial payload; fields not present are left untouched.
    async fn update(
        &mut self,
        schema: &ResourceSchema,
        key: &PrimaryKey,
        partial: Entity,
    ) -> Result<Entity, PersistenceError>;

    /// `false` when nothing matched the key.
    async fn delete(&mut self, schema: &ResourceSchema, key: &PrimaryKey) -> Result<bool, PersistenceError>;

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError>;

    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError>;
}
