//! Per-request Operation Context and the pipeline stages it moves through.

use crate::config::{OperationKind, PrimaryKey, ResourceSchema};
use crate::query::{Pagination, QueryPlan};
use crate::service::authz::Principal;
use crate::store::{Entity, Page};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    Validated,
    Authorized,
    PreHook,
    Persisted,
    PostHook,
    Serialized,
    Done,
    Errored,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "RECEIVED",
            Stage::Validated => "VALIDATED",
            Stage::Authorized => "AUTHORIZED",
            Stage::PreHook => "PRE_HOOK",
            Stage::Persisted => "PERSISTED",
            Stage::PostHook => "POST_HOOK",
            Stage::Serialized => "SERIALIZED",
            Stage::Done => "DONE",
            Stage::Errored => "ERRORED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Errored)
    }
}

/// What the persistence stage produced.
#[derive(Clone, Debug, PartialEq)]
pub enum OperationResult {
    One(Entity),
    Page { page: Page, pagination: Pagination },
}

/// Request-scoped state handed to the authorizer and hooks. Never shared across requests.
#[derive(Debug)]
pub struct OperationContext {
    pub request_id: Uuid,
    pub schema: Arc<ResourceSchema>,
    pub kind: OperationKind,
    pub principal: Option<Principal>,
    /// Create/update payload: the raw body during pre-validate hooks, the validated one after. Pre-hooks may rewrite it.
    pub payload: Option<Entity>,
    pub key: Option<PrimaryKey>,
    /// Compiled list query; taken by the persistence stage.
    pub plan: Option<QueryPlan>,
    pub result: Option<OperationResult>,
    /// Free-form side data shared between hooks.
    pub extras: Map<String, Value>,
    stage: Stage,
}

impl OperationContext {
    pub fn new(schema: Arc<ResourceSchema>, kind: OperationKind, principal: Option<Principal>) -> Self {
        OperationContext {
            request_id: Uuid::new_v4(),
            schema,
            kind,
            principal,
            payload: None,
            key: None,
            plan: None,
            result: None,
            extras: Map::new(),
            stage: Stage::Received,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Move forward. Going backwards or leaving a terminal stage is ignored.
    pub(crate) fn advance(&mut self, to: Stage) {
        if self.stage.is_terminal() || to <= self.stage {
            return;
        }
        tracing::debug!(
            request_id = %self.request_id,
            resource = %self.schema.name,
            operation = self.kind.as_str(),
            from = self.stage.as_str(),
            to = to.as_str(),
            "stage"
        );
        self.stage = to;
    }

    pub(crate) fn fail(&mut self) {
        if !self.stage.is_terminal() {
            self.stage = Stage::Errored;
        }
    }

    /// Key as shown in error messages.
    pub fn key_display(&self) -> String {
        self.key.as_ref().map(|k| k.to_string()).unwrap_or_default()
    }
}
