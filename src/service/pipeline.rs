//! Operation Pipeline: the per-request state machine shared by all five operations.
//!
//! `RECEIVED → VALIDATED → AUTHORIZED → PRE_HOOK → PERSISTED → POST_HOOK → SERIALIZED → DONE`,
//! with `ERRORED` reachable from every non-terminal stage. The persistence session opens after
//! the pre-hooks, commits after serialization and rolls back on any failure.

use crate::config::{OperationKind, PrimaryKey, ResourceSchema};
use crate::error::ApiError;
use crate::query::{compile, ListQueryParams};
use crate::response::{ListResponse, OperationOutput};
use crate::service::authz::{Decision, Principal};
use crate::service::context::{OperationContext, OperationResult, Stage};
use crate::service::hooks::HookPhase;
use crate::service::translate::{internal, translate};
use crate::state::CrudServices;
use crate::store::PersistenceSession;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Transport-neutral request input.
#[derive(Clone, Debug, PartialEq)]
pub enum OperationInput {
    List(ListQueryParams),
    Read { id: String },
    Create { body: Value },
    Update { id: String, body: Value },
    Delete { id: String },
}

impl OperationInput {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationInput::List(_) => OperationKind::List,
            OperationInput::Read { .. } => OperationKind::Read,
            OperationInput::Create { .. } => OperationKind::Create,
            OperationInput::Update { .. } => OperationKind::Update,
            OperationInput::Delete { .. } => OperationKind::Delete,
        }
    }
}

#[derive(Clone)]
pub struct OperationPipeline {
    schema: Arc<ResourceSchema>,
    services: CrudServices,
}

fn into_object(body: Value) -> Result<Map<String, Value>, ApiError> {
    match body {
        Value::Object(m) => Ok(m),
        _ => Err(ApiError::validation("request body must be a JSON object")),
    }
}

/// Keys of whatever the persistence stage returned, in order.
fn identity_of(schema: &ResourceSchema, result: Option<&OperationResult>) -> Vec<Option<PrimaryKey>> {
    match result {
        Some(OperationResult::One(entity)) => vec![schema.key_of(entity)],
        Some(OperationResult::Page { page, .. }) => page.rows.iter().map(|r| schema.key_of(r)).collect(),
        None => Vec::new(),
    }
}

impl OperationPipeline {
    pub fn new(schema: Arc<ResourceSchema>, services: CrudServices) -> Self {
        OperationPipeline { schema, services }
    }

    pub fn schema(&self) -> &Arc<ResourceSchema> {
        &self.schema
    }

    pub async fn run(&self, principal: Option<Principal>, input: OperationInput) -> Result<OperationOutput, ApiError> {
        let mut ctx = OperationContext::new(self.schema.clone(), input.kind(), principal);
        let result = self.drive(&mut ctx, input).await;
        match &result {
            Ok(_) => ctx.advance(Stage::Done),
            Err(e) => {
                tracing::debug!(
                    request_id = %ctx.request_id,
                    resource = %ctx.schema.name,
                    operation = ctx.kind.as_str(),
                    stage = ctx.stage().as_str(),
                    kind = e.kind().as_str(),
                    "operation failed"
                );
                ctx.fail();
            }
        }
        result
    }

    async fn drive(&self, ctx: &mut OperationContext, input: OperationInput) -> Result<OperationOutput, ApiError> {
        let input = self.pre_validate(ctx, input).await?;
        self.validate(ctx, input)?;
        ctx.advance(Stage::Validated);

        self.authorize(ctx).await?;
        ctx.advance(Stage::Authorized);

        self.services.hooks.run(HookPhase::Pre, ctx).await?;
        ctx.advance(Stage::PreHook);

        let mut session = self
            .services
            .persistence
            .begin()
            .await
            .map_err(|e| translate(e, ctx))?;
        match self.finish(ctx, session.as_mut()).await {
            Ok(out) => {
                session.commit().await.map_err(|e| translate(e, ctx))?;
                Ok(out)
            }
            Err(e) => {
                if let Err(rollback) = session.rollback().await {
                    tracing::warn!(request_id = %ctx.request_id, error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Hands an object body to pre-validate hooks through `ctx.payload` and takes it back rewritten.
    async fn pre_validate(&self, ctx: &mut OperationContext, input: OperationInput) -> Result<OperationInput, ApiError> {
        let (id, body) = match input {
            OperationInput::Create { body: Value::Object(body) } => (None, body),
            OperationInput::Update { id, body: Value::Object(body) } => (Some(id), body),
            other => {
                self.services.hooks.run(HookPhase::PreValidate, ctx).await?;
                return Ok(other);
            }
        };
        ctx.payload = Some(body);
        self.services.hooks.run(HookPhase::PreValidate, ctx).await?;
        let body = Value::Object(ctx.payload.take().unwrap_or_default());
        Ok(match id {
            None => OperationInput::Create { body },
            Some(id) => OperationInput::Update { id, body },
        })
    }

    fn validate(&self, ctx: &mut OperationContext, input: OperationInput) -> Result<(), ApiError> {
        let derived = self.schema.derived();
        match input {
            OperationInput::List(params) => {
                ctx.plan = Some(compile(&self.schema, &params, &self.services.settings)?);
            }
            OperationInput::Read { id } | OperationInput::Delete { id } => {
                ctx.key = Some(self.schema.parse_key(&id)?);
            }
            OperationInput::Create { body } => {
                let body = into_object(body)?;
                ctx.payload = Some(derived.create.apply(&self.schema, &body)?);
            }
            OperationInput::Update { id, body } => {
                ctx.key = Some(self.schema.parse_key(&id)?);
                let body = into_object(body)?;
                ctx.payload = Some(derived.update.apply(&self.schema, &body)?);
            }
        }
        Ok(())
    }

    async fn authorize(&self, ctx: &OperationContext) -> Result<(), ApiError> {
        let entity = match ctx.kind {
            OperationKind::Create | OperationKind::Update => ctx.payload.as_ref(),
            _ => None,
        };
        let decision = self
            .services
            .authorizer
            .check(ctx.principal.as_ref(), &ctx.schema.name, ctx.kind, entity)
            .await;
        match decision {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    resource = %ctx.schema.name,
                    operation = ctx.kind.as_str(),
                    principal = ctx.principal.as_ref().map(|p| p.id.as_str()).unwrap_or("-"),
                    "authorization denied"
                );
                Err(ApiError::Authorization(reason))
            }
        }
    }

    /// PERSISTED through SERIALIZED, inside the open session.
    async fn finish(
        &self,
        ctx: &mut OperationContext,
        session: &mut dyn PersistenceSession,
    ) -> Result<OperationOutput, ApiError> {
        let result = self.persist(ctx, session).await?;
        ctx.result = Some(result);
        ctx.advance(Stage::Persisted);

        let identity = identity_of(&self.schema, ctx.result.as_ref());
        self.services.hooks.run(HookPhase::Post, ctx).await?;
        if identity_of(&self.schema, ctx.result.as_ref()) != identity {
            return Err(internal(ctx, "post-hook replaced the identity of the persisted result"));
        }
        ctx.advance(Stage::PostHook);

        let out = self.serialize(ctx)?;
        ctx.advance(Stage::Serialized);
        Ok(out)
    }

    async fn persist(
        &self,
        ctx: &mut OperationContext,
        session: &mut dyn PersistenceSession,
    ) -> Result<OperationResult, ApiError> {
        let schema = self.schema.as_ref();
        if ctx.kind == OperationKind::List {
            let plan = ctx.plan.take().ok_or_else(|| internal(ctx, "list without a compiled plan"))?;
            let pagination = plan.pagination;
            let page = session.execute(schema, plan).await.map_err(|e| translate(e, ctx))?;
            return Ok(OperationResult::Page { page, pagination });
        }
        if ctx.kind == OperationKind::Create {
            let payload = ctx.payload.clone().unwrap_or_default();
            let entity = session.create(schema, payload).await.map_err(|e| translate(e, ctx))?;
            return Ok(OperationResult::One(entity));
        }

        // read, update and delete resolve the key first
        let key = ctx.key.clone().ok_or_else(|| internal(ctx, "missing primary key"))?;
        let existing = session
            .get(schema, &key)
            .await
            .map_err(|e| translate(e, ctx))?
            .ok_or_else(|| self.not_found(ctx))?;
        match ctx.kind {
            OperationKind::Update => {
                let partial = ctx.payload.clone().unwrap_or_default();
                if partial.is_empty() {
                    return Ok(OperationResult::One(existing));
                }
                let updated = session
                    .update(schema, &key, partial)
                    .await
                    .map_err(|e| translate(e, ctx))?;
                Ok(OperationResult::One(updated))
            }
            OperationKind::Delete => {
                if !session.delete(schema, &key).await.map_err(|e| translate(e, ctx))? {
                    return Err(self.not_found(ctx));
                }
                Ok(OperationResult::One(existing))
            }
            _ => Ok(OperationResult::One(existing)),
        }
    }

    fn not_found(&self, ctx: &OperationContext) -> ApiError {
        ApiError::NotFound {
            resource: self.schema.name.clone(),
            id: ctx.key_display(),
        }
    }

    fn serialize(&self, ctx: &OperationContext) -> Result<OperationOutput, ApiError> {
        let read = &self.schema.derived().read;
        match &ctx.result {
            Some(OperationResult::One(entity)) => {
                let body = read.apply(entity);
                Ok(if ctx.kind == OperationKind::Create {
                    OperationOutput::created(body)
                } else {
                    OperationOutput::ok(body)
                })
            }
            Some(OperationResult::Page { page, pagination }) => {
                let body = ListResponse {
                    items: page.rows.iter().map(|r| read.apply(r)).collect(),
                    total_count: page.total_count,
                    page: pagination.page,
                    limit: pagination.limit,
                };
                serde_json::to_value(body)
                    .map(OperationOutput::ok)
                    .map_err(|e| internal(ctx, &e.to_string()))
            }
            None => Err(internal(ctx, "nothing to serialize")),
        }
    }
}
