//! Hook registry: integrator callables keyed by (resource, operation, phase).

use crate::config::OperationKind;
use crate::error::ApiError;
use crate::service::context::OperationContext;
use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookPhase {
    /// Before validation. `payload` holds the raw request body for create and update;
    /// a rewrite is what gets validated.
    PreValidate,
    /// After authorization, before persistence. May rewrite the payload.
    Pre,
    /// After persistence. May enrich the result, not change its identity.
    Post,
}

impl HookPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPhase::PreValidate => "pre_validate",
            HookPhase::Pre => "pre",
            HookPhase::Post => "post",
        }
    }
}

/// Raised by a hook to stop the pipeline. The status defaults to 400.
#[derive(Clone, Debug, PartialEq)]
pub struct HookAbort {
    pub status: Option<StatusCode>,
    pub message: String,
    pub detail: Option<Value>,
}

impl HookAbort {
    pub fn new(message: impl Into<String>) -> Self {
        HookAbort {
            status: None,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

impl From<HookAbort> for ApiError {
    fn from(a: HookAbort) -> Self {
        ApiError::HookAbort {
            status: a.status,
            message: a.message,
            detail: a.detail,
        }
    }
}

#[async_trait]
pub trait Hook: Send + Sync {
    async fn call(&self, ctx: &mut OperationContext) -> Result<(), HookAbort>;
}

/// Plain closures are hooks.
#[async_trait]
impl<F> Hook for F
where
    F: Fn(&mut OperationContext) -> Result<(), HookAbort> + Send + Sync,
{
    async fn call(&self, ctx: &mut OperationContext) -> Result<(), HookAbort> {
        (self)(ctx)
    }
}

type HookKey = (String, OperationKind, HookPhase);

#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<HookKey, Vec<Arc<dyn Hook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hooks for the same key run in registration order.
    pub fn register<H>(&mut self, resource: &str, kind: OperationKind, phase: HookPhase, hook: H) -> &mut Self
    where
        H: Hook + 'static,
    {
        self.hooks
            .entry((resource.to_string(), kind, phase))
            .or_default()
            .push(Arc::new(hook));
        self
    }

    pub fn pre_validate<H: Hook + 'static>(&mut self, resource: &str, kind: OperationKind, hook: H) -> &mut Self {
        self.register(resource, kind, HookPhase::PreValidate, hook)
    }

    pub fn pre<H: Hook + 'static>(&mut self, resource: &str, kind: OperationKind, hook: H) -> &mut Self {
        self.register(resource, kind, HookPhase::Pre, hook)
    }

    pub fn post<H: Hook + 'static>(&mut self, resource: &str, kind: OperationKind, hook: H) -> &mut Self {
        self.register(resource, kind, HookPhase::Post, hook)
    }

    pub fn len(&self) -> usize {
        self.hooks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every hook registered for the context's resource and operation. Stops at the first abort.
    pub async fn run(&self, phase: HookPhase, ctx: &mut OperationContext) -> Result<(), HookAbort> {
        let key = (ctx.schema.name.clone(), ctx.kind, phase);
        let Some(hooks) = self.hooks.get(&key) else {
            return Ok(());
        };
        for hook in hooks {
            if let Err(abort) = hook.call(ctx).await {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    resource = %ctx.schema.name,
                    operation = ctx.kind.as_str(),
                    phase = phase.as_str(),
                    message = %abort.message,
                    "hook aborted operation"
                );
                return Err(abort);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry").field("hooks", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldConfig, FieldType, ResourceSchema};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn ctx(kind: OperationKind) -> OperationContext {
        let schema = ResourceSchema::build(
            "widget",
            None,
            vec![FieldConfig::new("id", FieldType::Identifier)],
            vec!["id".into()],
            BTreeMap::new(),
        )
        .unwrap();
        OperationContext::new(Arc::new(schema), kind, None)
    }

    #[tokio::test]
    async fn hooks_run_in_order_for_their_key_only() {
        let mut reg = HookRegistry::new();
        reg.pre("widget", OperationKind::Create, |c: &mut OperationContext| {
            c.extras.insert("first".into(), json!(1));
            Ok(())
        })
        .pre("widget", OperationKind::Create, |c: &mut OperationContext| {
            let seen = c.extras.contains_key("first");
            c.extras.insert("second_saw_first".into(), json!(seen));
            Ok(())
        })
        .post("widget", OperationKind::Create, |_: &mut OperationContext| Err(HookAbort::new("never")));

        let mut c = ctx(OperationKind::Create);
        reg.run(HookPhase::Pre, &mut c).await.unwrap();
        assert_eq!(c.extras["second_saw_first"], json!(true));

        let mut other = ctx(OperationKind::Update);
        reg.run(HookPhase::Post, &mut other).await.unwrap();
        assert!(other.extras.is_empty());
        assert_eq!(reg.len(), 3);
    }

    #[tokio::test]
    async fn abort_becomes_hook_abort_error() {
        let mut reg = HookRegistry::new();
        reg.pre("widget", OperationKind::Delete, |_: &mut OperationContext| {
            Err(HookAbort::new("locked").with_status(StatusCode::CONFLICT))
        });
        let mut c = ctx(OperationKind::Delete);
        let err: ApiError = reg.run(HookPhase::Pre, &mut c).await.unwrap_err().into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.kind().as_str(), "HookAbortError");
    }
}
