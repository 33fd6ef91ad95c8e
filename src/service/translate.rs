//! Error Translator: persistence failures to API errors.

use crate::error::ApiError;
use crate::service::context::OperationContext;
use crate::store::PersistenceError;

/// Translate a persistence failure. Backend detail is logged against the request id and never
/// returned to the client.
pub fn translate(err: PersistenceError, ctx: &OperationContext) -> ApiError {
    match err {
        PersistenceError::NotFound => ApiError::NotFound {
            resource: ctx.schema.name.clone(),
            id: ctx.key_display(),
        },
        PersistenceError::Constraint { kind, detail } => {
            tracing::warn!(
                request_id = %ctx.request_id,
                resource = %ctx.schema.name,
                operation = ctx.kind.as_str(),
                constraint = kind.as_str(),
                detail = %detail,
                "constraint violation"
            );
            ApiError::validation(format!("request violates a {} constraint", kind.as_str()))
        }
        PersistenceError::Backend(detail) => internal(ctx, &detail),
    }
}

/// An `InternalError` correlated with the request.
pub fn internal(ctx: &OperationContext, detail: &str) -> ApiError {
    tracing::error!(
        request_id = %ctx.request_id,
        resource = %ctx.schema.name,
        operation = ctx.kind.as_str(),
        detail = %detail,
        "internal error"
    );
    ApiError::Internal {
        request_id: ctx.request_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldConfig, FieldType, OperationKind, ResourceSchema};
    use crate::error::ErrorKind;
    use crate::store::ConstraintKind;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn ctx() -> OperationContext {
        let schema = ResourceSchema::build(
            "widget",
            None,
            vec![FieldConfig::new("id", FieldType::Identifier)],
            vec!["id".into()],
            BTreeMap::new(),
        )
        .unwrap();
        let mut c = OperationContext::new(Arc::new(schema), OperationKind::Read, None);
        c.key = Some(c.schema.parse_key("k1").unwrap());
        c
    }

    #[test]
    fn not_found_names_resource_and_key() {
        let err = translate(PersistenceError::NotFound, &ctx());
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "widget 'k1' not found");
    }

    #[test]
    fn constraint_detail_stays_out_of_the_message() {
        let err = translate(
            PersistenceError::Constraint {
                kind: ConstraintKind::Unique,
                detail: "duplicate key value violates unique constraint \"widgets_pkey\"".into(),
            },
            &ctx(),
        );
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.to_string().contains("widgets_pkey"));
    }

    #[test]
    fn backend_failures_are_internal_with_request_id() {
        let c = ctx();
        let err = translate(PersistenceError::Backend("connection reset".into()), &c);
        assert_eq!(err.kind(), ErrorKind::Internal);
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body["detail"]["request_id"], c.request_id.to_string());
        assert!(!body.to_string().contains("connection reset"));
    }
}
