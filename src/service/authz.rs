//! Authorization collaborator: allow or deny an operation for a principal.

use crate::config::{OperationKind, ResourceConfig};
use crate::store::Entity;
use async_trait::async_trait;
use std::collections::HashMap;

/// Authenticated caller. The pipeline passes it through without interpreting it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Principal {
            id: id.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// The reason is returned to the client.
    Deny(String),
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    /// `entity` is the validated payload for create and update, `None` otherwise.
    async fn check(
        &self,
        principal: Option<&Principal>,
        resource: &str,
        kind: OperationKind,
        entity: Option<&Entity>,
    ) -> Decision;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn check(&self, _: Option<&Principal>, _: &str, _: OperationKind, _: Option<&Entity>) -> Decision {
        Decision::Allow
    }
}

/// Per-resource role lists. Operations without a list are open; listed ones need any of the roles.
#[derive(Clone, Debug, Default)]
pub struct RoleAuthorizer {
    rules: HashMap<String, HashMap<OperationKind, Vec<String>>>,
}

impl RoleAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs<'a, I>(configs: I) -> Self
    where
        I: IntoIterator<Item = &'a ResourceConfig>,
    {
        let mut out = Self::new();
        for cfg in configs {
            for (kind, roles) in &cfg.roles {
                out = out.require(&cfg.name, *kind, roles.iter().cloned());
            }
        }
        out
    }

    pub fn require<I, S>(mut self, resource: &str, kind: OperationKind, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules
            .entry(resource.to_string())
            .or_default()
            .insert(kind, roles.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait]
impl Authorizer for RoleAuthorizer {
    async fn check(
        &self,
        principal: Option<&Principal>,
        resource: &str,
        kind: OperationKind,
        _entity: Option<&Entity>,
    ) -> Decision {
        let Some(required) = self.rules.get(resource).and_then(|r| r.get(&kind)) else {
            return Decision::Allow;
        };
        match principal {
            None => Decision::Deny(format!("authentication required to {} {}", kind.as_str(), resource)),
            Some(p) if required.iter().any(|r| p.has_role(r)) => Decision::Allow,
            Some(p) => Decision::Deny(format!(
                "principal '{}' may not {} {}",
                p.id,
                kind.as_str(),
                resource
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roles_gate_listed_operations_only() {
        let authz = RoleAuthorizer::new().require("widget", OperationKind::Delete, ["admin"]);
        let user = Principal::new("u1").with_roles(["viewer"]);
        let admin = Principal::new("u2").with_roles(["admin"]);

        let delete = OperationKind::Delete;
        assert!(matches!(authz.check(Some(&user), "widget", delete, None).await, Decision::Deny(_)));
        assert!(matches!(authz.check(None, "widget", delete, None).await, Decision::Deny(_)));
        assert_eq!(authz.check(Some(&admin), "widget", delete, None).await, Decision::Allow);
        assert_eq!(
            authz.check(Some(&user), "widget", OperationKind::List, None).await,
            Decision::Allow
        );
        assert_eq!(
            authz.check(None, "gadget", OperationKind::Delete, None).await,
            Decision::Allow
        );
    }
}
