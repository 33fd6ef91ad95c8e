//! Process-wide registry of resource schemas, keyed by resource name. Append-only, and closed
//! for registration once a route factory built from it has served a request.

use crate::config::{FieldConfig, ResourceConfig, ResourceSchema};
use crate::error::ConfigError;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: Vec<Arc<ResourceSchema>>,
    by_name: HashMap<String, usize>,
    frozen: Arc<AtomicBool>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource. Relation targets may name resources registered later;
    /// they are checked by [`SchemaRegistry::resolve_relations`].
    pub fn register(
        &mut self,
        resource_name: &str,
        fields: Vec<FieldConfig>,
        primary_key: Vec<String>,
        relations: BTreeMap<String, String>,
    ) -> Result<Arc<ResourceSchema>, ConfigError> {
        self.insert(resource_name, None, fields, primary_key, relations)
    }

    pub fn register_config(&mut self, config: &ResourceConfig) -> Result<Arc<ResourceSchema>, ConfigError> {
        self.insert(
            &config.name,
            config.table.as_deref(),
            config.fields.clone(),
            config.primary_key.names(),
            config.relations.clone(),
        )
    }

    fn insert(
        &mut self,
        resource_name: &str,
        table: Option<&str>,
        fields: Vec<FieldConfig>,
        primary_key: Vec<String>,
        relations: BTreeMap<String, String>,
    ) -> Result<Arc<ResourceSchema>, ConfigError> {
        if self.is_frozen() {
            return Err(ConfigError::RouteFrozen(resource_name.to_string()));
        }
        if self.by_name.contains_key(resource_name) {
            return Err(ConfigError::DuplicateResource(resource_name.to_string()));
        }
        let schema = Arc::new(ResourceSchema::build(resource_name, table, fields, primary_key, relations)?);
        self.by_name.insert(resource_name.to_string(), self.schemas.len());
        self.schemas.push(schema.clone());
        tracing::debug!(resource = %resource_name, "registered resource schema");
        Ok(schema)
    }

    pub fn get(&self, resource_name: &str) -> Option<&Arc<ResourceSchema>> {
        self.by_name.get(resource_name).map(|&i| &self.schemas[i])
    }

    /// Schemas in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ResourceSchema>> {
        self.schemas.iter()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    /// Set by the first request served through a factory sharing this flag.
    pub(crate) fn frozen_flag(&self) -> Arc<AtomicBool> {
        self.frozen.clone()
    }

    /// Eager relation resolution; must pass before routes are installed.
    pub fn resolve_relations(&self) -> Result<(), ConfigError> {
        for schema in &self.schemas {
            for (field, target) in &schema.relations {
                if !self.by_name.contains_key(target) {
                    return Err(ConfigError::invalid(
                        &schema.name,
                        format!("relation '{}' targets unregistered resource '{}'", field, target),
                    ));
                }
            }
        }
        Ok(())
    }
}
