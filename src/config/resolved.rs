//! Resolved resource model: declarations validated and normalized for runtime use.

use crate::config::{validate_declaration, DefaultConfig, FieldConfig, FieldType, Generator, ValidationRule};
use crate::dto::{derive_schemas, DerivedSchemas};
use crate::error::{ApiError, ConfigError};
use crate::service::validation::{coerce_text, format_datetime};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::OnceLock;

impl DefaultConfig {
    /// Value substituted when a create payload omits the field. `None` leaves it to the store.
    pub fn produce(&self) -> Option<Value> {
        match self {
            DefaultConfig::Literal(v) => Some(v.clone()),
            DefaultConfig::Generate(Generator::Uuid) => Some(Value::String(uuid::Uuid::new_v4().to_string())),
            DefaultConfig::Generate(Generator::Now) => Some(Value::String(format_datetime(chrono::Utc::now()))),
            DefaultConfig::Generate(Generator::Sequence) => None,
        }
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, DefaultConfig::Generate(Generator::Sequence))
    }
}

/// Declared rules plus the compiled pattern.
#[derive(Clone, Debug, Default)]
pub struct FieldRules {
    pub rule: ValidationRule,
    pub pattern: Option<Regex>,
}

#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub default: Option<DefaultConfig>,
    pub filterable: bool,
    pub sortable: bool,
    pub writable_on_create: bool,
    pub writable_on_update: bool,
    pub exposed_on_read: bool,
    pub primary_key: bool,
    pub variants: Vec<String>,
    pub references: Option<String>,
    pub rules: FieldRules,
    pub storage_type: Option<String>,
}

/// Primary key value, one entry per key field in declaration order of the key.
#[derive(Clone, Debug, PartialEq)]
pub struct PrimaryKey(pub Vec<(String, Value)>);

impl PrimaryKey {
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.iter().map(|(_, v)| v)
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(_, v)| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .map(|part| {
                if self.0.len() > 1 {
                    part.replace('\\', "\\\\").replace(',', "\\,")
                } else {
                    part
                }
            })
            .collect();
        f.write_str(&parts.join(","))
    }
}

/// Immutable once registered. DTO shapes are derived lazily and cached for the schema's lifetime.
#[derive(Debug)]
pub struct ResourceSchema {
    pub name: String,
    pub table: String,
    fields: Vec<FieldDescriptor>,
    index: HashMap<String, usize>,
    pub primary_key: Vec<String>,
    pub relations: BTreeMap<String, String>,
    derived: OnceLock<DerivedSchemas>,
}

impl ResourceSchema {
    pub fn build(
        name: &str,
        table: Option<&str>,
        fields: Vec<FieldConfig>,
        primary_key: Vec<String>,
        relations: BTreeMap<String, String>,
    ) -> Result<Self, ConfigError> {
        validate_declaration(name, &fields, &primary_key, &relations)?;

        let mut relations = relations;
        let mut descriptors = Vec::with_capacity(fields.len());
        for f in fields {
            let is_pk = primary_key.contains(&f.name);
            let default = f.default.clone().or_else(|| match (is_pk, f.type_) {
                (true, FieldType::Identifier) => Some(DefaultConfig::Generate(Generator::Uuid)),
                (true, FieldType::Integer) => Some(DefaultConfig::Generate(Generator::Sequence)),
                _ => None,
            });
            let pattern = match &f.validation.pattern {
                Some(p) => Some(Regex::new(p).map_err(|e| {
                    ConfigError::invalid(name, format!("field '{}' has an invalid pattern: {}", f.name, e))
                })?),
                None => None,
            };
            if let Some(target) = &f.references {
                relations.entry(f.name.clone()).or_insert_with(|| target.clone());
            }
            let references = relations.get(&f.name).cloned();
            descriptors.push(FieldDescriptor {
                writable_on_create: f.writable_on_create.unwrap_or(!(is_pk && default.is_some())),
                writable_on_update: f.writable_on_update.unwrap_or(!is_pk),
                exposed_on_read: f.exposed_on_read.unwrap_or(true),
                name: f.name,
                field_type: f.type_,
                nullable: f.nullable,
                default,
                filterable: f.filterable,
                sortable: f.sortable,
                primary_key: is_pk,
                variants: f.values,
                references,
                rules: FieldRules {
                    rule: f.validation,
                    pattern,
                },
                storage_type: f.storage_type,
            });
        }

        let index = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.clone(), i))
            .collect();

        Ok(ResourceSchema {
            name: name.to_string(),
            table: table.unwrap_or(name).to_string(),
            fields: descriptors,
            index,
            primary_key,
            relations,
            derived: OnceLock::new(),
        })
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_key.iter().any(|k| k == name)
    }

    pub fn derived(&self) -> &DerivedSchemas {
        self.derived.get_or_init(|| derive_schemas(self))
    }

    /// Parse a path id. Composite keys are comma separated in key order; a part containing a
    /// comma or backslash escapes it as `\,` or `\\`.
    pub fn parse_key(&self, raw: &str) -> Result<PrimaryKey, ApiError> {
        let parts: Vec<String> = if self.primary_key.len() == 1 {
            vec![raw.to_string()]
        } else {
            split_key(raw)?
        };
        if parts.len() != self.primary_key.len() {
            return Err(ApiError::validation(format!(
                "id must have {} comma-separated parts",
                self.primary_key.len()
            )));
        }
        let mut out = Vec::with_capacity(parts.len());
        for (name, part) in self.primary_key.iter().zip(parts) {
            let field = self
                .field(name)
                .ok_or_else(|| ApiError::validation(format!("unknown key field {}", name)))?;
            out.push((name.clone(), coerce_text(field, &part)?));
        }
        Ok(PrimaryKey(out))
    }

    /// Extract the key from a stored entity; `None` when any key field is missing.
    pub fn key_of(&self, entity: &Map<String, Value>) -> Option<PrimaryKey> {
        self.primary_key
            .iter()
            .map(|k| entity.get(k).filter(|v| !v.is_null()).map(|v| (k.clone(), v.clone())))
            .collect::<Option<Vec<_>>>()
            .map(PrimaryKey)
    }
}

fn split_key(raw: &str) -> Result<Vec<String>, ApiError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped @ (',' | '\\')) => current.push(escaped),
                _ => return Err(ApiError::validation("id has an invalid escape; use \\, or \\\\")),
            },
            ',' => parts.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    parts.push(current);
    Ok(parts)
}
