//! Schema Deriver: the four data-transfer shapes of a resource, and how they apply to payloads.
//!
//! Derivation is pure. [`ResourceSchema::derived`](crate::config::ResourceSchema::derived)
//! caches the result for the schema's lifetime.

use crate::config::{DefaultConfig, FieldType, ResourceSchema};
use crate::error::ApiError;
use crate::query::{FilterOp, SortDirection, SortKey};
use crate::service::validation::coerce_value;
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq)]
pub struct InputField {
    pub name: String,
    pub field_type: FieldType,
    /// Absent values are rejected.
    pub required: bool,
    /// Explicit null is accepted.
    pub nullable: bool,
    pub default: Option<DefaultConfig>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateInput {
    pub fields: Vec<InputField>,
    /// Defaults of fields the client cannot write (generated keys, timestamps).
    pub generated: Vec<(String, DefaultConfig)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateInput {
    /// Every field is optional; `nullable` decides whether explicit null is allowed.
    pub fields: Vec<InputField>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReadOutput {
    pub fields: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FilterParam {
    pub name: String,
    pub field_type: FieldType,
    pub operators: Vec<FilterOp>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListQuery {
    pub filters: Vec<FilterParam>,
    pub sortable: Vec<String>,
    pub default_sort: Vec<SortKey>,
}

impl ListQuery {
    pub fn filter(&self, name: &str) -> Option<&FilterParam> {
        self.filters.iter().find(|f| f.name == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DerivedSchemas {
    pub create: CreateInput,
    pub update: UpdateInput,
    pub read: ReadOutput,
    pub list: ListQuery,
}

/// Operators legal for a type: equality family everywhere, ranges on ordered types, substring on strings.
pub fn operators_for(ty: FieldType) -> Vec<FilterOp> {
    let mut ops = vec![FilterOp::Eq, FilterOp::Ne, FilterOp::In];
    if ty.is_ordered() {
        ops.extend([FilterOp::Gt, FilterOp::Gte, FilterOp::Lt, FilterOp::Lte]);
    }
    if ty == FieldType::String {
        ops.push(FilterOp::Contains);
    }
    ops
}

pub fn derive_schemas(schema: &ResourceSchema) -> DerivedSchemas {
    let mut create_fields = Vec::new();
    let mut generated = Vec::new();
    let mut update_fields = Vec::new();
    let mut read_fields = Vec::new();
    let mut filters = Vec::new();
    let mut sortable = Vec::new();

    for f in schema.fields() {
        if f.writable_on_create {
            let has_default = f.default.is_some();
            create_fields.push(InputField {
                name: f.name.clone(),
                field_type: f.field_type,
                required: !has_default && !f.nullable,
                nullable: f.nullable && !has_default,
                default: f.default.clone(),
            });
        } else if let Some(d) = &f.default {
            generated.push((f.name.clone(), d.clone()));
        }
        if f.writable_on_update {
            update_fields.push(InputField {
                name: f.name.clone(),
                field_type: f.field_type,
                required: false,
                nullable: f.nullable,
                default: None,
            });
        }
        if f.exposed_on_read {
            read_fields.push(f.name.clone());
        }
        if f.filterable {
            filters.push(FilterParam {
                name: f.name.clone(),
                field_type: f.field_type,
                operators: operators_for(f.field_type),
            });
        }
        if f.sortable {
            sortable.push(f.name.clone());
        }
    }

    let default_sort = schema
        .primary_key
        .iter()
        .map(|k| SortKey {
            field: k.clone(),
            direction: SortDirection::Asc,
        })
        .collect();

    DerivedSchemas {
        create: CreateInput {
            fields: create_fields,
            generated,
        },
        update: UpdateInput { fields: update_fields },
        read: ReadOutput { fields: read_fields },
        list: ListQuery {
            filters,
            sortable,
            default_sort,
        },
    }
}

fn reject_unknown_keys(
    schema: &ResourceSchema,
    payload: &Map<String, Value>,
    fields: &[InputField],
    action: &str,
) -> Result<(), ApiError> {
    for key in payload.keys() {
        if fields.iter().any(|f| &f.name == key) {
            continue;
        }
        let message = if schema.field(key).is_some() {
            format!("{} is not writable on {}", key, action)
        } else {
            format!("unknown field {}", key)
        };
        return Err(ApiError::field(key, message));
    }
    Ok(())
}

impl CreateInput {
    /// Validate a create body and substitute defaults. Sequence-generated fields stay absent.
    pub fn apply(&self, schema: &ResourceSchema, payload: &Map<String, Value>) -> Result<Map<String, Value>, ApiError> {
        reject_unknown_keys(schema, payload, &self.fields, "create")?;
        let mut out = Map::new();
        for f in &self.fields {
            let descriptor = schema
                .field(&f.name)
                .ok_or_else(|| ApiError::validation(format!("unknown field {}", f.name)))?;
            match payload.get(&f.name) {
                Some(Value::Null) if f.nullable => {
                    out.insert(f.name.clone(), Value::Null);
                }
                Some(Value::Null) => {
                    return Err(ApiError::field(&f.name, format!("{} must not be null", f.name)));
                }
                Some(v) => {
                    out.insert(f.name.clone(), coerce_value(descriptor, v)?);
                }
                None => {
                    if let Some(d) = &f.default {
                        if let Some(v) = d.produce() {
                            out.insert(f.name.clone(), v);
                        }
                    } else if f.required {
                        return Err(ApiError::field(&f.name, format!("{} is required", f.name)));
                    } else {
                        out.insert(f.name.clone(), Value::Null);
                    }
                }
            }
        }
        for (name, d) in &self.generated {
            if let Some(v) = d.produce() {
                out.insert(name.clone(), v);
            }
        }
        Ok(out)
    }
}

impl UpdateInput {
    /// Validate a partial update. Absent fields are left out of the result.
    pub fn apply(&self, schema: &ResourceSchema, payload: &Map<String, Value>) -> Result<Map<String, Value>, ApiError> {
        reject_unknown_keys(schema, payload, &self.fields, "update")?;
        let mut out = Map::new();
        for f in &self.fields {
            let Some(v) = payload.get(&f.name) else { continue };
            if v.is_null() {
                if !f.nullable {
                    return Err(ApiError::field(&f.name, format!("{} must not be null", f.name)));
                }
                out.insert(f.name.clone(), Value::Null);
                continue;
            }
            let descriptor = schema
                .field(&f.name)
                .ok_or_else(|| ApiError::validation(format!("unknown field {}", f.name)))?;
            out.insert(f.name.clone(), coerce_value(descriptor, v)?);
        }
        Ok(out)
    }
}

impl ReadOutput {
    /// Project an entity onto the exposed fields, in declaration order.
    pub fn apply(&self, entity: &Map<String, Value>) -> Value {
        let mut out = Map::new();
        for name in &self.fields {
            out.insert(name.clone(), entity.get(name).cloned().unwrap_or(Value::Null));
        }
        Value::Object(out)
    }
}
