//! Declaration validation: names, primary key, relations and per-field consistency.

use crate::config::{DefaultConfig, FieldConfig, FieldType};
use crate::error::ConfigError;
use crate::service::validation::value_fits;
use std::collections::{BTreeMap, HashSet};

/// Resource names double as path segments.
fn valid_segment(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub fn validate_declaration(
    resource: &str,
    fields: &[FieldConfig],
    primary_key: &[String],
    relations: &BTreeMap<String, String>,
) -> Result<(), ConfigError> {
    if !valid_segment(resource) {
        return Err(ConfigError::invalid(
            resource,
            "resource name must be a non-empty path segment of [A-Za-z0-9_-]",
        ));
    }

    let mut names = HashSet::new();
    for f in fields {
        if f.name.is_empty() {
            return Err(ConfigError::invalid(resource, "field name must not be empty"));
        }
        if !names.insert(f.name.as_str()) {
            return Err(ConfigError::invalid(resource, format!("duplicate field '{}'", f.name)));
        }
    }

    if primary_key.is_empty() {
        return Err(ConfigError::invalid(resource, "primary key must not be empty"));
    }
    let mut seen_pk = HashSet::new();
    for pk in primary_key {
        if !names.contains(pk.as_str()) {
            return Err(ConfigError::invalid(
                resource,
                format!("primary key references unknown field '{}'", pk),
            ));
        }
        if !seen_pk.insert(pk.as_str()) {
            return Err(ConfigError::invalid(
                resource,
                format!("primary key lists '{}' twice", pk),
            ));
        }
    }

    for name in relations.keys() {
        if !names.contains(name.as_str()) {
            return Err(ConfigError::invalid(
                resource,
                format!("relation declared on unknown field '{}'", name),
            ));
        }
    }

    for f in fields {
        if primary_key.contains(&f.name) {
            if f.writable_on_update == Some(true) {
                return Err(ConfigError::invalid(
                    resource,
                    format!("primary key field '{}' cannot be writable on update", f.name),
                ));
            }
            if f.exposed_on_read == Some(false) {
                return Err(ConfigError::invalid(
                    resource,
                    format!("primary key field '{}' must be exposed on read", f.name),
                ));
            }
            if f.nullable {
                return Err(ConfigError::invalid(
                    resource,
                    format!("primary key field '{}' cannot be nullable", f.name),
                ));
            }
        }
        match f.type_ {
            FieldType::Enumeration if f.values.is_empty() => {
                return Err(ConfigError::invalid(
                    resource,
                    format!("enumeration field '{}' declares no values", f.name),
                ));
            }
            FieldType::Reference if f.references.is_none() && !relations.contains_key(&f.name) => {
                return Err(ConfigError::invalid(
                    resource,
                    format!("reference field '{}' has no relation target", f.name),
                ));
            }
            _ => {}
        }
        if let Some(DefaultConfig::Literal(v)) = &f.default {
            let fits = if v.is_null() {
                f.nullable
            } else {
                value_fits(f.type_, v)
                    && (f.type_ != FieldType::Enumeration
                        || v.as_str().map(|s| f.values.iter().any(|x| x == s)).unwrap_or(false))
            };
            if !fits {
                return Err(ConfigError::invalid(
                    resource,
                    format!("default for '{}' does not match its {} type", f.name, f.type_.as_str()),
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id() -> FieldConfig {
        FieldConfig::new("id", FieldType::Identifier)
    }

    fn check(fields: Vec<FieldConfig>, pk: &[&str]) -> Result<(), ConfigError> {
        let pk: Vec<String> = pk.iter().map(|s| s.to_string()).collect();
        validate_declaration("widget", &fields, &pk, &BTreeMap::new())
    }

    #[test]
    fn rejects_duplicate_fields_and_unknown_key() {
        assert!(check(vec![id(), id()], &["id"]).is_err());
        assert!(check(vec![id()], &["uid"]).is_err());
        assert!(check(vec![id()], &[]).is_err());
        assert!(check(vec![id()], &["id"]).is_ok());
    }

    #[test]
    fn rejects_contradicting_key_flags() {
        let mut f = id();
        f.writable_on_update = Some(true);
        assert!(check(vec![f], &["id"]).is_err());
        assert!(check(vec![id().hidden()], &["id"]).is_err());
        assert!(check(vec![id().nullable()], &["id"]).is_err());
    }

    #[test]
    fn enumeration_and_reference_need_metadata() {
        assert!(check(vec![id(), FieldConfig::new("kind", FieldType::Enumeration)], &["id"]).is_err());
        assert!(check(vec![id(), FieldConfig::new("owner", FieldType::Reference)], &["id"]).is_err());
        assert!(check(
            vec![id(), FieldConfig::new("owner", FieldType::Reference).references("user")],
            &["id"]
        )
        .is_ok());
    }

    #[test]
    fn literal_default_must_fit_type() {
        let price = FieldConfig::new("price", FieldType::Float).default_value(json!("free"));
        assert!(check(vec![id(), price], &["id"]).is_err());
        let kind = FieldConfig::new("kind", FieldType::Enumeration)
            .variants(["a", "b"])
            .default_value(json!("c"));
        assert!(check(vec![id(), kind], &["id"]).is_err());
    }

    #[test]
    fn resource_name_must_be_a_path_segment() {
        let err = validate_declaration("a/b", &[id()], &["id".into()], &BTreeMap::new());
        assert!(err.is_err());
    }
}
