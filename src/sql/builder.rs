//! Builds parameterized SELECT, COUNT, INSERT, UPDATE and DELETE from a resource schema.

use crate::config::{FieldDescriptor, FieldType, PrimaryKey, ResourceSchema};
use crate::query::{Filter, FilterOp, QueryPlan, SortDirection};
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
fn qualified_table(pg_schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(pg_schema), quoted(table))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Push a value and return its placeholder, cast to the field's column type.
    fn placeholder(&mut self, field: &FieldDescriptor, v: Value) -> String {
        let n = self.push_param(v);
        format!("${}::{}", n, column_type(field))
    }
}

/// Column type used in placeholder casts. `storage_type` wins over the type default.
pub fn column_type(field: &FieldDescriptor) -> &str {
    if let Some(t) = field.storage_type.as_deref() {
        return t;
    }
    match field.field_type {
        FieldType::String | FieldType::Enumeration => "text",
        FieldType::Integer => "int8",
        FieldType::Float => "float8",
        FieldType::Boolean => "bool",
        FieldType::Datetime => "timestamptz",
        FieldType::Identifier | FieldType::Reference => "uuid",
    }
}

/// SELECT list: each field as-is, except custom enum (schema.typename) and numeric storage cast
/// so sqlx returns a decodable type.
fn select_column_list(schema: &ResourceSchema) -> String {
    schema
        .fields()
        .iter()
        .map(|f| {
            let q = quoted(&f.name);
            let storage = f.storage_type.as_deref().unwrap_or("");
            if storage == "numeric" && f.field_type == FieldType::Float {
                format!("{}::float8 AS {}", q, q)
            } else if storage.contains('.') || storage == "numeric" {
                format!("{}::text AS {}", q, q)
            } else {
                q
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn where_filters(q: &mut QueryBuf, schema: &ResourceSchema, filters: &[Filter]) -> String {
    let mut parts = Vec::new();
    for f in filters {
        let Some(field) = schema.field(&f.field) else { continue };
        let col = quoted(&field.name);
        let part = match f.op {
            FilterOp::In => {
                let items = f.value.as_array().cloned().unwrap_or_else(|| vec![f.value.clone()]);
                if items.is_empty() {
                    "FALSE".to_string()
                } else {
                    let phs: Vec<String> = items.into_iter().map(|v| q.placeholder(field, v)).collect();
                    format!("{} IN ({})", col, phs.join(", "))
                }
            }
            FilterOp::Contains => {
                let n = q.push_param(f.value.clone());
                format!("strpos({}, ${}::text) > 0", col, n)
            }
            op => {
                let sym = match op {
                    FilterOp::Ne => "<>",
                    FilterOp::Gt => ">",
                    FilterOp::Gte => ">=",
                    FilterOp::Lt => "<",
                    FilterOp::Lte => "<=",
                    _ => "=",
                };
                let ph = q.placeholder(field, f.value.clone());
                format!("{} {} {}", col, sym, ph)
            }
        };
        parts.push(part);
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn where_key(q: &mut QueryBuf, schema: &ResourceSchema, key: &PrimaryKey) -> String {
    let parts: Vec<String> = key
        .0
        .iter()
        .map(|(name, v)| match schema.field(name) {
            Some(field) => format!("{} = {}", quoted(name), q.placeholder(field, v.clone())),
            None => format!("{} = ${}", quoted(name), q.push_param(v.clone())),
        })
        .collect();
    format!(" WHERE {}", parts.join(" AND "))
}

/// SELECT one page: filters, ORDER BY the plan's sort keys, LIMIT/OFFSET.
pub fn select_page(schema: &ResourceSchema, pg_schema: &str, plan: &QueryPlan) -> QueryBuf {
    let mut q = QueryBuf::default();
    let table = qualified_table(pg_schema, &schema.table);
    let where_clause = where_filters(&mut q, schema, &plan.filters);
    let order: Vec<String> = plan
        .sort
        .iter()
        .map(|k| {
            let dir = match k.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            format!("{} {}", quoted(&k.field), dir)
        })
        .collect();
    let order_clause = if order.is_empty() {
        String::new()
    } else {
        format!(" ORDER BY {}", order.join(", "))
    };
    q.sql = format!(
        "SELECT {} FROM {}{}{} LIMIT {} OFFSET {}",
        select_column_list(schema),
        table,
        where_clause,
        order_clause,
        plan.pagination.limit,
        plan.pagination.offset
    );
    q
}

/// SELECT COUNT(*) over the same filters as [`select_page`].
pub fn count(schema: &ResourceSchema, pg_schema: &str, filters: &[Filter]) -> QueryBuf {
    let mut q = QueryBuf::default();
    let table = qualified_table(pg_schema, &schema.table);
    let where_clause = where_filters(&mut q, schema, filters);
    q.sql = format!("SELECT COUNT(*) FROM {}{}", table, where_clause);
    q
}

/// SELECT by primary key (composite keys AND their columns).
pub fn select_by_key(schema: &ResourceSchema, pg_schema: &str, key: &PrimaryKey) -> QueryBuf {
    let mut q = QueryBuf::default();
    let table = qualified_table(pg_schema, &schema.table);
    let where_clause = where_key(&mut q, schema, key);
    q.sql = format!("SELECT {} FROM {}{}", select_column_list(schema), table, where_clause);
    q
}

/// INSERT the fields present in the payload. Absent fields take the column default.
pub fn insert(schema: &ResourceSchema, pg_schema: &str, payload: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::default();
    let table = qualified_table(pg_schema, &schema.table);
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for f in schema.fields() {
        let Some(v) = payload.get(&f.name) else { continue };
        cols.push(quoted(&f.name));
        placeholders.push(q.placeholder(f, v.clone()));
    }
    let returning = select_column_list(schema);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by key: SET only non-key fields present in the payload. With nothing to set this
/// degrades to [`select_by_key`].
pub fn update(schema: &ResourceSchema, pg_schema: &str, key: &PrimaryKey, partial: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::default();
    let table = qualified_table(pg_schema, &schema.table);
    let mut sets = Vec::new();
    for f in schema.fields() {
        if f.primary_key {
            continue;
        }
        let Some(v) = partial.get(&f.name) else { continue };
        let rhs = q.placeholder(f, v.clone());
        sets.push(format!("{} = {}", quoted(&f.name), rhs));
    }
    if sets.is_empty() {
        return select_by_key(schema, pg_schema, key);
    }
    let where_clause = where_key(&mut q, schema, key);
    q.sql = format!(
        "UPDATE {} SET {}{} RETURNING {}",
        table,
        sets.join(", "),
        where_clause,
        select_column_list(schema)
    );
    q
}

/// DELETE by key, returning the removed row.
pub fn delete(schema: &ResourceSchema, pg_schema: &str, key: &PrimaryKey) -> QueryBuf {
    let mut q = QueryBuf::default();
    let table = qualified_table(pg_schema, &schema.table);
    let where_clause = where_key(&mut q, schema, key);
    q.sql = format!(
        "DELETE FROM {}{} RETURNING {}",
        table,
        where_clause,
        select_column_list(schema)
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldConfig, Settings};
    use crate::query::{compile, ListQueryParams};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn widget() -> ResourceSchema {
        let mut amount = FieldConfig::new("amount", FieldType::Float).filterable();
        amount.storage_type = Some("numeric".into());
        ResourceSchema::build(
            "widget",
            Some("widgets"),
            vec![
                FieldConfig::new("id", FieldType::Identifier),
                FieldConfig::new("name", FieldType::String).filterable().sortable(),
                FieldConfig::new("qty", FieldType::Integer).filterable().sortable(),
                amount,
            ],
            vec!["id".into()],
            BTreeMap::new(),
        )
        .unwrap()
    }

    fn plan(schema: &ResourceSchema, items: &[(&str, &str)]) -> QueryPlan {
        let params =
            ListQueryParams::from_pairs(items.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        compile(schema, &params, &Settings::default()).unwrap()
    }

    #[test]
    fn page_query_has_filters_order_and_window() {
        let s = widget();
        let p = plan(&s, &[("name__contains", "ab"), ("qty__in", "1,2"), ("sort", "-qty"), ("limit", "10"), ("page", "2")]);
        let q = select_page(&s, "public", &p);
        assert_eq!(
            q.sql,
            "SELECT \"id\", \"name\", \"qty\", \"amount\"::float8 AS \"amount\" FROM \"public\".\"widgets\" \
             WHERE strpos(\"name\", $1::text) > 0 AND \"qty\" IN ($2::int8, $3::int8) \
             ORDER BY \"qty\" DESC, \"id\" ASC LIMIT 10 OFFSET 10"
        );
        assert_eq!(q.params, vec![json!("ab"), json!(1), json!(2)]);

        let c = count(&s, "public", &p.filters);
        assert!(c.sql.starts_with("SELECT COUNT(*) FROM \"public\".\"widgets\" WHERE strpos"));
        assert_eq!(c.params.len(), 3);
    }

    #[test]
    fn comparison_operators_cast_to_column_type() {
        let s = widget();
        let p = plan(&s, &[("amount__gte", "2.5"), ("qty__ne", "3")]);
        let q = count(&s, "app", &p.filters);
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) FROM \"app\".\"widgets\" WHERE \"amount\" >= $1::numeric AND \"qty\" <> $2::int8"
        );
    }

    #[test]
    fn insert_only_lists_present_fields() {
        let s = widget();
        let payload = json!({ "id": "k1", "name": "A" });
        let q = insert(&s, "public", payload.as_object().unwrap());
        assert!(q.sql.starts_with(
            "INSERT INTO \"public\".\"widgets\" (\"id\", \"name\") VALUES ($1::uuid, $2::text) RETURNING \"id\""
        ));
        assert_eq!(q.params, vec![json!("k1"), json!("A")]);
    }

    #[test]
    fn empty_update_degrades_to_select() {
        let s = widget();
        let key = s.parse_key("k1").unwrap();
        let q = update(&s, "public", &key, &Map::new());
        assert!(q.sql.starts_with("SELECT "));
        assert!(q.sql.ends_with("WHERE \"id\" = $1::uuid"));

        let partial = json!({ "qty": 4, "id": "other" });
        let q = update(&s, "public", &key, partial.as_object().unwrap());
        assert!(q.sql.starts_with("UPDATE \"public\".\"widgets\" SET \"qty\" = $1::int8 WHERE \"id\" = $2::uuid RETURNING"));
        assert_eq!(q.params, vec![json!(4), json!("k1")]);
    }

    #[test]
    fn delete_returns_row() {
        let s = widget();
        let q = delete(&s, "public", &s.parse_key("k1").unwrap());
        assert!(q.sql.starts_with("DELETE FROM \"public\".\"widgets\" WHERE \"id\" = $1::uuid RETURNING \"id\""));
    }
}
