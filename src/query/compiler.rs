//! Query Compiler: checks list parameters against a schema and produces a [`QueryPlan`].

use crate::config::{ResourceSchema, Settings};
use crate::error::ApiError;
use crate::query::{Filter, FilterOp, ListQueryParams, Pagination, QueryPlan, SortDirection, SortKey};
use crate::service::validation::coerce_text;
use serde_json::Value;

pub fn compile(schema: &ResourceSchema, params: &ListQueryParams, settings: &Settings) -> Result<QueryPlan, ApiError> {
    let shape = &schema.derived().list;

    // Legality of every filter is settled before any value is coerced.
    let mut legal = Vec::with_capacity(params.filters.len());
    for raw in &params.filters {
        let param = shape.filter(&raw.field).ok_or_else(|| ApiError::UnsupportedOperator {
            field: raw.field.clone(),
            operator: raw.op.clone(),
            reason: format!("field '{}' is not filterable", raw.field),
        })?;
        let op = FilterOp::parse(&raw.op)
            .filter(|op| param.operators.contains(op))
            .ok_or_else(|| ApiError::UnsupportedOperator {
                field: raw.field.clone(),
                operator: raw.op.clone(),
                reason: format!(
                    "operator '{}' is not supported on {} field '{}'",
                    raw.op,
                    param.field_type.as_str(),
                    raw.field
                ),
            })?;
        legal.push((raw, op));
    }

    let mut filters = Vec::with_capacity(legal.len());
    for (raw, op) in legal {
        let field = schema
            .field(&raw.field)
            .ok_or_else(|| ApiError::validation(format!("unknown field {}", raw.field)))?;
        let value = if op == FilterOp::In {
            let items = raw
                .value
                .split(',')
                .map(|part| coerce_text(field, part.trim()))
                .collect::<Result<Vec<_>, _>>()?;
            Value::Array(items)
        } else {
            coerce_text(field, &raw.value)?
        };
        filters.push(Filter {
            field: raw.field.clone(),
            op,
            value,
        });
    }

    let mut sort: Vec<SortKey> = Vec::new();
    for (field, direction) in &params.sort {
        if !shape.sortable.iter().any(|s| s == field) {
            return Err(ApiError::UnsupportedSortField(field.clone()));
        }
        if sort.iter().all(|k| &k.field != field) {
            sort.push(SortKey {
                field: field.clone(),
                direction: *direction,
            });
        }
    }
    if sort.is_empty() {
        sort = shape.default_sort.clone();
    }
    // Tie-break on the primary key so paging is stable.
    for pk in &schema.primary_key {
        if sort.iter().all(|k| &k.field != pk) {
            sort.push(SortKey {
                field: pk.clone(),
                direction: SortDirection::Asc,
            });
        }
    }

    Ok(QueryPlan {
        resource: schema.name.clone(),
        filters,
        sort,
        pagination: paginate(params, settings)?,
    })
}

fn parse_count(name: &str, raw: &str) -> Result<u64, ApiError> {
    let v: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::field(name, format!("{} must be an integer", name)))?;
    u64::try_from(v).map_err(|_| ApiError::field(name, format!("{} must not be negative", name)))
}

fn paginate(params: &ListQueryParams, settings: &Settings) -> Result<Pagination, ApiError> {
    let limit = match params.limit.as_deref() {
        Some(l) => parse_count("limit", l)?.min(settings.max_limit),
        None => settings.default_limit,
    };
    match (params.page.as_deref(), params.offset.as_deref()) {
        (Some(_), Some(_)) => Err(ApiError::validation("use either page or offset, not both")),
        (_, Some(offset)) => {
            let offset = parse_count("offset", offset)?;
            let page = if limit == 0 { 1 } else { offset / limit + 1 };
            Ok(Pagination { page, offset, limit })
        }
        (page, None) => {
            let page = match page {
                Some(p) => parse_count("page", p)?,
                None => 1,
            };
            if page == 0 {
                return Err(ApiError::field("page", "page starts at 1"));
            }
            Ok(Pagination {
                page,
                offset: (page - 1).saturating_mul(limit),
                limit,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldConfig, FieldType};
    use crate::error::ErrorKind;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn widget() -> ResourceSchema {
        ResourceSchema::build(
            "widget",
            None,
            vec![
                FieldConfig::new("id", FieldType::Identifier),
                FieldConfig::new("name", FieldType::String).filterable().sortable(),
                FieldConfig::new("price", FieldType::Float).filterable(),
                FieldConfig::new("note", FieldType::String),
            ],
            vec!["id".into()],
            BTreeMap::new(),
        )
        .unwrap()
    }

    fn params(items: &[(&str, &str)]) -> ListQueryParams {
        ListQueryParams::from_pairs(items.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    fn run(items: &[(&str, &str)]) -> Result<QueryPlan, ApiError> {
        compile(&widget(), &params(items), &Settings::default())
    }

    #[test]
    fn compiles_filters_with_typed_values() {
        let plan = run(&[("name", "A"), ("price__gte", "2.5"), ("price__in", "1,2")]).unwrap();
        assert_eq!(plan.resource, "widget");
        assert_eq!(
            plan.filters,
            vec![
                Filter { field: "name".into(), op: FilterOp::Eq, value: json!("A") },
                Filter { field: "price".into(), op: FilterOp::Gte, value: json!(2.5) },
                Filter { field: "price".into(), op: FilterOp::In, value: json!([1.0, 2.0]) },
            ]
        );
    }

    #[test]
    fn non_filterable_fields_and_illegal_operators_fail() {
        assert_eq!(run(&[("note", "x")]).unwrap_err().kind(), ErrorKind::UnsupportedOperator);
        assert_eq!(run(&[("colour", "red")]).unwrap_err().kind(), ErrorKind::UnsupportedOperator);
        assert_eq!(run(&[("name__gt", "A")]).unwrap_err().kind(), ErrorKind::UnsupportedOperator);
        assert_eq!(run(&[("price__contains", "1")]).unwrap_err().kind(), ErrorKind::UnsupportedOperator);
        assert_eq!(run(&[("name__like", "A")]).unwrap_err().kind(), ErrorKind::UnsupportedOperator);
        assert_eq!(run(&[("price", "cheap")]).unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn sort_appends_primary_key_tie_break() {
        let plan = run(&[("sort", "-name")]).unwrap();
        assert_eq!(
            plan.sort,
            vec![
                SortKey { field: "name".into(), direction: SortDirection::Desc },
                SortKey { field: "id".into(), direction: SortDirection::Asc },
            ]
        );
        let plan = run(&[]).unwrap();
        assert_eq!(plan.sort, vec![SortKey { field: "id".into(), direction: SortDirection::Asc }]);
        assert_eq!(run(&[("sort", "price")]).unwrap_err().kind(), ErrorKind::UnsupportedSortField);
    }

    #[test]
    fn pagination_defaults_clamps_and_rejects_negatives() {
        let p = run(&[]).unwrap().pagination;
        assert_eq!(p, Pagination { page: 1, offset: 0, limit: 100 });
        let p = run(&[("limit", "5000"), ("page", "3")]).unwrap().pagination;
        assert_eq!(p, Pagination { page: 3, offset: 2000, limit: 1000 });
        let p = run(&[("limit", "0")]).unwrap().pagination;
        assert_eq!(p.limit, 0);
        let p = run(&[("limit", "10"), ("offset", "25")]).unwrap().pagination;
        assert_eq!(p, Pagination { page: 3, offset: 25, limit: 10 });
        assert_eq!(run(&[("limit", "-1")]).unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(run(&[("page", "0")]).unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(run(&[("offset", "-3")]).unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(run(&[("page", "1"), ("offset", "3")]).unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(run(&[("limit", "ten")]).unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn filter_legality_wins_over_invalid_values() {
        for items in [
            &[("price", "cheap"), ("note", "x")][..],
            &[("limit", "ten"), ("note", "x")][..],
            &[("page", "0"), ("name__gt", "A")][..],
            &[("sort", "price"), ("note", "x")][..],
        ] {
            let err = run(items).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedOperator, "{:?}", items);
        }
    }
}
