//! OpenAPI document for the generated routes, built from the derived shapes.

use crate::config::{FieldType, OperationKind, ResourceSchema};
use crate::dto::InputField;
use crate::query::FilterOp;
use crate::routes::{resource_paths, Binding, RouteFactory};
use utoipa::openapi::path::{Operation, OperationBuilder, ParameterBuilder, ParameterIn};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::schema::{Array, KnownFormat, ObjectBuilder, SchemaFormat, SchemaType, Type};
use utoipa::openapi::{
    self, ComponentsBuilder, ContentBuilder, Ref, RefOr, Required, ResponseBuilder, ResponsesBuilder, Schema,
};

/// "order_item" -> "OrderItem"
fn to_pascal_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize_next = true;
    for c in s.chars() {
        if c == '_' || c == '-' {
            capitalize_next = true;
        } else if capitalize_next {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn schema_ref(name: &str) -> RefOr<Schema> {
    RefOr::Ref(Ref::from_schema_name(name))
}

fn field_schema(ty: FieldType, nullable: bool, variants: &[String]) -> RefOr<Schema> {
    let base = match ty {
        FieldType::String | FieldType::Enumeration | FieldType::Datetime => Type::String,
        FieldType::Integer => Type::Integer,
        FieldType::Float => Type::Number,
        FieldType::Boolean => Type::Boolean,
        // identifiers may be strings or integers
        FieldType::Identifier | FieldType::Reference => Type::String,
    };
    let schema_type = if nullable {
        SchemaType::Array(vec![base, Type::Null])
    } else {
        SchemaType::Type(base)
    };
    let mut builder = ObjectBuilder::new().schema_type(schema_type);
    if ty == FieldType::Datetime {
        builder = builder.format(Some(SchemaFormat::KnownFormat(KnownFormat::DateTime)));
    }
    if ty == FieldType::Enumeration && !variants.is_empty() {
        builder = builder.enum_values(Some(variants.iter().cloned()));
    }
    RefOr::T(Schema::Object(builder.build()))
}

fn input_schema(schema: &ResourceSchema, fields: &[InputField]) -> RefOr<Schema> {
    let mut obj = ObjectBuilder::new().schema_type(SchemaType::Type(Type::Object));
    for f in fields {
        let variants = schema.field(&f.name).map(|d| d.variants.as_slice()).unwrap_or(&[]);
        obj = obj.property(&f.name, field_schema(f.field_type, f.nullable, variants));
        if f.required {
            obj = obj.required(&f.name);
        }
    }
    RefOr::T(Schema::Object(obj.build()))
}

fn read_schema(schema: &ResourceSchema) -> RefOr<Schema> {
    let mut obj = ObjectBuilder::new().schema_type(SchemaType::Type(Type::Object));
    for name in &schema.derived().read.fields {
        if let Some(f) = schema.field(name) {
            obj = obj.property(name, field_schema(f.field_type, f.nullable, &f.variants)).required(name);
        }
    }
    RefOr::T(Schema::Object(obj.build()))
}

fn page_schema(read_name: &str) -> RefOr<Schema> {
    let integer = || RefOr::T(Schema::Object(ObjectBuilder::new().schema_type(SchemaType::Type(Type::Integer)).build()));
    let obj = ObjectBuilder::new()
        .schema_type(SchemaType::Type(Type::Object))
        .property("items", RefOr::T(Schema::Array(Array::new(schema_ref(read_name)))))
        .required("items")
        .property("total_count", integer())
        .required("total_count")
        .property("page", integer())
        .required("page")
        .property("limit", integer())
        .required("limit");
    RefOr::T(Schema::Object(obj.build()))
}

fn error_schema() -> RefOr<Schema> {
    let string = RefOr::T(Schema::Object(ObjectBuilder::new().schema_type(SchemaType::Type(Type::String)).build()));
    let obj = ObjectBuilder::new()
        .schema_type(SchemaType::Type(Type::Object))
        .property("kind", string.clone())
        .required("kind")
        .property("message", string)
        .required("message")
        .property(
            "detail",
            RefOr::T(Schema::Object(ObjectBuilder::new().schema_type(SchemaType::Type(Type::Object)).build())),
        );
    RefOr::T(Schema::Object(obj.build()))
}

fn query_param(name: &str, schema: RefOr<Schema>, description: &str) -> openapi::path::Parameter {
    ParameterBuilder::new()
        .name(name)
        .parameter_in(ParameterIn::Query)
        .required(Required::False)
        .description(Some(description))
        .schema(Some(schema))
        .build()
}

fn list_parameters(schema: &ResourceSchema) -> Vec<openapi::path::Parameter> {
    let list = &schema.derived().list;
    let mut params = Vec::new();
    for filter in &list.filters {
        let variants = schema.field(&filter.name).map(|d| d.variants.as_slice()).unwrap_or(&[]);
        for op in &filter.operators {
            let (name, value_schema) = match op {
                FilterOp::Eq => (filter.name.clone(), field_schema(filter.field_type, false, variants)),
                FilterOp::In => (
                    format!("{}__in", filter.name),
                    field_schema(FieldType::String, false, &[]),
                ),
                other => (
                    format!("{}__{}", filter.name, other.as_str()),
                    field_schema(filter.field_type, false, variants),
                ),
            };
            let description = format!("{} {} filter", filter.name, op.as_str());
            params.push(query_param(&name, value_schema, &description));
        }
    }
    let string = field_schema(FieldType::String, false, &[]);
    let integer = field_schema(FieldType::Integer, false, &[]);
    let sortable = list.sortable.join(", ");
    params.push(query_param(
        "sort",
        string,
        &format!("comma-separated keys, '-' for descending; sortable: {}", sortable),
    ));
    params.push(query_param("page", integer.clone(), "1-based page number"));
    params.push(query_param("limit", integer.clone(), "page size"));
    params.push(query_param("offset", integer, "row offset, instead of page"));
    params
}

fn json_response(description: &str, schema: RefOr<Schema>) -> openapi::Response {
    ResponseBuilder::new()
        .description(description)
        .content("application/json", ContentBuilder::new().schema(Some(schema)).build())
        .build()
}

fn operation(binding: &Binding, kind: OperationKind, type_name: &str) -> Operation {
    let schema = binding.schema();
    let mut op = OperationBuilder::new()
        .operation_id(Some(format!("{}_{}", kind.as_str(), schema.name)))
        .summary(Some(format!("{} {}", kind.as_str(), schema.name)));
    let tags = if binding.options.tags.is_empty() {
        vec![schema.name.clone()]
    } else {
        binding.options.tags.clone()
    };
    for tag in tags {
        op = op.tag(tag);
    }
    if matches!(kind, OperationKind::Read | OperationKind::Update | OperationKind::Delete) {
        op = op.parameter(
            ParameterBuilder::new()
                .name("id")
                .parameter_in(ParameterIn::Path)
                .required(Required::True)
                .description(Some("primary key; composite keys are comma separated"))
                .schema(Some(field_schema(FieldType::String, false, &[])))
                .build(),
        );
    }
    if kind == OperationKind::List {
        for p in list_parameters(schema) {
            op = op.parameter(p);
        }
    }
    let body_name = match kind {
        OperationKind::Create => Some(format!("{}Create", type_name)),
        OperationKind::Update => Some(format!("{}Update", type_name)),
        _ => None,
    };
    if let Some(name) = body_name {
        op = op.request_body(Some(
            RequestBodyBuilder::new()
                .required(Some(Required::True))
                .content("application/json", ContentBuilder::new().schema(Some(schema_ref(&name))).build())
                .build(),
        ));
    }

    let read = schema_ref(&format!("{}Read", type_name));
    let error = schema_ref("Error");
    let mut responses = ResponsesBuilder::new();
    responses = match kind {
        OperationKind::List => responses.response(
            "200",
            json_response("one page of results", schema_ref(&format!("{}Page", type_name))),
        ),
        OperationKind::Create => responses.response("201", json_response("created", read)),
        _ => responses.response("200", json_response("ok", read)),
    };
    responses = responses
        .response("400", json_response("invalid request", error.clone()))
        .response("403", json_response("not authorized", error.clone()));
    if !matches!(kind, OperationKind::List | OperationKind::Create) {
        responses = responses.response("404", json_response("not found", error.clone()));
    }
    responses = responses.response("500", json_response("internal error", error));
    op.responses(responses.build()).build()
}

/// OpenAPI document covering every binding of the factory.
pub fn build_document(factory: &RouteFactory) -> openapi::OpenApi {
    let mut doc = openapi::OpenApiBuilder::new()
        .info(
            openapi::InfoBuilder::new()
                .title(env!("CARGO_PKG_NAME"))
                .version(env!("CARGO_PKG_VERSION"))
                .build(),
        )
        .paths(openapi::Paths::new())
        .build();

    let mut components = ComponentsBuilder::new().schema("Error", error_schema());
    for binding in factory.bindings() {
        let schema = binding.schema();
        let type_name = to_pascal_case(&schema.name);
        let derived = schema.derived();
        components = components
            .schema(format!("{}Create", type_name), input_schema(schema, &derived.create.fields))
            .schema(format!("{}Update", type_name), input_schema(schema, &derived.update.fields))
            .schema(format!("{}Read", type_name), read_schema(schema))
            .schema(format!("{}Page", type_name), page_schema(&format!("{}Read", type_name)));

        let (collection, item) = resource_paths(schema);
        let item = item.replace(":id", "{id}");
        for kind in &binding.options.operations {
            let path = match kind {
                OperationKind::List | OperationKind::Create => collection.clone(),
                _ => item.clone(),
            };
            let op = operation(binding, *kind, &type_name);
            let path_item = doc.paths.paths.entry(path).or_default();
            match kind {
                OperationKind::List | OperationKind::Read => path_item.get = Some(op),
                OperationKind::Create => path_item.post = Some(op),
                OperationKind::Update => path_item.patch = Some(op),
                OperationKind::Delete => path_item.delete = Some(op),
            }
        }
    }
    doc.components = Some(components.build());
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldConfig, Settings};
    use crate::routes::BindingOptions;
    use crate::state::CrudServices;
    use crate::store::MemoryStore;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn factory() -> RouteFactory {
        let schema = ResourceSchema::build(
            "order_item",
            None,
            vec![
                FieldConfig::new("id", FieldType::Identifier),
                FieldConfig::new("sku", FieldType::String).filterable().sortable(),
                FieldConfig::new("status", FieldType::Enumeration)
                    .variants(["open", "closed"])
                    .filterable(),
            ],
            vec!["id".into()],
            BTreeMap::new(),
        )
        .unwrap();
        let mut f = RouteFactory::new(CrudServices::new(Arc::new(MemoryStore::new()), Settings::default()));
        f.register(Arc::new(schema), BindingOptions::default()).unwrap();
        f
    }

    #[test]
    fn pascal_case_names() {
        assert_eq!(to_pascal_case("order_item"), "OrderItem");
        assert_eq!(to_pascal_case("widget"), "Widget");
    }

    #[test]
    fn document_lists_components_and_paths() {
        let doc = serde_json::to_value(build_document(&factory())).unwrap();
        let schemas = doc["components"]["schemas"].as_object().unwrap();
        for name in ["OrderItemCreate", "OrderItemUpdate", "OrderItemRead", "OrderItemPage", "Error"] {
            assert!(schemas.contains_key(name), "missing {}", name);
        }
        assert_eq!(schemas["OrderItemCreate"]["required"], serde_json::json!(["sku", "status"]));
        assert!(doc["paths"]["/order_item"]["get"].is_object());
        assert!(doc["paths"]["/order_item"]["post"].is_object());
        assert!(doc["paths"]["/order_item/{id}"]["patch"].is_object());
        let params: Vec<_> = doc["paths"]["/order_item"]["get"]["parameters"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap().to_string())
            .collect();
        assert!(params.contains(&"sku__contains".to_string()));
        assert!(params.contains(&"status__in".to_string()));
        assert!(!params.contains(&"status__gt".to_string()));
    }
}
