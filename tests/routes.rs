use autocrud::{
    build_document, common_routes, BindingOptions, ConfigError, CrudServices, FieldConfig, FieldType, HookAbort,
    HookRegistry, MemoryStore, OperationContext, OperationKind, ResourceSchema, RoleAuthorizer, RouteFactory,
    Settings,
};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceExt;

fn widget() -> Arc<ResourceSchema> {
    Arc::new(
        ResourceSchema::build(
            "widget",
            None,
            vec![
                FieldConfig::new("id", FieldType::Identifier),
                FieldConfig::new("name", FieldType::String).filterable().sortable(),
                FieldConfig::new("price", FieldType::Float)
                    .filterable()
                    .sortable()
                    .default_value(json!(0.0)),
                FieldConfig::new("note", FieldType::String).nullable(),
            ],
            vec!["id".into()],
            BTreeMap::new(),
        )
        .unwrap(),
    )
}

fn factory_with(services: CrudServices) -> RouteFactory {
    let mut factory = RouteFactory::new(services);
    factory.register(widget(), BindingOptions::default()).unwrap();
    factory
}

fn app() -> Router {
    factory_with(CrudServices::new(Arc::new(MemoryStore::new()), Settings::default())).router().unwrap()
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send_with(app, method, uri, body, &[]).await
}

async fn send_with(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
        req = req.header(*k, *v);
    }
    let req = match body {
        Some(b) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn seed(app: &Router, name: &str, price: f64) -> String {
    let (status, body) = send(app, Method::POST, "/widget", Some(json!({ "name": name, "price": price }))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn widget_lifecycle() {
    let app = app();
    let (status, created) = send(&app, Method::POST, "/widget", Some(json!({ "name": "A" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "A");
    assert_eq!(created["price"], 0.0);
    assert_eq!(created["note"], Value::Null);
    let id = created["id"].as_str().unwrap().to_string();
    seed(&app, "B", 2.0).await;

    let (status, list) = send(&app, Method::GET, "/widget?name=A", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total_count"], 1);
    assert_eq!(list["page"], 1);
    assert_eq!(list["limit"], 100);
    assert_eq!(list["items"][0], created);

    let (status, read) = send(&app, Method::GET, &format!("/widget/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(read, created);

    let (status, updated) = send(&app, Method::PATCH, &format!("/widget/{}", id), Some(json!({ "price": 9.99 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["price"], 9.99);
    assert_eq!(updated["name"], "A");

    let (status, deleted) = send(&app, Method::DELETE, &format!("/widget/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["id"], id.as_str());

    let (status, err) = send(&app, Method::DELETE, &format!("/widget/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["kind"], "NotFoundError");
    let (status, _) = send(&app, Method::GET, &format!("/widget/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_update_changes_nothing() {
    let app = app();
    let id = seed(&app, "A", 1.0).await;
    let (_, before) = send(&app, Method::GET, &format!("/widget/{}", id), None).await;
    let (status, after) = send(&app, Method::PATCH, &format!("/widget/{}", id), Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(before, after);
}

#[tokio::test]
async fn filters_and_sorting() {
    let app = app();
    seed(&app, "apple", 3.0).await;
    seed(&app, "banana", 1.0).await;
    seed(&app, "cherry", 2.0).await;

    let (status, list) = send(&app, Method::GET, "/widget?price__gte=2&sort=-price", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total_count"], 2);
    let names: Vec<_> = list["items"].as_array().unwrap().iter().map(|i| i["name"].clone()).collect();
    assert_eq!(names, vec![json!("apple"), json!("cherry")]);

    let (_, list) = send(&app, Method::GET, "/widget?name__contains=an", None).await;
    assert_eq!(list["total_count"], 1);
    assert_eq!(list["items"][0]["name"], "banana");

    let (_, list) = send(&app, Method::GET, "/widget?name__in=apple,cherry&sort=name", None).await;
    let names: Vec<_> = list["items"].as_array().unwrap().iter().map(|i| i["name"].clone()).collect();
    assert_eq!(names, vec![json!("apple"), json!("cherry")]);
}

#[tokio::test]
async fn limit_zero_reports_total_only() {
    let app = app();
    seed(&app, "A", 1.0).await;
    seed(&app, "B", 2.0).await;
    let (status, list) = send(&app, Method::GET, "/widget?limit=0", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["items"], json!([]));
    assert_eq!(list["total_count"], 2);
    assert_eq!(list["limit"], 0);
}

#[tokio::test]
async fn paging_over_ties_is_stable() {
    let app = app();
    for _ in 0..5 {
        seed(&app, "same", 1.0).await;
    }
    let mut seen = Vec::new();
    for page in 1..=3 {
        let (_, list) = send(&app, Method::GET, &format!("/widget?sort=price&limit=2&page={}", page), None).await;
        for item in list["items"].as_array().unwrap() {
            seen.push(item["id"].as_str().unwrap().to_string());
        }
    }
    assert_eq!(seen.len(), 5);
    let mut unique = seen.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 5);
    assert_eq!(seen, unique);
}

#[tokio::test]
async fn rejected_list_parameters() {
    let app = app();
    let (status, err) = send(&app, Method::GET, "/widget?note=x", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["kind"], "UnsupportedOperatorError");

    let (status, err) = send(&app, Method::GET, "/widget?name__gt=a", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["kind"], "UnsupportedOperatorError");

    let (status, err) = send(&app, Method::GET, "/widget?sort=note", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["kind"], "UnsupportedSortFieldError");
    assert_eq!(err["detail"]["field"], "note");

    let (status, err) = send(&app, Method::GET, "/widget?page=1&offset=10", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["kind"], "ValidationError");

    // an illegal filter is reported even when other parameters are also invalid
    for uri in ["/widget?price=cheap&note=x", "/widget?limit=ten&note=x", "/widget?sort=note&name__gt=a"] {
        let (status, err) = send(&app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(err["kind"], "UnsupportedOperatorError", "{}", uri);
    }

    let (status, err) = send(&app, Method::GET, "/widget?limit=ten", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["kind"], "ValidationError");

    let (status, err) = send(&app, Method::GET, "/widget?price=cheap", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["kind"], "ValidationError");
}

#[tokio::test]
async fn invalid_bodies_are_validation_errors() {
    let app = app();
    let (status, err) = send(&app, Method::POST, "/widget", Some(json!({ "price": 1.0 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["kind"], "ValidationError");
    assert_eq!(err["detail"]["field"], "name");

    let (status, _) = send(&app, Method::POST, "/widget", Some(json!({ "name": "A", "colour": "red" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::POST, "/widget", Some(json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, list) = send(&app, Method::GET, "/widget", None).await;
    assert_eq!(list["total_count"], 0);
}

#[tokio::test]
async fn roles_come_from_identity_headers() {
    let store = MemoryStore::new();
    let authorizer = RoleAuthorizer::new().require("widget", OperationKind::Delete, ["admin"]);
    let services = CrudServices::new(Arc::new(store.clone()), Settings::default()).with_authorizer(Arc::new(authorizer));
    let app = factory_with(services).router().unwrap();
    let id = seed(&app, "A", 1.0).await;
    let uri = format!("/widget/{}", id);

    let (status, err) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["kind"], "AuthorizationError");

    let (status, _) = send_with(&app, Method::DELETE, &uri, None, &[("x-principal-id", "u1"), ("x-principal-roles", "viewer")]).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(store.count("widget"), 1);

    let (status, _) = send_with(
        &app,
        Method::DELETE,
        &uri,
        None,
        &[("x-principal-id", "u1"), ("x-principal-roles", "viewer, admin")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(store.count("widget"), 0);
}

#[tokio::test]
async fn hooks_shape_requests_and_responses() {
    let mut hooks = HookRegistry::new();
    hooks.pre("widget", OperationKind::Create, |ctx: &mut OperationContext| -> Result<(), HookAbort> {
        if let Some(payload) = ctx.payload.as_mut() {
            let upper = payload.get("name").and_then(Value::as_str).map(str::to_uppercase);
            if let Some(name) = upper {
                payload.insert("name".into(), json!(name));
            }
        }
        Ok(())
    });
    hooks.pre("widget", OperationKind::Delete, |_: &mut OperationContext| -> Result<(), HookAbort> {
        Err(HookAbort::new("widgets are permanent").with_status(StatusCode::CONFLICT))
    });
    let store = MemoryStore::new();
    let services = CrudServices::new(Arc::new(store.clone()), Settings::default()).with_hooks(hooks);
    let app = factory_with(services).router().unwrap();

    let id = seed(&app, "loud", 1.0).await;
    let (_, read) = send(&app, Method::GET, &format!("/widget/{}", id), None).await;
    assert_eq!(read["name"], "LOUD");

    let (status, err) = send(&app, Method::DELETE, &format!("/widget/{}", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["kind"], "HookAbortError");
    assert_eq!(err["message"], "widgets are permanent");
    assert_eq!(store.count("widget"), 1);
}

#[tokio::test]
async fn registration_freezes_after_first_request() {
    let mut factory = factory_with(CrudServices::new(Arc::new(MemoryStore::new()), Settings::default()));
    // re-registering before any request replaces the binding
    factory.register(widget(), BindingOptions::default()).unwrap();
    let app = factory.router().unwrap();
    assert!(!factory.is_frozen());

    let (status, _) = send(&app, Method::GET, "/widget", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(factory.is_frozen());
    let err = factory.register(widget(), BindingOptions::default()).unwrap_err();
    assert_eq!(err, ConfigError::RouteFrozen("widget".into()));
}

#[tokio::test]
async fn unbound_operations_have_no_route() {
    let mut factory = RouteFactory::new(CrudServices::new(Arc::new(MemoryStore::new()), Settings::default()));
    let options = BindingOptions {
        operations: vec![OperationKind::List, OperationKind::Read],
        tags: vec![],
    };
    factory.register(widget(), options).unwrap();
    let app = factory.router().unwrap();
    let (status, _) = send(&app, Method::GET, "/widget", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::POST, "/widget", Some(json!({ "name": "A" }))).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let settings = Settings {
        max_body_bytes: 64,
        ..Settings::default()
    };
    let app = factory_with(CrudServices::new(Arc::new(MemoryStore::new()), settings)).router().unwrap();
    let body = json!({ "name": "x".repeat(200) }).to_string();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/widget")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let err: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(err["kind"], "ValidationError");
    assert_eq!(err["detail"]["limit"], 64);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let factory = factory_with(CrudServices::new(Arc::new(MemoryStore::new()), Settings::default()));
    let app = Router::new()
        .merge(common_routes(build_document(&factory)))
        .merge(factory.router().unwrap());

    let (status, doc) = send(&app, Method::GET, "/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["components"]["schemas"]["WidgetCreate"].is_object());
    assert!(doc["paths"]["/widget/{id}"]["delete"].is_object());

    let (status, health) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
}
