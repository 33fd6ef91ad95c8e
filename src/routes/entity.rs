//! Route Factory: five bindings per registered resource.
//!
//! Re-registering a resource before the first request replaces its binding. Once any generated
//! handler has served a request the factory is frozen and registration fails with `RouteFrozen`.

use crate::config::{OperationKind, ResourceConfig, ResourceSchema, SchemaRegistry};
use crate::error::{ApiError, ConfigError};
use crate::handlers::entity::{create, delete, list, read, update};
use crate::service::OperationPipeline;
use crate::state::{CrudServices, ResourceEndpoint};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::map_response_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::{on, MethodFilter, MethodRouter};
use axum::Router;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

/// Router collaborator: receives each generated binding once.
pub trait RouteBinder {
    fn bind(&mut self, method: Method, path: &str, handler: MethodRouter);
}

/// Collects bindings into an axum [`Router`], merging methods that share a path.
#[derive(Default)]
pub struct AxumBinder {
    routes: BTreeMap<String, MethodRouter>,
    bound: Vec<(Method, String)>,
}

impl AxumBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Method and path of every binding, in bind order.
    pub fn bound(&self) -> &[(Method, String)] {
        &self.bound
    }

    pub fn into_router(self) -> Router {
        self.routes
            .into_iter()
            .fold(Router::new(), |router, (path, handler)| router.route(&path, handler))
    }
}

impl RouteBinder for AxumBinder {
    fn bind(&mut self, method: Method, path: &str, handler: MethodRouter) {
        let merged = match self.routes.remove(path) {
            Some(existing) => existing.merge(handler),
            None => handler,
        };
        self.routes.insert(path.to_string(), merged);
        self.bound.push((method, path.to_string()));
    }
}

/// Which operations of a resource get routes, and how they are grouped in the OpenAPI document.
#[derive(Clone, Debug, PartialEq)]
pub struct BindingOptions {
    pub operations: Vec<OperationKind>,
    pub tags: Vec<String>,
}

impl Default for BindingOptions {
    fn default() -> Self {
        BindingOptions {
            operations: OperationKind::ALL.to_vec(),
            tags: Vec::new(),
        }
    }
}

impl BindingOptions {
    pub fn from_config(cfg: &ResourceConfig) -> Self {
        BindingOptions {
            operations: cfg.operations.clone().unwrap_or_else(|| OperationKind::ALL.to_vec()),
            tags: cfg.tags.clone(),
        }
    }
}

pub struct Binding {
    pub endpoint: Arc<ResourceEndpoint>,
    pub options: BindingOptions,
}

impl Binding {
    pub fn schema(&self) -> &ResourceSchema {
        self.endpoint.pipeline.schema()
    }
}

/// Collection path and item path of a resource.
pub fn resource_paths(schema: &ResourceSchema) -> (String, String) {
    (format!("/{}", schema.name), format!("/{}/:id", schema.name))
}

pub struct RouteFactory {
    services: CrudServices,
    bindings: Vec<Binding>,
    served: Arc<AtomicBool>,
}

impl RouteFactory {
    pub fn new(services: CrudServices) -> Self {
        RouteFactory {
            services,
            bindings: Vec::new(),
            served: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A factory whose first served request also closes `registry` for registration.
    pub fn for_registry(services: CrudServices, registry: &SchemaRegistry) -> Self {
        RouteFactory {
            services,
            bindings: Vec::new(),
            served: registry.frozen_flag(),
        }
    }

    pub fn services(&self) -> &CrudServices {
        &self.services
    }

    pub fn is_frozen(&self) -> bool {
        self.served.load(Ordering::SeqCst)
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn register(&mut self, schema: Arc<ResourceSchema>, options: BindingOptions) -> Result<(), ConfigError> {
        if self.is_frozen() {
            return Err(ConfigError::RouteFrozen(schema.name.clone()));
        }
        let name = schema.name.clone();
        let pipeline = OperationPipeline::new(schema, self.services.clone());
        let binding = Binding {
            endpoint: Arc::new(ResourceEndpoint::new(pipeline, self.served.clone())),
            options,
        };
        match self.bindings.iter_mut().find(|b| b.schema().name == name) {
            Some(existing) => {
                tracing::info!(resource = %name, "replacing resource binding");
                *existing = binding;
            }
            None => self.bindings.push(binding),
        }
        Ok(())
    }

    /// Every relation must target a resource registered with this factory.
    pub fn resolve_relations(&self) -> Result<(), ConfigError> {
        let names: BTreeSet<&str> = self.bindings.iter().map(|b| b.schema().name.as_str()).collect();
        for binding in &self.bindings {
            let schema = binding.schema();
            for (field, target) in &schema.relations {
                if !names.contains(target.as_str()) {
                    return Err(ConfigError::invalid(
                        &schema.name,
                        format!("relation '{}' targets unregistered resource '{}'", field, target),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Hand every binding to the router collaborator, after relations resolve.
    pub fn install<B: RouteBinder>(&self, binder: &mut B) -> Result<(), ConfigError> {
        self.resolve_relations()?;
        for binding in &self.bindings {
            let (collection, item) = resource_paths(binding.schema());
            for kind in &binding.options.operations {
                let ep = binding.endpoint.clone();
                let (method, path, handler): (Method, &str, MethodRouter) = match kind {
                    OperationKind::List => (Method::GET, collection.as_str(), on(MethodFilter::GET, list).with_state(ep)),
                    OperationKind::Read => (Method::GET, item.as_str(), on(MethodFilter::GET, read).with_state(ep)),
                    OperationKind::Create => (Method::POST, collection.as_str(), on(MethodFilter::POST, create).with_state(ep)),
                    OperationKind::Update => (Method::PATCH, item.as_str(), on(MethodFilter::PATCH, update).with_state(ep)),
                    OperationKind::Delete => (Method::DELETE, item.as_str(), on(MethodFilter::DELETE, delete).with_state(ep)),
                };
                tracing::info!(resource = %binding.schema().name, method = %method, path = %path, "binding route");
                binder.bind(method, path, handler);
            }
        }
        Ok(())
    }

    /// The generated routes as an axum router, with the request body limit applied.
    pub fn router(&self) -> Result<Router, ConfigError> {
        let mut binder = AxumBinder::new();
        self.install(&mut binder)?;
        let limit = self.services.settings.max_body_bytes;
        Ok(binder.into_router().layer(
            ServiceBuilder::new()
                .layer(map_response_with_state(limit, payload_too_large))
                .layer(RequestBodyLimitLayer::new(limit))
                .layer(DefaultBodyLimit::disable()),
        ))
    }
}

/// Gives the body limit's plain-text 413 the JSON error shape.
async fn payload_too_large<B>(State(limit): State<usize>, res: Response<B>) -> Response
where
    Response<B>: IntoResponse,
{
    let is_json = res
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.as_bytes().starts_with(b"application/json"))
        .unwrap_or(false);
    if res.status() != StatusCode::PAYLOAD_TOO_LARGE || is_json {
        return res.into_response();
    }
    ApiError::PayloadTooLarge { limit }.into_response()
}
