//! autocrud: schema-driven CRUD route generation for axum services.
//!
//! Declare a resource (fields, primary key, relations), register it with a [`RouteFactory`],
//! and get list/read/create/update/delete routes whose behavior runs through one
//! [`OperationPipeline`] per resource: validate, authorize, pre-hooks, persist, post-hooks,
//! serialize.

pub mod config;
pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod openapi;
pub mod query;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{
    load_resources_from_dir, parse_resources, FieldConfig, FieldDescriptor, FieldType, OperationKind, ResourceConfig,
    ResourceSchema, SchemaRegistry, Settings,
};
pub use error::{ApiError, ConfigError, ErrorKind};
pub use openapi::build_document;
pub use response::{ListResponse, OperationOutput};
pub use routes::{common_routes, BindingOptions, RouteFactory};
pub use service::{
    AllowAll, Authorizer, Decision, Hook, HookAbort, HookPhase, HookRegistry, OperationContext, OperationInput,
    OperationPipeline, Principal, RoleAuthorizer,
};
pub use state::CrudServices;
pub use store::{Entity, MemoryStore, Persistence, PersistenceError, PersistenceSession, PgStore};
