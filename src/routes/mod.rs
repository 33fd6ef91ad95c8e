//! Route Factory and common routes.

pub mod common;
pub mod entity;
pub use common::common_routes;
pub use entity::{resource_paths, AxumBinder, Binding, BindingOptions, RouteBinder, RouteFactory};
