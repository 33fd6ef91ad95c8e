//! Example server: loads resource declarations from a directory, registers their routes, and
//! serves them with the common routes. Uses Postgres when DATABASE_URL is set, memory otherwise.

use autocrud::{
    build_document, common_routes, load_resources_from_dir, BindingOptions, CrudServices, MemoryStore, Persistence,
    PgStore, RoleAuthorizer, RouteFactory, SchemaRegistry, Settings,
};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("autocrud=info".parse()?))
        .init();

    let settings = Settings::from_env()?;
    let resource_dir = std::env::var("RESOURCES_PATH").unwrap_or_else(|_| "demos/resources".into());
    let configs = load_resources_from_dir(&resource_dir).await?;

    let mut registry = SchemaRegistry::new();
    let mut schemas = Vec::with_capacity(configs.len());
    for cfg in &configs {
        schemas.push((registry.register_config(cfg)?, BindingOptions::from_config(cfg)));
    }
    registry.resolve_relations()?;

    let persistence: Arc<dyn Persistence> = if settings.database_url.is_some() {
        Arc::new(PgStore::connect(&settings).await?)
    } else {
        tracing::warn!("DATABASE_URL not set; using the in-memory store");
        Arc::new(MemoryStore::new())
    };
    let bind = settings.bind.clone();
    let services =
        CrudServices::new(persistence, settings).with_authorizer(Arc::new(RoleAuthorizer::from_configs(&configs)));

    let mut factory = RouteFactory::for_registry(services, &registry);
    for (schema, options) in schemas {
        factory.register(schema, options)?;
    }
    let doc = build_document(&factory);
    let app = Router::new().merge(common_routes(doc)).merge(factory.router()?);

    let listener = TcpListener::bind(&bind).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
