//! Collaborators shared by every generated route.

use crate::config::Settings;
use crate::service::{AllowAll, Authorizer, HookRegistry, OperationPipeline};
use crate::store::Persistence;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct CrudServices {
    pub persistence: Arc<dyn Persistence>,
    pub authorizer: Arc<dyn Authorizer>,
    /// Fixed once routes are built.
    pub hooks: Arc<HookRegistry>,
    pub settings: Arc<Settings>,
}

impl CrudServices {
    /// Allow-all authorization and no hooks.
    pub fn new(persistence: Arc<dyn Persistence>, settings: Settings) -> Self {
        CrudServices {
            persistence,
            authorizer: Arc::new(AllowAll),
            hooks: Arc::new(HookRegistry::new()),
            settings: Arc::new(settings),
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }
}

/// State of one resource's generated handlers.
pub struct ResourceEndpoint {
    pub pipeline: OperationPipeline,
    /// Shared with the route factory; set on the first request.
    served: Arc<AtomicBool>,
}

impl ResourceEndpoint {
    pub fn new(pipeline: OperationPipeline, served: Arc<AtomicBool>) -> Self {
        ResourceEndpoint { pipeline, served }
    }

    pub fn mark_served(&self) {
        self.served.store(true, Ordering::SeqCst);
    }
}
