//! Operation Pipeline and its collaborators: context, hooks, authorization, validation and
//! error translation.

pub mod authz;
pub mod context;
pub mod hooks;
pub mod pipeline;
pub mod translate;
pub mod validation;

pub use authz::{AllowAll, Authorizer, Decision, Principal, RoleAuthorizer};
pub use context::{OperationContext, OperationResult, Stage};
pub use hooks::{Hook, HookAbort, HookPhase, HookRegistry};
pub use pipeline::{OperationInput, OperationPipeline};
pub use translate::translate;
