//! Ambient request context propagated implicitly through async call trees.

pub mod context;
pub mod error;

pub use context::{
    require_config, require_context, require_correlation_id, require_session, spawn, try_current,
    RequestContext, Scope,
};
pub use error::ContextError;
