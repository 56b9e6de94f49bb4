use std::future::Future;
use std::sync::Arc;

use fleet_config::AppConfig;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::ContextError;

/// Ambient, per-request state threaded implicitly through a call tree via
/// `tokio::task_local!`. This is the idiomatic Rust stand-in for
/// thread/async-local context propagation: every repository call, audit
/// write, and log line picks up the correlation id and active config
/// snapshot without it being passed explicitly through every signature.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
    pub config: Arc<AppConfig>,
    pub session_id: Option<String>,
    pub actor_user_id: Option<Uuid>,
}

impl RequestContext {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            config,
            session_id: None,
            actor_user_id: None,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = id.into();
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_actor(mut self, actor: Uuid) -> Self {
        self.actor_user_id = Some(actor);
        self
    }
}

tokio::task_local! {
    static CURRENT: RequestContext;
}

/// RAII guard establishing `ctx` as the ambient context for the duration
/// of an async block. Dropping the guard (scope exit) restores whatever
/// was active before — there is no global mutable state, only
/// task-local storage scoped to the enclosing `tokio::task_local!` frame.
pub struct Scope;

impl Scope {
    /// Runs `fut` with `ctx` bound as the ambient context. Nothing is
    /// restored afterward because `task_local!` scoping already ends when
    /// `fut` completes — the binding simply goes out of scope.
    pub async fn enter<F, T>(ctx: RequestContext, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        CURRENT.scope(ctx, fut).await
    }

    /// Synchronous variant for non-async call sites (e.g. inside a
    /// `spawn_blocking` closure that still needs the ambient context).
    pub fn enter_sync<F, T>(ctx: RequestContext, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        CURRENT.sync_scope(ctx, f)
    }
}

/// Accessors over the ambient context. All of these panic-free; callers
/// that truly require the context use the `require_*` variants below.
pub fn try_current() -> Option<RequestContext> {
    CURRENT.try_with(|ctx| ctx.clone()).ok()
}

pub fn require_context() -> Result<RequestContext, ContextError> {
    try_current().ok_or(ContextError::Missing("RequestContext"))
}

pub fn require_correlation_id() -> Result<String, ContextError> {
    Ok(require_context()?.correlation_id)
}

pub fn require_config() -> Result<Arc<AppConfig>, ContextError> {
    Ok(require_context()?.config)
}

pub fn require_session() -> Result<String, ContextError> {
    require_context()?
        .session_id
        .ok_or(ContextError::FieldUnset { field: "session_id" })
}

/// Spawns `fut` on the current runtime with the calling task's ambient
/// context snapshotted into the child. Direct `tokio::spawn` would start
/// the child with no task-local binding at all, so any code path that
/// forks work (e.g. fire-and-forget audit writes) must go through this
/// helper instead.
pub fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match try_current() {
        Some(ctx) => tokio::spawn(Scope::enter(ctx, fut)),
        None => tokio::spawn(fut),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accessors_fail_outside_scope() {
        assert!(require_context().is_err());
    }

    #[tokio::test]
    async fn scope_makes_context_available_within() {
        let ctx = RequestContext::new(Arc::new(AppConfig::default())).with_correlation_id("abc-123");
        let seen = Scope::enter(ctx, async { require_correlation_id().unwrap() }).await;
        assert_eq!(seen, "abc-123");
    }

    #[tokio::test]
    async fn spawned_child_inherits_context() {
        let ctx = RequestContext::new(Arc::new(AppConfig::default())).with_correlation_id("parent-id");
        let result = Scope::enter(ctx, async {
            spawn(async { require_correlation_id().unwrap() })
                .await
                .unwrap()
        })
        .await;
        assert_eq!(result, "parent-id");
    }

    #[tokio::test]
    async fn context_does_not_leak_across_sibling_scopes() {
        let a = RequestContext::new(Arc::new(AppConfig::default())).with_correlation_id("a");
        let b = RequestContext::new(Arc::new(AppConfig::default())).with_correlation_id("b");

        let (ra, rb) = tokio::join!(
            Scope::enter(a, async { require_correlation_id().unwrap() }),
            Scope::enter(b, async { require_correlation_id().unwrap() }),
        );
        assert_eq!(ra, "a");
        assert_eq!(rb, "b");
    }
}
