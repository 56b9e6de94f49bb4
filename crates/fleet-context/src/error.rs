use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("no ambient context is active; `{0}` was accessed outside a Scope")]
    Missing(&'static str),

    #[error("ambient context field '{field}' was never populated for this scope")]
    FieldUnset { field: &'static str },
}
