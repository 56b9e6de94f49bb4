//! Audit trail recording and a thin, read-mostly HTTP surface for
//! operator tooling to consume over the control plane's repositories.

pub mod app;
pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod state;

pub use app::build_app;
pub use audit::{AuditEntryInput, AuditRecorder};
pub use error::ApiError;
pub use state::AppState;
