use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("field '{field}' out of range: {message}")]
    OutOfRange { field: &'static str, message: String },

    #[error("invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },

    #[error("incompatible auth type {auth:?} for export type {export_type:?}")]
    IncompatibleAuthType { auth: String, export_type: String },

    #[error("device group invariant violated: active_device_count ({active}) > device_count ({total})")]
    GroupCounterInvariant { active: u64, total: u64 },
}

pub type DomainResult<T> = Result<T, DomainError>;
