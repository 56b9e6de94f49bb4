//! Age-based retention: archive expired rows to disk, then soft-delete
//! them from the primary store.

pub mod archive;
pub mod engine;
pub mod error;
pub mod policy;

pub use archive::write_and_verify;
pub use engine::{RetentionEngine, RetentionResult};
pub use error::RetentionError;
pub use policy::{ArchiveFormat, RetentionPolicy, RetentionType};
