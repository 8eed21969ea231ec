//! Shared config, error, and domain-model types for the SPF flattener
//! workspace.

pub mod config;
pub mod error;
pub mod model;
pub mod validate;

pub use config::Config;
pub use error::{redact, Error, Result};
pub use validate::{validate_record, Issue, RECORD_TYPES};
