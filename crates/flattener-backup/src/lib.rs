//! Backup/Restore Engine: export a domain's provider
//! records to a portable document, and import one back under a
//! conflict-resolution strategy.

mod export;
mod import;

pub use export::{export_domain, serialize_json, serialize_text};
pub use import::{import_domain, ConflictStrategy, ImportOutcome};

use flattener_common::model::TxtRecord;
use serde::{Deserialize, Serialize};

/// The portable backup document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupDocument {
    pub domain: String,
    pub provider: String,
    pub version: String,
    pub exported_at: chrono::DateTime<chrono::Utc>,
    pub records: Vec<TxtRecord>,
    pub attribution: String,
}
