pub mod export;
pub mod flatten;
pub mod import;
pub mod ping;

/// A single domain task's outcome, reported over the results channel
/// and joined once every
/// task completes.
#[derive(Debug)]
pub struct TaskReport {
    pub domain: String,
    pub outcome: std::result::Result<String, flattener_common::error::Error>,
}
