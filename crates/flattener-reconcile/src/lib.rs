//! Per-domain reconciliation: diff desired vs actual SPF TXT state and
//! execute the resulting mutation plan under a rate limiter.

mod current;
mod plan;
mod pipeline;

pub use current::{rebuild_current, CurrentAggregate};
pub use plan::{build_plan, change_summary, MutationPlan};
pub use pipeline::{reconcile_domain, ReconcileOptions, ReconcileOutcome};
