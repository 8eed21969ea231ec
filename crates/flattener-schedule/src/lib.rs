//! Rate-limited scheduler primitives: a per-provider
//! token bucket, a bounded worker pool, and a retry/backoff wrapper.

mod retry;
mod token_bucket;
mod worker_pool;

pub use retry::{with_retry, RetryPolicy};
pub use token_bucket::{TokenBucket, DEFAULT_BURST, DEFAULT_RATE_PER_SEC};
pub use worker_pool::{WorkerPool, DEFAULT_WORKER_POOL_SIZE};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Domains are grouped by provider identifier, case-insensitively
///; each group shares one token bucket. This registry
/// hands out (and memoizes) one bucket per provider tag.
pub struct ProviderBuckets {
    buckets: Mutex<HashMap<String, Arc<TokenBucket>>>,
}

impl ProviderBuckets {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn for_provider(&self, provider_tag: &str) -> Arc<TokenBucket> {
        let key = provider_tag.to_ascii_lowercase();
        let mut buckets = self.buckets.lock().unwrap();
        buckets
            .entry(key)
            .or_insert_with(|| Arc::new(TokenBucket::default_rate()))
            .clone()
    }
}

impl Default for ProviderBuckets {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memoizes_bucket_per_provider_case_insensitively() {
        let buckets = ProviderBuckets::new();
        let a = buckets.for_provider("GenericRest");
        let b = buckets.for_provider("genericrest");
        assert!(Arc::ptr_eq(&a, &b));

        let c = buckets.for_provider("cloudflare");
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
