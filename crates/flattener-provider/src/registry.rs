//! Provider registry: resolves a case-insensitive provider tag from
//! config into a concrete [`ProviderClient`] built from that domain's
//! credentials.

use crate::{CloudflareLikeConfig, CloudflareLikeProvider, GenericRestConfig, GenericRestProvider, ProviderClient};
use flattener_common::error::{Error, Result};
use std::sync::Arc;

/// Builds a [`ProviderClient`] for a given provider tag and credential
/// pair. New provider kinds are added here.
pub struct ProviderRegistry;

impl ProviderRegistry {
    pub fn build(tag: &str, api_key: &str, secret_key: &str) -> Result<Arc<dyn ProviderClient>> {
        match tag.to_ascii_lowercase().as_str() {
            "genericrest" | "generic-rest" => {
                Ok(Arc::new(GenericRestProvider::new(GenericRestConfig {
                    api_key: api_key.to_string(),
                    secret_key: secret_key.to_string(),
                    ..GenericRestConfig::default()
                })))
            }
            "cloudflarelike" | "cloudflare-like" | "cloudflare" => {
                Ok(Arc::new(CloudflareLikeProvider::new(CloudflareLikeConfig {
                    api_token: api_key.to_string(),
                    ..CloudflareLikeConfig::default()
                })))
            }
            other => Err(Error::Config(format!("unknown provider tag: {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_provider_tags_case_insensitively() {
        assert!(ProviderRegistry::build("GenericRest", "k", "s").is_ok());
        assert!(ProviderRegistry::build("cloudflare", "token", "").is_ok());
    }

    #[test]
    fn rejects_unknown_provider_tag() {
        assert!(ProviderRegistry::build("nonexistent", "k", "s").is_err());
    }
}
