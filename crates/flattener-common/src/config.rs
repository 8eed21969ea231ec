//! Declarative YAML configuration, treated as a value object:
//! no behavior beyond validation and default-filling.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_ttl() -> u32 {
    600
}

fn default_v4_max_prefix() -> u8 {
    24
}

fn default_v6_max_prefix() -> u8 {
    64
}

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default provider tag, used by domains that don't override it.
    pub provider: String,

    /// Explicit DNS servers to resolve SPF records against. When absent,
    /// the system resolver is used.
    #[serde(default)]
    pub dns: Vec<DnsServer>,

    pub domains: Vec<DomainConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsServer {
    pub name: String,
    pub ip: String,
    #[serde(default = "default_dns_port")]
    pub port: u16,
}

fn default_dns_port() -> u16 {
    53
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,

    /// Provider tag override; falls back to the top-level `provider`.
    pub provider: Option<String>,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub secret_key: String,

    #[serde(default = "default_ttl")]
    pub ttl: u32,

    #[serde(default)]
    pub options: DomainOptions,

    #[serde(default)]
    pub aggregation: AggregationConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainOptions {
    #[serde(default)]
    pub aggregate: bool,

    #[serde(default)]
    pub force: bool,

    #[serde(default)]
    pub use_unflat_source: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_v4_max_prefix")]
    pub ipv4_max_prefix: u8,

    #[serde(default = "default_v6_max_prefix")]
    pub ipv6_max_prefix: u8,

    #[serde(default)]
    pub preserve_individual: Vec<String>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ipv4_max_prefix: default_v4_max_prefix(),
            ipv6_max_prefix: default_v6_max_prefix(),
            preserve_individual: Vec::new(),
        }
    }
}

/// Credentials resolved for a single domain task: config values, falling
/// back to `SPF_FLATTENER_API_KEY` / `SPF_FLATTENER_SECRET_KEY` when empty.
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
}

impl DomainConfig {
    pub fn resolved_provider(&self, default_provider: &str) -> String {
        self.provider
            .clone()
            .unwrap_or_else(|| default_provider.to_string())
    }

    pub fn resolved_credentials(&self) -> Result<Credentials> {
        let api_key = if self.api_key.is_empty() {
            std::env::var("SPF_FLATTENER_API_KEY").map_err(|_| {
                Error::Config(format!(
                    "no api_key configured for domain {} and SPF_FLATTENER_API_KEY is unset",
                    self.name
                ))
            })?
        } else {
            self.api_key.clone()
        };

        let secret_key = if self.secret_key.is_empty() {
            std::env::var("SPF_FLATTENER_SECRET_KEY").unwrap_or_default()
        } else {
            self.secret_key.clone()
        };

        Ok(Credentials {
            api_key,
            secret_key,
        })
    }
}

impl Config {
    /// Load and validate a YAML config document from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::parse(&content)
    }

    pub fn parse(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.provider.trim().is_empty() {
            return Err(Error::Config("top-level `provider` must not be empty".into()));
        }
        if self.domains.is_empty() {
            return Err(Error::Config("`domains` must contain at least one entry".into()));
        }
        for domain in &self.domains {
            crate::model::validate_domain_name(&domain.name)
                .map_err(|e| Error::Config(format!("domain {}: {e}", domain.name)))?;
            for entry in &domain.aggregation.preserve_individual {
                crate::model::parse_ip_entry(entry).map_err(|e| {
                    Error::Config(format!(
                        "domain {} preserve_individual entry {entry:?}: {e}",
                        domain.name
                    ))
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
provider: genericrest
dns:
  - name: primary
    ip: 1.1.1.1
domains:
  - name: example.com
    api_key: abc
    secret_key: def
    ttl: 300
    options:
      aggregate: true
      force: false
    aggregation:
      enabled: true
      ipv4_max_prefix: 28
"#;

    #[test]
    fn parses_sample_config() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.provider, "genericrest");
        assert_eq!(config.domains.len(), 1);
        let domain = &config.domains[0];
        assert_eq!(domain.name, "example.com");
        assert_eq!(domain.ttl, 300);
        assert!(domain.options.aggregate);
        assert_eq!(domain.aggregation.ipv4_max_prefix, 28);
    }

    #[test]
    fn defaults_ttl_and_aggregation() {
        let yaml = r#"
provider: p
domains:
  - name: example.com
    api_key: a
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.domains[0].ttl, 600);
        assert_eq!(config.domains[0].aggregation.ipv4_max_prefix, 24);
        assert_eq!(config.domains[0].aggregation.ipv6_max_prefix, 64);
    }

    #[test]
    fn rejects_empty_provider() {
        let yaml = "provider: \"\"\ndomains:\n  - name: example.com\n    api_key: a\n";
        assert!(Config::parse(yaml).is_err());
    }

    #[test]
    fn rejects_invalid_domain_name() {
        let yaml = "provider: p\ndomains:\n  - name: \"not a domain\"\n    api_key: a\n";
        assert!(Config::parse(yaml).is_err());
    }

    #[test]
    fn credentials_fall_back_to_env() {
        let domain = DomainConfig {
            name: "example.com".into(),
            provider: None,
            api_key: String::new(),
            secret_key: String::new(),
            ttl: 600,
            options: DomainOptions::default(),
            aggregation: AggregationConfig::default(),
        };
        std::env::set_var("SPF_FLATTENER_API_KEY", "env-key");
        let creds = domain.resolved_credentials().unwrap();
        assert_eq!(creds.api_key, "env-key");
        std::env::remove_var("SPF_FLATTENER_API_KEY");
    }
}
