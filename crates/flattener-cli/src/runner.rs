//! Shared wiring for every subcommand: building the DNS resolver and
//! provider clients from config, and the cancellation token installed on
//! Ctrl-C.

use flattener_common::config::{Config, DnsServer, DomainConfig};
use flattener_common::error::{Error, Result};
use flattener_provider::{ProviderClient, ProviderRegistry};
use flattener_resolver::{DnsResolver, ExplicitServersResolver, ServerSpec, SystemResolver};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Build the DNS resolver for SPF expansion: the explicit-servers
/// resolver when `dns:` entries are configured, the system resolver
/// otherwise.
pub fn build_dns_resolver(config: &Config) -> Arc<dyn DnsResolver> {
    if config.dns.is_empty() {
        return Arc::new(SystemResolver::new());
    }
    let specs: Result<Vec<ServerSpec>> = config
        .dns
        .iter()
        .map(|entry: &DnsServer| -> Result<ServerSpec> {
            let ip = entry
                .ip
                .parse()
                .map_err(|_| Error::Config(format!("invalid DNS server IP: {}", entry.ip)))?;
            Ok(ServerSpec {
                name: entry.name.clone(),
                ip,
                port: entry.port,
            })
        })
        .collect();
    match specs {
        Ok(specs) => Arc::new(ExplicitServersResolver::new(&specs)),
        Err(_) => Arc::new(SystemResolver::new()),
    }
}

/// Build a provider client for one domain, resolving its credentials and
/// provider tag.
pub fn build_provider(
    domain: &DomainConfig,
    default_provider: &str,
) -> Result<Arc<dyn ProviderClient>> {
    let creds = domain.resolved_credentials()?;
    let tag = domain.resolved_provider(default_provider);
    ProviderRegistry::build(&tag, &creds.api_key, &creds.secret_key)
}

/// Install a Ctrl-C handler that cancels `token` once, so every in-flight
/// task can wind down cooperatively instead of being killed mid-request.
pub fn install_ctrl_c_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received, cancelling in-flight tasks");
            token.cancel();
        }
    });
}
