//! Structured logging setup: an `EnvFilter` seeded with a crate-scoped
//! default, `--verbose` raising it to debug.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init_logging(verbose: bool) {
    let default_directive = if verbose {
        "debug,spf_flattener=trace"
    } else {
        "info,spf_flattener=debug"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}
