//! Entry point for `spf-flattener`: parses the CLI, loads
//! config, and dispatches to the subcommand handlers.

mod cli;
mod commands;
mod logging;
mod runner;

use clap::Parser;
use cli::{Cli, Command};
use commands::TaskReport;
use flattener_common::config::Config;
use flattener_common::error::ExitFamily;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {e}");
            return exit_code_for_family(ExitFamily::Config);
        }
    };

    let cancel = CancellationToken::new();
    runner::install_ctrl_c_handler(cancel.clone());

    let reports = match cli.command {
        Command::Flatten(args) => {
            let dns_resolver = runner::build_dns_resolver(&config);
            let reports = commands::flatten::run(&config, dns_resolver, &args, cancel).await;
            if let Some(output) = &args.output {
                if let Err(e) = write_report_file(output, &reports) {
                    error!("failed to write --output report: {e}");
                }
            }
            reports
        }
        Command::Ping => commands::ping::run(&config, cancel).await,
        Command::Export(args) => {
            commands::export::run(&config, &args, cancel, chrono::Utc::now()).await
        }
        Command::Import(args) => commands::import::run(&config, &args, cancel).await,
    };

    report_and_exit(&reports)
}

fn write_report_file(path: &std::path::Path, reports: &[TaskReport]) -> std::io::Result<()> {
    let mut content = String::new();
    for report in reports {
        match &report.outcome {
            Ok(summary) => content.push_str(&format!("{summary}\n")),
            Err(e) => content.push_str(&format!("{}: ERROR: {e}\n", report.domain)),
        }
    }
    std::fs::write(path, content)
}

fn report_and_exit(reports: &[TaskReport]) -> ExitCode {
    let mut worst: Option<ExitFamily> = None;
    for report in reports {
        match &report.outcome {
            Ok(summary) => info!("{summary}"),
            Err(e) => {
                error!(domain = %report.domain, "{e}");
                let family = e.exit_family();
                worst = Some(match worst {
                    Some(current) if (current as u8) >= (family as u8) => current,
                    _ => family,
                });
            }
        }
    }
    exit_code_for_family(worst.unwrap_or(ExitFamily::Success))
}

fn exit_code_for_family(family: ExitFamily) -> ExitCode {
    ExitCode::from(family as u8)
}
