//! CLI surface: `flatten`, `ping`, `export`, `import`, each
//! a subcommand of the `spf-flattener` binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "spf-flattener", version, about = "Flatten and reconcile SPF TXT records across DNS providers")]
pub struct Cli {
    /// Path to the YAML configuration document.
    #[arg(long, global = true, default_value = "./spf-flattener.yaml")]
    pub config: PathBuf,

    /// Raise the default log filter to debug.
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve, optionally aggregate, pack, and reconcile each configured
    /// domain's SPF record.
    Flatten(FlattenArgs),
    /// Check provider credentials and reachability for each domain.
    Ping,
    /// Export a domain's DNS records to a backup file.
    Export(ExportArgs),
    /// Import DNS records from one or more backup files.
    Import(ImportArgs),
}

#[derive(Debug, Parser)]
pub struct FlattenArgs {
    /// Perform a dry run: compute and report the plan without mutating
    /// provider state. Overridden by `--production`.
    #[arg(long, default_value_t = true)]
    pub dry_run: bool,

    /// Apply the computed plan for real. Inverts `--dry-run`.
    #[arg(long)]
    pub production: bool,

    /// Rewrite the SPF record even when it is already within the RFC
    /// 7208 lookup budget and functionally unchanged.
    #[arg(long)]
    pub force: bool,

    /// Aggregate the flattened IP set into CIDR blocks before packing.
    #[arg(long)]
    pub aggregate: bool,

    /// Write the run report to this file in addition to stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Restrict the run to these domains (defaults to every configured
    /// domain).
    #[arg(long = "domain")]
    pub domains: Vec<String>,
}

impl FlattenArgs {
    pub fn is_dry_run(&self) -> bool {
        !self.production && self.dry_run
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum BackupFormat {
    Json,
    Txt,
}

#[derive(Debug, Parser)]
pub struct ExportArgs {
    #[arg(long, value_enum, default_value = "json")]
    pub format: BackupFormat,

    /// Directory to write backup files into.
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Restrict the export to these domains.
    #[arg(long = "domain")]
    pub domains: Vec<String>,

    /// Restrict the export to these record types.
    #[arg(long = "record-type")]
    pub record_types: Vec<String>,

    /// Reserved for symmetry with `flatten`/`import`; export never
    /// mutates provider state, so this has no effect beyond being
    /// echoed in the report.
    #[arg(long, default_value_t = true)]
    pub dry_run: bool,

    #[arg(long)]
    pub production: bool,
}

#[derive(Debug, Parser)]
pub struct ImportArgs {
    /// Backup files to import, in order.
    #[arg(long = "file", required = true)]
    pub files: Vec<PathBuf>,

    /// Conflict-resolution strategy.
    #[arg(long, default_value = "skip")]
    pub strategy: String,

    /// Restrict the import to these record types.
    #[arg(long = "record-type")]
    pub record_types: Vec<String>,

    /// Export a timestamped backup of current state before any mutation.
    #[arg(long)]
    pub backup_before: bool,

    #[arg(long, default_value_t = true)]
    pub dry_run: bool,

    #[arg(long)]
    pub production: bool,
}

impl ImportArgs {
    pub fn is_dry_run(&self) -> bool {
        !self.production && self.dry_run
    }
}

impl ExportArgs {
    pub fn is_dry_run(&self) -> bool {
        !self.production && self.dry_run
    }
}
