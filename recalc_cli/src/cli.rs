use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "recalc",
    version,
    about = "Bulk metric recalculation and validation for Targetprocess accounts"
)]
pub struct Cli {
    /// YAML (.yaml/.yml) or JSON configuration file.
    #[arg(long, global = true, env = "RECALC_CONFIG", default_value = "recalc.yaml")]
    pub config: PathBuf,

    /// Do not draw progress bars.
    #[arg(long, global = true)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Validate or recalculate, as chosen by `validate_only` (default if no subcommand given).
    Run,

    /// Recalculate all metrics. Mutates the remote accounts.
    Recalculate,

    /// Check metric consistency without changing anything.
    Validate,

    /// Print the resolved configuration (redacted secrets).
    Config,
}
