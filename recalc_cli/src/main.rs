use clap::Parser;
use recalc_cli::cli::{Cli, Commands};
use recalc_cli::progress::TerminalProgress;
use recalc_cli::runner::{HttpRemoteFactory, RunSummary, RunTotals, Runner};
use recalc_core::o11y::redaction::{mask_secret, redact_json};
use recalc_core::{RecalcConfig, RecomputeClassifier, ReportClassifier, TracingLog, ValidateClassifier};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    recalc_core::o11y::init_global_from_env()?;
    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or(Commands::Run);
    let cfg = RecalcConfig::load(&cli.config)?;
    let show_progress = !cli.no_progress;

    let summary = match cmd {
        Commands::Config => {
            print_config(&cfg)?;
            return Ok(());
        }
        Commands::Run if cfg.validate_only => {
            execute(ValidateClassifier, &cfg, show_progress).await?
        }
        Commands::Run | Commands::Recalculate => {
            execute(RecomputeClassifier, &cfg, show_progress).await?
        }
        Commands::Validate => execute(ValidateClassifier, &cfg, show_progress).await?,
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    if let Some(message) = summary.failure_message() {
        anyhow::bail!(message);
    }
    Ok(())
}

async fn execute<C>(classifier: C, cfg: &RecalcConfig, show_progress: bool) -> anyhow::Result<RunSummary>
where
    C: ReportClassifier + Clone,
    C::Aggregate: RunTotals,
{
    let targets = cfg.resolve_targets()?;
    let runner = Runner::new(
        classifier,
        Arc::new(HttpRemoteFactory),
        Arc::new(TracingLog),
        cfg.on_error,
    )
    .with_progress(Arc::new(TerminalProgress::new(show_progress)));
    Ok(runner.run(&targets).await)
}

fn print_config(cfg: &RecalcConfig) -> anyhow::Result<()> {
    let mut raw = serde_json::to_value(cfg)?;
    redact_json(&mut raw);

    let resolved: Vec<serde_json::Value> = cfg
        .resolve_targets()?
        .iter()
        .map(|t| {
            serde_json::json!({
                "base_url": t.base_url(),
                "token": mask_secret(&t.token),
                "page_size": t.page_size,
                "request_timeout_secs": t.request_timeout.map(|d| d.as_secs()),
                "entity_types": t.entity_types,
            })
        })
        .collect();

    let out = serde_json::json!({ "config": raw, "resolved_targets": resolved });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
