//! `mgmt-chain` runs a deployment file against a management endpoint.
//!
//! Exit status: 0 when the chain completed, 2 when it failed and was rolled
//! back to its checkpoint, 1 for every other failure.

use anyhow::Context;
use clap::Parser;
use mgmt_chain::deployment::Deployment;
use mgmt_chain::report::RunReport;
use mgmt_chain::{ChainError, ChainExecutor};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "mgmt-chain")]
#[command(about = "Execute a chain of XML management operations", long_about = None)]
struct Cli {
    /// Deployment file (YAML)
    deployment: PathBuf,

    /// Log operation progress and response excerpts
    #[arg(short, long)]
    verbose: bool,

    /// Log generated requests and full responses
    #[arg(short, long)]
    debug: bool,

    /// Override a session option, e.g. --set hostName=dp2
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_key_val)]
    overrides: Vec<(String, String)>,

    /// Write a JSON run report to this path
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    Ok((name.trim().to_string(), value.to_string()))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!("{:#}", err);
            err.downcast_ref::<ChainError>().map_or(1, ChainError::exit_code)
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut deployment = Deployment::load(&cli.deployment)
        .with_context(|| format!("loading {}", cli.deployment.display()))?;
    deployment.apply_overrides(&cli.overrides)?;
    if cli.verbose {
        deployment.session.verbose = true;
    }
    if cli.debug {
        deployment.session.debug = true;
    }

    let cancel = CancellationToken::new();
    let session = deployment
        .session_builder()?
        .cancellation(cancel.clone())
        .build()?;
    let mut chain = deployment.build_chain(&session)?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, stopping after the current request");
            cancel.cancel();
        }
    });

    tracing::info!(
        host = session.host(),
        port = session.port(),
        operations = chain.len(),
        "executing chain"
    );

    let mut report = RunReport::default();
    let result = ChainExecutor::new(&session)
        .execute_into(&mut chain, &mut report)
        .await;

    if let Some(path) = &cli.report {
        if let Err(err) = write_report(&report, path) {
            tracing::warn!("{:#}", err);
        }
    }

    result?;
    tracing::info!(
        operations = report.operations.len(),
        checkpoint_removed = report.checkpoint_removed,
        "chain completed"
    );
    Ok(())
}

fn write_report(report: &RunReport, path: &Path) -> anyhow::Result<()> {
    std::fs::write(path, report.to_json()?)
        .with_context(|| format!("writing report to {}", path.display()))
}
