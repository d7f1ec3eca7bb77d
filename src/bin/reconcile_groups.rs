use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tg_groupsync::config;
use tg_groupsync::db;
use tg_groupsync::jobs::{self, JobContext};
use tg_groupsync::progress::LogProgress;
use tg_groupsync::provider::GatewayClient;
use tg_groupsync::tables;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Verify membership of candidate groups, join where needed and split them into ready and pending tables"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// CSV tables to read candidates from. Defaults to the pending groups of
    /// the last reconciliation, or the groups of the last search.
    #[arg(long = "input", short = 'i')]
    inputs: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.app.database_url()).await?;
    db::run_migrations(&pool).await?;

    let records = if args.inputs.is_empty() {
        jobs::pending_candidates(&pool).await?
    } else {
        let mut all = Vec::new();
        for path in &args.inputs {
            let records = tables::read_records(path)?;
            info!(path = %path.display(), records = records.len(), "candidates loaded");
            all.extend(records);
        }
        all
    };
    if records.is_empty() {
        info!("no candidates to reconcile, exiting");
        return Ok(());
    }

    let account = GatewayClient::from_config(&cfg)?;
    let ctx = JobContext {
        cfg: Arc::new(cfg),
        pool,
        account: Arc::new(account),
    };

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; finishing current group and saving results");
            on_ctrl_c.cancel();
        }
    });

    let report = jobs::run_reconcile(&ctx, records, &cancel, Some(Arc::new(LogProgress))).await?;
    println!("{}", report.summary());
    for path in report.files() {
        println!("  {}", path.display());
    }
    Ok(())
}
