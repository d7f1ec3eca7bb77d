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
use tg_groupsync::query;
use tg_groupsync::settings;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Search Telegram groups and channels by keyword and save them as tables"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Keywords to use instead of the configured ones
    #[arg(long = "keyword", short = 'k')]
    keywords: Vec<String>,

    /// Cities to use instead of the configured ones
    #[arg(long = "city", short = 'c')]
    cities: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let mut cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.app.database_url()).await?;
    db::run_migrations(&pool).await?;

    // keywords, cities and delay edited from the bot apply here too
    cfg.search = settings::search_config(&pool, &cfg.search).await?;
    if !args.keywords.is_empty() {
        cfg.search.keywords = args.keywords;
        cfg.search.cities = args.cities;
    }

    let queries = query::plan_queries(&cfg.search);
    if queries.is_empty() {
        anyhow::bail!("no keywords configured");
    }
    info!(queries = queries.len(), "search queries planned");

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
            warn!("interrupted; saving results found so far");
            on_ctrl_c.cancel();
        }
    });

    let report = jobs::run_search(&ctx, &queries, &cancel, Some(Arc::new(LogProgress))).await?;
    println!("{}", report.summary());
    for path in report.files() {
        println!("  {}", path.display());
    }
    Ok(())
}
