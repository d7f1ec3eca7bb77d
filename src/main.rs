use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{error, info, warn};

use tg_groupsync::config;
use tg_groupsync::db;
use tg_groupsync::handlers;
use tg_groupsync::jobs::JobContext;
use tg_groupsync::provider::GatewayClient;
use tg_groupsync::registry::JobRegistry;

#[derive(Debug, Parser)]
#[command(author, version, about = "Telegram control panel for group search and reconciliation")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
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
    cfg.require_bot()?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.app.database_url()).await?;
    db::run_migrations(&pool).await?;

    let account = GatewayClient::from_config(&cfg)?;
    let bot = Bot::new(cfg.telegram.bot_token.clone());
    let allowed = cfg.telegram.allowed_users.clone();
    let ctx = JobContext {
        cfg: Arc::new(cfg),
        pool,
        account: Arc::new(account),
    };
    let registry = JobRegistry::new();

    info!("starting control panel bot");
    teloxide::repl(bot, move |bot: Bot, msg: Message| {
        let ctx = ctx.clone();
        let registry = registry.clone();
        let allowed = allowed.clone();
        async move {
            let sender = msg.from().map(|from| from.id.0 as i64);
            if !handlers::is_allowed(&allowed, sender) {
                warn!(chat_id = msg.chat.id.0, ?sender, "ignoring message from unlisted sender");
                return respond(());
            }
            if let Err(err) = handlers::handle_update(&bot, &registry, &ctx, &msg).await {
                error!(?err, "failed to handle update");
            }
            respond(())
        }
    })
    .await;

    Ok(())
}
