use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tg_groupsync::config;
use tg_groupsync::membership::MembershipVerifier;
use tg_groupsync::model::EntityRef;
use tg_groupsync::provider::{AccountContext, GatewayClient};

#[derive(Parser, Debug)]
#[command(author, version, about = "Resolve one group or channel and show its membership state")]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// @username or numeric id
    target: String,
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
    let client = GatewayClient::from_config(&cfg)?;

    let target = match args.target.trim().parse::<i64>() {
        Ok(id) => EntityRef::Id(id),
        Err(_) => EntityRef::Handle(args.target.trim().trim_start_matches('@').to_string()),
    };

    let me = client.me().await.context("failed to identify the active account")?;
    let entity = client
        .resolve(&target)
        .await
        .with_context(|| format!("failed to resolve {}", target))?;

    println!("Entity: {} ({})", entity.title, entity.id);
    println!("  kind: {:?}", entity.kind);
    println!("  username: {}", entity.username.as_deref().unwrap_or("N/A"));
    println!("  forum: {}", entity.is_forum);
    match client.member_count(&entity).await {
        Ok(Some(count)) => println!("  members: {}", count),
        Ok(None) => println!("  members: N/A"),
        Err(err) => println!("  members: error: {}", err),
    }

    let verifier = MembershipVerifier::new(
        &client,
        me,
        cfg.reconcile.member_scan_limit,
        cfg.reconcile.dialog_scan_limit,
    );
    println!("  member: {}", verifier.verify(&entity).await);

    if entity.is_forum {
        match client.forum_topics(&entity).await {
            Ok(topics) => {
                println!("Topics:");
                for t in topics {
                    println!("  {} -> {}", t.id, t.title);
                }
            }
            Err(err) => println!("Topics: error: {}", err),
        }
    }
    Ok(())
}
