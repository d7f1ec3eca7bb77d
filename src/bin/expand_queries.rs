use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tg_groupsync::config;
use tg_groupsync::query;

#[derive(Parser, Debug)]
#[command(author, version, about = "Print the search queries a search run would use")]
struct Args {
    /// Path to YAML config; keywords and cities come from its search section
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Keywords to use instead of the configured ones
    #[arg(long = "keyword", short = 'k')]
    keywords: Vec<String>,

    /// Cities to combine with the keywords
    #[arg(long = "city", short = 'c')]
    cities: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let queries = if args.keywords.is_empty() {
        let cfg = config::load(Some(&args.config))?;
        query::plan_queries(&cfg.search)
    } else {
        query::expand(&args.keywords, &args.cities)
    };

    for q in &queries {
        println!("{}", q);
    }
    eprintln!("{} queries", queries.len());
    Ok(())
}
