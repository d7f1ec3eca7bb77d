//! Search keywords, cities and delay edited from the bot.
//!
//! Edits are stored in the `settings` table and laid over the YAML
//! `search` section; a list that was never edited falls back to the file.
use anyhow::{Context, Result};
use tracing::info;

use crate::config::SearchConfig;
use crate::db::{self, Pool};

const DELAY_KEY: &str = "search.delay_ms";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermList {
    Keywords,
    Cities,
}

impl TermList {
    pub fn as_str(&self) -> &'static str {
        match self {
            TermList::Keywords => "keywords",
            TermList::Cities => "cities",
        }
    }

    fn key(&self) -> &'static str {
        match self {
            TermList::Keywords => "search.keywords",
            TermList::Cities => "search.cities",
        }
    }

    fn from_config<'a>(&self, cfg: &'a SearchConfig) -> &'a [String] {
        match self {
            TermList::Keywords => &cfg.keywords,
            TermList::Cities => &cfg.cities,
        }
    }
}

async fn stored_terms(pool: &Pool, list: TermList) -> Result<Option<Vec<String>>> {
    match db::get_setting(pool, list.key()).await? {
        Some(raw) => {
            let terms = serde_json::from_str(&raw)
                .with_context(|| format!("invalid stored {}", list.as_str()))?;
            Ok(Some(terms))
        }
        None => Ok(None),
    }
}

async fn store_terms(pool: &Pool, list: TermList, terms: &[String]) -> Result<()> {
    let raw = serde_json::to_string(terms)?;
    db::put_setting(pool, list.key(), &raw).await
}

/// Current terms of `list`: the stored edit, else the configured list.
pub async fn terms(pool: &Pool, base: &SearchConfig, list: TermList) -> Result<Vec<String>> {
    Ok(stored_terms(pool, list)
        .await?
        .unwrap_or_else(|| list.from_config(base).to_vec()))
}

/// Appends the terms not yet present (exact match after trimming).
pub async fn add_terms(
    pool: &Pool,
    base: &SearchConfig,
    list: TermList,
    new_terms: &[String],
) -> Result<Vec<String>> {
    let mut current = terms(pool, base, list).await?;
    for term in new_terms.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !current.iter().any(|c| c == term) {
            current.push(term.to_string());
        }
    }
    store_terms(pool, list, &current).await?;
    info!(list = list.as_str(), count = current.len(), "search terms added");
    Ok(current)
}

/// Removes the given terms. Returns the remaining list and the terms that
/// were not in it.
pub async fn remove_terms(
    pool: &Pool,
    base: &SearchConfig,
    list: TermList,
    gone: &[String],
) -> Result<(Vec<String>, Vec<String>)> {
    let mut current = terms(pool, base, list).await?;
    let mut missing = Vec::new();
    for term in gone.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        match current.iter().position(|c| c == term) {
            Some(idx) => {
                current.remove(idx);
            }
            None => missing.push(term.to_string()),
        }
    }
    store_terms(pool, list, &current).await?;
    info!(list = list.as_str(), count = current.len(), "search terms removed");
    Ok((current, missing))
}

pub async fn delay_ms(pool: &Pool, base: &SearchConfig) -> Result<u64> {
    match db::get_setting(pool, DELAY_KEY).await? {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid stored delay: {}", raw)),
        None => Ok(base.delay_ms),
    }
}

pub async fn set_delay_ms(pool: &Pool, delay_ms: u64) -> Result<()> {
    db::put_setting(pool, DELAY_KEY, &delay_ms.to_string()).await
}

/// The configured search section with the stored edits applied.
pub async fn search_config(pool: &Pool, base: &SearchConfig) -> Result<SearchConfig> {
    Ok(SearchConfig {
        keywords: terms(pool, base, TermList::Keywords).await?,
        cities: terms(pool, base, TermList::Cities).await?,
        delay_ms: delay_ms(pool, base).await?,
        ..base.clone()
    })
}
