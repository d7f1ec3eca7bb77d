//! Control-panel commands for the Telegram bot.
use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use tracing::{error, info, instrument, warn};

use crate::jobs::{self, JobContext};
use crate::query;
use crate::registry::{JobKind, JobOutput, JobRegistry, JobSnapshot, RegistryError};
use crate::settings::{self, TermList};
use crate::tables;

const HELP: &str = "Commands:\n\
/search [keyword, keyword | city, city] - search groups and channels\n\
/reconcile - re-check pending groups and new search results\n\
/stop - stop the running job\n\
/status - show progress\n\
/keywords [add|remove a, b] - show or edit search keywords\n\
/cities [add|remove a, b] - show or edit search cities\n\
/delay [seconds] - show or set the pause between search queries\n\
/files [name] - list result files or download one";

const FILES_SHOWN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermEdit {
    Show,
    Add(Vec<String>),
    Remove(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search {
        keywords: Vec<String>,
        cities: Vec<String>,
    },
    Reconcile,
    Stop,
    Status,
    Terms {
        list: TermList,
        edit: TermEdit,
    },
    /// `None` shows the current delay.
    Delay {
        millis: Option<u64>,
    },
    Files {
        name: Option<String>,
    },
    Help,
    /// A known command with arguments that make no sense; carries the reason.
    Invalid(&'static str),
    Unknown,
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_terms(list: TermList, rest: &str) -> Command {
    let rest = rest.trim();
    if rest.is_empty() {
        return Command::Terms {
            list,
            edit: TermEdit::Show,
        };
    }
    let (verb, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let terms = split_list(args);
    let edit = match verb.to_ascii_lowercase().as_str() {
        _ if terms.is_empty() => return Command::Invalid("give at least one term, e.g. add кафе, bar"),
        "add" => TermEdit::Add(terms),
        "remove" | "rm" | "del" => TermEdit::Remove(terms),
        _ => return Command::Invalid("use add or remove"),
    };
    Command::Terms { list, edit }
}

fn parse_delay(rest: &str) -> Command {
    let rest = rest.trim();
    if rest.is_empty() {
        return Command::Delay { millis: None };
    }
    match rest.replace(',', ".").parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Command::Delay {
            millis: Some((secs * 1000.0).round() as u64),
        },
        Ok(_) => Command::Invalid("delay cannot be negative"),
        Err(_) => Command::Invalid("delay must be a number of seconds"),
    }
}

/// Parses a command message. Returns `None` for plain text.
pub fn parse_command(text: &str) -> Option<Command> {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return None;
    }
    let (head, rest) = trimmed.split_once(char::is_whitespace).unwrap_or((trimmed, ""));
    // "/search@my_bot" addresses the bot explicitly in groups
    let name = head.split('@').next().unwrap_or(head);
    let cmd = match name {
        "/search" => {
            let (kw, cities) = rest.split_once('|').unwrap_or((rest, ""));
            Command::Search {
                keywords: split_list(kw),
                cities: split_list(cities),
            }
        }
        "/reconcile" => Command::Reconcile,
        "/stop" => Command::Stop,
        "/status" => Command::Status,
        "/keywords" => parse_terms(TermList::Keywords, rest),
        "/cities" => parse_terms(TermList::Cities, rest),
        "/delay" => parse_delay(rest),
        "/files" => Command::Files {
            name: Some(rest.trim().to_string()).filter(|n| !n.is_empty()),
        },
        "/start" | "/help" => Command::Help,
        _ => Command::Unknown,
    };
    Some(cmd)
}

/// Whether a message from `sender` may drive the bot. An empty allow-list
/// admits everyone; otherwise messages without a sender are refused.
pub fn is_allowed(allowed: &[i64], sender: Option<i64>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    sender.map(|id| allowed.contains(&id)).unwrap_or(false)
}

fn describe(snapshot: &JobSnapshot) -> String {
    format!(
        "{} job {}: {}",
        snapshot.kind.as_str(),
        snapshot.status.as_str(),
        snapshot.message
    )
}

fn format_terms(list: TermList, terms: &[String]) -> String {
    if terms.is_empty() {
        format!("No {} set.", list.as_str())
    } else {
        format!("{} ({}): {}", list.as_str(), terms.len(), terms.join(", "))
    }
}

#[instrument(skip_all)]
pub async fn handle_update(
    bot: &Bot,
    registry: &Arc<JobRegistry>,
    ctx: &JobContext,
    msg: &Message,
) -> Result<()> {
    let Some(cmd) = msg.text().and_then(parse_command) else {
        return Ok(());
    };
    let chat_id = msg.chat.id;
    let key = chat_id.0;

    match cmd {
        Command::Help => {
            bot.send_message(chat_id, HELP).await?;
        }
        Command::Unknown => {
            bot.send_message(chat_id, "Unknown command.").await?;
        }
        Command::Invalid(reason) => {
            bot.send_message(chat_id, format!("Error: {}.", reason)).await?;
        }
        Command::Status => {
            let text = registry
                .snapshot(key)
                .map(|s| describe(&s))
                .unwrap_or_else(|| "No job has run yet.".to_string());
            bot.send_message(chat_id, text).await?;
        }
        Command::Stop => {
            let text = if registry.stop(key) {
                "Stopping… results found so far will be saved."
            } else {
                "Nothing is running."
            };
            bot.send_message(chat_id, text).await?;
        }
        Command::Terms { list, edit } => {
            let base = &ctx.cfg.search;
            let text = match edit {
                TermEdit::Show => format_terms(list, &settings::terms(&ctx.pool, base, list).await?),
                TermEdit::Add(terms) => {
                    let current = settings::add_terms(&ctx.pool, base, list, &terms).await?;
                    format_terms(list, &current)
                }
                TermEdit::Remove(terms) => {
                    let (current, missing) =
                        settings::remove_terms(&ctx.pool, base, list, &terms).await?;
                    let mut text = format_terms(list, &current);
                    if !missing.is_empty() {
                        text.push_str(&format!("\nNot found: {}", missing.join(", ")));
                    }
                    text
                }
            };
            bot.send_message(chat_id, text).await?;
        }
        Command::Delay { millis } => {
            let millis = match millis {
                Some(ms) => {
                    settings::set_delay_ms(&ctx.pool, ms).await?;
                    ms
                }
                None => settings::delay_ms(&ctx.pool, &ctx.cfg.search).await?,
            };
            let text = format!("Delay between queries: {:.1}s", millis as f64 / 1000.0);
            bot.send_message(chat_id, text).await?;
        }
        Command::Files { name: None } => {
            let files = tables::list_result_files(&ctx.cfg.app.results_dir())?;
            let text = if files.is_empty() {
                "No result files yet.".to_string()
            } else {
                let mut lines = vec!["Result files (newest first):".to_string()];
                lines.extend(files.iter().take(FILES_SHOWN).map(|f| {
                    format!(
                        "{}  {} KB  {}",
                        f.name,
                        (f.size + 1023) / 1024,
                        f.modified.format("%Y-%m-%d %H:%M:%S")
                    )
                }));
                lines.push("Send /files <name> to download.".to_string());
                lines.join("\n")
            };
            bot.send_message(chat_id, text).await?;
        }
        Command::Files { name: Some(name) } => {
            match tables::result_file(&ctx.cfg.app.results_dir(), &name) {
                Some(path) => {
                    bot.send_document(chat_id, InputFile::file(path)).await?;
                }
                None => {
                    bot.send_message(chat_id, format!("File not found: {}", name))
                        .await?;
                }
            }
        }
        Command::Search { keywords, cities } => {
            let mut search_cfg = settings::search_config(&ctx.pool, &ctx.cfg.search).await?;
            if !keywords.is_empty() {
                search_cfg.keywords = keywords;
                search_cfg.cities = cities;
            }
            let queries = query::plan_queries(&search_cfg);
            if queries.is_empty() {
                bot.send_message(chat_id, "Error: no keywords given. Add some with /keywords add.")
                    .await?;
                return Ok(());
            }
            let mut job_ctx = ctx.clone();
            job_ctx.cfg = Arc::new(crate::config::Config {
                search: search_cfg,
                ..(*ctx.cfg).clone()
            });
            let count = queries.len();
            let started = registry.spawn(key, JobKind::Search, move |cancel, sink| async move {
                let report = jobs::run_search(&job_ctx, &queries, &cancel, Some(sink)).await?;
                Ok(JobOutput::new(report.summary()).with_files(report.files()))
            });
            announce(bot, chat_id, started, format!("Searching {} queries…", count)).await?;
        }
        Command::Reconcile => {
            let records = jobs::pending_candidates(&ctx.pool).await?;
            if records.is_empty() {
                bot.send_message(chat_id, "No pending groups to check. Run /search first.")
                    .await?;
                return Ok(());
            }
            let job_ctx = ctx.clone();
            let count = records.len();
            let started = registry.spawn(key, JobKind::Reconcile, move |cancel, sink| async move {
                let report = jobs::run_reconcile(&job_ctx, records, &cancel, Some(sink)).await?;
                Ok(JobOutput::new(report.summary()).with_files(report.files()))
            });
            announce(bot, chat_id, started, format!("Checking {} groups…", count)).await?;
        }
    }
    Ok(())
}

/// Confirms the start, then reports the final status and sends the result
/// files back to the chat.
async fn announce(
    bot: &Bot,
    chat_id: ChatId,
    started: Result<tokio::task::JoinHandle<JobSnapshot>, RegistryError>,
    text: String,
) -> Result<()> {
    match started {
        Ok(handle) => {
            info!(chat_id = chat_id.0, "{}", text);
            bot.send_message(chat_id, text).await?;
            let bot = bot.clone();
            tokio::spawn(async move {
                let snapshot = match handle.await {
                    Ok(snapshot) => snapshot,
                    Err(err) => {
                        error!(?err, "job supervisor failed");
                        return;
                    }
                };
                if let Err(err) = bot.send_message(chat_id, describe(&snapshot)).await {
                    warn!(?err, "failed to report job result");
                }
                for path in snapshot.files.into_iter().filter(|p| p.is_file()) {
                    if let Err(err) = bot.send_document(chat_id, InputFile::file(path)).await {
                        warn!(?err, "failed to send result file");
                    }
                }
            });
        }
        Err(err) => {
            bot.send_message(chat_id, format!("Error: {}", err)).await?;
        }
    }
    Ok(())
}
