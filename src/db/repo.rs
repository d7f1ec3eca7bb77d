use super::model::{Run, RunKind, RunStatus};
use crate::report::{GroupRow, Table, TableWriter};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{info, instrument};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized)
        .await
        .with_context(|| format!("failed to open database {}", normalized))?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// For a file-backed SQLite URL, expand a leading `~/`, ensure the parent
/// directory exists and make sure the file gets created. In-memory URLs and
/// other schemes pass through.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let query = match query_part {
        Some(q) if q.contains("mode=") => q.to_string(),
        Some(q) => format!("{}&mode=rwc", q),
        None => "mode=rwc".to_string(),
    };
    format!("sqlite://{}?{}", expanded, query)
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn create_run(pool: &Pool, kind: RunKind, total: usize) -> Result<String> {
    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO runs (id, kind, status, total) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(kind.as_str())
        .bind(RunStatus::Running.as_str())
        .bind(total as i64)
        .execute(pool)
        .await?;
    info!(run_id = %id, kind = kind.as_str(), total, "run created");
    Ok(id)
}

#[instrument(skip_all)]
pub async fn finish_run(pool: &Pool, run_id: &str, status: RunStatus, message: &str) -> Result<()> {
    sqlx::query(
        "UPDATE runs SET status = ?, message = ?, finished_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(message)
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_run(pool: &Pool, run_id: &str) -> Result<Option<Run>> {
    let row = sqlx::query(
        "SELECT rowid AS seq, id, kind, status, message, total, started_at, finished_at FROM runs WHERE id = ?",
    )
    .bind(run_id)
    .fetch_optional(pool)
    .await?;
    row.map(|r| map_run(&r)).transpose()
}

/// Most recent run of `kind` that got far enough to write rows.
#[instrument(skip_all)]
pub async fn latest_run(pool: &Pool, kind: RunKind) -> Result<Option<Run>> {
    let row = sqlx::query(
        "SELECT rowid AS seq, id, kind, status, message, total, started_at, finished_at FROM runs \
         WHERE kind = ? AND status IN ('completed', 'stopped') \
         ORDER BY started_at DESC, rowid DESC LIMIT 1",
    )
    .bind(kind.as_str())
    .fetch_optional(pool)
    .await?;
    row.map(|r| map_run(&r)).transpose()
}

fn map_run(row: &sqlx::sqlite::SqliteRow) -> Result<Run> {
    let status: String = row.try_get("status")?;
    Ok(Run {
        seq: row.try_get("seq")?,
        id: row.try_get("id")?,
        kind: row.try_get("kind")?,
        status: RunStatus::parse_status(&status),
        message: row.try_get("message")?,
        total: row.try_get("total")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
    })
}

#[instrument(skip_all)]
pub async fn insert_rows(pool: &Pool, run_id: &str, table: Table, rows: &[GroupRow]) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM group_rows WHERE run_id = ? AND table_name = ?")
        .bind(run_id)
        .bind(table.as_str())
        .execute(&mut *tx)
        .await?;
    for (position, row) in rows.iter().enumerate() {
        sqlx::query(
            "INSERT INTO group_rows (run_id, table_name, position, entity_id, title, handle, member_count, status, message, action, origin_keyword, parent_group) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(run_id)
        .bind(table.as_str())
        .bind(position as i64)
        .bind(row.id)
        .bind(&row.title)
        .bind(&row.handle)
        .bind(row.member_count)
        .bind(&row.status)
        .bind(&row.message)
        .bind(&row.action)
        .bind(&row.origin_keyword)
        .bind(&row.parent_group)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn load_rows(pool: &Pool, run_id: &str, table: Table) -> Result<Vec<GroupRow>> {
    let rows = sqlx::query(
        "SELECT entity_id, title, handle, member_count, status, message, action, origin_keyword, parent_group \
         FROM group_rows WHERE run_id = ? AND table_name = ? ORDER BY position",
    )
    .bind(run_id)
    .bind(table.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|r| {
            Ok(GroupRow {
                id: r.try_get("entity_id")?,
                title: r.try_get("title")?,
                handle: r.try_get("handle")?,
                member_count: r.try_get("member_count")?,
                status: r.try_get("status")?,
                message: r.try_get("message")?,
                action: r.try_get("action")?,
                origin_keyword: r.try_get("origin_keyword")?,
                parent_group: r.try_get("parent_group")?,
            })
        })
        .collect()
}

/// Rows of `table` from the newest usable run of `kind`, if any.
pub async fn latest_rows(pool: &Pool, kind: RunKind, table: Table) -> Result<Option<Vec<GroupRow>>> {
    match latest_run(pool, kind).await? {
        Some(run) => Ok(Some(load_rows(pool, &run.id, table).await?)),
        None => Ok(None),
    }
}

#[instrument(skip_all)]
pub async fn get_setting(pool: &Pool, key: &str) -> Result<Option<String>> {
    let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

#[instrument(skip_all)]
pub async fn put_setting(pool: &Pool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    info!(key, "setting stored");
    Ok(())
}

/// Table writer storing the rows of one run.
#[derive(Debug, Clone)]
pub struct SqliteTables {
    pool: Pool,
    run_id: String,
}

impl SqliteTables {
    pub fn new(pool: Pool, run_id: impl Into<String>) -> Self {
        Self {
            pool,
            run_id: run_id.into(),
        }
    }
}

#[async_trait]
impl TableWriter for SqliteTables {
    async fn write_table(&self, table: Table, rows: &[GroupRow]) -> Result<()> {
        insert_rows(&self.pool, &self.run_id, table, rows)
            .await
            .with_context(|| format!("failed to store {} rows", table.as_str()))
    }
}
