//! CSV tables on disk.
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::model::GroupRecord;
use crate::report::{candidates, GroupRow, Table, TableWriter};

/// Writes each table to its own CSV file.
#[derive(Debug, Clone)]
pub struct CsvTables {
    dir: PathBuf,
    stamp: String,
}

impl CsvTables {
    /// `<dir>/<table>_groups_<stamp>.csv` for ready/pending and
    /// `<dir>/telegram_<table>_<stamp>.csv` for search output.
    pub fn in_dir(dir: &Path, stamp: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            stamp: stamp.to_string(),
        }
    }

    pub fn path(&self, table: Table) -> PathBuf {
        let file = match table {
            Table::Ready | Table::Pending => format!("{}_groups_{}.csv", table.as_str(), self.stamp),
            Table::Groups | Table::Channels => {
                format!("telegram_{}_{}.csv", table.as_str(), self.stamp)
            }
        };
        self.dir.join(file)
    }
}

#[async_trait]
impl TableWriter for CsvTables {
    async fn write_table(&self, table: Table, rows: &[GroupRow]) -> Result<()> {
        let path = self.path(table);
        let rows = rows.to_vec();
        let count = rows.len();
        let written = path.clone();
        tokio::task::spawn_blocking(move || write_rows(&path, &rows))
            .await
            .context("CSV writer task failed")??;
        info!(table = table.as_str(), rows = count, path = %written.display(), "table written");
        Ok(())
    }
}

pub fn write_rows(path: &Path, rows: &[GroupRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir: {}", parent.display()))?;
        }
    }
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("open CSV for writing: {}", path.display()))?;
    if rows.is_empty() {
        wtr.write_record(HEADER)?;
    }
    for row in rows {
        wtr.serialize(row)
            .with_context(|| format!("write CSV row: {}", path.display()))?;
    }
    wtr.flush()?;
    Ok(())
}

const HEADER: [&str; 9] = [
    "id",
    "title",
    "handle",
    "member_count",
    "status",
    "message",
    "action",
    "origin_keyword",
    "parent_group",
];

pub fn read_rows(path: &Path) -> Result<Vec<GroupRow>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("open CSV: {}", path.display()))?;
    let mut rows = Vec::new();
    for row in rdr.deserialize() {
        let row: GroupRow = row.with_context(|| format!("parse CSV row: {}", path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Reads candidate records from any table with the group row header.
/// Forum topic rows are skipped; their parent row stands for them.
pub fn read_records(path: &Path) -> Result<Vec<GroupRecord>> {
    Ok(candidates(&read_rows(path)?))
}

/// A CSV table in the results directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultFile {
    pub name: String,
    pub size: u64,
    pub modified: chrono::DateTime<chrono::Local>,
}

/// CSV files in `dir`, newest first. A missing directory has no files.
pub fn list_result_files(dir: &Path) -> Result<Vec<ResultFile>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("list dir: {}", dir.display())),
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        files.push(ResultFile {
            name: entry.file_name().to_string_lossy().into_owned(),
            size: meta.len(),
            modified: meta.modified()?.into(),
        });
    }
    files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
    Ok(files)
}

/// Path of the result file called `name`, if it is a plain CSV file name
/// that exists in `dir`.
pub fn result_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let name = name.trim();
    let plain = Path::new(name)
        .file_name()
        .map(|f| f == std::ffi::OsStr::new(name))
        .unwrap_or(false);
    if !plain || !name.ends_with(".csv") {
        return None;
    }
    let path = dir.join(name);
    path.is_file().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_table_keeps_header() {
        let td = tempdir().unwrap();
        let p = td.path().join("empty.csv");
        write_rows(&p, &[]).unwrap();
        let text = std::fs::read_to_string(&p).unwrap();
        assert!(text.starts_with("id,title,handle,member_count,status"));
        assert!(read_rows(&p).unwrap().is_empty());
    }

    #[test]
    fn result_files_are_listed_and_looked_up() {
        let td = tempdir().unwrap();
        assert!(list_result_files(&td.path().join("missing")).unwrap().is_empty());

        write_rows(&td.path().join("ready_groups_1.csv"), &[]).unwrap();
        write_rows(&td.path().join("pending_groups_1.csv"), &[]).unwrap();
        std::fs::write(td.path().join("notes.txt"), "x").unwrap();

        let names: Vec<String> = list_result_files(td.path())
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"ready_groups_1.csv".to_string()));

        assert!(result_file(td.path(), "ready_groups_1.csv").is_some());
        assert!(result_file(td.path(), "notes.txt").is_none());
        assert!(result_file(td.path(), "../ready_groups_1.csv").is_none());
        assert!(result_file(td.path(), "nope.csv").is_none());
    }

    #[test]
    fn file_names_follow_table() {
        let tables = CsvTables::in_dir(Path::new("/tmp/out"), "20260101_000000");
        assert_eq!(
            tables.path(Table::Ready),
            Path::new("/tmp/out/ready_groups_20260101_000000.csv")
        );
        assert_eq!(
            tables.path(Table::Channels),
            Path::new("/tmp/out/telegram_channels_20260101_000000.csv")
        );
    }
}
