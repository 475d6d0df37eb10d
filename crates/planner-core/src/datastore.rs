use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::history::{HistoryEntry, HistoryLog, latest, latest_undone};
use crate::scheduler::MutationSink;
use crate::task::Task;

/// File-backed stand-in for the hosted backend: one JSON line per task and
/// one per history entry.
#[derive(Debug, Clone)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub history_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.jsonl");
        let history_path = data_dir.join("history.jsonl");

        for path in [&tasks_path, &history_path] {
            if !path.exists() {
                fs::write(path, "").with_context(|| format!("failed to create {}", path.display()))?;
            }
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            history = %history_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            history_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        load_jsonl(&self.tasks_path).context("failed to load tasks.jsonl")
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.jsonl")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_history(&self) -> anyhow::Result<Vec<HistoryEntry>> {
        load_jsonl(&self.history_path).context("failed to load history.jsonl")
    }

    #[tracing::instrument(skip(self, entries))]
    fn save_history(&self, entries: &[HistoryEntry]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.history_path, entries).context("failed to save history.jsonl")
    }
}

impl MutationSink for DataStore {
    #[tracing::instrument(skip(self, task), fields(task_id = %task.id))]
    fn commit_task(&mut self, task: &Task) -> anyhow::Result<()> {
        let mut tasks = self.load_tasks()?;
        match tasks.iter_mut().find(|existing| existing.id == task.id) {
            Some(existing) => *existing = task.clone(),
            None => tasks.push(task.clone()),
        }
        self.save_tasks(&tasks)
    }

    #[tracing::instrument(skip(self), fields(task_id = %id))]
    fn delete_task(&mut self, id: Uuid) -> anyhow::Result<()> {
        let mut tasks = self.load_tasks()?;
        let before = tasks.len();
        tasks.retain(|task| task.id != id);
        if tasks.len() == before {
            debug!("delete of unknown task ignored");
            return Ok(());
        }
        self.save_tasks(&tasks)
    }
}

impl HistoryLog for DataStore {
    #[tracing::instrument(skip(self, entry), fields(entry_id = %entry.id, task_id = %entry.task_id))]
    fn append(&mut self, entry: &HistoryEntry) -> anyhow::Result<()> {
        let mut entries = self.load_history()?;
        entries.push(entry.clone());
        self.save_history(&entries)
    }

    fn fetch_latest(&self, skip_undo_redo: bool) -> anyhow::Result<Option<HistoryEntry>> {
        let entries = self.load_history()?;
        Ok(latest(&entries, skip_undo_redo).cloned())
    }

    fn fetch_latest_undone(&self) -> anyhow::Result<Option<HistoryEntry>> {
        let entries = self.load_history()?;
        Ok(latest_undone(&entries).cloned())
    }

    #[tracing::instrument(skip(self))]
    fn delete(&mut self, id: Uuid) -> anyhow::Result<()> {
        let mut entries = self.load_history()?;
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        if entries.len() == before {
            return Err(anyhow!("history entry not found: {id}"));
        }
        self.save_history(&entries)
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let row: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(row);
    }

    debug!(count = out.len(), "loaded rows from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, rows))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, rows: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = rows.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for row in rows {
        let serialized = serde_json::to_string(row)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
