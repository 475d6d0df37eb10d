//! Durable action log consumed by undo when the in-memory stack is empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::Task;
use crate::undo::{ActionKind, UndoAction};

/// Which stack an entry belongs to. `User` entries can be undone; `Undo`
/// entries hold an undone action, forward snapshots intact, that can be
/// redone. `Redo` is accepted from older logs and never replayed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActionOrigin {
    #[default]
    User,
    Undo,
    Redo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub action: ActionKind,
    #[serde(default)]
    pub origin: ActionOrigin,
    pub task_id: Uuid,
    #[serde(default)]
    pub before: Option<Task>,
    #[serde(default)]
    pub after: Option<Task>,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn record(action: &UndoAction, origin: ActionOrigin, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: action.kind(),
            origin,
            task_id: action.task_id(),
            before: action.before().cloned(),
            after: action.after().cloned(),
            recorded_at: now,
        }
    }

    /// Rebuilds the undoable action. `None` when the snapshots the kind
    /// needs are missing.
    pub fn to_action(&self) -> Option<UndoAction> {
        match self.action {
            ActionKind::Add => Some(UndoAction::Add {
                task: self.after.clone()?,
            }),
            ActionKind::Update => Some(UndoAction::Update {
                before: self.before.clone()?,
                after: self.after.clone()?,
            }),
            ActionKind::Delete => Some(UndoAction::Delete {
                task: self.before.clone()?,
            }),
        }
    }
}

pub trait HistoryLog {
    fn append(&mut self, entry: &HistoryEntry) -> anyhow::Result<()>;

    /// Newest entry, optionally ignoring ones written by undo/redo.
    fn fetch_latest(&self, skip_undo_redo: bool) -> anyhow::Result<Option<HistoryEntry>>;

    /// Newest entry of an action that was undone and not yet redone.
    fn fetch_latest_undone(&self) -> anyhow::Result<Option<HistoryEntry>>;

    fn delete(&mut self, id: Uuid) -> anyhow::Result<()>;
}

/// In-process log for hosts that keep history elsewhere, and for tests.
#[derive(Debug, Default)]
pub struct MemoryHistoryLog {
    entries: Vec<HistoryEntry>,
}

impl MemoryHistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }
}

impl HistoryLog for MemoryHistoryLog {
    fn append(&mut self, entry: &HistoryEntry) -> anyhow::Result<()> {
        self.entries.push(entry.clone());
        Ok(())
    }

    fn fetch_latest(&self, skip_undo_redo: bool) -> anyhow::Result<Option<HistoryEntry>> {
        Ok(latest(&self.entries, skip_undo_redo).cloned())
    }

    fn fetch_latest_undone(&self) -> anyhow::Result<Option<HistoryEntry>> {
        Ok(latest_undone(&self.entries).cloned())
    }

    fn delete(&mut self, id: Uuid) -> anyhow::Result<()> {
        self.entries.retain(|entry| entry.id != id);
        Ok(())
    }
}

pub(crate) fn latest(entries: &[HistoryEntry], skip_undo_redo: bool) -> Option<&HistoryEntry> {
    newest(entries, |entry| !skip_undo_redo || entry.origin == ActionOrigin::User)
}

pub(crate) fn latest_undone(entries: &[HistoryEntry]) -> Option<&HistoryEntry> {
    newest(entries, |entry| entry.origin == ActionOrigin::Undo)
}

/// Newest by `recorded_at`; later position wins ties.
fn newest(entries: &[HistoryEntry], keep: impl Fn(&HistoryEntry) -> bool) -> Option<&HistoryEntry> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| keep(entry))
        .max_by(|(ia, a), (ib, b)| a.recorded_at.cmp(&b.recorded_at).then(ia.cmp(ib)))
        .map(|(_, entry)| entry)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{ActionOrigin, HistoryEntry, HistoryLog, MemoryHistoryLog};
    use crate::task::Task;
    use crate::undo::UndoAction;

    #[test]
    fn latest_user_entry_skips_undo_and_redo() {
        let t0 = Utc
            .with_ymd_and_hms(2024, 6, 1, 9, 0, 0)
            .single()
            .expect("valid now");
        let task = Task::new_backlog("a".to_string(), None, t0);
        let add = UndoAction::Add { task: task.clone() };

        let mut log = MemoryHistoryLog::new();
        let user = HistoryEntry::record(&add, ActionOrigin::User, t0);
        let undo = HistoryEntry::record(&add.inverse(), ActionOrigin::Undo, t0 + Duration::minutes(1));
        log.append(&user).expect("append user");
        log.append(&undo).expect("append undo");

        let newest = log.fetch_latest(false).expect("fetch").expect("entry");
        assert_eq!(newest.id, undo.id);
        let newest_user = log.fetch_latest(true).expect("fetch").expect("entry");
        assert_eq!(newest_user.id, user.id);
        assert_eq!(newest_user.to_action(), Some(add));

        log.delete(user.id).expect("delete");
        assert!(log.fetch_latest(true).expect("fetch").is_none());
    }

    #[test]
    fn latest_undone_ignores_newer_user_entries() {
        let t0 = Utc
            .with_ymd_and_hms(2024, 6, 1, 9, 0, 0)
            .single()
            .expect("valid now");
        let task = Task::new_backlog("a".to_string(), None, t0);
        let add = UndoAction::Add { task };

        let mut log = MemoryHistoryLog::new();
        let undone = HistoryEntry::record(&add, ActionOrigin::Undo, t0);
        let redo = HistoryEntry::record(&add, ActionOrigin::Redo, t0 + Duration::minutes(1));
        let user = HistoryEntry::record(&add, ActionOrigin::User, t0 + Duration::minutes(2));
        for entry in [&undone, &redo, &user] {
            log.append(entry).expect("append");
        }

        let found = log.fetch_latest_undone().expect("fetch").expect("entry");
        assert_eq!(found.id, undone.id);
        log.delete(undone.id).expect("delete");
        assert!(log.fetch_latest_undone().expect("fetch").is_none());
    }

    #[test]
    fn incomplete_snapshot_is_not_replayable() {
        let t0 = Utc
            .with_ymd_and_hms(2024, 6, 1, 9, 0, 0)
            .single()
            .expect("valid now");
        let task = Task::new_backlog("a".to_string(), None, t0);
        let mut entry = HistoryEntry::record(
            &UndoAction::Update {
                before: task.clone(),
                after: task,
            },
            ActionOrigin::User,
            t0,
        );
        entry.before = None;
        assert!(entry.to_action().is_none());
    }
}
