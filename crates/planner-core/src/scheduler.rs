//! Turns drop intents into task mutations.
//!
//! The scheduler owns the canonical task collection. Every change goes
//! through one path: patch locally, tell the cache patchers, hand the row to
//! the mutation sink, then bring the history log in line. Local state is
//! updated first and is never rolled back when a downstream write fails.
//!
//! The log mirrors both stacks: `user` entries are the actions that can
//! still be undone and `undo` entries are the undone ones that can be
//! redone. Undo and redo move an entry between the two instead of
//! appending, so the log only grows with fresh user actions.

use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::anyhow;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::datetime::{DayKey, derive_task_time_metrics, local_instant};
use crate::gesture::DropIntent;
use crate::history::{ActionOrigin, HistoryEntry, HistoryLog};
use crate::layout::{ColumnSlot, layout_day};
use crate::rank::{plan_insert, rank_after_last};
use crate::task::Task;
use crate::undo::{ActionKind, UndoAction, UndoRecord, UndoStack};

/// Where committed rows go. A hosted backend in production, a JSONL file in
/// the CLI.
pub trait MutationSink {
    fn commit_task(&mut self, task: &Task) -> anyhow::Result<()>;
    fn delete_task(&mut self, id: Uuid) -> anyhow::Result<()>;
}

/// Read caches outside the scheduler that must see a commit immediately.
pub trait CachePatcher {
    fn patch_scheduled(&mut self, task: &Task);
    fn patch_detail(&mut self, task: &Task);
    fn evict(&mut self, _id: Uuid) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// Nothing would change; no mutation, undo entry or history row.
    Suppressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    Applied { task_id: Uuid, action: ActionKind },
    Nothing,
}

#[derive(Debug, Default, Clone)]
pub struct TaskCollections {
    tasks: HashMap<Uuid, Task>,
}

impl TaskCollections {
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        Self {
            tasks: tasks.into_iter().map(|task| (task.id, task)).collect(),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    fn upsert(&mut self, task: Task) {
        self.tasks.insert(task.id, task);
    }

    fn remove(&mut self, id: Uuid) -> Option<Task> {
        self.tasks.remove(&id)
    }
}

pub struct Scheduler<S, L> {
    tasks: TaskCollections,
    undo: UndoStack,
    tz: Tz,
    default_list: String,
    sink: S,
    history: L,
    patchers: Vec<Box<dyn CachePatcher>>,
    has_history: bool,
    hydrated: bool,
    clock: fn() -> DateTime<Utc>,
}

impl<S, L> Scheduler<S, L>
where
    S: MutationSink,
    L: HistoryLog,
{
    pub fn new(tasks: Vec<Task>, tz: Tz, default_list: impl Into<String>, sink: S, history: L) -> Self {
        Self {
            tasks: TaskCollections::from_tasks(tasks),
            undo: UndoStack::new(),
            tz,
            default_list: default_list.into(),
            sink,
            history,
            patchers: Vec::new(),
            has_history: false,
            hydrated: false,
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn add_patcher(&mut self, patcher: Box<dyn CachePatcher>) {
        self.patchers.push(patcher);
    }

    pub fn tasks(&self) -> &TaskCollections {
        &self.tasks
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn timezone(&self) -> &Tz {
        &self.tz
    }

    pub fn default_list(&self) -> &str {
        &self.default_list
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn history(&self) -> &L {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo() || self.has_history
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    pub fn has_history(&self) -> bool {
        self.has_history
    }

    /// Cold-start check of the durable log. Runs once per scheduler.
    #[tracing::instrument(skip(self))]
    pub fn hydrate(&mut self) {
        if self.hydrated {
            return;
        }
        self.hydrated = true;
        self.has_history = match self.history.fetch_latest(true) {
            Ok(entry) => entry.is_some(),
            Err(err) => {
                warn!(error = %err, "history log unavailable; starting without history");
                false
            }
        };
        debug!(has_history = self.has_history, "hydrated undo state");
    }

    #[tracing::instrument(skip(self, intent), fields(task_id = %intent.task_id()))]
    pub fn apply(&mut self, intent: &DropIntent) -> anyhow::Result<CommitOutcome> {
        let task_id = intent.task_id();
        let before = self
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| anyhow!("task not found: {task_id}"))?;

        let Some(mut after) = self.plan(&before, intent)? else {
            debug!("drop does not change ordering; suppressed");
            return Ok(CommitOutcome::Suppressed);
        };
        if after.same_content(&before) {
            debug!("drop leaves task unchanged; suppressed");
            return Ok(CommitOutcome::Suppressed);
        }

        after.modified = (self.clock)();
        self.record(UndoAction::Update { before, after });
        info!(?intent, "drop committed");
        Ok(CommitOutcome::Committed)
    }

    #[tracing::instrument(skip(self, task), fields(task_id = %task.id))]
    pub fn add_task(&mut self, task: Task) -> anyhow::Result<()> {
        if self.tasks.get(task.id).is_some() {
            return Err(anyhow!("task already exists: {}", task.id));
        }
        self.record(UndoAction::Add { task });
        Ok(())
    }

    #[tracing::instrument(skip(self, after), fields(task_id = %after.id))]
    pub fn update_task(&mut self, mut after: Task) -> anyhow::Result<CommitOutcome> {
        let before = self
            .tasks
            .get(after.id)
            .cloned()
            .ok_or_else(|| anyhow!("task not found: {}", after.id))?;
        if after.same_content(&before) {
            return Ok(CommitOutcome::Suppressed);
        }
        after.modified = (self.clock)();
        self.record(UndoAction::Update { before, after });
        Ok(CommitOutcome::Committed)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_task(&mut self, id: Uuid) -> anyhow::Result<()> {
        let task = self
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("task not found: {id}"))?;
        self.record(UndoAction::Delete { task });
        Ok(())
    }

    /// Reverts the newest action. With an empty in-memory stack the newest
    /// user entry of the durable log is reverted instead. Either way the
    /// action lands on the redo stack.
    #[tracing::instrument(skip(self))]
    pub fn undo(&mut self) -> anyhow::Result<UndoOutcome> {
        let record = match self.undo.pop_undo() {
            Some(record) => record,
            None => match self.latest_logged(ActionOrigin::User)? {
                Some(record) => record,
                None => {
                    debug!("nothing to undo");
                    self.has_history = false;
                    return Ok(UndoOutcome::Nothing);
                }
            },
        };

        let inverse = record.action.inverse();
        self.commit(&inverse);
        let entry_id = self.move_entry(&record, ActionOrigin::Undo);
        info!(task_id = %record.action.task_id(), entry_id = %record.entry_id, "undid action");
        self.undo.push_redo(UndoRecord {
            action: record.action,
            entry_id,
        });
        Ok(UndoOutcome::Applied {
            task_id: inverse.task_id(),
            action: inverse.kind(),
        })
    }

    /// Re-applies the newest undone action, falling back to the newest
    /// `undo` entry of the durable log when this session has none.
    #[tracing::instrument(skip(self))]
    pub fn redo(&mut self) -> anyhow::Result<UndoOutcome> {
        let record = match self.undo.pop_redo() {
            Some(record) => record,
            None => match self.latest_logged(ActionOrigin::Undo)? {
                Some(record) => record,
                None => {
                    debug!("nothing to redo");
                    return Ok(UndoOutcome::Nothing);
                }
            },
        };

        self.commit(&record.action);
        let entry_id = self.move_entry(&record, ActionOrigin::User);
        info!(task_id = %record.action.task_id(), entry_id = %record.entry_id, "redid action");
        let outcome = UndoOutcome::Applied {
            task_id: record.action.task_id(),
            action: record.action.kind(),
        };
        self.undo.push_undo(UndoRecord {
            action: record.action,
            entry_id,
        });
        Ok(outcome)
    }

    /// Backlog bucket in rank order.
    pub fn backlog(&self, list_id: &str) -> Vec<&Task> {
        let mut rows: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|task| task.in_backlog() && task.bucket(&self.default_list) == list_id)
            .collect();
        rows.sort_by(|a, b| {
            a.rank()
                .total_cmp(&b.rank())
                .then(a.created.cmp(&b.created))
                .then(a.id.cmp(&b.id))
        });
        rows
    }

    /// Tasks on `day`: timed ones by start, then untimed ones by rank.
    pub fn scheduled(&self, day: DayKey) -> Vec<&Task> {
        let mut rows: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|task| task.is_scheduled_on(day.date()))
            .collect();
        rows.sort_by(|a, b| {
            a.planned_start
                .is_none()
                .cmp(&b.planned_start.is_none())
                .then(a.planned_start.cmp(&b.planned_start))
                .then(a.rank().total_cmp(&b.rank()))
                .then(a.created.cmp(&b.created))
                .then(a.id.cmp(&b.id))
        });
        rows
    }

    /// Tasks on `day` in board order: rank only, whatever their times.
    pub fn board(&self, day: DayKey) -> Vec<&Task> {
        let mut rows: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|task| task.is_scheduled_on(day.date()))
            .collect();
        rows.sort_by(|a, b| {
            a.rank()
                .total_cmp(&b.rank())
                .then(a.created.cmp(&b.created))
                .then(a.id.cmp(&b.id))
        });
        rows
    }

    pub fn layout(&self, day: DayKey, hidden: &HashSet<Uuid>) -> HashMap<Uuid, ColumnSlot> {
        let tasks: Vec<Task> = self.tasks.iter().cloned().collect();
        layout_day(&tasks, day, &self.tz, hidden)
    }

    /// Every backlog bucket that currently holds a task, plus the default.
    pub fn lists(&self) -> Vec<String> {
        let mut lists: BTreeSet<String> = self
            .tasks
            .iter()
            .filter(|task| task.in_backlog())
            .map(|task| task.bucket(&self.default_list).to_string())
            .collect();
        lists.insert(self.default_list.clone());
        lists.into_iter().collect()
    }

    /// Builds the post-drop row. `Ok(None)` means the drop is a no-op.
    fn plan(&self, before: &Task, intent: &DropIntent) -> anyhow::Result<Option<Task>> {
        let mut after = before.clone();
        match intent {
            DropIntent::Reschedule {
                day,
                start_minutes,
                duration_minutes,
                ..
            } => {
                set_day(&mut after, Some(day.date()));
                self.set_time(&mut after, *day, *start_minutes, *duration_minutes)?;
            }
            DropIntent::MoveToDay { day, keep_time, .. } => {
                let already_there = before.is_scheduled_on(day.date());
                set_day(&mut after, Some(day.date()));
                match derive_task_time_metrics(before, &self.tz) {
                    Some(metrics) if *keep_time => {
                        self.set_time(&mut after, *day, metrics.start_minutes, metrics.duration_minutes)?;
                    }
                    _ => after.clear_time(),
                }
                if !already_there {
                    after.sort_rank = Some(rank_after_last(&self.day_ranks(*day), before.id));
                }
            }
            DropIntent::MoveToList { list_id, .. } => {
                if before.recurrence.is_some() {
                    debug!("recurring instances stay on their day");
                    return Ok(None);
                }
                let already_there =
                    before.in_backlog() && before.bucket(&self.default_list) == list_id;
                set_day(&mut after, None);
                after.clear_time();
                after.list_id = Some(list_id.clone());
                if !already_there {
                    after.sort_rank = Some(rank_after_last(&self.list_ranks(list_id), before.id));
                }
            }
            DropIntent::InsertInList {
                list_id,
                anchor,
                position,
                ..
            } => {
                if before.recurrence.is_some() {
                    debug!("recurring instances stay on their day");
                    return Ok(None);
                }
                let Some(plan) = plan_insert(&self.list_ranks(list_id), before.id, *anchor, *position)
                else {
                    return Ok(None);
                };
                let same_bucket =
                    before.in_backlog() && before.bucket(&self.default_list) == list_id;
                if same_bucket && !plan.changed {
                    return Ok(None);
                }
                set_day(&mut after, None);
                after.clear_time();
                after.list_id = Some(list_id.clone());
                after.sort_rank = Some(plan.rank);
            }
            DropIntent::ReorderInDay {
                day,
                anchor,
                position,
                ..
            } => {
                let Some(plan) = plan_insert(&self.day_ranks(*day), before.id, *anchor, *position)
                else {
                    return Ok(None);
                };
                let same_day = before.is_scheduled_on(day.date());
                if same_day && !plan.changed {
                    return Ok(None);
                }
                if !same_day {
                    set_day(&mut after, Some(day.date()));
                    after.clear_time();
                }
                after.sort_rank = Some(plan.rank);
            }
            DropIntent::Resize {
                day,
                start_minutes,
                end_minutes,
                ..
            } => {
                if end_minutes <= start_minutes {
                    return Err(anyhow!(
                        "resize range is empty: {start_minutes}..{end_minutes}"
                    ));
                }
                set_day(&mut after, Some(day.date()));
                self.set_time(&mut after, *day, *start_minutes, end_minutes - start_minutes)?;
            }
        }
        Ok(Some(after))
    }

    fn set_time(&self, task: &mut Task, day: DayKey, start: u32, duration: u32) -> anyhow::Result<()> {
        let start = local_instant(day.date(), start, &self.tz)?;
        task.planned_start = Some(start);
        task.planned_end = Some(start + Duration::minutes(i64::from(duration)));
        Ok(())
    }

    fn list_ranks(&self, list_id: &str) -> Vec<(Uuid, f64)> {
        self.backlog(list_id)
            .into_iter()
            .map(|task| (task.id, task.rank()))
            .collect()
    }

    fn day_ranks(&self, day: DayKey) -> Vec<(Uuid, f64)> {
        self.board(day)
            .into_iter()
            .map(|task| (task.id, task.rank()))
            .collect()
    }

    /// A fresh user action: apply it, log it, stack it.
    fn record(&mut self, action: UndoAction) {
        self.discard_logged_redos();
        self.commit(&action);
        let entry = HistoryEntry::record(&action, ActionOrigin::User, (self.clock)());
        match self.history.append(&entry) {
            Ok(()) => self.has_history = true,
            Err(err) => warn!(entry_id = %entry.id, error = %err, "failed to append history"),
        }
        self.undo.push(UndoRecord {
            action,
            entry_id: entry.id,
        });
    }

    fn commit(&mut self, action: &UndoAction) {
        match action.after() {
            Some(task) => {
                self.tasks.upsert(task.clone());
                for patcher in &mut self.patchers {
                    patcher.patch_scheduled(task);
                    patcher.patch_detail(task);
                }
                if let Err(err) = self.sink.commit_task(task) {
                    warn!(task_id = %task.id, error = %err, "mutation sink rejected commit; keeping local state");
                }
            }
            None => {
                let id = action.task_id();
                self.tasks.remove(id);
                for patcher in &mut self.patchers {
                    patcher.evict(id);
                }
                if let Err(err) = self.sink.delete_task(id) {
                    warn!(task_id = %id, error = %err, "mutation sink rejected delete; keeping local state");
                }
            }
        }
    }

    /// Newest logged entry of `origin` as a stack record. Entries without
    /// the snapshots their kind needs are dropped on the way.
    fn latest_logged(&mut self, origin: ActionOrigin) -> anyhow::Result<Option<UndoRecord>> {
        loop {
            let fetched = match origin {
                ActionOrigin::User => self.history.fetch_latest(true),
                _ => self.history.fetch_latest_undone(),
            };
            let entry = match fetched {
                Ok(Some(entry)) => entry,
                Ok(None) => return Ok(None),
                Err(err) => return Err(err.context("failed to read history log")),
            };
            if let Some(action) = entry.to_action() {
                return Ok(Some(UndoRecord {
                    action,
                    entry_id: entry.id,
                }));
            }
            warn!(entry_id = %entry.id, "history entry lacks snapshots; dropping it");
            self.history
                .delete(entry.id)
                .map_err(|err| err.context("failed to drop unusable history entry"))?;
        }
    }

    /// Re-files the record's entry under `origin` and returns the new id.
    fn move_entry(&mut self, record: &UndoRecord, origin: ActionOrigin) -> Uuid {
        if let Err(err) = self.history.delete(record.entry_id) {
            warn!(entry_id = %record.entry_id, error = %err, "failed to delete replayed history entry");
        }
        let entry = HistoryEntry::record(&record.action, origin, (self.clock)());
        if let Err(err) = self.history.append(&entry) {
            warn!(entry_id = %entry.id, error = %err, "failed to append history");
        }
        self.has_history = matches!(self.history.fetch_latest(true), Ok(Some(_)));
        entry.id
    }

    /// A fresh action makes every logged undo unreachable.
    fn discard_logged_redos(&mut self) {
        loop {
            match self.history.fetch_latest_undone() {
                Ok(Some(entry)) => {
                    if let Err(err) = self.history.delete(entry.id) {
                        warn!(entry_id = %entry.id, error = %err, "failed to discard redo entry");
                        return;
                    }
                }
                Ok(None) => return,
                Err(err) => {
                    warn!(error = %err, "history log unavailable; keeping redo entries");
                    return;
                }
            }
        }
    }
}

/// Puts the row on `day`, or into the backlog for `None`. Recurring
/// instances record a move instead of changing their series date.
fn set_day(task: &mut Task, day: Option<NaiveDate>) {
    match (&mut task.recurrence, day) {
        (Some(link), Some(day)) => {
            link.moved_to_date = (day != link.occurrence_date).then_some(day);
        }
        _ => task.due_date = day,
    }
}
