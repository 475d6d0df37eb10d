use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::Task;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Add,
    Update,
    Delete,
}

/// One reversible change, stored as full task snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoAction {
    Add { task: Task },
    Update { before: Task, after: Task },
    Delete { task: Task },
}

impl UndoAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            UndoAction::Add { .. } => ActionKind::Add,
            UndoAction::Update { .. } => ActionKind::Update,
            UndoAction::Delete { .. } => ActionKind::Delete,
        }
    }

    pub fn task_id(&self) -> Uuid {
        match self {
            UndoAction::Add { task } | UndoAction::Delete { task } => task.id,
            UndoAction::Update { after, .. } => after.id,
        }
    }

    /// The action that puts things back the way they were.
    pub fn inverse(&self) -> UndoAction {
        match self {
            UndoAction::Add { task } => UndoAction::Delete { task: task.clone() },
            UndoAction::Delete { task } => UndoAction::Add { task: task.clone() },
            UndoAction::Update { before, after } => UndoAction::Update {
                before: after.clone(),
                after: before.clone(),
            },
        }
    }

    pub fn before(&self) -> Option<&Task> {
        match self {
            UndoAction::Add { .. } => None,
            UndoAction::Update { before, .. } => Some(before),
            UndoAction::Delete { task } => Some(task),
        }
    }

    pub fn after(&self) -> Option<&Task> {
        match self {
            UndoAction::Add { task } => Some(task),
            UndoAction::Update { after, .. } => Some(after),
            UndoAction::Delete { .. } => None,
        }
    }
}

/// A stacked action plus the history entry that currently records it.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoRecord {
    pub action: UndoAction,
    pub entry_id: Uuid,
}

/// Lives as long as the planning session; nothing is dropped.
#[derive(Debug, Default)]
pub struct UndoStack {
    undo: Vec<UndoRecord>,
    redo: Vec<UndoRecord>,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fresh user action. Clears the redo stack.
    pub fn push(&mut self, record: UndoRecord) {
        self.undo.push(record);
        self.redo.clear();
    }

    /// Newest action to revert. The caller re-stacks it with
    /// [`UndoStack::push_redo`] once the revert is logged.
    pub fn pop_undo(&mut self) -> Option<UndoRecord> {
        self.undo.pop()
    }

    pub fn pop_redo(&mut self) -> Option<UndoRecord> {
        self.redo.pop()
    }

    pub fn push_redo(&mut self, record: UndoRecord) {
        self.redo.push(record);
    }

    /// Puts a redone action back without touching the redo stack.
    pub fn push_undo(&mut self, record: UndoRecord) {
        self.undo.push(record);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
