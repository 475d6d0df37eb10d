//! Pointer-driven drag and resize state machines.
//!
//! One parametric [`DragMachine`] serves every scheduling surface; a
//! [`SurfaceConfig`] supplies the geometry that differs between the daily
//! panel, the weekly grid and the task board. Machines never touch task
//! collections. They only report what the user meant as a [`DropIntent`].

mod drag;
mod resize;
mod surface;

use planner_shared::{CalendarPreview, DragPreview, InsertPosition, ListHover};
use uuid::Uuid;

use crate::datetime::DayKey;

pub use drag::{DragMachine, DragPhase, DragSession, DragSubject};
pub use resize::{ResizeEdge, ResizeMachine, ResizeSession};
pub use surface::{HostCapabilities, SurfaceConfig, SurfaceKind};

/// Rendering callbacks. They fire many times per second while a drag is
/// live, so implementations should only stash state.
pub trait DragObserver {
    fn on_drag_preview_change(&mut self, _preview: Option<&DragPreview>) {}
    fn on_day_hover_change(&mut self, _day_key: Option<&str>) {}
    fn on_list_hover_change(&mut self, _hover: Option<&ListHover>) {}
    fn on_calendar_preview_change(&mut self, _preview: Option<&CalendarPreview>) {}
    fn on_open_detail(&mut self, _task_id: Uuid) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl DragObserver for NullObserver {}

/// What a finished gesture asks the scheduler to do.
#[derive(Debug, Clone, PartialEq)]
pub enum DropIntent {
    Reschedule {
        task_id: Uuid,
        day: DayKey,
        start_minutes: u32,
        duration_minutes: u32,
    },
    MoveToDay {
        task_id: Uuid,
        day: DayKey,
        keep_time: bool,
    },
    MoveToList {
        task_id: Uuid,
        list_id: String,
    },
    InsertInList {
        task_id: Uuid,
        list_id: String,
        anchor: Uuid,
        position: InsertPosition,
    },
    ReorderInDay {
        task_id: Uuid,
        day: DayKey,
        anchor: Uuid,
        position: InsertPosition,
    },
    Resize {
        task_id: Uuid,
        day: DayKey,
        start_minutes: u32,
        end_minutes: u32,
    },
}

impl DropIntent {
    pub fn task_id(&self) -> Uuid {
        match self {
            DropIntent::Reschedule { task_id, .. }
            | DropIntent::MoveToDay { task_id, .. }
            | DropIntent::MoveToList { task_id, .. }
            | DropIntent::InsertInList { task_id, .. }
            | DropIntent::ReorderInDay { task_id, .. }
            | DropIntent::Resize { task_id, .. } => *task_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GestureOutcome {
    Commit(DropIntent),
    /// Released before the drag threshold; the card was tapped.
    Tap(Uuid),
    Cancelled,
}
