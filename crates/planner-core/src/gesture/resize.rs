use planner_shared::CalendarPreview;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{DragObserver, DropIntent};
use crate::datetime::{
    DayKey, MIN_BLOCK_MINUTES, MINUTES_PER_DAY, TaskTimeMetrics, pixels_to_minutes, snap_minutes,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeEdge {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResizeSession {
    pub task_id: Uuid,
    pub day: DayKey,
    pub edge: ResizeEdge,
    pub original_start: u32,
    pub original_end: u32,
    pub start: u32,
    pub end: u32,
}

/// Edge-handle drag on a calendar block. Every move is measured from the
/// grant position, so rounding never accumulates.
#[derive(Debug)]
pub struct ResizeMachine {
    hour_height: f64,
    snap: u32,
    session: Option<ResizeSession>,
}

impl ResizeMachine {
    pub fn new(hour_height: f64, snap: u32) -> Self {
        Self {
            hour_height,
            snap: snap.max(1),
            session: None,
        }
    }

    pub fn session(&self) -> Option<&ResizeSession> {
        self.session.as_ref()
    }

    #[tracing::instrument(skip(self, metrics))]
    pub fn grant(&mut self, task_id: Uuid, day: DayKey, metrics: TaskTimeMetrics, edge: ResizeEdge) {
        let start = metrics.start_minutes.min(MINUTES_PER_DAY - MIN_BLOCK_MINUTES);
        let end = metrics
            .end_minutes()
            .clamp(start + MIN_BLOCK_MINUTES, MINUTES_PER_DAY);
        self.session = Some(ResizeSession {
            task_id,
            day,
            edge,
            original_start: start,
            original_end: end,
            start,
            end,
        });
    }

    /// Applies the vertical travel since the grant and returns the new range.
    pub fn drag(&mut self, dy: f64, observer: &mut dyn DragObserver) -> Option<(u32, u32)> {
        let session = self.session.as_mut()?;
        let delta = snap_minutes(pixels_to_minutes(dy, self.hour_height), self.snap);

        match session.edge {
            ResizeEdge::Start => {
                let latest = (session.original_end - MIN_BLOCK_MINUTES) as i32;
                let start = (session.original_start as i32).saturating_add(delta);
                session.start = start.clamp(0, latest) as u32;
                session.end = session.original_end;
            }
            ResizeEdge::End => {
                let earliest = (session.original_start + MIN_BLOCK_MINUTES) as i32;
                let end = (session.original_end as i32).saturating_add(delta);
                session.end = end.clamp(earliest, MINUTES_PER_DAY as i32) as u32;
                session.start = session.original_start;
            }
        }

        let preview = CalendarPreview {
            task_id: session.task_id,
            day_key: session.day.to_string(),
            start_minutes: session.start,
            duration_minutes: session.end - session.start,
        };
        observer.on_calendar_preview_change(Some(&preview));
        Some((session.start, session.end))
    }

    /// Ends the resize. Yields nothing when the range is back where it began.
    pub fn release(&mut self, observer: &mut dyn DragObserver) -> Option<DropIntent> {
        let session = self.session.take()?;
        observer.on_calendar_preview_change(None);
        if session.start == session.original_start && session.end == session.original_end {
            debug!(task_id = %session.task_id, "resize released unchanged");
            return None;
        }
        Some(DropIntent::Resize {
            task_id: session.task_id,
            day: session.day,
            start_minutes: session.start,
            end_minutes: session.end,
        })
    }

    pub fn terminate(&mut self, observer: &mut dyn DragObserver) {
        if self.session.take().is_some() {
            observer.on_calendar_preview_change(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::{ResizeEdge, ResizeMachine};
    use crate::datetime::{DayKey, TaskTimeMetrics};
    use crate::gesture::{DropIntent, NullObserver};

    fn day() -> DayKey {
        DayKey::new(NaiveDate::from_ymd_opt(2024, 6, 3).expect("valid date"))
    }

    fn block(start: u32, duration: u32) -> TaskTimeMetrics {
        TaskTimeMetrics {
            start_minutes: start,
            duration_minutes: duration,
        }
    }

    #[test]
    fn start_edge_stops_fifteen_minutes_before_end() {
        let mut machine = ResizeMachine::new(60.0, 15);
        let mut observer = NullObserver;
        machine.grant(Uuid::new_v4(), day(), block(540, 60), ResizeEdge::Start);

        assert_eq!(machine.drag(500.0, &mut observer), Some((585, 600)));
        assert_eq!(machine.drag(-1000.0, &mut observer), Some((0, 600)));
        assert_eq!(machine.drag(-20.0, &mut observer), Some((525, 600)));
    }

    #[test]
    fn end_edge_is_bounded_by_midnight() {
        let mut machine = ResizeMachine::new(60.0, 15);
        let mut observer = NullObserver;
        let id = Uuid::new_v4();
        machine.grant(id, day(), block(1380, 30), ResizeEdge::End);

        assert_eq!(machine.drag(600.0, &mut observer), Some((1380, 1440)));
        assert_eq!(machine.drag(-600.0, &mut observer), Some((1380, 1395)));
        assert_eq!(
            machine.release(&mut observer),
            Some(DropIntent::Resize {
                task_id: id,
                day: day(),
                start_minutes: 1380,
                end_minutes: 1395,
            })
        );
    }

    #[test]
    fn unchanged_release_yields_nothing() {
        let mut machine = ResizeMachine::new(60.0, 15);
        let mut observer = NullObserver;
        machine.grant(Uuid::new_v4(), day(), block(600, 60), ResizeEdge::End);

        machine.drag(40.0, &mut observer);
        machine.drag(5.0, &mut observer);
        assert_eq!(machine.release(&mut observer), None);
        assert!(machine.session().is_none());
    }

    #[test]
    fn terminate_drops_the_session() {
        let mut machine = ResizeMachine::new(60.0, 15);
        let mut observer = NullObserver;
        machine.grant(Uuid::new_v4(), day(), block(600, 60), ResizeEdge::Start);
        machine.drag(30.0, &mut observer);
        machine.terminate(&mut observer);
        assert_eq!(machine.release(&mut observer), None);
        assert_eq!(machine.drag(30.0, &mut observer), None);
    }
}
