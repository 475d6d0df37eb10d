use chrono_tz::Tz;
use planner_shared::{CalendarPreview, DayOrigin, DragPreview, DropTarget, ListHover, Point};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::{DragObserver, DropIntent, GestureOutcome, SurfaceConfig, SurfaceKind};
use crate::datetime::{
    DEFAULT_DURATION_MINUTES, DayKey, MINUTES_PER_HOUR, TaskTimeMetrics, clamp_start,
    derive_task_time_metrics, pixels_to_minutes, snap_minutes,
};
use crate::hit::HitTest;
use crate::task::Task;

/// Snapshot of the card that was grabbed.
#[derive(Debug, Clone, PartialEq)]
pub struct DragSubject {
    pub task_id: Uuid,
    pub day: Option<DayKey>,
    pub list_id: Option<String>,
    pub metrics: Option<TaskTimeMetrics>,
    pub estimated_minutes: Option<u32>,
}

impl DragSubject {
    pub fn from_task(task: &Task, tz: &Tz) -> Self {
        Self {
            task_id: task.id,
            day: task.effective_day().map(DayKey::new),
            list_id: task.list_id.clone(),
            metrics: derive_task_time_metrics(task, tz),
            estimated_minutes: task.estimated_minutes,
        }
    }

    pub fn duration_minutes(&self) -> u32 {
        self.metrics
            .map(|m| m.duration_minutes)
            .or(self.estimated_minutes.filter(|m| *m > 0))
            .unwrap_or(DEFAULT_DURATION_MINUTES)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragPhase {
    Idle,
    /// Pressed but still inside the movement threshold.
    Armed,
    Dragging,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub subject: DragSubject,
    pub origin: Point,
    pub current: Point,
    pub started: bool,
    /// Index into the surface's visible days the card started on.
    pub origin_day_index: Option<usize>,
    pub candidate_day_index: Option<usize>,
    pub candidate_start: Option<u32>,
    pub target: Option<DropTarget>,
    pub external: bool,
}

impl DragSession {
    /// Timed card dragged along this surface's own hour axis.
    fn in_grid(&self) -> bool {
        self.origin_day_index.is_some() && self.subject.metrics.is_some()
    }
}

#[derive(Debug, Default)]
struct Emitted {
    preview: bool,
    day: Option<String>,
    list: Option<ListHover>,
    calendar: Option<CalendarPreview>,
}

#[derive(Debug, Default, Clone, Copy)]
struct PressGuard {
    armed: bool,
    clear_on_frame: bool,
}

/// Press/move/release tracker for one scheduling surface.
#[derive(Debug)]
pub struct DragMachine {
    config: SurfaceConfig,
    session: Option<DragSession>,
    emitted: Emitted,
    guard: PressGuard,
    dragged: bool,
}

impl DragMachine {
    pub fn new(config: SurfaceConfig) -> Self {
        Self {
            config,
            session: None,
            emitted: Emitted::default(),
            guard: PressGuard::default(),
            dragged: false,
        }
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&DragSession> {
        self.session.as_ref()
    }

    pub fn phase(&self) -> DragPhase {
        match &self.session {
            None => DragPhase::Idle,
            Some(session) if session.started => DragPhase::Dragging,
            Some(_) => DragPhase::Armed,
        }
    }

    /// Task to leave out of its origin day's layout while in flight.
    pub fn hidden_task(&self) -> Option<Uuid> {
        let session = self.session.as_ref()?;
        self.hidden_in_origin(session).then_some(session.subject.task_id)
    }

    /// Hosts call this from the card's own tap handler. Returns false for the
    /// synthetic tap that trails a finished drag.
    pub fn consume_tap(&mut self) -> bool {
        if self.guard.armed {
            self.guard = PressGuard::default();
            debug!("suppressed tap trailing a drag");
            return false;
        }
        true
    }

    pub fn next_frame(&mut self) {
        if self.guard.clear_on_frame {
            self.guard = PressGuard::default();
        }
    }

    #[tracing::instrument(skip(self, subject, hit, observer), fields(task_id = %subject.task_id))]
    pub fn press(
        &mut self,
        subject: DragSubject,
        origin: Point,
        hit: &dyn HitTest,
        observer: &mut dyn DragObserver,
    ) -> bool {
        if self.session.is_some() {
            debug!("press ignored; a gesture is already live");
            return false;
        }
        if self.guard.armed {
            self.guard = PressGuard::default();
            debug!("press swallowed by skip-next-press guard");
            return false;
        }
        if !origin.is_finite() {
            warn!("press with non-finite origin ignored");
            return false;
        }

        let origin_day_index = if self.config.is_timed_grid() {
            subject.day.and_then(|day| self.config.day_index(day))
        } else {
            None
        };
        let candidate_start = subject.metrics.map(|m| m.start_minutes);
        self.dragged = false;
        self.session = Some(DragSession {
            subject,
            origin,
            current: origin,
            started: false,
            origin_day_index,
            candidate_day_index: origin_day_index,
            candidate_start,
            target: None,
            external: false,
        });

        if self.config.capabilities.supports_point_geometry
            && let Some(session) = self.session.as_mut()
        {
            session.target = hit.resolve(origin, Some(session.subject.task_id));
        }
        self.emit(observer);
        true
    }

    pub fn update(&mut self, point: Point, hit: &dyn HitTest, observer: &mut dyn DragObserver) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        self.track(&mut session, point, hit);
        self.session = Some(session);
        self.emit(observer);
    }

    #[tracing::instrument(skip(self, hit, observer))]
    pub fn release(
        &mut self,
        point: Point,
        hit: &dyn HitTest,
        observer: &mut dyn DragObserver,
    ) -> GestureOutcome {
        let Some(mut session) = self.session.take() else {
            return GestureOutcome::Cancelled;
        };
        self.track(&mut session, point, hit);

        if !session.started {
            debug!(task_id = %session.subject.task_id, "released under threshold; treating as tap");
            observer.on_open_detail(session.subject.task_id);
            return GestureOutcome::Tap(session.subject.task_id);
        }

        self.dragged = true;
        let outcome = match session.target.clone() {
            Some(target) => self.intent_for(&session, &target),
            None => self.intent_without_target(&session),
        };
        debug!(?outcome, "drag released");
        outcome
    }

    /// Commits an explicit drop zone, used where the host has no point
    /// geometry to resolve against.
    #[tracing::instrument(skip(self, target))]
    pub fn drop_on_zone(&mut self, target: &DropTarget) -> GestureOutcome {
        let Some(session) = self.session.take() else {
            return GestureOutcome::Cancelled;
        };
        self.dragged = true;
        self.intent_for(&session, target)
    }

    /// Clears every preview. Safe to call any number of times.
    pub fn finalize(&mut self, observer: &mut dyn DragObserver) {
        self.session = None;
        if std::mem::take(&mut self.emitted.preview) {
            observer.on_drag_preview_change(None);
        }
        if self.emitted.day.take().is_some() {
            observer.on_day_hover_change(None);
        }
        if self.emitted.list.take().is_some() {
            observer.on_list_hover_change(None);
        }
        if self.emitted.calendar.take().is_some() {
            observer.on_calendar_preview_change(None);
        }
        if std::mem::take(&mut self.dragged) {
            self.guard = PressGuard {
                armed: true,
                clear_on_frame: true,
            };
        }
    }

    pub fn cancel(&mut self, observer: &mut dyn DragObserver) {
        if let Some(session) = &self.session {
            debug!(task_id = %session.subject.task_id, "drag cancelled");
            if session.started {
                self.dragged = true;
            }
        }
        self.finalize(observer);
    }

    fn track(&self, session: &mut DragSession, point: Point, hit: &dyn HitTest) {
        let geometry = self.config.capabilities.supports_point_geometry;
        if !point.is_finite() {
            trace!("non-finite pointer sample; dropping target");
            if geometry {
                session.target = None;
            }
            return;
        }
        session.current = point;

        let dx = point.x - session.origin.x;
        let dy = point.y - session.origin.y;
        let threshold = self.config.drag_threshold;
        if dx.abs() > threshold || dy.abs() > threshold {
            session.started = true;
        }

        if session.in_grid()
            && let Some(metrics) = session.subject.metrics
        {
            let delta = snap_minutes(
                pixels_to_minutes(dy, self.config.hour_height),
                self.config.snap_minutes,
            );
            let start = i32::try_from(metrics.start_minutes)
                .unwrap_or(i32::MAX)
                .saturating_add(delta);
            session.candidate_start = Some(clamp_start(start, metrics.duration_minutes));
        }

        if self.config.kind == SurfaceKind::WeeklyGrid
            && let (Some(origin_index), Some(width)) =
                (session.origin_day_index, self.config.day_width)
            && width > 0.0
            && !self.config.visible_days.is_empty()
        {
            let last = self.config.visible_days.len() as i64 - 1;
            let shift = (dx / width).round() as i64;
            let index = (origin_index as i64 + shift).clamp(0, last);
            session.candidate_day_index = Some(index as usize);
        }

        if geometry {
            session.target = hit.resolve(point, Some(session.subject.task_id));
        }
        session.external = self.is_external(session);
        trace!(
            dx,
            dy,
            started = session.started,
            candidate_start = ?session.candidate_start,
            target = ?session.target,
            "pointer moved"
        );
    }

    /// Pointer is over something other than the card's own day or list.
    fn is_external(&self, session: &DragSession) -> bool {
        let Some(target) = &session.target else {
            return false;
        };
        match (&session.subject.day, target) {
            (Some(day), DropTarget::CalendarSlot { day_key, .. })
            | (Some(day), DropTarget::Day { day_key, .. })
            | (Some(day), DropTarget::BoardTask { day_key, .. }) => *day_key != day.to_string(),
            (Some(_), _) => true,
            (None, DropTarget::List { list_id }) | (None, DropTarget::Task { list_id, .. }) => {
                session.subject.list_id.as_deref() != Some(list_id.as_str())
            }
            (None, _) => true,
        }
    }

    fn hidden_in_origin(&self, session: &DragSession) -> bool {
        session.started
            && session.subject.day.is_some()
            && (session.external || session.candidate_day_index != session.origin_day_index)
    }

    fn candidate_day(&self, session: &DragSession) -> Option<DayKey> {
        session
            .candidate_day_index
            .and_then(|index| self.config.visible_days.get(index).copied())
    }

    fn slot_start(&self, session: &DragSession, hour: u32) -> u32 {
        let duration = session.subject.duration_minutes();
        let start = match session.candidate_start {
            Some(start) if session.in_grid() => start,
            _ => hour.min(23) * MINUTES_PER_HOUR,
        };
        clamp_start(i32::try_from(start).unwrap_or(i32::MAX), duration)
    }

    fn intent_for(&self, session: &DragSession, target: &DropTarget) -> GestureOutcome {
        let task_id = session.subject.task_id;
        let intent = match target {
            DropTarget::CalendarSlot { day_key, hour } => {
                let Some(day) = parse_day(day_key) else {
                    return GestureOutcome::Cancelled;
                };
                DropIntent::Reschedule {
                    task_id,
                    day,
                    start_minutes: self.slot_start(session, *hour),
                    duration_minutes: session.subject.duration_minutes(),
                }
            }
            DropTarget::Day { day_key, origin } => {
                let Some(day) = parse_day(day_key) else {
                    return GestureOutcome::Cancelled;
                };
                let keep_time = self.config.kind == SurfaceKind::WeeklyGrid
                    && *origin == DayOrigin::WeekGrid
                    && session.in_grid();
                DropIntent::MoveToDay {
                    task_id,
                    day,
                    keep_time,
                }
            }
            DropTarget::List { list_id } => DropIntent::MoveToList {
                task_id,
                list_id: list_id.clone(),
            },
            DropTarget::Task {
                list_id,
                task_id: anchor,
                position,
                ..
            } => DropIntent::InsertInList {
                task_id,
                list_id: list_id.clone(),
                anchor: *anchor,
                position: *position,
            },
            DropTarget::BoardTask {
                day_key,
                task_id: anchor,
                position,
                ..
            } => {
                let Some(day) = parse_day(day_key) else {
                    return GestureOutcome::Cancelled;
                };
                DropIntent::ReorderInDay {
                    task_id,
                    day,
                    anchor: *anchor,
                    position: *position,
                }
            }
        };
        GestureOutcome::Commit(intent)
    }

    fn intent_without_target(&self, session: &DragSession) -> GestureOutcome {
        if self.config.capabilities.supports_point_geometry || !session.in_grid() {
            return GestureOutcome::Cancelled;
        }
        let (Some(day), Some(start_minutes)) =
            (self.candidate_day(session), session.candidate_start)
        else {
            return GestureOutcome::Cancelled;
        };
        GestureOutcome::Commit(DropIntent::Reschedule {
            task_id: session.subject.task_id,
            day,
            start_minutes,
            duration_minutes: session.subject.duration_minutes(),
        })
    }

    fn calendar_preview(&self, session: &DragSession) -> Option<CalendarPreview> {
        if !session.started {
            return None;
        }
        let duration_minutes = session.subject.duration_minutes();
        match &session.target {
            Some(DropTarget::CalendarSlot { day_key, hour }) => Some(CalendarPreview {
                task_id: session.subject.task_id,
                day_key: day_key.clone(),
                start_minutes: self.slot_start(session, *hour),
                duration_minutes,
            }),
            None if !self.config.capabilities.supports_point_geometry && session.in_grid() => {
                Some(CalendarPreview {
                    task_id: session.subject.task_id,
                    day_key: self.candidate_day(session)?.to_string(),
                    start_minutes: session.candidate_start?,
                    duration_minutes,
                })
            }
            _ => None,
        }
    }

    fn emit(&mut self, observer: &mut dyn DragObserver) {
        let Some(session) = &self.session else {
            return;
        };

        let preview = DragPreview {
            task_id: session.subject.task_id,
            origin: session.origin,
            point: session.current,
            started: session.started,
            external: session.external,
            hidden_in_origin: self.hidden_in_origin(session),
        };
        observer.on_drag_preview_change(Some(&preview));
        self.emitted.preview = true;

        let day = if session.started {
            match &session.target {
                Some(target) => target.day_key().map(str::to_string),
                None if !self.config.capabilities.supports_point_geometry => self
                    .candidate_day(session)
                    .filter(|_| session.in_grid())
                    .map(|day| day.to_string()),
                None => None,
            }
        } else {
            None
        };
        if day != self.emitted.day {
            observer.on_day_hover_change(day.as_deref());
            self.emitted.day = day;
        }

        let list = match (&session.target, session.started) {
            (Some(DropTarget::List { list_id }), true) => Some(ListHover {
                list_id: list_id.clone(),
                task_id: None,
                position: None,
            }),
            (
                Some(DropTarget::Task {
                    list_id,
                    task_id,
                    position,
                    ..
                }),
                true,
            ) => Some(ListHover {
                list_id: list_id.clone(),
                task_id: Some(*task_id),
                position: Some(*position),
            }),
            _ => None,
        };
        if list != self.emitted.list {
            observer.on_list_hover_change(list.as_ref());
            self.emitted.list = list;
        }

        let calendar = self.calendar_preview(session);
        if calendar != self.emitted.calendar {
            observer.on_calendar_preview_change(calendar.as_ref());
            self.emitted.calendar = calendar;
        }
    }
}

fn parse_day(raw: &str) -> Option<DayKey> {
    match raw.parse::<DayKey>() {
        Ok(day) => Some(day),
        Err(err) => {
            warn!(day_key = raw, error = %err, "drop target carries a malformed day key");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use planner_shared::{
        CalendarPreview, DayOrigin, DragPreview, DropTarget, InsertPosition, ListHover, Point,
        Rect, RegionTag,
    };
    use uuid::Uuid;

    use super::{DragMachine, DragPhase, DragSubject};
    use crate::config::GeometryConfig;
    use crate::datetime::{DayKey, TaskTimeMetrics};
    use crate::gesture::{
        DragObserver, DropIntent, GestureOutcome, HostCapabilities, NullObserver, SurfaceConfig,
    };
    use crate::hit::{NoHitTest, RegionRegistry};

    #[derive(Default)]
    struct Recorder {
        previews: Vec<Option<DragPreview>>,
        days: Vec<Option<String>>,
        lists: Vec<Option<ListHover>>,
        calendars: Vec<Option<CalendarPreview>>,
        opened: Vec<Uuid>,
    }

    impl DragObserver for Recorder {
        fn on_drag_preview_change(&mut self, preview: Option<&DragPreview>) {
            self.previews.push(preview.cloned());
        }
        fn on_day_hover_change(&mut self, day_key: Option<&str>) {
            self.days.push(day_key.map(str::to_string));
        }
        fn on_list_hover_change(&mut self, hover: Option<&ListHover>) {
            self.lists.push(hover.cloned());
        }
        fn on_calendar_preview_change(&mut self, preview: Option<&CalendarPreview>) {
            self.calendars.push(preview.cloned());
        }
        fn on_open_detail(&mut self, task_id: Uuid) {
            self.opened.push(task_id);
        }
    }

    fn day(d: u32) -> DayKey {
        DayKey::new(NaiveDate::from_ymd_opt(2024, 6, d).expect("valid date"))
    }

    fn timed_subject(on: DayKey, start: u32, duration: u32) -> DragSubject {
        DragSubject {
            task_id: Uuid::new_v4(),
            day: Some(on),
            list_id: None,
            metrics: Some(TaskTimeMetrics {
                start_minutes: start,
                duration_minutes: duration,
            }),
            estimated_minutes: None,
        }
    }

    fn backlog_subject(list: &str) -> DragSubject {
        DragSubject {
            task_id: Uuid::new_v4(),
            day: None,
            list_id: Some(list.to_string()),
            metrics: None,
            estimated_minutes: None,
        }
    }

    fn week() -> Vec<DayKey> {
        (3..=9).map(day).collect()
    }

    #[test]
    fn short_press_opens_detail_without_commit() {
        let config = SurfaceConfig::daily_panel(&GeometryConfig::default(), day(3), HostCapabilities::WEB);
        let mut machine = DragMachine::new(config);
        let mut observer = Recorder::default();
        let subject = backlog_subject("L1");
        let id = subject.task_id;

        assert!(machine.press(subject, Point::new(10.0, 10.0), &NoHitTest, &mut observer));
        machine.update(Point::new(13.0, 14.0), &NoHitTest, &mut observer);
        assert_eq!(machine.phase(), DragPhase::Armed);

        let outcome = machine.release(Point::new(15.0, 15.0), &NoHitTest, &mut observer);
        assert_eq!(outcome, GestureOutcome::Tap(id));
        assert_eq!(observer.opened, vec![id]);

        machine.finalize(&mut observer);
        assert_eq!(machine.phase(), DragPhase::Idle);
        assert!(machine.consume_tap());
    }

    #[test]
    fn threshold_is_per_axis() {
        let config = SurfaceConfig::daily_panel(&GeometryConfig::default(), day(3), HostCapabilities::WEB);
        let mut machine = DragMachine::new(config);
        let mut observer = NullObserver;

        machine.press(backlog_subject("L1"), Point::new(0.0, 0.0), &NoHitTest, &mut observer);
        machine.update(Point::new(5.0, 5.0), &NoHitTest, &mut observer);
        assert_eq!(machine.phase(), DragPhase::Armed);
        machine.update(Point::new(0.0, 7.0), &NoHitTest, &mut observer);
        assert_eq!(machine.phase(), DragPhase::Dragging);
        machine.update(Point::new(0.0, 0.0), &NoHitTest, &mut observer);
        assert_eq!(machine.phase(), DragPhase::Dragging);
    }

    #[test]
    fn backlog_card_onto_hour_slot_reschedules_at_slot_hour() {
        let mut registry = RegionRegistry::new().expect("registry");
        registry.tagged(
            None,
            Rect::new(200.0, 0.0, 120.0, 60.0),
            RegionTag::HourSlot {
                day_key: "2024-06-03".to_string(),
                hour: 14,
            },
        );
        let config = SurfaceConfig::daily_panel(&GeometryConfig::default(), day(3), HostCapabilities::WEB);
        let mut machine = DragMachine::new(config);
        let mut observer = Recorder::default();
        let subject = backlog_subject("L1");
        let id = subject.task_id;

        machine.press(subject, Point::new(20.0, 20.0), &registry, &mut observer);
        machine.update(Point::new(250.0, 30.0), &registry, &mut observer);
        assert_eq!(
            observer.calendars.last().cloned().flatten(),
            Some(CalendarPreview {
                task_id: id,
                day_key: "2024-06-03".to_string(),
                start_minutes: 840,
                duration_minutes: 60,
            })
        );
        assert_eq!(observer.days.last().cloned().flatten().as_deref(), Some("2024-06-03"));

        let outcome = machine.release(Point::new(250.0, 30.0), &registry, &mut observer);
        assert_eq!(
            outcome,
            GestureOutcome::Commit(DropIntent::Reschedule {
                task_id: id,
                day: day(3),
                start_minutes: 840,
                duration_minutes: 60,
            })
        );

        machine.finalize(&mut observer);
        assert_eq!(observer.previews.last(), Some(&None));
        assert_eq!(observer.days.last(), Some(&None));
        assert_eq!(observer.calendars.last(), Some(&None));
    }

    #[test]
    fn hover_callbacks_fire_only_on_change() {
        let mut registry = RegionRegistry::new().expect("registry");
        registry.tagged(
            None,
            Rect::new(0.0, 100.0, 200.0, 400.0),
            RegionTag::List {
                list_id: "L2".to_string(),
            },
        );
        let config = SurfaceConfig::task_board(&GeometryConfig::default(), week(), HostCapabilities::WEB);
        let mut machine = DragMachine::new(config);
        let mut observer = Recorder::default();

        machine.press(backlog_subject("L1"), Point::new(10.0, 10.0), &registry, &mut observer);
        for y in [150.0, 160.0, 170.0] {
            machine.update(Point::new(10.0, y), &registry, &mut observer);
        }
        assert_eq!(observer.lists.len(), 1);
        assert_eq!(observer.previews.len(), 4);
        let last = observer.previews.last().cloned().flatten().expect("preview");
        assert!(last.external);
        assert!(!last.hidden_in_origin);
    }

    #[test]
    fn in_grid_drag_snaps_and_keeps_duration() {
        let mut registry = RegionRegistry::new().expect("registry");
        registry.tagged(
            None,
            Rect::new(0.0, 0.0, 120.0, 1440.0),
            RegionTag::TimedDayColumn {
                day_key: "2024-06-03".to_string(),
                first_hour: 0,
                hour_height: 60.0,
            },
        );
        let config = SurfaceConfig::daily_panel(&GeometryConfig::default(), day(3), HostCapabilities::WEB);
        let mut machine = DragMachine::new(config);
        let mut observer = NullObserver;
        let subject = timed_subject(day(3), 600, 45);
        let id = subject.task_id;

        machine.press(subject, Point::new(50.0, 610.0), &registry, &mut observer);
        // 97px at 60px/hour is 97 minutes, snapping to 90
        let outcome = {
            machine.update(Point::new(50.0, 707.0), &registry, &mut observer);
            machine.release(Point::new(50.0, 707.0), &registry, &mut observer)
        };
        assert_eq!(
            outcome,
            GestureOutcome::Commit(DropIntent::Reschedule {
                task_id: id,
                day: day(3),
                start_minutes: 690,
                duration_minutes: 45,
            })
        );
    }

    #[test]
    fn candidate_start_stays_inside_the_day() {
        let config = SurfaceConfig::daily_panel(&GeometryConfig::default(), day(3), HostCapabilities::NATIVE);
        let mut machine = DragMachine::new(config);
        let mut observer = NullObserver;

        machine.press(timed_subject(day(3), 1380, 60), Point::new(0.0, 0.0), &NoHitTest, &mut observer);
        machine.update(Point::new(0.0, 600.0), &NoHitTest, &mut observer);
        assert_eq!(machine.session().and_then(|s| s.candidate_start), Some(1380));
        machine.update(Point::new(0.0, -5000.0), &NoHitTest, &mut observer);
        assert_eq!(machine.session().and_then(|s| s.candidate_start), Some(0));
    }

    #[test]
    fn weekly_grid_day_index_is_clamped() {
        let config = SurfaceConfig::weekly_grid(&GeometryConfig::default(), week(), HostCapabilities::NATIVE);
        let mut machine = DragMachine::new(config);
        let mut observer = Recorder::default();
        let subject = timed_subject(day(8), 540, 60);
        let id = subject.task_id;

        machine.press(subject, Point::new(700.0, 540.0), &NoHitTest, &mut observer);
        machine.update(Point::new(700.0 + 120.0 * 5.0, 600.0), &NoHitTest, &mut observer);
        assert_eq!(machine.session().and_then(|s| s.candidate_day_index), Some(6));
        assert_eq!(machine.hidden_task(), Some(id));

        machine.update(Point::new(700.0 - 120.0 * 2.0, 600.0), &NoHitTest, &mut observer);
        let outcome = machine.release(Point::new(700.0 - 120.0 * 2.0, 600.0), &NoHitTest, &mut observer);
        assert_eq!(
            outcome,
            GestureOutcome::Commit(DropIntent::Reschedule {
                task_id: id,
                day: day(6),
                start_minutes: 600,
                duration_minutes: 60,
            })
        );
        assert_eq!(observer.days.last().cloned().flatten().as_deref(), Some("2024-06-06"));
    }

    #[test]
    fn missing_target_cancels_on_geometry_hosts() {
        let config = SurfaceConfig::weekly_grid(&GeometryConfig::default(), week(), HostCapabilities::WEB);
        let mut machine = DragMachine::new(config);
        let mut observer = NullObserver;

        machine.press(timed_subject(day(4), 540, 60), Point::new(0.0, 0.0), &NoHitTest, &mut observer);
        machine.update(Point::new(0.0, 300.0), &NoHitTest, &mut observer);
        let outcome = machine.release(Point::new(0.0, 300.0), &NoHitTest, &mut observer);
        assert_eq!(outcome, GestureOutcome::Cancelled);
    }

    #[test]
    fn week_column_drop_keeps_time_only_inside_the_grid() {
        let mut registry = RegionRegistry::new().expect("registry");
        registry.tagged(
            None,
            Rect::new(0.0, 0.0, 100.0, 100.0),
            RegionTag::DayColumn {
                day_key: "2024-06-05".to_string(),
                origin: DayOrigin::WeekGrid,
            },
        );
        let week_config = SurfaceConfig::weekly_grid(&GeometryConfig::default(), week(), HostCapabilities::WEB);
        let mut machine = DragMachine::new(week_config);
        let mut observer = NullObserver;
        let timed = timed_subject(day(4), 540, 60);
        let id = timed.task_id;

        machine.press(timed, Point::new(200.0, 200.0), &registry, &mut observer);
        let outcome = machine.release(Point::new(50.0, 50.0), &registry, &mut observer);
        assert_eq!(
            outcome,
            GestureOutcome::Commit(DropIntent::MoveToDay {
                task_id: id,
                day: day(5),
                keep_time: true,
            })
        );
        machine.finalize(&mut observer);
        machine.next_frame();

        let board_config = SurfaceConfig::task_board(&GeometryConfig::default(), week(), HostCapabilities::WEB);
        let mut board = DragMachine::new(board_config);
        let untimed = backlog_subject("L1");
        let untimed_id = untimed.task_id;
        board.press(untimed, Point::new(200.0, 200.0), &registry, &mut observer);
        let outcome = board.release(Point::new(50.0, 50.0), &registry, &mut observer);
        assert_eq!(
            outcome,
            GestureOutcome::Commit(DropIntent::MoveToDay {
                task_id: untimed_id,
                day: day(5),
                keep_time: false,
            })
        );
    }

    #[test]
    fn guard_swallows_one_trailing_tap() {
        let config = SurfaceConfig::task_board(&GeometryConfig::default(), week(), HostCapabilities::NATIVE);
        let mut machine = DragMachine::new(config);
        let mut observer = NullObserver;

        machine.press(backlog_subject("L1"), Point::new(0.0, 0.0), &NoHitTest, &mut observer);
        machine.update(Point::new(40.0, 0.0), &NoHitTest, &mut observer);
        let target = DropTarget::List {
            list_id: "L2".to_string(),
        };
        assert!(matches!(
            machine.drop_on_zone(&target),
            GestureOutcome::Commit(DropIntent::MoveToList { .. })
        ));
        machine.finalize(&mut observer);
        machine.finalize(&mut observer);

        assert!(!machine.consume_tap());
        assert!(machine.consume_tap());

        machine.press(backlog_subject("L1"), Point::new(0.0, 0.0), &NoHitTest, &mut observer);
        machine.update(Point::new(40.0, 0.0), &NoHitTest, &mut observer);
        machine.release(Point::new(40.0, 0.0), &NoHitTest, &mut observer);
        machine.finalize(&mut observer);
        machine.next_frame();
        assert!(machine.consume_tap());
    }

    #[test]
    fn cancel_commits_nothing_and_clears_previews() {
        let config = SurfaceConfig::daily_panel(&GeometryConfig::default(), day(3), HostCapabilities::WEB);
        let mut machine = DragMachine::new(config);
        let mut observer = Recorder::default();

        machine.press(backlog_subject("L1"), Point::new(0.0, 0.0), &NoHitTest, &mut observer);
        machine.update(Point::new(30.0, 30.0), &NoHitTest, &mut observer);
        machine.cancel(&mut observer);

        assert_eq!(machine.phase(), DragPhase::Idle);
        assert_eq!(observer.previews.last(), Some(&None));
        assert_eq!(
            machine.release(Point::new(30.0, 30.0), &NoHitTest, &mut observer),
            GestureOutcome::Cancelled
        );
    }

    #[test]
    fn drop_between_backlog_rows() {
        let mut registry = RegionRegistry::new().expect("registry");
        let list = registry.tagged(
            None,
            Rect::new(0.0, 0.0, 200.0, 400.0),
            RegionTag::List {
                list_id: "L1".to_string(),
            },
        );
        let anchor = Uuid::new_v4();
        registry.tagged(
            Some(list),
            Rect::new(0.0, 40.0, 200.0, 40.0),
            RegionTag::BacklogTask {
                list_id: "L1".to_string(),
                task_id: anchor,
            },
        );
        let config = SurfaceConfig::daily_panel(&GeometryConfig::default(), day(3), HostCapabilities::WEB);
        let mut machine = DragMachine::new(config);
        let mut observer = Recorder::default();
        let subject = backlog_subject("L1");
        let id = subject.task_id;

        machine.press(subject, Point::new(10.0, 200.0), &registry, &mut observer);
        let outcome = machine.release(Point::new(10.0, 45.0), &registry, &mut observer);
        assert_eq!(
            outcome,
            GestureOutcome::Commit(DropIntent::InsertInList {
                task_id: id,
                list_id: "L1".to_string(),
                anchor,
                position: InsertPosition::Before,
            })
        );
    }
}
