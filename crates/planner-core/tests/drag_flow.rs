use std::fs;

use chrono::{TimeZone, Utc};
use planner_core::config::GeometryConfig;
use planner_core::datastore::DataStore;
use planner_core::datetime::DayKey;
use planner_core::gesture::{
    DragMachine, DragObserver, DragSubject, DropIntent, GestureOutcome, HostCapabilities,
    NullObserver, SurfaceConfig,
};
use planner_core::hit::RegionRegistry;
use planner_core::replay::{ReplayScript, replay};
use planner_core::scheduler::{CommitOutcome, Scheduler, UndoOutcome};
use planner_core::task::Task;
use planner_shared::{DropTarget, InsertPosition, Point, Rect, RegionTag};
use tempfile::tempdir;
use uuid::Uuid;

#[derive(Default)]
struct DetailRecorder {
    opened: Vec<Uuid>,
}

impl DragObserver for DetailRecorder {
    fn on_open_detail(&mut self, task_id: Uuid) {
        self.opened.push(task_id);
    }
}

fn june_3() -> DayKey {
    DayKey::new(
        chrono::NaiveDate::from_ymd_opt(2024, 6, 3).expect("valid date"),
    )
}

fn backlog_task(title: &str, list: &str, rank: f64) -> Task {
    let now = Utc
        .with_ymd_and_hms(2024, 6, 1, 9, 0, 0)
        .single()
        .expect("valid now");
    let mut task = Task::new_backlog(title.to_string(), Some(list.to_string()), now);
    task.sort_rank = Some(rank);
    task
}

fn open_scheduler(store: &DataStore) -> Scheduler<DataStore, DataStore> {
    let tasks = store.load_tasks().expect("load tasks");
    Scheduler::new(tasks, chrono_tz::UTC, "inbox", store.clone(), store.clone())
}

#[test]
fn backlog_card_dropped_on_hour_slot_is_scheduled_and_undoable() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let task = backlog_task("write report", "L1", 1.0);
    store.save_tasks(&[task.clone()]).expect("seed");

    let mut scheduler = open_scheduler(&store);
    let mut registry = RegionRegistry::new().expect("registry");
    registry.tagged(
        None,
        Rect::new(0.0, 0.0, 200.0, 400.0),
        RegionTag::List {
            list_id: "L1".to_string(),
        },
    );
    registry.tagged(
        None,
        Rect::new(300.0, 840.0, 200.0, 60.0),
        RegionTag::HourSlot {
            day_key: "2024-06-03".to_string(),
            hour: 14,
        },
    );

    let surface = SurfaceConfig::daily_panel(&GeometryConfig::default(), june_3(), HostCapabilities::WEB);
    let mut machine = DragMachine::new(surface);
    let mut observer = NullObserver;
    let subject = DragSubject::from_task(&task, scheduler.timezone());

    assert!(machine.press(subject, Point::new(20.0, 20.0), &registry, &mut observer));
    machine.update(Point::new(320.0, 850.0), &registry, &mut observer);
    let outcome = machine.release(Point::new(320.0, 860.0), &registry, &mut observer);
    machine.finalize(&mut observer);

    let GestureOutcome::Commit(intent) = outcome else {
        panic!("expected a commit, got {outcome:?}");
    };
    assert_eq!(
        intent,
        DropIntent::Reschedule {
            task_id: task.id,
            day: june_3(),
            start_minutes: 840,
            duration_minutes: 60,
        }
    );
    assert_eq!(scheduler.apply(&intent).expect("apply"), CommitOutcome::Committed);

    let stored = store.load_tasks().expect("reload");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].due_date, Some(june_3().date()));
    assert_eq!(stored[0].planned_start, Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).single());
    assert_eq!(stored[0].planned_end, Utc.with_ymd_and_hms(2024, 6, 3, 15, 0, 0).single());
    assert_eq!(store.load_history().expect("history").len(), 1);
    assert!(scheduler.backlog("L1").is_empty());
    assert_eq!(scheduler.scheduled(june_3()).len(), 1);

    assert!(matches!(scheduler.undo().expect("undo"), UndoOutcome::Applied { .. }));
    let restored = store.load_tasks().expect("reload");
    assert_eq!(restored[0].due_date, None);
    assert_eq!(restored[0].planned_start, None);
    assert_eq!(restored[0].planned_end, None);
    assert_eq!(restored[0].list_id.as_deref(), Some("L1"));
    assert!(restored[0].in_backlog());
    assert_eq!(scheduler.backlog("L1").len(), 1);
    assert!(scheduler.scheduled(june_3()).is_empty());
    assert!(scheduler.can_redo());

    assert!(matches!(scheduler.redo().expect("redo"), UndoOutcome::Applied { .. }));
    assert_eq!(scheduler.scheduled(june_3()).len(), 1);
    assert!(!machine.consume_tap());
}

fn move_to(scheduler: &mut Scheduler<DataStore, DataStore>, task_id: Uuid, list_id: &str) {
    let intent = DropIntent::MoveToList {
        task_id,
        list_id: list_id.to_string(),
    };
    assert_eq!(scheduler.apply(&intent).expect("apply"), CommitOutcome::Committed);
}

fn stored_list(store: &DataStore) -> Option<String> {
    store.load_tasks().expect("reload")[0].list_id.clone()
}

#[test]
fn undo_after_reload_continues_below_undone_action() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let task = backlog_task("file taxes", "L1", 1.0);
    store.save_tasks(&[task.clone()]).expect("seed");

    let mut first = open_scheduler(&store);
    move_to(&mut first, task.id, "L2");
    move_to(&mut first, task.id, "L3");
    first.undo().expect("undo");
    assert_eq!(stored_list(&store).as_deref(), Some("L2"));
    drop(first);

    let mut second = open_scheduler(&store);
    second.hydrate();
    assert!(second.can_undo());
    assert!(matches!(second.undo().expect("undo"), UndoOutcome::Applied { .. }));
    assert_eq!(stored_list(&store).as_deref(), Some("L1"));
    assert!(!second.has_history());
    assert_eq!(second.undo().expect("undo"), UndoOutcome::Nothing);
    assert_eq!(stored_list(&store).as_deref(), Some("L1"));
}

#[test]
fn redo_survives_reload_and_fresh_move_clears_it() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let task = backlog_task("book flights", "L1", 1.0);
    store.save_tasks(&[task.clone()]).expect("seed");

    let mut first = open_scheduler(&store);
    move_to(&mut first, task.id, "L2");
    move_to(&mut first, task.id, "L3");
    first.undo().expect("undo");
    first.undo().expect("undo");
    assert_eq!(stored_list(&store).as_deref(), Some("L1"));
    drop(first);

    let mut second = open_scheduler(&store);
    assert!(matches!(second.redo().expect("redo"), UndoOutcome::Applied { .. }));
    assert_eq!(stored_list(&store).as_deref(), Some("L2"));
    drop(second);

    let mut third = open_scheduler(&store);
    move_to(&mut third, task.id, "L4");
    assert_eq!(third.redo().expect("redo"), UndoOutcome::Nothing);
    assert_eq!(stored_list(&store).as_deref(), Some("L4"));
    assert_eq!(store.load_history().expect("history").len(), 2);
}

#[test]
fn tap_under_threshold_opens_detail_without_writing() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let task = backlog_task("call bank", "L1", 1.0);
    store.save_tasks(&[task.clone()]).expect("seed");
    let scheduler = open_scheduler(&store);

    let surface = SurfaceConfig::daily_panel(&GeometryConfig::default(), june_3(), HostCapabilities::WEB);
    let mut machine = DragMachine::new(surface);
    let registry = RegionRegistry::new().expect("registry");
    let mut observer = DetailRecorder::default();

    let subject = DragSubject::from_task(&task, scheduler.timezone());
    assert!(machine.press(subject, Point::new(50.0, 50.0), &registry, &mut observer));
    machine.update(Point::new(53.0, 54.0), &registry, &mut observer);
    let outcome = machine.release(Point::new(54.0, 52.0), &registry, &mut observer);
    machine.finalize(&mut observer);

    assert_eq!(outcome, GestureOutcome::Tap(task.id));
    assert_eq!(observer.opened, vec![task.id]);
    assert!(machine.consume_tap());
    assert_eq!(store.load_tasks().expect("reload"), vec![task]);
    assert!(store.load_history().expect("history").is_empty());
}

#[test]
fn dropping_into_current_slot_writes_nothing() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let first = backlog_task("first", "L1", 1.0);
    let second = backlog_task("second", "L1", 2.0);
    store.save_tasks(&[first.clone(), second.clone()]).expect("seed");

    let mut scheduler = open_scheduler(&store);
    let surface = SurfaceConfig::task_board(&GeometryConfig::default(), vec![june_3()], HostCapabilities::NATIVE);
    let mut machine = DragMachine::new(surface);
    let registry = RegionRegistry::new().expect("registry");
    let mut observer = NullObserver;

    let subject = DragSubject::from_task(&first, scheduler.timezone());
    assert!(machine.press(subject, Point::new(0.0, 0.0), &registry, &mut observer));
    let outcome = machine.drop_on_zone(&DropTarget::Task {
        list_id: "L1".to_string(),
        task_id: second.id,
        position: InsertPosition::Before,
        y_fraction: 0.2,
    });
    machine.finalize(&mut observer);

    let GestureOutcome::Commit(intent) = outcome else {
        panic!("expected a commit, got {outcome:?}");
    };
    assert_eq!(scheduler.apply(&intent).expect("apply"), CommitOutcome::Suppressed);
    assert!(!scheduler.can_undo());
    assert!(store.load_history().expect("history").is_empty());
}

#[test]
fn replay_script_moves_card_to_aliased_list() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let task = backlog_task("pack bags", "L1", 1.0);
    store.save_tasks(&[task.clone()]).expect("seed");
    let mut scheduler = open_scheduler(&store);

    let script_path = temp.path().join("move.json");
    let script = format!(
        r#"{{
            "surface": "task_board",
            "days": ["2024-06-03"],
            "task_id": "{}",
            "regions": [
                {{"bounds": {{"x": 0, "y": 0, "width": 200, "height": 400}},
                  "tag": {{"kind": "list", "listId": "L1"}}}},
                {{"name": "sidebar", "bounds": {{"x": 400, "y": 0, "width": 200, "height": 400}},
                  "element_id": "someday-container"}},
                {{"parent": "sidebar", "bounds": {{"x": 400, "y": 0, "width": 200, "height": 40}}}}
            ],
            "aliases": {{"someday-container": "L2"}},
            "pointer": [{{"x": 20, "y": 20}}, {{"x": 200, "y": 30}}, {{"x": 450, "y": 20}}]
        }}"#,
        task.id
    );
    fs::write(&script_path, script).expect("write script");

    let script = ReplayScript::from_path(&script_path).expect("load script");
    let report = replay(&script, &mut scheduler, &GeometryConfig::default(), &mut NullObserver)
        .expect("replay");

    assert_eq!(
        report.outcome,
        GestureOutcome::Commit(DropIntent::MoveToList {
            task_id: task.id,
            list_id: "L2".to_string(),
        })
    );
    assert_eq!(report.commit, Some(CommitOutcome::Committed));
    let stored = store.load_tasks().expect("reload");
    assert_eq!(stored[0].list_id.as_deref(), Some("L2"));
    assert_eq!(scheduler.lists(), vec!["L2".to_string(), "inbox".to_string()]);
}
