use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, anyhow};
use chrono::{Duration, NaiveDate};
use planner_shared::{DropTarget, InsertPosition, Point};
use regex::Regex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::cli::Command;
use crate::config::{Config, GeometryConfig};
use crate::datetime::{
    DEFAULT_DURATION_MINUTES, DayKey, DayWindow, MINUTES_PER_DAY, PlannerDay, local_instant,
    parse_day_expr,
};
use crate::gesture::{
    DragMachine, DragSubject, GestureOutcome, HostCapabilities, NullObserver, SurfaceConfig,
};
use crate::hit::NoHitTest;
use crate::history::HistoryLog;
use crate::rank::rank_after_last;
use crate::render::{Renderer, short_id};
use crate::replay::{ReplayScript, replay};
use crate::scheduler::{CommitOutcome, MutationSink, Scheduler, UndoOutcome};
use crate::task::Task;

const REVEAL_MARGIN_DAYS: u32 = 1;

#[instrument(skip(scheduler, cfg, renderer))]
pub fn dispatch<S, L>(
    command: Command,
    scheduler: &mut Scheduler<S, L>,
    cfg: &Config,
    renderer: &mut Renderer,
    today: NaiveDate,
) -> anyhow::Result<()>
where
    S: MutationSink,
    L: HistoryLog,
{
    debug!(?command, %today, "dispatching command");
    match command {
        Command::Add {
            title,
            list,
            day,
            at,
            minutes,
        } => {
            let task = build_task(
                scheduler,
                &title.join(" "),
                list,
                day.as_deref(),
                at.as_deref(),
                minutes,
                today,
            )?;
            let id = task.id;
            scheduler.add_task(task)?;
            renderer.print_line(&format!("Created task {}.", short_id(id)))
        }
        Command::Backlog { list } => {
            let list = list.unwrap_or_else(|| cfg.default_list());
            let rows = scheduler.backlog(&list);
            renderer.print_backlog(&list, &rows)
        }
        Command::Lists => {
            let rows: Vec<(String, usize)> = scheduler
                .lists()
                .into_iter()
                .map(|list| {
                    let count = scheduler.backlog(&list).len();
                    (list, count)
                })
                .collect();
            renderer.print_lists(&rows)
        }
        Command::Agenda { day } => {
            let date = match day {
                Some(expr) => parse_day_expr(&expr, today)?,
                None => today,
            };
            let key = DayKey::new(date);
            let rows = scheduler.scheduled(key);
            let layout = scheduler.layout(key, &HashSet::new());
            renderer.print_agenda(&PlannerDay::new(date), &rows, &layout, scheduler.timezone())
        }
        Command::Days {
            before,
            after,
            around,
        } => {
            let before = match before {
                Some(n) => n,
                None => cfg.get_u32("window.days_before")?.unwrap_or(7),
            };
            let after = match after {
                Some(n) => n,
                None => cfg.get_u32("window.days_after")?.unwrap_or(14),
            };
            let mut window = DayWindow::new(before, after);
            if let Some(expr) = around {
                let date = parse_day_expr(&expr, today)?;
                window.reveal((date - today).num_days(), REVEAL_MARGIN_DAYS);
            }
            let days = window.days(today);
            let counts: HashMap<DayKey, usize> = days
                .iter()
                .map(|day| (day.key, scheduler.scheduled(day.key).len()))
                .collect();
            renderer.print_days(&days, &counts, today)
        }
        Command::Drop { task, target } => {
            let id = resolve_task_ref(scheduler, &task)?;
            let target = parse_drop_target(scheduler, &target, today)?;
            let outcome = drop_task(scheduler, cfg, id, &target)?;
            renderer.print_line(&describe_commit(id, outcome))
        }
        Command::Replay { script } => {
            let report = run_replay(scheduler, cfg, &script)?;
            let message = match (&report.outcome, report.commit) {
                (GestureOutcome::Tap(id), _) => {
                    format!("Tap on task {}; nothing moved.", short_id(*id))
                }
                (GestureOutcome::Cancelled, _) => "Gesture cancelled; nothing moved.".to_string(),
                (GestureOutcome::Commit(intent), commit) => describe_commit(intent.task_id(), commit),
            };
            renderer.print_line(&message)
        }
        Command::Undo => {
            scheduler.hydrate();
            let message = match scheduler.undo()? {
                UndoOutcome::Applied { task_id, action } => {
                    format!("Undid {action:?} of task {}.", short_id(task_id))
                }
                UndoOutcome::Nothing => "Nothing to undo.".to_string(),
            };
            renderer.print_line(&message)
        }
        Command::Redo => {
            let message = match scheduler.redo()? {
                UndoOutcome::Applied { task_id, action } => {
                    format!("Redid {action:?} of task {}.", short_id(task_id))
                }
                UndoOutcome::Nothing => "Nothing to redo.".to_string(),
            };
            renderer.print_line(&message)
        }
    }
}

fn describe_commit(id: Uuid, outcome: Option<CommitOutcome>) -> String {
    match outcome {
        Some(CommitOutcome::Committed) => format!("Moved task {}.", short_id(id)),
        Some(CommitOutcome::Suppressed) => format!("Task {} is already there.", short_id(id)),
        None => format!("Task {} was not moved.", short_id(id)),
    }
}

/// Commits a drop without pointer geometry, the way a touch host's explicit
/// drop zones do.
#[instrument(skip(scheduler, cfg, target))]
pub fn drop_task<S, L>(
    scheduler: &mut Scheduler<S, L>,
    cfg: &Config,
    id: Uuid,
    target: &DropTarget,
) -> anyhow::Result<Option<CommitOutcome>>
where
    S: MutationSink,
    L: HistoryLog,
{
    let task = scheduler
        .task(id)
        .ok_or_else(|| anyhow!("task not found: {id}"))?;
    let geometry = GeometryConfig::from_config(cfg)?;
    let subject = DragSubject::from_task(task, scheduler.timezone());
    let mut machine = DragMachine::new(SurfaceConfig::task_board(
        &geometry,
        Vec::new(),
        HostCapabilities::NATIVE,
    ));
    let mut observer = NullObserver;

    machine.press(subject, Point::default(), &NoHitTest, &mut observer);
    let outcome = machine.drop_on_zone(target);
    machine.finalize(&mut observer);

    match outcome {
        GestureOutcome::Commit(intent) => Ok(Some(scheduler.apply(&intent)?)),
        GestureOutcome::Tap(_) | GestureOutcome::Cancelled => Ok(None),
    }
}

#[instrument(skip(scheduler, cfg))]
pub fn run_replay<S, L>(
    scheduler: &mut Scheduler<S, L>,
    cfg: &Config,
    path: &Path,
) -> anyhow::Result<crate::replay::ReplayReport>
where
    S: MutationSink,
    L: HistoryLog,
{
    let script = ReplayScript::from_path(path)?;
    let geometry = GeometryConfig::from_config(cfg)?;
    let mut observer = NullObserver;
    replay(&script, scheduler, &geometry, &mut observer)
}

/// Finds a task by full id or by an unambiguous id prefix.
pub fn resolve_task_ref<S, L>(scheduler: &Scheduler<S, L>, raw: &str) -> anyhow::Result<Uuid>
where
    S: MutationSink,
    L: HistoryLog,
{
    let needle = raw.trim().to_ascii_lowercase().replace('-', "");
    if needle.is_empty() {
        return Err(anyhow!("empty task reference"));
    }
    let matches: Vec<Uuid> = scheduler
        .tasks()
        .iter()
        .filter(|task| task.id.simple().to_string().starts_with(&needle))
        .map(|task| task.id)
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(anyhow!("no task matches {raw}")),
        _ => Err(anyhow!("{raw} matches {} tasks; use more characters", matches.len())),
    }
}

/// Parses `list:ID`, `day:EXPR`, `slot:EXPR@HOUR`, `before:TASK` and
/// `after:TASK`.
#[instrument(skip(scheduler))]
pub fn parse_drop_target<S, L>(
    scheduler: &Scheduler<S, L>,
    raw: &str,
    today: NaiveDate,
) -> anyhow::Result<DropTarget>
where
    S: MutationSink,
    L: HistoryLog,
{
    let (kind, rest) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("drop target must look like kind:value, got {raw}"))?;
    let rest = rest.trim();

    match kind.trim().to_ascii_lowercase().as_str() {
        "list" => {
            if rest.is_empty() {
                return Err(anyhow!("list target needs a list id"));
            }
            Ok(DropTarget::List {
                list_id: rest.to_string(),
            })
        }
        "day" => Ok(DropTarget::Day {
            day_key: DayKey::new(parse_day_expr(rest, today)?).to_string(),
            origin: planner_shared::DayOrigin::Board,
        }),
        "slot" => {
            let (day, hour) = rest
                .rsplit_once('@')
                .ok_or_else(|| anyhow!("slot target must look like slot:DAY@HOUR, got {raw}"))?;
            let hour: u32 = hour
                .trim()
                .parse()
                .with_context(|| format!("invalid hour in {raw}"))?;
            if hour > 23 {
                return Err(anyhow!("hour must be 0-23, got {hour}"));
            }
            Ok(DropTarget::CalendarSlot {
                day_key: DayKey::new(parse_day_expr(day, today)?).to_string(),
                hour,
            })
        }
        "before" | "after" => {
            let position = if kind.trim().eq_ignore_ascii_case("before") {
                InsertPosition::Before
            } else {
                InsertPosition::After
            };
            let anchor_id = resolve_task_ref(scheduler, rest)?;
            let anchor = scheduler
                .task(anchor_id)
                .ok_or_else(|| anyhow!("task not found: {anchor_id}"))?;
            let y_fraction = match position {
                InsertPosition::Before => 0.0,
                InsertPosition::After => 1.0,
            };
            Ok(match anchor.effective_day() {
                Some(day) => DropTarget::BoardTask {
                    day_key: DayKey::new(day).to_string(),
                    task_id: anchor_id,
                    position,
                    y_fraction,
                },
                None => DropTarget::Task {
                    list_id: anchor.bucket(scheduler.default_list()).to_string(),
                    task_id: anchor_id,
                    position,
                    y_fraction,
                },
            })
        }
        other => Err(anyhow!("unknown drop target kind: {other}")),
    }
}

/// `HH:MM` to minutes past midnight.
pub fn parse_clock(raw: &str) -> anyhow::Result<u32> {
    let re = Regex::new(r"^(?P<h>\d{1,2}):(?P<m>\d{2})$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;
    let caps = re
        .captures(raw.trim())
        .ok_or_else(|| anyhow!("expected HH:MM, got {raw}"))?;
    let hour: u32 = caps["h"].parse().with_context(|| format!("invalid hour in {raw}"))?;
    let minute: u32 = caps["m"].parse().with_context(|| format!("invalid minute in {raw}"))?;
    if hour > 23 || minute > 59 {
        return Err(anyhow!("time out of range: {raw}"));
    }
    Ok(hour * 60 + minute)
}

fn build_task<S, L>(
    scheduler: &Scheduler<S, L>,
    title: &str,
    list: Option<String>,
    day: Option<&str>,
    at: Option<&str>,
    minutes: Option<u32>,
    today: NaiveDate,
) -> anyhow::Result<Task>
where
    S: MutationSink,
    L: HistoryLog,
{
    let title = title.trim();
    if title.is_empty() {
        return Err(anyhow!("task title cannot be empty"));
    }
    let now = chrono::Utc::now();
    let mut task = Task::new_backlog(title.to_string(), list, now);
    task.estimated_minutes = minutes.filter(|m| *m > 0);

    let Some(expr) = day else {
        let bucket = task.bucket(scheduler.default_list()).to_string();
        let ranks: Vec<(Uuid, f64)> = scheduler
            .backlog(&bucket)
            .into_iter()
            .map(|t| (t.id, t.rank()))
            .collect();
        task.sort_rank = Some(rank_after_last(&ranks, task.id));
        return Ok(task);
    };

    let date = parse_day_expr(expr, today)?;
    let key = DayKey::new(date);
    task.due_date = Some(date);
    let ranks: Vec<(Uuid, f64)> = scheduler
        .board(key)
        .into_iter()
        .map(|t| (t.id, t.rank()))
        .collect();
    task.sort_rank = Some(rank_after_last(&ranks, task.id));

    if let Some(at) = at {
        let start_minutes = parse_clock(at)?;
        let duration = minutes
            .filter(|m| *m > 0)
            .unwrap_or(DEFAULT_DURATION_MINUTES)
            .min(MINUTES_PER_DAY - start_minutes);
        let start = local_instant(date, start_minutes, scheduler.timezone())?;
        task.planned_start = Some(start);
        task.planned_end = Some(start + Duration::minutes(i64::from(duration)));
    }
    info!(task_id = %task.id, day = %key, "built scheduled task");
    Ok(task)
}
