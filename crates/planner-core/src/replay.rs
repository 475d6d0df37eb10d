//! Recorded gesture scripts.
//!
//! A script lays out the droppable regions of one screen and lists the
//! pointer samples of a single gesture. Replaying it drives the matching
//! surface machine and commits whatever the gesture meant.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, anyhow};
use planner_shared::{DropTarget, Point, Rect, RegionTag};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::GeometryConfig;
use crate::datetime::{DayKey, derive_task_time_metrics};
use crate::gesture::{
    DragMachine, DragObserver, DragSubject, GestureOutcome, HostCapabilities, ResizeEdge,
    ResizeMachine, SurfaceConfig, SurfaceKind,
};
use crate::hit::{HitTest, NoHitTest, Region, RegionId, RegionRegistry};
use crate::history::HistoryLog;
use crate::scheduler::{CommitOutcome, MutationSink, Scheduler};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptRegion {
    /// Handle other regions use to name this one as their parent.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    pub bounds: Rect,
    #[serde(default)]
    pub tag: Option<RegionTag>,
    #[serde(default)]
    pub element_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptResize {
    pub edge: ResizeEdge,
    /// Vertical travel of each sample, measured from the grab point.
    pub moves: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayScript {
    pub surface: SurfaceKind,
    pub days: Vec<DayKey>,
    #[serde(default = "default_point_geometry")]
    pub point_geometry: bool,
    pub task_id: Uuid,
    #[serde(default)]
    pub regions: Vec<ScriptRegion>,
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    /// First sample is the press, last is the release.
    #[serde(default)]
    pub pointer: Vec<Point>,
    #[serde(default)]
    pub zone: Option<DropTarget>,
    #[serde(default)]
    pub resize: Option<ScriptResize>,
    #[serde(default)]
    pub cancel: bool,
}

fn default_point_geometry() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    pub outcome: GestureOutcome,
    pub commit: Option<CommitOutcome>,
}

impl ReplayScript {
    #[tracing::instrument]
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse replay script {}", path.display()))
    }

    pub fn registry(&self) -> anyhow::Result<RegionRegistry> {
        let mut registry = RegionRegistry::new()?;
        let mut names: HashMap<&str, RegionId> = HashMap::new();

        for region in &self.regions {
            let parent = match region.parent.as_deref() {
                Some(name) => Some(
                    *names
                        .get(name)
                        .ok_or_else(|| anyhow!("region parent {name} is not declared earlier"))?,
                ),
                None => None,
            };
            let id = registry.register(Region {
                parent,
                bounds: region.bounds,
                tag: region.tag.clone(),
                element_id: region.element_id.clone(),
            });
            if let Some(name) = region.name.as_deref() {
                names.insert(name, id);
            }
        }
        for (element_id, list_id) in &self.aliases {
            registry.alias_container(element_id.clone(), list_id.clone());
        }
        Ok(registry)
    }

    fn surface(&self, geometry: &GeometryConfig) -> anyhow::Result<SurfaceConfig> {
        let capabilities = if self.point_geometry {
            HostCapabilities::WEB
        } else {
            HostCapabilities::NATIVE
        };
        Ok(match self.surface {
            SurfaceKind::DailyPanel => {
                let day = self
                    .days
                    .first()
                    .copied()
                    .ok_or_else(|| anyhow!("daily panel script needs a day"))?;
                SurfaceConfig::daily_panel(geometry, day, capabilities)
            }
            SurfaceKind::WeeklyGrid => {
                SurfaceConfig::weekly_grid(geometry, self.days.clone(), capabilities)
            }
            SurfaceKind::TaskBoard => {
                SurfaceConfig::task_board(geometry, self.days.clone(), capabilities)
            }
        })
    }
}

/// Plays `script` against `scheduler` and commits the result.
#[tracing::instrument(skip(script, scheduler, geometry, observer), fields(task_id = %script.task_id))]
pub fn replay<S, L>(
    script: &ReplayScript,
    scheduler: &mut Scheduler<S, L>,
    geometry: &GeometryConfig,
    observer: &mut dyn DragObserver,
) -> anyhow::Result<ReplayReport>
where
    S: MutationSink,
    L: HistoryLog,
{
    let outcome = match &script.resize {
        Some(resize) => replay_resize(script, resize, scheduler, geometry, observer)?,
        None => replay_drag(script, scheduler, geometry, observer)?,
    };

    let commit = match &outcome {
        GestureOutcome::Commit(intent) => Some(scheduler.apply(intent)?),
        GestureOutcome::Tap(_) | GestureOutcome::Cancelled => None,
    };
    info!(?outcome, ?commit, "replay finished");
    Ok(ReplayReport { outcome, commit })
}

fn replay_drag<S, L>(
    script: &ReplayScript,
    scheduler: &Scheduler<S, L>,
    geometry: &GeometryConfig,
    observer: &mut dyn DragObserver,
) -> anyhow::Result<GestureOutcome>
where
    S: MutationSink,
    L: HistoryLog,
{
    let task = scheduler
        .task(script.task_id)
        .ok_or_else(|| anyhow!("task not found: {}", script.task_id))?;
    let (press, rest) = script
        .pointer
        .split_first()
        .ok_or_else(|| anyhow!("drag script needs at least one pointer sample"))?;

    let registry = script.registry()?;
    let hit: &dyn HitTest = if script.point_geometry { &registry } else { &NoHitTest };
    let mut machine = DragMachine::new(script.surface(geometry)?);
    let subject = DragSubject::from_task(task, scheduler.timezone());
    if !machine.press(subject, *press, hit, observer) {
        return Err(anyhow!("press at {press:?} was not accepted"));
    }

    let outcome = if script.cancel {
        for point in rest {
            machine.update(*point, hit, observer);
        }
        machine.cancel(observer);
        GestureOutcome::Cancelled
    } else if let Some(zone) = &script.zone {
        for point in rest {
            machine.update(*point, hit, observer);
        }
        machine.drop_on_zone(zone)
    } else {
        let (release, moves): (&Point, &[Point]) = match rest.split_last() {
            Some(split) => split,
            None => (press, &[]),
        };
        for point in moves {
            machine.update(*point, hit, observer);
        }
        machine.release(*release, hit, observer)
    };
    machine.finalize(observer);
    debug!(?outcome, "drag replayed");
    Ok(outcome)
}

fn replay_resize<S, L>(
    script: &ReplayScript,
    resize: &ScriptResize,
    scheduler: &Scheduler<S, L>,
    geometry: &GeometryConfig,
    observer: &mut dyn DragObserver,
) -> anyhow::Result<GestureOutcome>
where
    S: MutationSink,
    L: HistoryLog,
{
    let task = scheduler
        .task(script.task_id)
        .ok_or_else(|| anyhow!("task not found: {}", script.task_id))?;
    let metrics = derive_task_time_metrics(task, scheduler.timezone())
        .ok_or_else(|| anyhow!("task {} has no planned time to resize", task.id))?;
    let day = task
        .effective_day()
        .map(DayKey::new)
        .ok_or_else(|| anyhow!("task {} is not on a day", task.id))?;

    let mut machine = ResizeMachine::new(geometry.hour_height, geometry.snap_minutes);
    machine.grant(task.id, day, metrics, resize.edge);
    if script.cancel {
        for dy in &resize.moves {
            machine.drag(*dy, observer);
        }
        machine.terminate(observer);
        return Ok(GestureOutcome::Cancelled);
    }
    for dy in &resize.moves {
        machine.drag(*dy, observer);
    }
    Ok(match machine.release(observer) {
        Some(intent) => GestureOutcome::Commit(intent),
        None => GestureOutcome::Cancelled,
    })
}
