//! Coordinate hit-testing for drag and drop.
//!
//! Every droppable region registers its screen bounds, an optional parent
//! and an optional typed tag. Resolving a point walks the regions under it
//! front to back and, for each, climbs to the nearest tagged ancestor.

use std::collections::HashMap;

use planner_shared::{DropTarget, InsertPosition, Point, Rect, RegionTag};
use regex::Regex;
use tracing::trace;
use uuid::Uuid;

const LAST_HOUR: u32 = 23;
const LIST_ID_PATTERN: &str = r"^(?:backlog-list|list-drop)-(?P<id>.+)$";

/// Anything that can turn a pointer position into a drop target.
pub trait HitTest {
    fn resolve(&self, point: Point, dragging: Option<Uuid>) -> Option<DropTarget>;
}

/// Hosts without point geometry hand this to the gesture machines.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHitTest;

impl HitTest for NoHitTest {
    fn resolve(&self, _point: Point, _dragging: Option<Uuid>) -> Option<DropTarget> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(usize);

#[derive(Debug, Clone)]
pub struct Region {
    pub parent: Option<RegionId>,
    pub bounds: Rect,
    pub tag: Option<RegionTag>,
    pub element_id: Option<String>,
}

#[derive(Debug)]
pub struct RegionRegistry {
    regions: Vec<Region>,
    aliases: HashMap<String, String>,
    list_id_re: Regex,
}

impl RegionRegistry {
    pub fn new() -> anyhow::Result<Self> {
        let list_id_re = Regex::new(LIST_ID_PATTERN)
            .map_err(|e| anyhow::anyhow!("internal regex compile failure: {e}"))?;
        Ok(Self {
            regions: Vec::new(),
            aliases: HashMap::new(),
            list_id_re,
        })
    }

    /// Registers a region. Later registrations sit on top of earlier ones,
    /// so children must be registered after their parents.
    pub fn register(&mut self, region: Region) -> RegionId {
        let id = RegionId(self.regions.len());
        self.regions.push(region);
        id
    }

    pub fn tagged(&mut self, parent: Option<RegionId>, bounds: Rect, tag: RegionTag) -> RegionId {
        self.register(Region {
            parent,
            bounds,
            tag: Some(tag),
            element_id: None,
        })
    }

    pub fn plain(&mut self, parent: Option<RegionId>, bounds: Rect) -> RegionId {
        self.register(Region {
            parent,
            bounds,
            tag: None,
            element_id: None,
        })
    }

    pub fn named(
        &mut self,
        parent: Option<RegionId>,
        bounds: Rect,
        element_id: impl Into<String>,
    ) -> RegionId {
        self.register(Region {
            parent,
            bounds,
            tag: None,
            element_id: Some(element_id.into()),
        })
    }

    /// Maps a well-known container identifier straight to a list.
    pub fn alias_container(&mut self, element_id: impl Into<String>, list_id: impl Into<String>) {
        self.aliases.insert(element_id.into(), list_id.into());
    }

    /// Drops all regions, e.g. before the host re-registers after a layout
    /// pass. Aliases survive.
    pub fn clear(&mut self) {
        self.regions.clear();
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.0)
    }

    /// Regions containing `point`, frontmost first.
    pub fn regions_at(&self, point: Point) -> Vec<RegionId> {
        if !point.is_finite() {
            return Vec::new();
        }
        (0..self.regions.len())
            .rev()
            .filter(|idx| self.regions[*idx].bounds.contains(point))
            .map(RegionId)
            .collect()
    }

    /// The region itself followed by its ancestors.
    pub fn ancestors(&self, id: RegionId) -> Ancestors<'_> {
        Ancestors {
            registry: self,
            next: Some(id),
            steps: 0,
        }
    }

    pub fn resolve_xy(&self, x: f64, y: f64, dragging: Option<Uuid>) -> Option<DropTarget> {
        self.resolve(Point::new(x, y), dragging)
    }

    fn target_for_chain(&self, start: RegionId, point: Point, dragging: Option<Uuid>) -> Option<DropTarget> {
        for id in self.ancestors(start) {
            let region = &self.regions[id.0];
            let Some(tag) = &region.tag else {
                continue;
            };
            if let Some(target) = target_for_tag(tag, region.bounds, point, dragging) {
                return Some(target);
            }
        }

        self.ancestors(start).find_map(|id| {
            let element_id = self.regions[id.0].element_id.as_deref()?;
            self.list_for_element(element_id)
                .map(|list_id| DropTarget::List { list_id })
        })
    }

    fn list_for_element(&self, element_id: &str) -> Option<String> {
        if let Some(list_id) = self.aliases.get(element_id) {
            return Some(list_id.clone());
        }
        self.list_id_re
            .captures(element_id)
            .and_then(|caps| caps.name("id"))
            .map(|m| m.as_str().to_string())
    }
}

impl HitTest for RegionRegistry {
    fn resolve(&self, point: Point, dragging: Option<Uuid>) -> Option<DropTarget> {
        if !point.is_finite() {
            trace!(x = point.x, y = point.y, "ignoring non-finite pointer");
            return None;
        }
        let target = self
            .regions_at(point)
            .into_iter()
            .find_map(|id| self.target_for_chain(id, point, dragging));
        trace!(?target, "resolved drop target");
        target
    }
}

pub struct Ancestors<'a> {
    registry: &'a RegionRegistry,
    next: Option<RegionId>,
    steps: usize,
}

impl Iterator for Ancestors<'_> {
    type Item = RegionId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        // a parent cycle would otherwise never end
        if self.steps > self.registry.regions.len() {
            return None;
        }
        self.steps += 1;
        let region = self.registry.get(current)?;
        self.next = region.parent;
        Some(current)
    }
}

/// Target for one tag, or `None` when the tag cannot accept this drop
/// (the dragged task's own row) and the walk should keep climbing.
fn target_for_tag(tag: &RegionTag, bounds: Rect, point: Point, dragging: Option<Uuid>) -> Option<DropTarget> {
    match tag {
        RegionTag::BacklogTask { list_id, task_id } => {
            if dragging == Some(*task_id) {
                return None;
            }
            let y_fraction = bounds.y_fraction(point.y);
            Some(DropTarget::Task {
                list_id: list_id.clone(),
                task_id: *task_id,
                position: InsertPosition::from_fraction(y_fraction),
                y_fraction,
            })
        }
        RegionTag::BoardTask { day_key, task_id } => {
            if dragging == Some(*task_id) {
                return None;
            }
            let y_fraction = bounds.y_fraction(point.y);
            Some(DropTarget::BoardTask {
                day_key: day_key.clone(),
                task_id: *task_id,
                position: InsertPosition::from_fraction(y_fraction),
                y_fraction,
            })
        }
        RegionTag::BacklogDropRow {
            list_id,
            task_id,
            position,
        } => {
            if dragging == Some(*task_id) {
                return None;
            }
            let y_fraction = match position {
                InsertPosition::Before => 0.0,
                InsertPosition::After => 1.0,
            };
            Some(DropTarget::Task {
                list_id: list_id.clone(),
                task_id: *task_id,
                position: *position,
                y_fraction,
            })
        }
        RegionTag::List { list_id } => Some(DropTarget::List {
            list_id: list_id.clone(),
        }),
        RegionTag::DayColumn { day_key, origin } => Some(DropTarget::Day {
            day_key: day_key.clone(),
            origin: *origin,
        }),
        RegionTag::HourSlot { day_key, hour } => Some(DropTarget::CalendarSlot {
            day_key: day_key.clone(),
            hour: (*hour).min(LAST_HOUR),
        }),
        RegionTag::TimedDayColumn {
            day_key,
            first_hour,
            hour_height,
        } => {
            let hour = hour_from_offset(point.y - bounds.top(), *hour_height)
                .map(|offset| (first_hour + offset).min(LAST_HOUR))
                .unwrap_or(*first_hour);
            Some(DropTarget::CalendarSlot {
                day_key: day_key.clone(),
                hour,
            })
        }
    }
}

fn hour_from_offset(offset_px: f64, hour_height: f64) -> Option<u32> {
    if !offset_px.is_finite() || !hour_height.is_finite() || hour_height <= 0.0 {
        return None;
    }
    Some((offset_px / hour_height).floor().max(0.0) as u32)
}
