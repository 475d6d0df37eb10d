use serde::{
  Deserialize,
  Serialize
};
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Default,
)]
pub struct Point {
  pub x: f64,
  pub y: f64
}

impl Point {
  pub fn new(x: f64, y: f64) -> Self {
    Self { x, y }
  }

  pub fn is_finite(&self) -> bool {
    self.x.is_finite()
      && self.y.is_finite()
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Default,
)]
pub struct Rect {
  pub x:      f64,
  pub y:      f64,
  pub width:  f64,
  pub height: f64
}

impl Rect {
  pub fn new(
    x: f64,
    y: f64,
    width: f64,
    height: f64
  ) -> Self {
    Self {
      x,
      y,
      width,
      height
    }
  }

  pub fn top(&self) -> f64 {
    self.y
  }

  pub fn bottom(&self) -> f64 {
    self.y + self.height
  }

  pub fn right(&self) -> f64 {
    self.x + self.width
  }

  /// Edges are inclusive, matching how a
  /// browser reports elements at a point.
  pub fn contains(
    &self,
    point: Point
  ) -> bool {
    point.x >= self.x
      && point.x <= self.right()
      && point.y >= self.y
      && point.y <= self.bottom()
  }

  /// Vertical position of `y` inside the
  /// rect, clamped to `0.0..=1.0`.
  pub fn y_fraction(&self, y: f64) -> f64 {
    if self.height.is_nan()
      || self.height <= 0.0
    {
      return 0.0;
    }
    ((y - self.y) / self.height)
      .clamp(0.0, 1.0)
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
  Before,
  After
}

impl InsertPosition {
  pub const SPLIT: f64 = 0.5;

  pub fn from_fraction(
    fraction: f64
  ) -> Self {
    if fraction < Self::SPLIT {
      Self::Before
    } else {
      Self::After
    }
  }
}

/// Which kind of day column a `Day` target
/// came from.
#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum DayOrigin {
  Board,
  DailyList,
  WeekGrid
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(
  tag = "kind",
  rename_all = "camelCase",
  rename_all_fields = "camelCase"
)]
pub enum DropTarget {
  CalendarSlot {
    day_key: String,
    hour:    u32
  },
  Day {
    day_key: String,
    origin:  DayOrigin
  },
  List {
    list_id: String
  },
  Task {
    list_id:    String,
    task_id:    Uuid,
    position:   InsertPosition,
    y_fraction: f64
  },
  BoardTask {
    day_key:    String,
    task_id:    Uuid,
    position:   InsertPosition,
    y_fraction: f64
  }
}

impl DropTarget {
  pub fn day_key(&self) -> Option<&str> {
    match self {
      | DropTarget::CalendarSlot {
        day_key,
        ..
      }
      | DropTarget::Day {
        day_key, ..
      }
      | DropTarget::BoardTask {
        day_key,
        ..
      } => Some(day_key.as_str()),
      | DropTarget::List { .. }
      | DropTarget::Task { .. } => None
    }
  }

  pub fn list_id(&self) -> Option<&str> {
    match self {
      | DropTarget::List { list_id }
      | DropTarget::Task {
        list_id, ..
      } => Some(list_id.as_str()),
      | _ => None
    }
  }

  pub fn anchor_task(
    &self
  ) -> Option<Uuid> {
    match self {
      | DropTarget::Task {
        task_id, ..
      }
      | DropTarget::BoardTask {
        task_id,
        ..
      } => Some(*task_id),
      | _ => None
    }
  }
}

/// Tag attached to a registered hit region.
/// This is what a rendering host stamps on
/// every droppable element.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(
  tag = "kind",
  rename_all = "camelCase",
  rename_all_fields = "camelCase"
)]
pub enum RegionTag {
  BacklogTask {
    list_id: String,
    task_id: Uuid
  },
  BoardTask {
    day_key: String,
    task_id: Uuid
  },
  BacklogDropRow {
    list_id:  String,
    task_id:  Uuid,
    position: InsertPosition
  },
  List {
    list_id: String
  },
  DayColumn {
    day_key: String,
    origin:  DayOrigin
  },
  HourSlot {
    day_key: String,
    hour:    u32
  },
  TimedDayColumn {
    day_key:     String,
    first_hour:  u32,
    hour_height: f64
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct ListHover {
  pub list_id:  String,
  pub task_id:  Option<Uuid>,
  pub position: Option<InsertPosition>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct DragPreview {
  pub task_id:          Uuid,
  pub origin:           Point,
  pub point:            Point,
  #[serde(default)]
  pub started:          bool,
  #[serde(default)]
  pub external:         bool,
  #[serde(default)]
  pub hidden_in_origin: bool
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct CalendarPreview {
  pub task_id:          Uuid,
  pub day_key:          String,
  pub start_minutes:    u32,
  pub duration_minutes: u32
}
