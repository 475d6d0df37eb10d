use planner_shared::DayOrigin;
use serde::{Deserialize, Serialize};

use crate::config::GeometryConfig;
use crate::datetime::DayKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    /// Single-day list plus its hour column.
    DailyPanel,
    /// Hour grid across several days; horizontal drags switch day.
    WeeklyGrid,
    /// Horizontally paged day columns without an hour axis.
    TaskBoard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    /// Whether the host can answer "what is under this point" while a
    /// gesture is live. Touch builds generally cannot.
    pub supports_point_geometry: bool,
}

impl HostCapabilities {
    pub const WEB: Self = Self {
        supports_point_geometry: true,
    };
    pub const NATIVE: Self = Self {
        supports_point_geometry: false,
    };
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self::WEB
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceConfig {
    pub kind: SurfaceKind,
    pub hour_height: f64,
    /// Pixel width of one day column; only the weekly grid switches days.
    pub day_width: Option<f64>,
    pub visible_days: Vec<DayKey>,
    pub snap_minutes: u32,
    pub drag_threshold: f64,
    pub capabilities: HostCapabilities,
}

impl SurfaceConfig {
    pub fn daily_panel(geometry: &GeometryConfig, day: DayKey, capabilities: HostCapabilities) -> Self {
        Self {
            kind: SurfaceKind::DailyPanel,
            hour_height: geometry.hour_height,
            day_width: None,
            visible_days: vec![day],
            snap_minutes: geometry.snap_minutes,
            drag_threshold: geometry.drag_threshold,
            capabilities,
        }
    }

    pub fn weekly_grid(
        geometry: &GeometryConfig,
        visible_days: Vec<DayKey>,
        capabilities: HostCapabilities,
    ) -> Self {
        Self {
            kind: SurfaceKind::WeeklyGrid,
            hour_height: geometry.hour_height,
            day_width: Some(geometry.day_width),
            visible_days,
            snap_minutes: geometry.snap_minutes,
            drag_threshold: geometry.drag_threshold,
            capabilities,
        }
    }

    pub fn task_board(
        geometry: &GeometryConfig,
        visible_days: Vec<DayKey>,
        capabilities: HostCapabilities,
    ) -> Self {
        Self {
            kind: SurfaceKind::TaskBoard,
            hour_height: geometry.hour_height,
            day_width: None,
            visible_days,
            snap_minutes: geometry.snap_minutes,
            drag_threshold: geometry.drag_threshold,
            capabilities,
        }
    }

    /// Surfaces with an hour axis, where vertical travel means time.
    pub fn is_timed_grid(&self) -> bool {
        matches!(self.kind, SurfaceKind::DailyPanel | SurfaceKind::WeeklyGrid)
    }

    pub fn day_origin(&self) -> DayOrigin {
        match self.kind {
            SurfaceKind::DailyPanel => DayOrigin::DailyList,
            SurfaceKind::WeeklyGrid => DayOrigin::WeekGrid,
            SurfaceKind::TaskBoard => DayOrigin::Board,
        }
    }

    pub fn day_index(&self, day: DayKey) -> Option<usize> {
        self.visible_days.iter().position(|visible| *visible == day)
    }
}
