//! Side-by-side column packing for overlapping calendar blocks.
//!
//! Greedy interval colouring: blocks are visited by start time and each one
//! takes the lowest column no live block is using. The column count a block
//! reports is the widest its cluster got while it was live, so blocks that
//! overlap each other agree on how to split the width.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use chrono_tz::Tz;
use uuid::Uuid;

use crate::datetime::{DayKey, derive_task_time_metrics};
use crate::task::Task;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedBlock<K> {
    pub id: K,
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSlot {
    pub column: usize,
    pub columns: usize,
}

pub fn layout_overlaps<K>(blocks: &[TimedBlock<K>]) -> HashMap<K, ColumnSlot>
where
    K: Clone + Eq + Hash,
{
    let mut order: Vec<&TimedBlock<K>> = blocks.iter().collect();
    order.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));

    let mut slots: HashMap<K, ColumnSlot> = HashMap::with_capacity(blocks.len());
    // (end, column, id) of blocks still overlapping the sweep position
    let mut active: Vec<(u32, usize, K)> = Vec::new();

    for block in order {
        active.retain(|(end, _, _)| *end > block.start);

        let mut column = 0;
        while active.iter().any(|(_, used, _)| *used == column) {
            column += 1;
        }

        active.push((block.end, column, block.id.clone()));
        slots.insert(
            block.id.clone(),
            ColumnSlot {
                column,
                columns: column + 1,
            },
        );

        let width = (column + 1).max(active.len());
        for (_, _, id) in &active {
            if let Some(slot) = slots.get_mut(id) {
                slot.columns = slot.columns.max(width);
            }
        }
    }

    slots
}

/// Lays out the timed tasks of one day. Tasks in `hidden` (e.g. the card
/// being dragged off this day) are left out of the packing entirely.
#[tracing::instrument(skip(tasks, tz, hidden), fields(day = %day, count = tasks.len()))]
pub fn layout_day(
    tasks: &[Task],
    day: DayKey,
    tz: &Tz,
    hidden: &HashSet<Uuid>,
) -> HashMap<Uuid, ColumnSlot> {
    let blocks: Vec<TimedBlock<Uuid>> = tasks
        .iter()
        .filter(|task| task.is_scheduled_on(day.date()))
        .filter(|task| !hidden.contains(&task.id))
        .filter_map(|task| {
            derive_task_time_metrics(task, tz).map(|metrics| TimedBlock {
                id: task.id,
                start: metrics.start_minutes,
                end: metrics.end_minutes(),
            })
        })
        .collect();

    tracing::trace!(blocks = blocks.len(), "packing day blocks");
    layout_overlaps(&blocks)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{ColumnSlot, TimedBlock, layout_day, layout_overlaps};
    use crate::datetime::DayKey;
    use crate::task::Task;

    fn block(id: &'static str, start: u32, end: u32) -> TimedBlock<&'static str> {
        TimedBlock { id, start, end }
    }

    #[test]
    fn overlapping_pair_then_free_block() {
        let slots = layout_overlaps(&[
            block("a", 600, 660),
            block("b", 630, 690),
            block("c", 720, 780),
        ]);

        let a = slots["a"];
        let b = slots["b"];
        assert_ne!(a.column, b.column);
        assert_eq!(a.columns, 2);
        assert_eq!(b.columns, 2);
        assert_eq!(slots["c"], ColumnSlot { column: 0, columns: 1 });
    }

    #[test]
    fn touching_endpoints_share_a_column() {
        let slots = layout_overlaps(&[block("a", 540, 600), block("b", 600, 660)]);
        assert_eq!(slots["a"], ColumnSlot { column: 0, columns: 1 });
        assert_eq!(slots["b"], ColumnSlot { column: 0, columns: 1 });
    }

    #[test]
    fn freed_column_is_reused() {
        let slots = layout_overlaps(&[
            block("long", 0, 300),
            block("short", 0, 60),
            block("later", 120, 180),
        ]);
        assert_eq!(slots["short"].column, 0);
        assert_eq!(slots["long"].column, 1);
        assert_eq!(slots["later"].column, 0);
        assert_eq!(slots["long"].columns, 2);
        assert_eq!(slots["later"].columns, 2);
    }

    #[test]
    fn column_count_matches_overlap_depth() {
        let slots = layout_overlaps(&[
            block("a", 0, 120),
            block("b", 30, 120),
            block("c", 60, 120),
            block("d", 200, 230),
        ]);
        for id in ["a", "b", "c"] {
            assert_eq!(slots[id].columns, 3);
        }
        let mut columns: Vec<usize> = ["a", "b", "c"].iter().map(|id| slots[id].column).collect();
        columns.sort_unstable();
        assert_eq!(columns, vec![0, 1, 2]);
        assert_eq!(slots["d"], ColumnSlot { column: 0, columns: 1 });
    }

    #[test]
    fn ties_sort_shorter_block_first() {
        let slots = layout_overlaps(&[block("long", 60, 180), block("short", 60, 90)]);
        assert_eq!(slots["short"].column, 0);
        assert_eq!(slots["long"].column, 1);
    }

    #[test]
    fn hidden_tasks_do_not_take_a_column() {
        let now = Utc
            .with_ymd_and_hms(2024, 6, 1, 8, 0, 0)
            .single()
            .expect("valid now");
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).expect("valid date");
        let make = |hour: u32| {
            let mut task = Task::new_backlog(format!("at {hour}"), None, now);
            task.due_date = Some(date);
            task.planned_start = Utc.with_ymd_and_hms(2024, 6, 3, hour, 0, 0).single();
            task.planned_end = Utc.with_ymd_and_hms(2024, 6, 3, hour + 1, 0, 0).single();
            task
        };
        let staying = make(10);
        let leaving = make(10);
        let tasks = vec![staying.clone(), leaving.clone()];

        let day = DayKey::new(date);
        let full = layout_day(&tasks, day, &chrono_tz::UTC, &HashSet::new());
        assert_eq!(full[&staying.id].columns, 2);

        let hidden: HashSet<_> = [leaving.id].into_iter().collect();
        let trimmed = layout_day(&tasks, day, &chrono_tz::UTC, &hidden);
        assert_eq!(trimmed.len(), 1);
        assert_eq!(trimmed[&staying.id], ColumnSlot { column: 0, columns: 1 });
    }
}
