use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Todo,
    Doing,
    Done,
    Canceled,
}

impl Status {
    /// The drag layer only cares about finished vs. not finished.
    pub fn is_done(self) -> bool {
        matches!(self, Status::Done | Status::Canceled)
    }
}

/// Links a row to a repeating series instead of standing alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurrenceLink {
    pub recurrence_id: Uuid,
    pub occurrence_date: NaiveDate,
    #[serde(default)]
    pub moved_to_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,

    pub title: String,

    #[serde(default)]
    pub list_id: Option<String>,

    #[serde(default)]
    pub status: Status,

    #[serde(default)]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub planned_start: Option<DateTime<Utc>>,

    #[serde(default)]
    pub planned_end: Option<DateTime<Utc>>,

    #[serde(default)]
    pub estimated_minutes: Option<u32>,

    #[serde(default)]
    pub sort_rank: Option<f64>,

    #[serde(default)]
    pub recurrence: Option<RecurrenceLink>,

    pub created: DateTime<Utc>,

    pub modified: DateTime<Utc>,
}

impl Task {
    pub fn new_backlog(title: String, list_id: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            list_id,
            status: Status::Todo,
            due_date: None,
            planned_start: None,
            planned_end: None,
            estimated_minutes: None,
            sort_rank: None,
            recurrence: None,
            created: now,
            modified: now,
        }
    }

    /// Day this row shows up on. Recurring instances honour their
    /// "moved to" override before the occurrence date.
    pub fn effective_day(&self) -> Option<NaiveDate> {
        if let Some(link) = &self.recurrence {
            return Some(link.moved_to_date.unwrap_or(link.occurrence_date));
        }
        self.due_date
    }

    pub fn is_scheduled_on(&self, day: NaiveDate) -> bool {
        self.effective_day() == Some(day)
    }

    pub fn is_timed(&self) -> bool {
        self.planned_start.is_some()
    }

    pub fn in_backlog(&self) -> bool {
        self.effective_day().is_none()
    }

    /// Backlog bucket, falling back to the default list when unset.
    pub fn bucket<'a>(&'a self, default_list: &'a str) -> &'a str {
        self.list_id.as_deref().unwrap_or(default_list)
    }

    pub fn rank(&self) -> f64 {
        self.sort_rank.unwrap_or(0.0)
    }

    pub fn clear_time(&mut self) {
        self.planned_start = None;
        self.planned_end = None;
    }

    /// Same row, ignoring the `modified` stamp. Used to spot no-op commits.
    pub fn same_content(&self, other: &Task) -> bool {
        self.id == other.id
            && self.title == other.title
            && self.list_id == other.list_id
            && self.status == other.status
            && self.due_date == other.due_date
            && self.planned_start == other.planned_start
            && self.planned_end == other.planned_end
            && self.estimated_minutes == other.estimated_minutes
            && self.sort_rank == other.sort_rank
            && self.recurrence == other.recurrence
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    use super::{RecurrenceLink, Status, Task};

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0)
            .single()
            .expect("valid now")
    }

    #[test]
    fn backlog_task_uses_default_bucket_without_list() {
        let task = Task::new_backlog("water plants".to_string(), None, now());
        assert!(task.in_backlog());
        assert_eq!(task.bucket("inbox"), "inbox");

        let listed = Task::new_backlog("pay rent".to_string(), Some("home".to_string()), now());
        assert_eq!(listed.bucket("inbox"), "home");
    }

    #[test]
    fn recurring_instance_prefers_moved_date() {
        let mut task = Task::new_backlog("standup".to_string(), None, now());
        let occurrence = NaiveDate::from_ymd_opt(2024, 6, 3).expect("valid date");
        let moved = NaiveDate::from_ymd_opt(2024, 6, 4).expect("valid date");
        task.recurrence = Some(RecurrenceLink {
            recurrence_id: Uuid::new_v4(),
            occurrence_date: occurrence,
            moved_to_date: None,
        });
        assert!(task.is_scheduled_on(occurrence));

        if let Some(link) = task.recurrence.as_mut() {
            link.moved_to_date = Some(moved);
        }
        assert!(task.is_scheduled_on(moved));
        assert!(!task.is_scheduled_on(occurrence));
        assert!(!task.in_backlog());
    }

    #[test]
    fn same_content_ignores_modified_stamp() {
        let task = Task::new_backlog("read".to_string(), None, now());
        let mut touched = task.clone();
        touched.modified = now() + chrono::Duration::minutes(5);
        assert!(task.same_content(&touched));

        touched.status = Status::Done;
        assert!(!task.same_content(&touched));
        assert!(touched.status.is_done());
    }
}
