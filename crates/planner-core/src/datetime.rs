use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  LocalResult,
  NaiveDate,
  Offset,
  TimeZone,
  Timelike,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::{
  Deserialize,
  Serialize
};

use crate::task::Task;

const TIMEZONE_CONFIG_FILE: &str =
  "planner-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "PLANNER_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "PLANNER_TIME_CONFIG";

pub const MINUTES_PER_HOUR: u32 = 60;
pub const MINUTES_PER_DAY: u32 = 1440;
/// Smallest block a resize may produce;
/// also the drag snapping step.
pub const MIN_BLOCK_MINUTES: u32 = 15;
pub const DEFAULT_DURATION_MINUTES: u32 =
  60;

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

pub fn project_timezone() -> Tz {
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  *PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  tracing::debug!(
    "no timezone configured; using UTC"
  );
  chrono_tz::UTC
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Minutes since local midnight, always in
/// `0..1440`.
pub fn minutes_of_day(
  instant: DateTime<Utc>,
  tz: &Tz
) -> u32 {
  let local = instant.with_timezone(tz);
  local.hour() * MINUTES_PER_HOUR
    + local.minute()
}

/// UTC instant for `minutes` past local
/// midnight on `day`. Minutes past the end of
/// the day roll into the next one. Times
/// skipped by a DST jump land just after it.
pub fn local_instant(
  day: NaiveDate,
  minutes: u32,
  tz: &Tz
) -> anyhow::Result<DateTime<Utc>> {
  let midnight = day
    .and_hms_opt(0, 0, 0)
    .ok_or_else(|| {
      anyhow!(
        "failed to construct midnight \
         for {day}"
      )
    })?;
  let naive = midnight
    + Duration::minutes(i64::from(
      minutes
    ));

  match tz.from_local_datetime(&naive) {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        day = %day,
        minutes,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Ok(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      // Inside a spring-forward gap: keep
      // the offset from before the jump, so
      // 02:30 reads as 03:30 after it.
      let before_gap = tz
        .offset_from_local_datetime(
          &(naive - Duration::hours(3))
        )
        .earliest()
        .ok_or_else(|| {
          anyhow!(
            "local time {naive} does not \
             exist in {}",
            tz.name()
          )
        })?
        .fix();
      tracing::debug!(
        day = %day,
        minutes,
        "local time falls in a DST gap; shifting forward"
      );
      Ok(Utc.from_utc_datetime(
        &(naive
          - Duration::seconds(i64::from(
            before_gap.local_minus_utc()
          )))
      ))
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct TaskTimeMetrics {
  pub start_minutes:    u32,
  pub duration_minutes: u32
}

impl TaskTimeMetrics {
  pub fn end_minutes(&self) -> u32 {
    self.start_minutes
      + self.duration_minutes
  }
}

/// Grid placement of a timed task. `None`
/// when the task has no planned start.
pub fn derive_task_time_metrics(
  task: &Task,
  tz: &Tz
) -> Option<TaskTimeMetrics> {
  let start = task.planned_start?;
  let raw_duration =
    match task.planned_end {
      | Some(end) => {
        (end - start).num_minutes()
      }
      | None => i64::from(
        DEFAULT_DURATION_MINUTES
      )
    };

  let duration = raw_duration.clamp(
    i64::from(MIN_BLOCK_MINUTES),
    i64::from(MINUTES_PER_DAY)
  ) as u32;
  let start_minutes =
    minutes_of_day(start, tz).min(
      MINUTES_PER_DAY - MIN_BLOCK_MINUTES
    );
  let duration = duration
    .min(MINUTES_PER_DAY - start_minutes);

  Some(TaskTimeMetrics {
    start_minutes,
    duration_minutes: duration
  })
}

/// `"H:MM"`, or `None` for empty, negative
/// or non-finite input.
pub fn format_duration(
  minutes: f64
) -> Option<String> {
  if !minutes.is_finite()
    || minutes <= 0.0
  {
    return None;
  }
  let total = minutes.round() as u64;
  Some(format!(
    "{}:{:02}",
    total / 60,
    total % 60
  ))
}

pub fn format_hour_label(
  hour: u32
) -> String {
  let hour = hour % 24;
  let display = if hour % 12 == 0 {
    12
  } else {
    hour % 12
  };
  let suffix =
    if hour < 12 { "AM" } else { "PM" };
  format!("{display} {suffix}")
}

pub fn pixels_to_minutes(
  delta_px: f64,
  hour_height: f64
) -> f64 {
  if !delta_px.is_finite()
    || !hour_height.is_finite()
    || hour_height <= 0.0
  {
    return 0.0;
  }
  delta_px / hour_height
    * f64::from(MINUTES_PER_HOUR)
}

/// Rounds to the nearest multiple of
/// `step`.
pub fn snap_minutes(
  minutes: f64,
  step: u32
) -> i32 {
  if !minutes.is_finite() || step == 0 {
    return 0;
  }
  let step = f64::from(step);
  ((minutes / step).round() * step)
    as i32
}

/// Clamps a start minute so a block of
/// `duration` still fits before midnight.
pub fn clamp_start(
  start: i32,
  duration: u32
) -> u32 {
  let latest = MINUTES_PER_DAY
    .saturating_sub(duration);
  start.clamp(0, latest as i32) as u32
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(
  try_from = "String",
  into = "String"
)]
pub struct DayKey(NaiveDate);

impl DayKey {
  pub fn new(date: NaiveDate) -> Self {
    Self(date)
  }

  pub fn date(&self) -> NaiveDate {
    self.0
  }

  pub fn offset(
    &self,
    days: i64
  ) -> Option<Self> {
    self
      .0
      .checked_add_signed(Duration::days(
        days
      ))
      .map(Self)
  }
}

impl fmt::Display for DayKey {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    write!(f, "{}", self.0.format("%Y-%m-%d"))
  }
}

impl FromStr for DayKey {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    NaiveDate::parse_from_str(
      s.trim(),
      "%Y-%m-%d"
    )
    .map(Self)
    .with_context(|| {
      format!("invalid day key: {s}")
    })
  }
}

impl TryFrom<String> for DayKey {
  type Error = anyhow::Error;

  fn try_from(
    value: String
  ) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<DayKey> for String {
  fn from(value: DayKey) -> Self {
    value.to_string()
  }
}

impl From<NaiveDate> for DayKey {
  fn from(value: NaiveDate) -> Self {
    Self(value)
  }
}

/// One day of the scrolling planner.
#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub struct PlannerDay {
  pub key:     DayKey,
  pub weekday: String,
  pub month:   String,
  pub day:     String,
  pub date:    NaiveDate
}

impl PlannerDay {
  pub fn new(date: NaiveDate) -> Self {
    Self {
      key: DayKey::new(date),
      weekday: date
        .format("%a")
        .to_string(),
      month: date
        .format("%b")
        .to_string(),
      day: date.day().to_string(),
      date
    }
  }
}

/// Range of day offsets around today that is
/// currently materialised. Grows by whole
/// pages when the viewer scrolls near an
/// edge; never shrinks.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct DayWindow {
  pub first_offset: i64,
  pub last_offset:  i64,
  pub page:         u32
}

impl DayWindow {
  pub fn new(
    days_before: u32,
    days_after: u32
  ) -> Self {
    Self {
      first_offset: -i64::from(
        days_before
      ),
      last_offset: i64::from(days_after),
      page: days_before
        .max(days_after)
        .max(1)
    }
  }

  pub fn len(&self) -> usize {
    (self.last_offset - self.first_offset
      + 1) as usize
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn extend_before(
    &mut self,
    days: u32
  ) {
    self.first_offset -= i64::from(days);
  }

  pub fn extend_after(
    &mut self,
    days: u32
  ) {
    self.last_offset += i64::from(days);
  }

  /// Grows the window when `offset` comes
  /// within `margin` days of either edge.
  /// Returns whether anything changed.
  pub fn reveal(
    &mut self,
    offset: i64,
    margin: u32
  ) -> bool {
    let margin = i64::from(margin);
    let mut grew = false;
    while offset - margin
      < self.first_offset
    {
      self.extend_before(self.page);
      grew = true;
    }
    while offset + margin
      > self.last_offset
    {
      self.extend_after(self.page);
      grew = true;
    }
    if grew {
      tracing::debug!(
        first = self.first_offset,
        last = self.last_offset,
        "day window grew"
      );
    }
    grew
  }

  pub fn days(
    &self,
    today: NaiveDate
  ) -> Vec<PlannerDay> {
    (self.first_offset..=self.last_offset)
      .filter_map(|offset| {
        today.checked_add_signed(
          Duration::days(offset)
        )
      })
      .map(PlannerDay::new)
      .collect()
  }
}

#[tracing::instrument]
pub fn parse_day_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return today
        .succ_opt()
        .ok_or_else(|| {
          anyhow!("date out of range")
        });
    }
    | "yesterday" => {
      return today
        .pred_opt()
        .ok_or_else(|| {
          anyhow!("date out of range")
        });
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(next_weekday_date(
      today,
      target_weekday
    ));
  }

  let rel_re = Regex::new(
    r"^(?P<sign>[+-])(?P<num>\d+)d$"
  )
  .map_err(|e| {
    anyhow!(
      "internal regex compile failure: \
       {e}"
    )
  })?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let signed = if caps
      .name("sign")
      .is_some_and(|m| m.as_str() == "-")
    {
      -num
    } else {
      num
    };
    return today
      .checked_add_signed(Duration::days(
        signed
      ))
      .ok_or_else(|| {
        anyhow!("date out of range")
      });
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(date);
  }

  Err(anyhow!(
    "unrecognized day expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     today/tomorrow/yesterday, weekday \
     names (e.g. monday), +Nd/-Nd, \
     YYYY-MM-DD"
  })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}
