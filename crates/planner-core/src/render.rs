use std::collections::HashMap;
use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use chrono_tz::Tz;
use unicode_width::UnicodeWidthStr;
use uuid::Uuid;

use crate::config::Config;
use crate::datetime::{DayKey, PlannerDay, derive_task_time_metrics, format_duration, format_hour_label};
use crate::layout::ColumnSlot;
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, rows))]
    pub fn print_backlog(&mut self, list_id: &str, rows: &[&Task]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", self.paint(&format!("backlog {list_id}"), "1"))?;

        let headers = vec![
            "ID".to_string(),
            "Rank".to_string(),
            "Est".to_string(),
            "Title".to_string(),
        ];
        let rows = rows
            .iter()
            .map(|task| {
                vec![
                    self.paint(&short_id(task.id), "33"),
                    format!("{}", task.rank()),
                    task.estimated_minutes
                        .and_then(|m| format_duration(f64::from(m)))
                        .unwrap_or_default(),
                    self.title(task),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)
    }

    pub fn print_lists(&mut self, rows: &[(String, usize)]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec!["List".to_string(), "Tasks".to_string()];
        let rows = rows
            .iter()
            .map(|(list, count)| vec![self.paint(list, "36"), count.to_string()])
            .collect();
        write_table(&mut out, headers, rows)
    }

    /// Timed blocks with their overlap column, then the untimed rows.
    #[tracing::instrument(skip(self, rows, layout, tz))]
    pub fn print_agenda(
        &mut self,
        day: &PlannerDay,
        rows: &[&Task],
        layout: &HashMap<Uuid, ColumnSlot>,
        tz: &Tz,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "{}",
            self.paint(&format!("{} {} {} ({})", day.weekday, day.month, day.day, day.key), "1")
        )?;

        let headers = vec![
            "ID".to_string(),
            "Slot".to_string(),
            "Time".to_string(),
            "Length".to_string(),
            "Col".to_string(),
            "Title".to_string(),
        ];
        let rows = agenda_rows(rows, layout, tz)
            .into_iter()
            .map(|mut row| {
                row[0] = self.paint(&row[0], "33");
                row
            })
            .collect();

        write_table(&mut out, headers, rows)
    }

    #[tracing::instrument(skip(self, days, counts))]
    pub fn print_days(
        &mut self,
        days: &[PlannerDay],
        counts: &HashMap<DayKey, usize>,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec![
            "Day".to_string(),
            "Date".to_string(),
            "Tasks".to_string(),
        ];
        let rows = days
            .iter()
            .map(|day| {
                let label = format!("{} {} {}", day.weekday, day.month, day.day);
                let label = if day.date == today {
                    self.paint(&label, "32")
                } else {
                    label
                };
                let count = counts.get(&day.key).copied().unwrap_or(0);
                vec![label, day.key.to_string(), count.to_string()]
            })
            .collect();

        write_table(&mut out, headers, rows)
    }

    pub fn print_line(&mut self, message: &str) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{message}")?;
        Ok(())
    }

    fn title(&self, task: &Task) -> String {
        if task.status.is_done() {
            self.paint(&task.title, "9")
        } else {
            task.title.clone()
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

fn agenda_rows(rows: &[&Task], layout: &HashMap<Uuid, ColumnSlot>, tz: &Tz) -> Vec<Vec<String>> {
    rows.iter()
        .map(|task| {
            let (slot, time, length) = match derive_task_time_metrics(task, tz) {
                Some(metrics) => (
                    format_hour_label(metrics.start_minutes / 60),
                    format!(
                        "{:02}:{:02}-{:02}:{:02}",
                        metrics.start_minutes / 60,
                        metrics.start_minutes % 60,
                        metrics.end_minutes() / 60,
                        metrics.end_minutes() % 60
                    ),
                    format_duration(f64::from(metrics.duration_minutes)).unwrap_or_default(),
                ),
                None => (String::new(), "all day".to_string(), String::new()),
            };
            let column = layout
                .get(&task.id)
                .map(|slot| format!("{}/{}", slot.column + 1, slot.columns))
                .unwrap_or_default();
            vec![short_id(task.id), slot, time, length, column, task.title.clone()]
        })
        .collect()
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
