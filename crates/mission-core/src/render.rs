use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{Datelike, Weekday};
use unicode_width::UnicodeWidthStr;

use crate::calendar::{CalendarMonth, DayCell, weekday_header};
use crate::config::Config;
use crate::mission::{Category, Mission, MissionStatus};
use crate::stats::{AggregateStats, MissionSummary, format_hours, format_percent};
use crate::status::available_action;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => io::stdout().is_terminal(),
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, missions, categories))]
    pub fn print_mission_table(
        &self,
        missions: &[Mission],
        categories: &[Category],
    ) -> anyhow::Result<()> {
        self.write_mission_table(io::stdout().lock(), missions, categories)
    }

    pub fn write_mission_table<W: Write>(
        &self,
        writer: W,
        missions: &[Mission],
        categories: &[Category],
    ) -> anyhow::Result<()> {
        let headers = ["ID", "Date", "Time", "Status", "Imp", "Dur", "Category", "Title"]
            .iter()
            .map(|h| h.to_string())
            .collect();

        let rows = missions
            .iter()
            .map(|mission| {
                let category = category_name(mission, categories);
                vec![
                    self.paint(&short_id(mission), "33"),
                    mission.scheduled_date.clone(),
                    mission.scheduled_time.clone().unwrap_or_default(),
                    self.paint(mission.status.as_str(), status_code(mission.status)),
                    importance_stars(mission.importance),
                    format!("{}m", mission.estimated_duration),
                    category,
                    mission.title.clone(),
                ]
            })
            .collect();

        write_table(writer, headers, rows)
    }

    #[tracing::instrument(skip(self, mission, category))]
    pub fn print_mission_info(
        &self,
        mission: &Mission,
        category: Option<&Category>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", mission.id)?;
        writeln!(out, "title       {}", mission.title)?;
        writeln!(
            out,
            "status      {}",
            self.paint(mission.status.label(), status_code(mission.status))
        )?;
        writeln!(out, "next        {}", available_action(mission.status).label())?;
        writeln!(out, "date        {}", mission.scheduled_date)?;
        if let Some(time) = &mission.scheduled_time {
            writeln!(out, "time        {time}")?;
        }
        writeln!(out, "duration    {} min", mission.estimated_duration)?;
        writeln!(out, "importance  {}", importance_stars(mission.importance))?;
        if let Some(priority) = mission.priority {
            writeln!(out, "priority    {priority}")?;
        }
        if let Some(category) = category {
            writeln!(out, "category    {} ({})", category.name, category.color)?;
        } else if let Some(id) = mission.category_id {
            writeln!(out, "category    {id} (missing)")?;
        }
        if !mission.tags().is_empty() {
            writeln!(out, "tags        {}", mission.tags().join(", "))?;
        }
        if let Some(description) = &mission.description {
            writeln!(out, "description {description}")?;
        }
        writeln!(out, "created     {}", mission.created_at.to_rfc3339())?;
        writeln!(out, "modified    {}", mission.updated_at.to_rfc3339())?;

        Ok(())
    }

    #[tracing::instrument(skip(self, cells))]
    pub fn print_month(
        &self,
        month: CalendarMonth,
        cells: &[DayCell],
        week_start: Weekday,
    ) -> anyhow::Result<()> {
        self.write_month(io::stdout().lock(), month, cells, week_start)
    }

    /// One row per week. Cells show the day number, up to three status
    /// markers and a `+N` overflow count.
    pub fn write_month<W: Write>(
        &self,
        mut writer: W,
        month: CalendarMonth,
        cells: &[DayCell],
        week_start: Weekday,
    ) -> anyhow::Result<()> {
        writeln!(writer, "{}", month.title())?;
        writeln!(writer)?;

        let lead = cells
            .first()
            .map(|cell| {
                (7 + cell.date.weekday().num_days_from_monday()
                    - week_start.num_days_from_monday())
                    % 7
            })
            .unwrap_or(0) as usize;

        let mut slots: Vec<String> = vec![String::new(); lead];
        slots.extend(cells.iter().map(|cell| self.day_cell(cell)));
        while slots.len() % 7 != 0 {
            slots.push(String::new());
        }

        let rows = slots.chunks(7).map(|week| week.to_vec()).collect();
        write_table(writer, weekday_header(week_start), rows)
    }

    fn day_cell(&self, cell: &DayCell) -> String {
        let mut whole = Vec::new();
        if cell.is_selected {
            whole.push("7");
        }
        if !cell.in_month {
            whole.push("2");
        }
        // selected and padding cells get one style for the whole cell
        let tint = whole.is_empty();

        let day = format!("{:>2}", cell.date.day());
        let mut text = match cell.color {
            Some(color) if tint => self.paint(&day, color.ansi_code()),
            _ => day,
        };
        if cell.is_today {
            text.push('*');
        }
        if !cell.preview().is_empty() {
            text.push(' ');
            for mission in cell.preview() {
                let marker = status_marker(mission.status);
                if tint {
                    text.push_str(&self.paint(marker, status_code(mission.status)));
                } else {
                    text.push_str(marker);
                }
            }
            if cell.overflow() > 0 {
                text.push_str(&format!("+{}", cell.overflow()));
            }
        }

        if tint {
            return text;
        }
        self.paint(&text, &whole.join(";"))
    }

    #[tracing::instrument(skip(self, stats, summary))]
    pub fn print_stats(&self, stats: &AggregateStats, summary: &MissionSummary) -> anyhow::Result<()> {
        self.write_stats(io::stdout().lock(), stats, summary)
    }

    pub fn write_stats<W: Write>(
        &self,
        mut writer: W,
        stats: &AggregateStats,
        summary: &MissionSummary,
    ) -> anyhow::Result<()> {
        writeln!(writer, "missions        {}", stats.total)?;
        writeln!(
            writer,
            "by status       {} todo, {} in progress, {} completed",
            stats.todo, stats.in_progress, stats.completed
        )?;
        writeln!(writer, "planned         {}", format_hours(stats.total_planned_hours))?;
        writeln!(writer, "completed       {}", format_hours(stats.completed_hours))?;
        writeln!(
            writer,
            "completion      {}",
            self.paint(&format_percent(stats.completion_rate), "36")
        )?;
        writeln!(writer, "avg importance  {:.1}", summary.avg_importance)?;
        writeln!(writer)?;
        writeln!(
            writer,
            "week            {} .. {}",
            stats.week.monday, stats.week.sunday
        )?;
        writeln!(
            writer,
            "this week       {} of {} ({})",
            format_hours(stats.this_week_completed_hours),
            format_hours(stats.this_week_planned_hours),
            format_percent(stats.weekly_progress)
        )?;
        writeln!(
            writer,
            "last week       {} completed",
            format_hours(stats.last_week_completed_hours)
        )?;
        writeln!(writer)?;

        let headers = ["Day", "Missions", "Done", "Planned", "Completed", "Rate"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        let rows = stats
            .daily
            .iter()
            .map(|day| {
                vec![
                    day.date.format("%a %m-%d").to_string(),
                    day.total.to_string(),
                    day.completed.to_string(),
                    format_hours(day.planned_hours),
                    format_hours(day.completed_hours),
                    format_percent(day.completion_rate),
                ]
            })
            .collect();
        write_table(&mut writer, headers, rows)?;

        if !stats.rejected.is_empty() {
            writeln!(writer)?;
            writeln!(
                writer,
                "{} mission(s) left out of stats:",
                stats.rejected.len()
            )?;
            for err in &stats.rejected {
                writeln!(writer, "  {err}")?;
            }
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, categories))]
    pub fn print_categories(&self, categories: &[Category]) -> anyhow::Result<()> {
        let headers = ["ID", "Name", "Color", "Icon"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        let rows = categories
            .iter()
            .map(|category| {
                vec![
                    self.paint(&category.id.to_string()[..8], "33"),
                    category.name.clone(),
                    category.color.clone(),
                    category.icon.clone().unwrap_or_default(),
                ]
            })
            .collect();
        write_table(io::stdout().lock(), headers, rows)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn short_id(mission: &Mission) -> String {
    mission.id.to_string()[..8].to_string()
}

fn category_name(mission: &Mission, categories: &[Category]) -> String {
    mission
        .category_id
        .and_then(|id| categories.iter().find(|c| c.id == id))
        .map(|c| c.name.clone())
        .unwrap_or_default()
}

fn importance_stars(importance: u8) -> String {
    "*".repeat(usize::from(importance))
}

fn status_marker(status: MissionStatus) -> &'static str {
    match status {
        MissionStatus::Todo => "o",
        MissionStatus::InProgress => ">",
        MissionStatus::Completed => "x",
    }
}

fn status_code(status: MissionStatus) -> &'static str {
    match status {
        MissionStatus::Todo => "34",
        MissionStatus::InProgress => "33",
        MissionStatus::Completed => "32",
    }
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

    for (idx, header) in headers.iter().enumerate() {
        write!(writer, "{:width$} ", header, width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, width) in widths.iter().enumerate() {
            let cell = row.get(idx).map(String::as_str).unwrap_or_default();
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
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
