use chrono::{
  Datelike,
  NaiveDate,
  NaiveDateTime,
  Weekday
};
use tracing::{
  debug,
  warn
};

use crate::calendar::{
  add_days,
  start_of_week
};
use crate::error::DataQualityError;
use crate::mission::{
  Mission,
  MissionStatus
};

/// Inclusive Monday..Sunday date range.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct WeekRange {
  pub monday: NaiveDate,
  pub sunday: NaiveDate
}

impl WeekRange {
  pub fn contains(
    &self,
    day: NaiveDate
  ) -> bool {
    day >= self.monday
      && day <= self.sunday
  }

  pub fn previous(&self) -> Self {
    Self {
      monday: add_days(self.monday, -7),
      sunday: add_days(self.sunday, -7)
    }
  }

  pub fn days(
    &self
  ) -> impl Iterator<Item = NaiveDate> {
    self.monday.iter_days().take(7)
  }
}

/// The ISO week holding `now`.
pub fn week_range(
  now: NaiveDateTime
) -> WeekRange {
  let monday =
    start_of_week(now.date(), Weekday::Mon);
  WeekRange {
    monday,
    sunday: add_days(monday, 6)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyStat {
  pub date:            NaiveDate,
  pub total:           usize,
  pub completed:       usize,
  pub planned_hours:   f64,
  pub completed_hours: f64,
  pub completion_rate: f64
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateStats {
  pub total:                     usize,
  pub completed:                 usize,
  pub in_progress:               usize,
  pub todo:                      usize,
  pub total_planned_hours:       f64,
  pub completed_hours:           f64,
  pub completion_rate:           f64,
  pub week:                      WeekRange,
  pub this_week_planned_hours:   f64,
  pub this_week_completed_hours: f64,
  pub weekly_progress:           f64,
  pub last_week_completed_hours: f64,
  pub daily:                     Vec<DailyStat>,
  pub rejected:                  Vec<DataQualityError>
}

/// Store-side user summary, computed from the loaded collection.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionSummary {
  pub total_missions:     usize,
  pub completed_missions: usize,
  pub pending_missions:   usize,
  /// Minutes.
  pub total_duration:     u64,
  pub avg_importance:     f64
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
  total:             usize,
  completed:         usize,
  planned_minutes:   u64,
  completed_minutes: u64
}

impl Tally {
  fn push(
    &mut self,
    mission: &Mission
  ) {
    let minutes = u64::from(
      mission.estimated_duration
    );
    self.total =
      self.total.saturating_add(1);
    self.planned_minutes = self
      .planned_minutes
      .saturating_add(minutes);
    if mission.is_completed() {
      self.completed =
        self.completed.saturating_add(1);
      self.completed_minutes = self
        .completed_minutes
        .saturating_add(minutes);
    }
  }

  fn planned_hours(&self) -> f64 {
    minutes_to_hours(self.planned_minutes)
  }

  fn completed_hours(&self) -> f64 {
    minutes_to_hours(
      self.completed_minutes
    )
  }
}

#[tracing::instrument(skip(missions))]
pub fn compute_stats(
  missions: &[Mission],
  now: NaiveDateTime
) -> AggregateStats {
  let week = week_range(now);
  let last_week = week.previous();

  let mut all = Tally::default();
  let mut in_progress = 0_usize;
  let mut todo = 0_usize;
  let mut this_week = Tally::default();
  let mut prior_week = Tally::default();
  let mut daily = [Tally::default(); 7];
  let mut rejected = Vec::new();

  for mission in missions {
    let day = match mission.scheduled_day()
    {
      | Ok(day) => day,
      | Err(err) => {
        warn!(
          mission_id = %err.mission_id,
          raw = %err.raw,
          "mission left out of stats"
        );
        rejected.push(err);
        continue;
      }
    };

    all.push(mission);
    match mission.status {
      | MissionStatus::InProgress => {
        in_progress += 1;
      }
      | MissionStatus::Todo => todo += 1,
      | MissionStatus::Completed => {}
    }

    if week.contains(day) {
      this_week.push(mission);
      let slot = day
        .weekday()
        .num_days_from_monday()
        as usize;
      daily[slot].push(mission);
    } else if last_week.contains(day) {
      prior_week.push(mission);
    }
  }

  let daily = week
    .days()
    .zip(daily.iter())
    .map(|(date, tally)| DailyStat {
      date,
      total: tally.total,
      completed: tally.completed,
      planned_hours: tally.planned_hours(),
      completed_hours: tally
        .completed_hours(),
      completion_rate: percentage(
        tally.completed as f64,
        tally.total as f64
      )
    })
    .collect();

  let stats = AggregateStats {
    total: all.total,
    completed: all.completed,
    in_progress,
    todo,
    total_planned_hours: all
      .planned_hours(),
    completed_hours: all
      .completed_hours(),
    completion_rate: percentage(
      all.completed as f64,
      all.total as f64
    ),
    week,
    this_week_planned_hours: this_week
      .planned_hours(),
    this_week_completed_hours: this_week
      .completed_hours(),
    weekly_progress: percentage(
      this_week.completed_minutes as f64,
      this_week.planned_minutes as f64
    ),
    last_week_completed_hours:
      prior_week.completed_hours(),
    daily,
    rejected
  };

  debug!(
    total = stats.total,
    completed = stats.completed,
    this_week = this_week.total,
    rejected = stats.rejected.len(),
    "computed stats"
  );
  stats
}

pub fn summarize(
  missions: &[Mission]
) -> MissionSummary {
  let mut all = Tally::default();
  let mut importance_sum = 0_u64;
  for mission in missions {
    all.push(mission);
    importance_sum = importance_sum
      .saturating_add(u64::from(
        mission.importance
      ));
  }
  let avg_importance = if all.total == 0 {
    0.0
  } else {
    importance_sum as f64
      / all.total as f64
  };
  MissionSummary {
    total_missions: all.total,
    completed_missions: all.completed,
    pending_missions: all.total
      - all.completed,
    total_duration: all.planned_minutes,
    avg_importance
  }
}

fn minutes_to_hours(minutes: u64) -> f64 {
  minutes as f64 / 60.0
}

/// `part / whole * 100`, or 0 when `whole` is 0.
pub fn percentage(
  part: f64,
  whole: f64
) -> f64 {
  if whole <= 0.0 {
    return 0.0;
  }
  part / whole * 100.0
}

pub fn round_one_decimal(
  value: f64
) -> f64 {
  (value * 10.0).round() / 10.0
}

/// `3.5h`
pub fn format_hours(
  hours: f64
) -> String {
  format!("{:.1}h", round_one_decimal(hours))
}

/// `66.7%`
pub fn format_percent(
  value: f64
) -> String {
  format!("{:.1}%", round_one_decimal(value))
}

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Utc
  };
  use uuid::Uuid;

  use super::*;

  fn mission(
    status: MissionStatus,
    minutes: u32,
    date: &str
  ) -> Mission {
    let stamp = Utc
      .with_ymd_and_hms(2024, 6, 1, 9, 0, 0)
      .single()
      .expect("valid timestamp");
    Mission {
      id:                 Uuid::new_v4(),
      user_id:            "u1".to_string(),
      title:              format!("{minutes}m"),
      description:        None,
      estimated_duration: minutes,
      importance:         3,
      status,
      scheduled_date:     date.to_string(),
      scheduled_time:     None,
      priority:           None,
      tags:               None,
      category_id:        None,
      created_at:         stamp,
      updated_at:         stamp
    }
  }

  fn at(
    y: i32,
    m: u32,
    d: u32,
    h: u32
  ) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
      .and_then(|day| day.and_hms_opt(h, 0, 0))
      .expect("valid datetime")
  }

  fn day(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  fn close(
    a: f64,
    b: f64
  ) -> bool {
    (a - b).abs() < 1e-9
  }

  #[test]
  fn empty_collection_has_zero_rates() {
    let stats =
      compute_stats(&[], at(2024, 6, 5, 12));
    assert_eq!(stats.total, 0);
    assert_eq!(stats.completion_rate, 0.0);
    assert_eq!(stats.weekly_progress, 0.0);
    assert_eq!(stats.daily.len(), 7);
    assert!(
      stats
        .daily
        .iter()
        .all(|d| d.completion_rate == 0.0)
    );
  }

  #[test]
  fn three_mission_scenario() {
    let missions = vec![
      mission(MissionStatus::Completed, 90, "2024-06-03"),
      mission(MissionStatus::Completed, 60, "2024-06-04"),
      mission(MissionStatus::Todo, 60, "2024-06-04"),
    ];
    let stats = compute_stats(
      &missions,
      at(2024, 6, 5, 12)
    );

    assert_eq!(stats.total, 3);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.todo, 1);
    assert!(close(stats.total_planned_hours, 3.5));
    assert!(close(stats.completed_hours, 2.5));
    assert!(close(
      stats.completion_rate,
      200.0 / 3.0
    ));
    assert_eq!(
      format_percent(stats.completion_rate),
      "66.7%"
    );
    assert!(close(
      stats.weekly_progress,
      150.0 / 210.0 * 100.0
    ));

    let tuesday = &stats.daily[1];
    assert_eq!(tuesday.date, day(2024, 6, 4));
    assert_eq!(tuesday.total, 2);
    assert_eq!(tuesday.completed, 1);
    assert!(close(tuesday.completion_rate, 50.0));
    assert!(close(tuesday.planned_hours, 2.0));
  }

  #[test]
  fn week_boundaries_follow_iso_monday() {
    // 2024-06-05 is a Wednesday.
    let now = at(2024, 6, 5, 8);
    let week = week_range(now);
    assert_eq!(week.monday, day(2024, 6, 3));
    assert_eq!(week.sunday, day(2024, 6, 9));

    let missions = vec![
      mission(MissionStatus::Completed, 60, "2024-06-03"),
      mission(MissionStatus::Completed, 120, "2024-06-02"),
      mission(MissionStatus::Completed, 30, "2024-05-27"),
      mission(MissionStatus::Completed, 45, "2024-05-26"),
      mission(MissionStatus::Completed, 15, "2024-06-09T23:59:00"),
    ];
    let stats = compute_stats(&missions, now);

    assert!(close(stats.this_week_completed_hours, 1.25));
    assert!(close(stats.last_week_completed_hours, 2.5));
    assert_eq!(
      stats.daily[6].date,
      day(2024, 6, 9)
    );
    assert_eq!(stats.daily[6].total, 1);
  }

  #[test]
  fn bad_dates_are_left_out_of_every_figure() {
    let missions = vec![
      mission(MissionStatus::Completed, 60, "2024-06-04"),
      mission(MissionStatus::Completed, 60, "not a date"),
    ];
    let stats = compute_stats(
      &missions,
      at(2024, 6, 5, 12)
    );
    assert_eq!(stats.total, 1);
    assert_eq!(stats.completed, 1);
    assert!(close(stats.completed_hours, 1.0));
    assert!(close(stats.completion_rate, 100.0));
    assert!(close(stats.this_week_completed_hours, 1.0));
    assert_eq!(stats.rejected.len(), 1);
    assert_eq!(
      stats.rejected[0].mission_id,
      missions[1].id
    );
  }

  #[test]
  fn summary_mirrors_user_stats() {
    let mut missions = vec![
      mission(MissionStatus::Completed, 90, "2024-06-03"),
      mission(MissionStatus::InProgress, 30, "2024-06-04"),
    ];
    missions[1].importance = 5;
    let summary = summarize(&missions);
    assert_eq!(summary.total_missions, 2);
    assert_eq!(summary.completed_missions, 1);
    assert_eq!(summary.pending_missions, 1);
    assert_eq!(summary.total_duration, 120);
    assert!(close(summary.avg_importance, 4.0));

    assert_eq!(summarize(&[]).avg_importance, 0.0);
  }

  #[test]
  fn rounding_helpers() {
    assert_eq!(round_one_decimal(3.4499), 3.4);
    assert_eq!(round_one_decimal(66.666), 66.7);
    assert_eq!(format_hours(2.5), "2.5h");
    assert_eq!(percentage(1.0, 0.0), 0.0);
  }
}
