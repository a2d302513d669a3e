use std::fmt;
use std::str::FromStr;

use chrono::{
  Datelike,
  Duration,
  NaiveDate,
  Weekday
};
use tracing::debug;

use crate::bucket::DateBucketIndex;
use crate::error::ValidationError;
use crate::mission::{
  Mission,
  MissionStatus
};

/// Markers drawn inside a cell before the "+N" overflow note.
pub const PREVIEW_LIMIT: usize = 3;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
)]
pub struct CalendarMonth {
  pub year:  i32,
  pub month: u32
}

impl CalendarMonth {
  pub fn new(
    year: i32,
    month: u32
  ) -> Result<Self, ValidationError> {
    if !(1..=12).contains(&month) {
      return Err(ValidationError::new(
        "month",
        format!(
          "expected 1-12, got {month}"
        )
      ));
    }
    Ok(Self {
      year,
      month
    })
  }

  pub fn containing(
    day: NaiveDate
  ) -> Self {
    Self {
      year:  day.year(),
      month: day.month()
    }
  }

  pub fn first_day(&self) -> NaiveDate {
    first_day_of_month(
      self.year, self.month
    )
  }

  pub fn last_day(&self) -> NaiveDate {
    last_day_of_month(
      self.year, self.month
    )
  }

  pub fn days(&self) -> u32 {
    days_in_month(self.year, self.month)
  }

  pub fn contains(
    &self,
    day: NaiveDate
  ) -> bool {
    day.year() == self.year
      && day.month() == self.month
  }

  pub fn shift(
    &self,
    months: i32
  ) -> Self {
    let mut year = self.year;
    let mut month =
      self.month as i32 + months;

    while month < 1 {
      month += 12;
      year = year.saturating_sub(1);
    }
    while month > 12 {
      month -= 12;
      year = year.saturating_add(1);
    }

    Self {
      year,
      month: month as u32
    }
  }

  pub fn next(&self) -> Self {
    self.shift(1)
  }

  pub fn previous(&self) -> Self {
    self.shift(-1)
  }

  /// `June 2024`
  pub fn title(&self) -> String {
    self
      .first_day()
      .format("%B %Y")
      .to_string()
  }
}

impl fmt::Display for CalendarMonth {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    write!(
      f,
      "{:04}-{:02}",
      self.year, self.month
    )
  }
}

impl FromStr for CalendarMonth {
  type Err = ValidationError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let invalid = || {
      ValidationError::new(
        "month",
        format!(
          "expected YYYY-MM, got {s:?}"
        )
      )
    };
    let (year, month) = s
      .trim()
      .split_once('-')
      .ok_or_else(invalid)?;
    let year = year
      .parse::<i32>()
      .map_err(|_| invalid())?;
    let month = month
      .parse::<u32>()
      .map_err(|_| invalid())?;
    Self::new(year, month)
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash,
)]
pub enum StatusColor {
  InProgress,
  Todo,
  Completed
}

impl StatusColor {
  pub fn class_name(
    &self
  ) -> &'static str {
    match self {
      | Self::InProgress => "in-progress",
      | Self::Todo => "todo",
      | Self::Completed => "completed"
    }
  }

  /// SGR code used by the terminal renderer.
  pub fn ansi_code(
    &self
  ) -> &'static str {
    match self {
      | Self::InProgress => "33",
      | Self::Todo => "34",
      | Self::Completed => "32"
    }
  }
}

/// In-progress beats todo beats all-completed; no missions, no color.
pub fn status_color(
  missions: &[Mission]
) -> Option<StatusColor> {
  if missions.is_empty() {
    return None;
  }
  let any = |status: MissionStatus| {
    missions
      .iter()
      .any(|mission| mission.status == status)
  };
  if any(MissionStatus::InProgress) {
    Some(StatusColor::InProgress)
  } else if any(MissionStatus::Todo) {
    Some(StatusColor::Todo)
  } else {
    Some(StatusColor::Completed)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayCell {
  pub date:        NaiveDate,
  pub missions:    Vec<Mission>,
  pub is_today:    bool,
  pub is_selected: bool,
  pub in_month:    bool,
  pub color:       Option<StatusColor>
}

impl DayCell {
  fn build(
    date: NaiveDate,
    index: &DateBucketIndex,
    today: NaiveDate,
    selected: Option<NaiveDate>,
    in_month: bool
  ) -> Self {
    let missions =
      index.bucket(date).to_vec();
    let color = status_color(&missions);
    Self {
      date,
      missions,
      is_today: date == today,
      is_selected: selected == Some(date),
      in_month,
      color
    }
  }

  pub fn preview(&self) -> &[Mission] {
    let end = self
      .missions
      .len()
      .min(PREVIEW_LIMIT);
    &self.missions[..end]
  }

  pub fn overflow(&self) -> usize {
    self
      .missions
      .len()
      .saturating_sub(PREVIEW_LIMIT)
  }
}

/// Every day of `month`, first to last.
#[tracing::instrument(skip(index))]
pub fn month_grid(
  month: CalendarMonth,
  index: &DateBucketIndex,
  today: NaiveDate,
  selected: Option<NaiveDate>
) -> Vec<DayCell> {
  let cells: Vec<DayCell> =
    date_span(
      month.first_day(),
      month.last_day()
    )
    .map(|date| {
      DayCell::build(
        date, index, today, selected, true
      )
    })
    .collect();
  debug!(
    %month,
    cells = cells.len(),
    "built month grid"
  );
  cells
}

/// `month` surrounded by adjacent-month days so the grid is whole weeks
/// starting on `week_start`.
#[tracing::instrument(skip(index))]
pub fn padded_month_grid(
  month: CalendarMonth,
  index: &DateBucketIndex,
  today: NaiveDate,
  selected: Option<NaiveDate>,
  week_start: Weekday
) -> Vec<DayCell> {
  let start = start_of_week(
    month.first_day(),
    week_start
  );
  let end = add_days(
    start_of_week(
      month.last_day(),
      week_start
    ),
    6
  );
  let cells: Vec<DayCell> =
    date_span(start, end)
      .map(|date| {
        DayCell::build(
          date,
          index,
          today,
          selected,
          month.contains(date)
        )
      })
      .collect();
  debug!(
    %month,
    cells = cells.len(),
    "built padded month grid"
  );
  cells
}

/// Short weekday names in display order.
pub fn weekday_header(
  week_start: Weekday
) -> Vec<String> {
  let mut day = week_start;
  let mut labels =
    Vec::with_capacity(7);
  for _ in 0..7 {
    labels.push(day.to_string());
    day = day.succ();
  }
  labels
}

fn date_span(
  start: NaiveDate,
  end: NaiveDate
) -> impl Iterator<Item = NaiveDate> {
  start
    .iter_days()
    .take_while(move |day| *day <= end)
}

fn first_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .unwrap_or(NaiveDate::MIN)
}

fn last_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  let (next_year, next_month) =
    if month >= 12 {
      (year.saturating_add(1), 1_u32)
    } else {
      (year, month + 1)
    };
  add_days(
    first_day_of_month(
      next_year, next_month
    ),
    -1
  )
}

fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  last_day_of_month(year, month).day()
}

pub(crate) fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or(date)
}

pub(crate) fn start_of_week(
  day: NaiveDate,
  week_start: Weekday
) -> NaiveDate {
  let day_idx = day
    .weekday()
    .num_days_from_monday()
    as i64;
  let start_idx = week_start
    .num_days_from_monday()
    as i64;
  let diff =
    (7 + day_idx - start_idx) % 7;
  add_days(day, -diff)
}
