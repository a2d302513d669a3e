use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use tracing::trace;

use crate::error::ValidationError;
use crate::mission::{
  MAX_IMPORTANCE,
  MIN_IMPORTANCE,
  Mission,
  MissionStatus
};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub enum StatusFilter {
  #[default]
  All,
  Only(MissionStatus)
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub enum ImportanceFilter {
  #[default]
  All,
  Exactly(u8)
}

impl FromStr for StatusFilter {
  type Err = ValidationError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    if s.trim().eq_ignore_ascii_case("all")
    {
      return Ok(Self::All);
    }
    s.parse::<MissionStatus>()
      .map(Self::Only)
  }
}

impl FromStr for ImportanceFilter {
  type Err = ValidationError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let trimmed = s.trim();
    if trimmed.eq_ignore_ascii_case("all")
    {
      return Ok(Self::All);
    }
    match trimmed.parse::<u8>() {
      | Ok(level)
        if (MIN_IMPORTANCE
          ..=MAX_IMPORTANCE)
          .contains(&level) =>
      {
        Ok(Self::Exactly(level))
      }
      | _ => {
        Err(ValidationError::new(
          "importance",
          format!(
            "expected all or \
             {MIN_IMPORTANCE}-{MAX_IMPORTANCE}, \
             got {trimmed:?}"
          )
        ))
      }
    }
  }
}

impl fmt::Display for StatusFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | Self::All => f.write_str("all"),
      | Self::Only(status) => {
        f.write_str(status.as_str())
      }
    }
  }
}

impl fmt::Display for ImportanceFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | Self::All => f.write_str("all"),
      | Self::Exactly(level) => {
        write!(f, "{level}")
      }
    }
  }
}

#[derive(Debug, Clone, Copy)]
enum Pred {
  StatusEq(MissionStatus),
  ImportanceEq(u8)
}

impl Pred {
  fn matches(
    &self,
    mission: &Mission
  ) -> bool {
    match self {
      | Pred::StatusEq(status) => {
        mission.status == *status
      }
      | Pred::ImportanceEq(level) => {
        mission.importance == *level
      }
    }
  }
}

/// Conjunction of the active status and importance selections.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub struct MissionFilter {
  pub status:     StatusFilter,
  pub importance: ImportanceFilter
}

impl MissionFilter {
  pub fn new(
    status: StatusFilter,
    importance: ImportanceFilter
  ) -> Self {
    Self {
      status,
      importance
    }
  }

  pub fn parse(
    status: &str,
    importance: &str
  ) -> Result<Self, ValidationError> {
    Ok(Self {
      status:     status.parse()?,
      importance: importance.parse()?
    })
  }

  pub fn is_identity(&self) -> bool {
    self.status == StatusFilter::All
      && self.importance
        == ImportanceFilter::All
  }

  fn preds(&self) -> Vec<Pred> {
    let mut preds = Vec::with_capacity(2);
    if let StatusFilter::Only(status) =
      self.status
    {
      preds.push(Pred::StatusEq(status));
    }
    if let ImportanceFilter::Exactly(
      level
    ) = self.importance
    {
      preds
        .push(Pred::ImportanceEq(level));
    }
    preds
  }

  pub fn matches(
    &self,
    mission: &Mission
  ) -> bool {
    self
      .preds()
      .iter()
      .all(|pred| pred.matches(mission))
  }

  /// New vector of matching missions, in input order.
  #[tracing::instrument(skip(missions))]
  pub fn apply(
    &self,
    missions: &[Mission]
  ) -> Vec<Mission> {
    let preds = self.preds();
    let out: Vec<Mission> = missions
      .iter()
      .filter(|mission| {
        preds
          .iter()
          .all(|pred| pred.matches(mission))
      })
      .cloned()
      .collect();
    trace!(
      input = missions.len(),
      kept = out.len(),
      "filter applied"
    );
    out
  }

  /// Matching missions scheduled on `day`. Unreadable dates never match.
  pub fn apply_on_day(
    &self,
    missions: &[Mission],
    day: NaiveDate
  ) -> Vec<Mission> {
    missions
      .iter()
      .filter(|mission| {
        mission
          .scheduled_day()
          .is_ok_and(|d| d == day)
      })
      .filter(|mission| {
        self.matches(mission)
      })
      .cloned()
      .collect()
  }
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
    importance: u8,
    date: &str
  ) -> Mission {
    let stamp = Utc
      .with_ymd_and_hms(2024, 6, 1, 9, 0, 0)
      .single()
      .expect("valid timestamp");
    Mission {
      id: Uuid::new_v4(),
      user_id: "u1".to_string(),
      title: format!("{status}-{importance}"),
      description: None,
      estimated_duration: 45,
      importance,
      status,
      scheduled_date: date.to_string(),
      scheduled_time: None,
      priority: None,
      tags: None,
      category_id: None,
      created_at: stamp,
      updated_at: stamp
    }
  }

  fn sample() -> Vec<Mission> {
    vec![
      mission(MissionStatus::Todo, 3, "2024-06-03"),
      mission(MissionStatus::Completed, 5, "2024-06-03"),
      mission(MissionStatus::InProgress, 3, "2024-06-04"),
      mission(MissionStatus::Completed, 3, "2024-06-05"),
    ]
  }

  #[test]
  fn all_all_is_identity() {
    let missions = sample();
    let filter =
      MissionFilter::parse("all", "all")
        .expect("parse filter");
    assert!(filter.is_identity());
    assert_eq!(filter.apply(&missions), missions);
  }

  #[test]
  fn filters_compose_as_intersection() {
    let missions = sample();
    let filter =
      MissionFilter::parse("completed", "3")
        .expect("parse filter");
    let out = filter.apply(&missions);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].id, missions[3].id);

    let by_status = MissionFilter::new(
      StatusFilter::Only(
        MissionStatus::Completed
      ),
      ImportanceFilter::All
    )
    .apply(&missions);
    assert_eq!(by_status.len(), 2);
  }

  #[test]
  fn filtering_leaves_source_untouched() {
    let missions = sample();
    let before = missions.clone();
    let _ = MissionFilter::parse("todo", "5")
      .expect("parse filter")
      .apply(&missions);
    assert_eq!(missions, before);
  }

  #[test]
  fn rejects_unknown_option_values() {
    assert!("someday".parse::<StatusFilter>().is_err());
    assert!("0".parse::<ImportanceFilter>().is_err());
    assert!("6".parse::<ImportanceFilter>().is_err());
    assert_eq!(
      "4".parse::<ImportanceFilter>(),
      Ok(ImportanceFilter::Exactly(4))
    );
    assert_eq!(
      StatusFilter::Only(MissionStatus::InProgress)
        .to_string(),
      "in_progress"
    );
  }

  #[test]
  fn selected_day_view_combines_date_and_filter() {
    let missions = sample();
    let day = NaiveDate::from_ymd_opt(2024, 6, 3)
      .expect("valid date");
    let all = MissionFilter::default()
      .apply_on_day(&missions, day);
    assert_eq!(all.len(), 2);

    let todo = MissionFilter::parse("todo", "all")
      .expect("parse filter")
      .apply_on_day(&missions, day);
    assert_eq!(todo.len(), 1);
    assert_eq!(todo[0].status, MissionStatus::Todo);
  }
}
