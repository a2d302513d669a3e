use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use chrono::NaiveDate;
use tracing::{
  debug,
  warn
};

use crate::error::DataQualityError;
use crate::mission::{
  Mission,
  parse_scheduled_date
};

/// Missions grouped by the local day they are scheduled on.
///
/// Grouping is stable: inside a day, missions keep the order they had in
/// the input. Records whose date cannot be read are left out and kept in
/// [`DateBucketIndex::rejected`].
#[derive(Debug, Clone, Default)]
pub struct DateBucketIndex {
  buckets:  BTreeMap<NaiveDate, Vec<Mission>>,
  rejected: Vec<DataQualityError>
}

impl DateBucketIndex {
  #[tracing::instrument(skip_all)]
  pub fn build<'a, I>(
    missions: I
  ) -> Self
  where
    I: IntoIterator<Item = &'a Mission>
  {
    let mut index = Self::default();
    let mut seen = 0_usize;

    for mission in missions {
      seen += 1;
      match mission.scheduled_day() {
        | Ok(day) => {
          index
            .buckets
            .entry(day)
            .or_default()
            .push(mission.clone());
        }
        | Err(err) => {
          warn!(
            mission_id = %err.mission_id,
            raw = %err.raw,
            reason = %err.reason,
            "excluding mission from date buckets"
          );
          index.rejected.push(err);
        }
      }
    }

    debug!(
      missions = seen,
      days = index.buckets.len(),
      rejected = index.rejected.len(),
      "built date bucket index"
    );
    index
  }

  /// Missions on `day`; empty when nothing is scheduled.
  pub fn bucket(
    &self,
    day: NaiveDate
  ) -> &[Mission] {
    self
      .buckets
      .get(&day)
      .map(Vec::as_slice)
      .unwrap_or_default()
  }

  /// Lookup by `YYYY-MM-DD` key. An unreadable key has no bucket.
  pub fn bucket_by_key(
    &self,
    key: &str
  ) -> &[Mission] {
    match parse_scheduled_date(key) {
      | Ok(day) => self.bucket(day),
      | Err(_) => &[]
    }
  }

  pub fn days(
    &self
  ) -> impl Iterator<Item = (NaiveDate, &[Mission])>
  {
    self
      .buckets
      .iter()
      .map(|(day, missions)| {
        (*day, missions.as_slice())
      })
  }

  /// Days in `range` that have at least one mission, in date order.
  pub fn range(
    &self,
    range: RangeInclusive<NaiveDate>
  ) -> impl Iterator<Item = (NaiveDate, &[Mission])>
  {
    self
      .buckets
      .range(range)
      .map(|(day, missions)| {
        (*day, missions.as_slice())
      })
  }

  pub fn day_count(&self) -> usize {
    self.buckets.len()
  }

  pub fn mission_count(&self) -> usize {
    self
      .buckets
      .values()
      .map(Vec::len)
      .sum()
  }

  pub fn rejected(
    &self
  ) -> &[DataQualityError] {
    &self.rejected
  }
}
