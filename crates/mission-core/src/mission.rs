use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{DataQualityError, ValidationError};

pub const MIN_IMPORTANCE: u8 = 1;
pub const MAX_IMPORTANCE: u8 = 5;
pub const DEFAULT_CATEGORY_COLOR: &str = "#3b82f6";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    #[default]
    Todo,
    InProgress,
    Completed,
}

impl MissionStatus {
    pub const ALL: [MissionStatus; 3] = [Self::Todo, Self::InProgress, Self::Completed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Todo => "To do",
            Self::InProgress => "In progress",
            Self::Completed => "Completed",
        }
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "todo" => Ok(Self::Todo),
            "in_progress" | "inprogress" => Ok(Self::InProgress),
            "completed" | "done" => Ok(Self::Completed),
            other => Err(ValidationError::new(
                "status",
                format!("expected todo, in_progress or completed, got {other:?}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mission {
    pub id: Uuid,

    #[serde(default)]
    pub user_id: String,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Planned cost in minutes.
    pub estimated_duration: u32,

    pub importance: u8,

    #[serde(default)]
    pub status: MissionStatus,

    /// Kept as the raw text the store returned; see [`Mission::scheduled_day`].
    /// A null or non-string value reads as `""` so one bad row cannot sink a
    /// whole listing.
    #[serde(default, deserialize_with = "lenient_date_text")]
    pub scheduled_date: String,

    #[serde(default)]
    pub scheduled_time: Option<String>,

    #[serde(default)]
    pub priority: Option<i32>,

    #[serde(default)]
    pub tags: Option<Vec<String>>,

    #[serde(default)]
    pub category_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Mission {
    /// The calendar day this mission is bucketed under.
    pub fn scheduled_day(&self) -> Result<NaiveDate, DataQualityError> {
        parse_scheduled_date(&self.scheduled_date).map_err(|reason| DataQualityError {
            mission_id: self.id,
            raw: self.scheduled_date.clone(),
            reason,
        })
    }

    pub fn is_completed(&self) -> bool {
        self.status == MissionStatus::Completed
    }

    pub fn tags(&self) -> &[String] {
        self.tags.as_deref().unwrap_or_default()
    }
}

fn lenient_date_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(text) => text,
        _ => String::new(),
    })
}

/// Local calendar date of a stored `scheduled_date`.
///
/// Timestamps keep the date as written; no zone conversion happens here.
pub fn parse_scheduled_date(raw: &str) -> Result<NaiveDate, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("scheduled date is missing".to_string());
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.date_naive());
    }

    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(ndt.date());
        }
    }

    Err("expected YYYY-MM-DD or an ISO 8601 timestamp".to_string())
}

pub fn format_day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreateMissionData {
    pub title: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub estimated_duration: u32,

    pub importance: u8,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MissionStatus>,

    pub scheduled_date: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
}

impl CreateMissionData {
    pub fn new(
        title: impl Into<String>,
        scheduled_date: NaiveDate,
        estimated_duration: u32,
        importance: u8,
    ) -> Self {
        Self {
            title: title.into(),
            description: None,
            estimated_duration,
            importance,
            status: None,
            scheduled_date: format_day_key(scheduled_date),
            scheduled_time: None,
            priority: None,
            tags: None,
            category_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)?;
        validate_duration(self.estimated_duration)?;
        validate_importance(self.importance)?;
        validate_scheduled_date(&self.scheduled_date)?;
        if let Some(time) = self.scheduled_time.as_deref() {
            validate_scheduled_time(time)?;
        }
        Ok(())
    }
}

/// Partial update. `None` leaves a field alone; for clearable fields
/// `Some(None)` clears it.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct UpdateMissionData {
    #[serde(skip)]
    pub id: Uuid,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MissionStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<Option<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Option<i32>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Option<Vec<String>>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Option<Uuid>>,
}

impl UpdateMissionData {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn with_status(id: Uuid, status: MissionStatus) -> Self {
        Self {
            id,
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::new(self.id)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = self.title.as_deref() {
            validate_title(title)?;
        }
        if let Some(duration) = self.estimated_duration {
            validate_duration(duration)?;
        }
        if let Some(importance) = self.importance {
            validate_importance(importance)?;
        }
        if let Some(date) = self.scheduled_date.as_deref() {
            validate_scheduled_date(date)?;
        }
        if let Some(Some(time)) = self.scheduled_time.as_ref() {
            validate_scheduled_time(time)?;
        }
        Ok(())
    }

    /// Used by stores that apply patches themselves.
    pub fn apply_to(&self, mission: &mut Mission) {
        if let Some(title) = &self.title {
            mission.title = title.clone();
        }
        if let Some(description) = &self.description {
            mission.description = description.clone();
        }
        if let Some(duration) = self.estimated_duration {
            mission.estimated_duration = duration;
        }
        if let Some(importance) = self.importance {
            mission.importance = importance;
        }
        if let Some(status) = self.status {
            mission.status = status;
        }
        if let Some(date) = &self.scheduled_date {
            mission.scheduled_date = date.clone();
        }
        if let Some(time) = &self.scheduled_time {
            mission.scheduled_time = time.clone();
        }
        if let Some(priority) = self.priority {
            mission.priority = priority;
        }
        if let Some(tags) = &self.tags {
            mission.tags = tags.clone();
        }
        if let Some(category_id) = self.category_id {
            mission.category_id = category_id;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: Uuid,

    #[serde(default)]
    pub user_id: String,

    pub name: String,

    #[serde(default = "default_category_color")]
    pub color: String,

    #[serde(default)]
    pub icon: Option<String>,

    pub created_at: DateTime<Utc>,
}

fn default_category_color() -> String {
    DEFAULT_CATEGORY_COLOR.to_string()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreateCategoryData {
    pub name: String,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl CreateCategoryData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: default_category_color(),
            icon: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_category_name(&self.name)?;
        validate_color(&self.color)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct UpdateCategoryData {
    #[serde(skip)]
    pub id: Uuid,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<Option<String>>,
}

impl UpdateCategoryData {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = self.name.as_deref() {
            validate_category_name(name)?;
        }
        if let Some(color) = self.color.as_deref() {
            validate_color(color)?;
        }
        Ok(())
    }

    pub fn apply_to(&self, category: &mut Category) {
        if let Some(name) = &self.name {
            category.name = name.clone();
        }
        if let Some(color) = &self.color {
            category.color = color.clone();
        }
        if let Some(icon) = &self.icon {
            category.icon = icon.clone();
        }
    }
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::new("title", "must not be empty"));
    }
    Ok(())
}

fn validate_duration(minutes: u32) -> Result<(), ValidationError> {
    if minutes == 0 {
        return Err(ValidationError::new(
            "estimated_duration",
            "must be a positive number of minutes",
        ));
    }
    Ok(())
}

fn validate_importance(importance: u8) -> Result<(), ValidationError> {
    if !(MIN_IMPORTANCE..=MAX_IMPORTANCE).contains(&importance) {
        return Err(ValidationError::new(
            "importance",
            format!("must be between {MIN_IMPORTANCE} and {MAX_IMPORTANCE}, got {importance}"),
        ));
    }
    Ok(())
}

fn validate_scheduled_date(raw: &str) -> Result<(), ValidationError> {
    parse_scheduled_date(raw)
        .map(|_| ())
        .map_err(|reason| ValidationError::new("scheduled_date", reason))
}

fn validate_scheduled_time(raw: &str) -> Result<(), ValidationError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map(|_| ())
        .map_err(|_| ValidationError::new("scheduled_time", format!("expected HH:MM, got {raw:?}")))
}

fn validate_category_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::new("name", "must not be empty"));
    }
    Ok(())
}

fn validate_color(color: &str) -> Result<(), ValidationError> {
    let hex = color.strip_prefix('#').unwrap_or_default();
    let valid = matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(ValidationError::new(
            "color",
            format!("expected #rgb or #rrggbb, got {color:?}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn scheduled_date_accepts_plain_and_timestamp_forms() {
        assert_eq!(parse_scheduled_date("2024-06-03"), Ok(day(2024, 6, 3)));
        assert_eq!(
            parse_scheduled_date("2024-06-03T23:30:00-05:00"),
            Ok(day(2024, 6, 3))
        );
        assert_eq!(
            parse_scheduled_date("2024-06-03T08:15:00"),
            Ok(day(2024, 6, 3))
        );
        assert_eq!(
            parse_scheduled_date("2024-06-03 08:15"),
            Ok(day(2024, 6, 3))
        );
    }

    #[test]
    fn scheduled_date_rejects_garbage_and_empty() {
        assert!(parse_scheduled_date("").is_err());
        assert!(parse_scheduled_date("03/06/2024").is_err());
        assert!(parse_scheduled_date("2024-02-30").is_err());
    }

    #[test]
    fn status_parses_option_values() {
        assert_eq!("in_progress".parse::<MissionStatus>(), Ok(MissionStatus::InProgress));
        assert_eq!("In-Progress".parse::<MissionStatus>(), Ok(MissionStatus::InProgress));
        assert_eq!("done".parse::<MissionStatus>(), Ok(MissionStatus::Completed));
        assert!("blocked".parse::<MissionStatus>().is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        let raw = serde_json::to_string(&MissionStatus::InProgress).expect("serialize");
        assert_eq!(raw, "\"in_progress\"");
    }

    #[test]
    fn create_payload_requires_core_fields() {
        let ok = CreateMissionData::new("Write report", day(2024, 6, 3), 90, 3);
        assert!(ok.validate().is_ok());

        let mut empty_title = ok.clone();
        empty_title.title = "   ".to_string();
        assert_eq!(empty_title.validate().map_err(|e| e.field), Err("title"));

        let mut zero = ok.clone();
        zero.estimated_duration = 0;
        assert_eq!(zero.validate().map_err(|e| e.field), Err("estimated_duration"));

        let mut loud = ok.clone();
        loud.importance = 6;
        assert_eq!(loud.validate().map_err(|e| e.field), Err("importance"));

        let mut undated = ok;
        undated.scheduled_date = String::new();
        assert_eq!(undated.validate().map_err(|e| e.field), Err("scheduled_date"));
    }

    #[test]
    fn update_payload_skips_untouched_fields() {
        let id = Uuid::new_v4();
        let mut patch = UpdateMissionData::with_status(id, MissionStatus::Completed);
        patch.description = Some(None);
        let body = serde_json::to_value(&patch).expect("serialize");
        assert_eq!(
            body,
            serde_json::json!({ "status": "completed", "description": null })
        );
        assert!(UpdateMissionData::new(id).is_empty());
        assert!(!patch.is_empty());
    }

    #[test]
    fn category_color_must_be_hex() {
        let mut data = CreateCategoryData::new("Work");
        assert!(data.validate().is_ok());
        data.color = "blue".to_string();
        assert_eq!(data.validate().map_err(|e| e.field), Err("color"));
    }
}
