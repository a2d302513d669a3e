use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  Datelike,
  Duration,
  Local,
  NaiveDate,
  NaiveDateTime,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "mission-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "MISSION_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "MISSION_TIME_CONFIG";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Explicitly configured zone; `None` means the system local zone.
pub fn configured_timezone()
-> Option<&'static Tz> {
  static CONFIGURED_TZ: OnceLock<
    Option<Tz>
  > = OnceLock::new();
  CONFIGURED_TZ
    .get_or_init(
      resolve_configured_timezone
    )
    .as_ref()
}

/// Wall-clock "now" in the user's zone.
pub fn local_now() -> NaiveDateTime {
  match configured_timezone() {
    | Some(tz) => {
      Utc::now()
        .with_timezone(tz)
        .naive_local()
    }
    | None => Local::now().naive_local()
  }
}

pub fn local_today() -> NaiveDate {
  local_now().date()
}

fn resolve_configured_timezone()
-> Option<Tz> {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return Some(tz);
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return Some(tz);
  }

  tracing::debug!(
    "no timezone configured; using \
     system local time"
  );
  None
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

  let timezone =
    timezone_from_toml(&raw)
      .map_err(|err| {
        tracing::error!(
          file = %path.display(),
          error = %err,
          "failed parsing timezone config file"
        );
      })
      .ok()
      .flatten();
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

/// `timezone = ".."` at the top level or under `[time]`.
fn timezone_from_toml(
  raw: &str
) -> Result<Option<String>, toml::de::Error>
{
  let parsed =
    toml::from_str::<TimezoneConfig>(raw)?;
  Ok(parsed.timezone.or_else(|| {
    parsed
      .time
      .and_then(|section| section.timezone)
  }))
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
        "configured timezone"
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

/// Resolves a day argument relative to `today`.
#[tracing::instrument(skip(today))]
pub fn parse_day_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower = token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" | "now" => return Ok(today),
    | "tomorrow" => {
      return Ok(shift_days(today, 1));
    }
    | "yesterday" => {
      return Ok(shift_days(today, -1));
    }
    | _ => {}
  }

  if let Some(weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(next_weekday_date(
      today, weekday
    ));
  }

  let offset_re = Regex::new(
    r"^(?P<sign>[+-])(?P<n>\d+)(?P<unit>[dw])$"
  )
  .context("failed to compile offset regex")?;
  if let Some(captures) =
    offset_re.captures(&lower)
  {
    let n = captures["n"]
      .parse::<i64>()
      .with_context(|| {
        format!(
          "offset out of range: {token}"
        )
      })?;
    let days = match &captures["unit"] {
      | "w" => n.saturating_mul(7),
      | _ => n
    };
    let days = if &captures["sign"] == "-"
    {
      -days
    } else {
      days
    };
    return today
      .checked_add_signed(Duration::days(
        days
      ))
      .ok_or_else(|| {
        anyhow!(
          "date offset out of range: \
           {token}"
        )
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
    "unrecognized date expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     today/tomorrow/yesterday, weekday \
     names (e.g. monday), +Nd/-Nd, \
     +Nw/-Nw, YYYY-MM-DD"
  })
}

pub(crate) fn parse_weekday_name(
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

/// Strictly after `from`; the same weekday means next week.
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
  shift_days(from, delta)
}

fn shift_days(
  from: NaiveDate,
  days: i64
) -> NaiveDate {
  from
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or(from)
}
