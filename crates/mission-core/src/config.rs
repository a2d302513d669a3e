use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use chrono::Weekday;
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::datetime::parse_weekday_name;
use crate::store::RestConfig;

const RC_ENV_VAR: &str = "MISSIONRC";
const URL_ENV_VAR: &str = "MISSION_URL";
const ANON_KEY_ENV_VAR: &str =
  "MISSION_ANON_KEY";

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Backend {
  File,
  Rest
}

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    for (key, value) in [
      ("data.location", "~/.mission"),
      ("store.backend", "file"),
      ("rest.timeout", "30"),
      ("profile", "default"),
      ("calendar.week_start", "monday"),
      ("calendar.padded", "off"),
      ("color", "on")
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }
    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    missionrc_override
  ))]
  pub fn load(
    missionrc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let missionrc =
      resolve_missionrc_path(
        missionrc_override
      )?;
    if let Some(path) = missionrc {
      info!(missionrc = %path.display(), "loading missionrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no missionrc found; using \
         defaults"
      );
    }

    cfg.apply_env(|name| {
      std::env::var(name).ok()
    });
    Ok(cfg)
  }

  /// `MISSION_URL` / `MISSION_ANON_KEY` win over the rc file.
  pub fn apply_env<F>(
    &mut self,
    lookup: F
  ) where
    F: Fn(&str) -> Option<String>
  {
    for (var, key) in [
      (URL_ENV_VAR, "rest.url"),
      (ANON_KEY_ENV_VAR, "rest.anon_key")
    ] {
      if let Some(value) = lookup(var)
        && !value.trim().is_empty()
      {
        debug!(key, env = var, "config key set from environment");
        self.map.insert(
          key.to_string(),
          value.trim().to_string()
        );
      }
    }
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn backend(
    &self
  ) -> anyhow::Result<Backend> {
    let raw = self
      .get("store.backend")
      .unwrap_or_else(|| {
        "file".to_string()
      });
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "file" | "local" => {
        Ok(Backend::File)
      }
      | "rest" | "remote" => {
        Ok(Backend::Rest)
      }
      | other => {
        Err(anyhow!(
          "invalid store.backend: \
           {other} (expected file or \
           rest)"
        ))
      }
    }
  }

  pub fn profile(&self) -> String {
    self
      .get("profile")
      .map(|p| p.trim().to_string())
      .filter(|p| !p.is_empty())
      .unwrap_or_else(|| {
        "default".to_string()
      })
  }

  pub fn week_start(
    &self
  ) -> anyhow::Result<Weekday> {
    let raw = self
      .get("calendar.week_start")
      .unwrap_or_else(|| {
        "monday".to_string()
      });
    parse_weekday_name(
      &raw.trim().to_ascii_lowercase()
    )
    .ok_or_else(|| {
      anyhow!(
        "invalid calendar.week_start: \
         {raw}"
      )
    })
  }

  pub fn padded_calendar(&self) -> bool {
    self
      .get_bool("calendar.padded")
      .unwrap_or(false)
  }

  #[tracing::instrument(skip(self))]
  pub fn rest_config(
    &self
  ) -> anyhow::Result<RestConfig> {
    let base_url = self
      .get("rest.url")
      .ok_or_else(|| {
        anyhow!(
          "rest.url is not set (use \
           the missionrc or \
           {URL_ENV_VAR})"
        )
      })?;
    validate_base_url(&base_url)?;

    let anon_key = self
      .get("rest.anon_key")
      .ok_or_else(|| {
        anyhow!(
          "rest.anon_key is not set \
           (use the missionrc or \
           {ANON_KEY_ENV_VAR})"
        )
      })?;

    let timeout_raw = self
      .get("rest.timeout")
      .unwrap_or_else(|| {
        "30".to_string()
      });
    let timeout_secs = timeout_raw
      .trim()
      .parse::<u64>()
      .ok()
      .filter(|secs| *secs > 0)
      .ok_or_else(|| {
        anyhow!(
          "invalid rest.timeout: \
           {timeout_raw}"
        )
      })?;

    Ok(RestConfig {
      base_url,
      anon_key,
      timeout: Duration::from_secs(
        timeout_secs
      )
    })
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
          file = %path.display(),
          include = %include_path.display(),
          line = line_num + 1,
          "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

/// Absolute `http`/`https` URL with a host.
pub fn validate_base_url(
  raw: &str
) -> anyhow::Result<()> {
  let url = reqwest::Url::parse(
    raw.trim()
  )
  .with_context(|| {
    format!("invalid rest.url: {raw}")
  })?;
  if !matches!(
    url.scheme(),
    "http" | "https"
  ) {
    return Err(anyhow!(
      "invalid rest.url: {raw} (scheme \
       must be http or https)"
    ));
  }
  if url.host_str().is_none() {
    return Err(anyhow!(
      "invalid rest.url: {raw} (missing \
       host)"
    ));
  }
  Ok(())
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_missionrc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping missionrc"
    );
    return Ok(None);
  };
  let candidate =
    home.join(".missionrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".mission"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

pub(crate) fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
