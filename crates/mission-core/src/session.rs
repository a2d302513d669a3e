use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

const SESSION_FILE: &str = "session.json";

/// Who the caches act for. Created at sign-in, dropped at sign-out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,

    #[serde(default)]
    pub email: Option<String>,

    /// Bearer token for the remote store; local profiles have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl Session {
    pub fn local(profile: &str) -> Self {
        Self {
            user_id: profile.to_string(),
            email: None,
            access_token: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.user_id)
    }
}

pub fn session_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SESSION_FILE)
}

#[tracing::instrument(skip(data_dir))]
pub fn load_session(data_dir: &Path) -> anyhow::Result<Option<Session>> {
    let path = session_path(data_dir);
    if !path.exists() {
        debug!(file = %path.display(), "no saved session");
        return Ok(None);
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(None);
    }

    let session: Session = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing {}", path.display()))?;
    debug!(user_id = %session.user_id, "loaded session");
    Ok(Some(session))
}

#[tracing::instrument(skip(data_dir, session), fields(user_id = %session.user_id))]
pub fn save_session(data_dir: &Path, session: &Session) -> anyhow::Result<()> {
    fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let path = session_path(data_dir);

    let mut temp = NamedTempFile::new_in(data_dir)?;
    serde_json::to_writer_pretty(&mut temp, session)?;
    writeln!(temp)?;
    temp.flush()?;
    temp.persist(&path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    info!(file = %path.display(), "saved session");
    Ok(())
}

/// Returns whether a session file was present.
#[tracing::instrument(skip(data_dir))]
pub fn clear_session(data_dir: &Path) -> anyhow::Result<bool> {
    let path = session_path(data_dir);
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(&path).with_context(|| format!("failed removing {}", path.display()))?;
    info!(file = %path.display(), "cleared session");
    Ok(true)
}
