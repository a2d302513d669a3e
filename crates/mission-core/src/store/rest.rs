use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{
  Method,
  RequestBuilder,
  StatusCode,
  header
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{
  debug,
  info,
  warn
};
use uuid::Uuid;

use super::MissionStore;
use crate::error::StoreError;
use crate::mission::{
  Category,
  CreateCategoryData,
  CreateMissionData,
  Mission,
  UpdateCategoryData,
  UpdateMissionData
};
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct RestConfig {
  pub base_url: String,
  pub anon_key: String,
  pub timeout:  Duration
}

/// Hosted backend: PostgREST tables plus token auth.
#[derive(Debug, Clone)]
pub struct RestStore {
  base_url: String,
  anon_key: String,
  client:   reqwest::Client
}

#[derive(Debug, Deserialize)]
struct AuthUser {
  id:    String,
  #[serde(default)]
  email: Option<String>
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
  #[serde(default)]
  access_token: Option<String>,
  #[serde(default)]
  user:         Option<AuthUser>,
  #[serde(default)]
  id:           Option<String>,
  #[serde(default)]
  email:        Option<String>
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
  #[serde(default)]
  message:           Option<String>,
  #[serde(default)]
  msg:               Option<String>,
  #[serde(default)]
  error_description: Option<String>,
  #[serde(default)]
  error:             Option<String>
}

impl RestStore {
  pub fn new(
    config: RestConfig
  ) -> Result<Self, StoreError> {
    let base_url = config
      .base_url
      .trim()
      .trim_end_matches('/')
      .to_string();
    if base_url.is_empty() {
      return Err(StoreError::Config(
        "rest.url is not set".to_string()
      ));
    }
    if config.anon_key.trim().is_empty() {
      return Err(StoreError::Config(
        "rest.anon_key is not set"
          .to_string()
      ));
    }

    let client =
      reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|err| {
          StoreError::Config(format!(
            "failed building HTTP \
             client: {err}"
          ))
        })?;

    info!(
      base_url = %base_url,
      timeout_secs = config.timeout.as_secs(),
      "configured rest store"
    );
    Ok(Self {
      base_url,
      anon_key: config.anon_key,
      client
    })
  }

  /// Registers an account. Returns a session only when the service signs
  /// the user in right away (no email confirmation step).
  #[tracing::instrument(skip(self, password))]
  pub async fn sign_up(
    &self,
    email: &str,
    password: &str
  ) -> Result<Option<Session>, StoreError> {
    let body = serde_json::json!({
      "email": email,
      "password": password
    });
    let request = self
      .request(
        Method::POST,
        "/auth/v1/signup",
        None
      )
      .body(body.to_string());
    let response: AuthResponse =
      self.send_json(request).await?;

    let session =
      response.into_session(email).ok();
    info!(
      signed_in = session.is_some(),
      "registered account"
    );
    Ok(session)
  }

  #[tracing::instrument(skip(self, password))]
  pub async fn sign_in(
    &self,
    email: &str,
    password: &str
  ) -> Result<Session, StoreError> {
    let body = serde_json::json!({
      "email": email,
      "password": password
    });
    let request = self
      .request(
        Method::POST,
        "/auth/v1/token?grant_type=password",
        None
      )
      .body(body.to_string());
    let response: AuthResponse =
      self.send_json(request).await?;

    let session =
      response.into_session(email)?;
    info!(
      user_id = %session.user_id,
      "signed in"
    );
    Ok(session)
  }

  #[tracing::instrument(skip(self, session), fields(user_id = %session.user_id))]
  pub async fn sign_out(
    &self,
    session: &Session
  ) -> Result<(), StoreError> {
    let request = self.request(
      Method::POST,
      "/auth/v1/logout",
      Some(session)
    );
    self.send(request).await?;
    info!("signed out");
    Ok(())
  }

  fn request(
    &self,
    method: Method,
    path: &str,
    session: Option<&Session>
  ) -> RequestBuilder {
    let url =
      format!("{}{}", self.base_url, path);
    let bearer = session
      .and_then(|s| {
        s.access_token.as_deref()
      })
      .unwrap_or(self.anon_key.as_str());

    self
      .client
      .request(method, url.as_str())
      .header("apikey", &self.anon_key)
      .header(
        header::AUTHORIZATION,
        format!("Bearer {bearer}")
      )
      .header(
        header::CONTENT_TYPE,
        "application/json"
      )
      .header(
        header::ACCEPT,
        "application/json"
      )
      .header(
        header::CACHE_CONTROL,
        "no-cache"
      )
  }

  fn authed(
    &self,
    method: Method,
    path: &str,
    session: &Session
  ) -> Result<RequestBuilder, StoreError>
  {
    if session.access_token.is_none() {
      return Err(StoreError::Auth(
        "session has no access token; \
         sign in again"
          .to_string()
      ));
    }
    Ok(self.request(
      method,
      path,
      Some(session)
    ))
  }

  async fn send(
    &self,
    request: RequestBuilder
  ) -> Result<String, StoreError> {
    let response = request
      .send()
      .await
      .map_err(|err| {
        warn!(error = %err, "request failed");
        StoreError::Network(err.to_string())
      })?;

    let status = response.status();
    let body =
      response.text().await.map_err(
        |err| {
          StoreError::Network(format!(
            "failed reading response \
             body: {err}"
          ))
        }
      )?;

    if status.is_success() {
      debug!(
        status = %status,
        bytes = body.len(),
        "request succeeded"
      );
      return Ok(body);
    }

    warn!(
      status = %status,
      "store returned non-success status"
    );
    Err(status_error(status, &body))
  }

  async fn send_json<T: DeserializeOwned>(
    &self,
    request: RequestBuilder
  ) -> Result<T, StoreError> {
    let body = self.send(request).await?;
    Ok(serde_json::from_str(&body)?)
  }

  /// `return=representation` answers with an array; exactly one row is
  /// expected back.
  async fn send_single<T: DeserializeOwned>(
    &self,
    request: RequestBuilder,
    what: &str
  ) -> Result<T, StoreError> {
    let rows: Vec<T> = self
      .send_json(
        request.header(
          "Prefer",
          "return=representation"
        )
      )
      .await?;
    rows.into_iter().next().ok_or_else(
      || StoreError::NotFound(what.to_string())
    )
  }
}

impl AuthResponse {
  fn into_session(
    self,
    fallback_email: &str
  ) -> Result<Session, StoreError> {
    let access_token =
      self.access_token.ok_or_else(|| {
        StoreError::Auth(
          "no session returned; confirm \
           the account email first"
            .to_string()
        )
      })?;
    let (user_id, email) =
      match (self.user, self.id) {
        | (Some(user), _) => {
          (user.id, user.email)
        }
        | (None, Some(id)) => {
          (id, self.email)
        }
        | (None, None) => {
          return Err(StoreError::Auth(
            "auth response carried no \
             user"
              .to_string()
          ));
        }
      };
    Ok(Session {
      user_id,
      email: email.or_else(|| {
        Some(fallback_email.to_string())
      }),
      access_token: Some(access_token)
    })
  }
}

fn status_error(
  status: StatusCode,
  body: &str
) -> StoreError {
  let parsed: ErrorBody =
    serde_json::from_str(body)
      .unwrap_or_default();
  let message = parsed
    .message
    .or(parsed.error_description)
    .or(parsed.msg)
    .or(parsed.error)
    .unwrap_or_else(|| {
      let trimmed = body.trim();
      if trimmed.is_empty() {
        status.to_string()
      } else {
        trimmed.to_string()
      }
    });

  match status {
    | StatusCode::UNAUTHORIZED
    | StatusCode::FORBIDDEN => {
      StoreError::Auth(message)
    }
    | StatusCode::NOT_FOUND => {
      StoreError::NotFound(message)
    }
    | _ => {
      StoreError::Rejected {
        status: status.as_u16(),
        message
      }
    }
  }
}

fn with_updated_at(
  data: &UpdateMissionData
) -> Result<serde_json::Value, StoreError> {
  let mut body = serde_json::to_value(data)?;
  if let serde_json::Value::Object(map) =
    &mut body
  {
    map.insert(
      "updated_at".to_string(),
      serde_json::Value::String(
        Utc::now().to_rfc3339()
      )
    );
  }
  Ok(body)
}

fn with_user_id<T: serde::Serialize>(
  data: &T,
  session: &Session
) -> Result<serde_json::Value, StoreError> {
  let mut body = serde_json::to_value(data)?;
  if let serde_json::Value::Object(map) =
    &mut body
  {
    map.insert(
      "user_id".to_string(),
      serde_json::Value::String(
        session.user_id.clone()
      )
    );
  }
  Ok(body)
}

#[async_trait]
impl MissionStore for RestStore {
  #[tracing::instrument(skip(self, session), fields(user_id = %session.user_id))]
  async fn list_missions(
    &self,
    session: &Session
  ) -> Result<Vec<Mission>, StoreError> {
    let path = format!(
      "/rest/v1/missions?select=*&user_id=eq.{}&order=scheduled_date.asc",
      session.user_id
    );
    let request = self.authed(
      Method::GET,
      &path,
      session
    )?;
    let missions: Vec<Mission> =
      self.send_json(request).await?;
    debug!(
      count = missions.len(),
      "fetched missions"
    );
    Ok(missions)
  }

  #[tracing::instrument(skip(self, session, data), fields(user_id = %session.user_id))]
  async fn create_mission(
    &self,
    session: &Session,
    data: &CreateMissionData
  ) -> Result<Mission, StoreError> {
    let body = with_user_id(data, session)?;
    let request = self
      .authed(
        Method::POST,
        "/rest/v1/missions?select=*",
        session
      )?
      .body(body.to_string());
    let mission: Mission = self
      .send_single(
        request,
        "created mission"
      )
      .await?;
    info!(
      mission_id = %mission.id,
      "created mission"
    );
    Ok(mission)
  }

  #[tracing::instrument(skip(self, session, data), fields(mission_id = %data.id))]
  async fn update_mission(
    &self,
    session: &Session,
    data: &UpdateMissionData
  ) -> Result<Mission, StoreError> {
    let path = format!(
      "/rest/v1/missions?id=eq.{}&select=*",
      data.id
    );
    let request = self
      .authed(
        Method::PATCH,
        &path,
        session
      )?
      .body(
        with_updated_at(data)?.to_string()
      );
    let mission: Mission = self
      .send_single(
        request,
        &format!("mission {}", data.id)
      )
      .await?;
    info!("updated mission");
    Ok(mission)
  }

  #[tracing::instrument(skip(self, session), fields(mission_id = %id))]
  async fn delete_mission(
    &self,
    session: &Session,
    id: Uuid
  ) -> Result<(), StoreError> {
    let path = format!(
      "/rest/v1/missions?id=eq.{id}"
    );
    let request = self.authed(
      Method::DELETE,
      &path,
      session
    )?;
    self.send(request).await?;
    info!("deleted mission");
    Ok(())
  }

  #[tracing::instrument(skip(self, session), fields(user_id = %session.user_id))]
  async fn list_categories(
    &self,
    session: &Session
  ) -> Result<Vec<Category>, StoreError> {
    let path = format!(
      "/rest/v1/categories?select=*&user_id=eq.{}&order=name.asc",
      session.user_id
    );
    let request = self.authed(
      Method::GET,
      &path,
      session
    )?;
    self.send_json(request).await
  }

  #[tracing::instrument(skip(self, session, data), fields(user_id = %session.user_id))]
  async fn create_category(
    &self,
    session: &Session,
    data: &CreateCategoryData
  ) -> Result<Category, StoreError> {
    let body = with_user_id(data, session)?;
    let request = self
      .authed(
        Method::POST,
        "/rest/v1/categories?select=*",
        session
      )?
      .body(body.to_string());
    self
      .send_single(
        request,
        "created category"
      )
      .await
  }

  #[tracing::instrument(skip(self, session, data), fields(category_id = %data.id))]
  async fn update_category(
    &self,
    session: &Session,
    data: &UpdateCategoryData
  ) -> Result<Category, StoreError> {
    let path = format!(
      "/rest/v1/categories?id=eq.{}&select=*",
      data.id
    );
    let request = self
      .authed(
        Method::PATCH,
        &path,
        session
      )?
      .body(
        serde_json::to_string(data)?
      );
    self
      .send_single(
        request,
        &format!("category {}", data.id)
      )
      .await
  }

  #[tracing::instrument(skip(self, session), fields(category_id = %id))]
  async fn delete_category(
    &self,
    session: &Session,
    id: Uuid
  ) -> Result<(), StoreError> {
    let path = format!(
      "/rest/v1/categories?id=eq.{id}"
    );
    let request = self.authed(
      Method::DELETE,
      &path,
      session
    )?;
    self.send(request).await?;
    Ok(())
  }
}
