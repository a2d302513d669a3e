use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use super::MissionStore;
use crate::error::StoreError;
use crate::mission::{
    Category, CreateCategoryData, CreateMissionData, Mission, UpdateCategoryData,
    UpdateMissionData,
};
use crate::session::Session;

const MISSIONS_FILE: &str = "missions.data";
const CATEGORIES_FILE: &str = "categories.data";

/// JSON-lines store with one directory per profile under `<data>/users/`.
#[derive(Debug)]
pub struct FileStore {
    pub data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(data_dir.join("users"))?;

        info!(data_dir = %data_dir.display(), "opened file store");
        Ok(Self {
            data_dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Local profiles need no credentials.
    pub fn sign_in(&self, profile: &str) -> Result<Session, StoreError> {
        validate_profile(profile)?;
        let dir = self.user_dir(profile);
        fs::create_dir_all(&dir)?;
        info!(profile, dir = %dir.display(), "signed in to local profile");
        Ok(Session::local(profile))
    }

    fn user_dir(&self, user_id: &str) -> PathBuf {
        self.data_dir.join("users").join(user_id)
    }

    fn missions_path(&self, session: &Session) -> Result<PathBuf, StoreError> {
        validate_profile(&session.user_id)?;
        Ok(self.user_dir(&session.user_id).join(MISSIONS_FILE))
    }

    fn categories_path(&self, session: &Session) -> Result<PathBuf, StoreError> {
        validate_profile(&session.user_id)?;
        Ok(self.user_dir(&session.user_id).join(CATEGORIES_FILE))
    }
}

#[async_trait]
impl MissionStore for FileStore {
    #[tracing::instrument(skip(self, session), fields(user_id = %session.user_id))]
    async fn list_missions(&self, session: &Session) -> Result<Vec<Mission>, StoreError> {
        let mut missions: Vec<Mission> = load_jsonl(&self.missions_path(session)?)?;
        sort_missions(&mut missions);
        Ok(missions)
    }

    #[tracing::instrument(skip(self, session, data), fields(user_id = %session.user_id))]
    async fn create_mission(
        &self,
        session: &Session,
        data: &CreateMissionData,
    ) -> Result<Mission, StoreError> {
        let path = self.missions_path(session)?;
        let _guard = self.write_lock.lock();

        let now = Utc::now();
        let mission = Mission {
            id: Uuid::new_v4(),
            user_id: session.user_id.clone(),
            title: data.title.clone(),
            description: data.description.clone(),
            estimated_duration: data.estimated_duration,
            importance: data.importance,
            status: data.status.unwrap_or_default(),
            scheduled_date: data.scheduled_date.clone(),
            scheduled_time: data.scheduled_time.clone(),
            priority: data.priority,
            tags: data.tags.clone(),
            category_id: data.category_id,
            created_at: now,
            updated_at: now,
        };

        let mut missions: Vec<Mission> = load_jsonl(&path)?;
        missions.push(mission.clone());
        sort_missions(&mut missions);
        save_jsonl_atomic(&path, &missions)?;

        info!(mission_id = %mission.id, "created mission");
        Ok(mission)
    }

    #[tracing::instrument(skip(self, session, data), fields(mission_id = %data.id))]
    async fn update_mission(
        &self,
        session: &Session,
        data: &UpdateMissionData,
    ) -> Result<Mission, StoreError> {
        let path = self.missions_path(session)?;
        let _guard = self.write_lock.lock();

        let mut missions: Vec<Mission> = load_jsonl(&path)?;
        let mission = missions
            .iter_mut()
            .find(|m| m.id == data.id)
            .ok_or_else(|| StoreError::NotFound(format!("mission {}", data.id)))?;
        data.apply_to(mission);
        mission.updated_at = Utc::now();
        let updated = mission.clone();

        sort_missions(&mut missions);
        save_jsonl_atomic(&path, &missions)?;

        info!("updated mission");
        Ok(updated)
    }

    #[tracing::instrument(skip(self, session), fields(mission_id = %id))]
    async fn delete_mission(&self, session: &Session, id: Uuid) -> Result<(), StoreError> {
        let path = self.missions_path(session)?;
        let _guard = self.write_lock.lock();

        let mut missions: Vec<Mission> = load_jsonl(&path)?;
        let before = missions.len();
        missions.retain(|m| m.id != id);
        if missions.len() == before {
            return Err(StoreError::NotFound(format!("mission {id}")));
        }
        save_jsonl_atomic(&path, &missions)?;

        info!("deleted mission");
        Ok(())
    }

    #[tracing::instrument(skip(self, session), fields(user_id = %session.user_id))]
    async fn list_categories(&self, session: &Session) -> Result<Vec<Category>, StoreError> {
        let mut categories: Vec<Category> = load_jsonl(&self.categories_path(session)?)?;
        sort_categories(&mut categories);
        Ok(categories)
    }

    #[tracing::instrument(skip(self, session, data), fields(user_id = %session.user_id))]
    async fn create_category(
        &self,
        session: &Session,
        data: &CreateCategoryData,
    ) -> Result<Category, StoreError> {
        let path = self.categories_path(session)?;
        let _guard = self.write_lock.lock();

        let category = Category {
            id: Uuid::new_v4(),
            user_id: session.user_id.clone(),
            name: data.name.clone(),
            color: data.color.clone(),
            icon: data.icon.clone(),
            created_at: Utc::now(),
        };

        let mut categories: Vec<Category> = load_jsonl(&path)?;
        categories.push(category.clone());
        sort_categories(&mut categories);
        save_jsonl_atomic(&path, &categories)?;

        info!(category_id = %category.id, "created category");
        Ok(category)
    }

    #[tracing::instrument(skip(self, session, data), fields(category_id = %data.id))]
    async fn update_category(
        &self,
        session: &Session,
        data: &UpdateCategoryData,
    ) -> Result<Category, StoreError> {
        let path = self.categories_path(session)?;
        let _guard = self.write_lock.lock();

        let mut categories: Vec<Category> = load_jsonl(&path)?;
        let category = categories
            .iter_mut()
            .find(|c| c.id == data.id)
            .ok_or_else(|| StoreError::NotFound(format!("category {}", data.id)))?;
        data.apply_to(category);
        let updated = category.clone();

        sort_categories(&mut categories);
        save_jsonl_atomic(&path, &categories)?;
        Ok(updated)
    }

    #[tracing::instrument(skip(self, session), fields(category_id = %id))]
    async fn delete_category(&self, session: &Session, id: Uuid) -> Result<(), StoreError> {
        let path = self.categories_path(session)?;
        let _guard = self.write_lock.lock();

        let mut categories: Vec<Category> = load_jsonl(&path)?;
        let before = categories.len();
        categories.retain(|c| c.id != id);
        if categories.len() == before {
            return Err(StoreError::NotFound(format!("category {id}")));
        }
        save_jsonl_atomic(&path, &categories)?;
        Ok(())
    }
}

fn validate_profile(profile: &str) -> Result<(), StoreError> {
    let ok = !profile.is_empty()
        && profile
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && profile != "."
        && profile != "..";
    if !ok {
        return Err(StoreError::Config(format!(
            "invalid profile name {profile:?}: use letters, digits, '-', '_' or '.'"
        )));
    }
    Ok(())
}

fn sort_missions(missions: &mut [Mission]) {
    missions.sort_by(|a, b| a.scheduled_date.cmp(&b.scheduled_date));
}

fn sort_categories(categories: &mut [Category]) {
    categories.sort_by(|a, b| a.name.cmp(&b.name));
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    debug!(file = %path.display(), "loading jsonl");
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        out.push(serde_json::from_str(trimmed)?);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> Result<(), StoreError> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;
    temp.persist(path).map_err(|err| StoreError::Io(err.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::mission::MissionStatus;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[tokio::test]
    async fn create_then_list_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("open store");
        let session = store.sign_in("default").expect("sign in");

        let created = store
            .create_mission(
                &session,
                &CreateMissionData::new("Deep work", day(2024, 6, 3), 90, 4),
            )
            .await
            .expect("create mission");

        let listed = store.list_missions(&session).await.expect("list missions");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        assert_eq!(listed[0].estimated_duration, 90);
        assert_eq!(listed[0].status, MissionStatus::Todo);
        assert_eq!(listed[0].user_id, "default");
    }

    #[tokio::test]
    async fn lists_sorted_by_scheduled_date() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("open store");
        let session = store.sign_in("default").expect("sign in");

        for (title, date) in [("late", day(2024, 6, 9)), ("early", day(2024, 6, 1))] {
            store
                .create_mission(&session, &CreateMissionData::new(title, date, 30, 1))
                .await
                .expect("create mission");
        }

        let titles: Vec<String> = store
            .list_missions(&session)
            .await
            .expect("list missions")
            .into_iter()
            .map(|m| m.title)
            .collect();
        assert_eq!(titles, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn profiles_are_isolated() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("open store");
        let work = store.sign_in("work").expect("sign in work");
        let home = store.sign_in("home").expect("sign in home");

        store
            .create_mission(&work, &CreateMissionData::new("Ship", day(2024, 6, 3), 60, 5))
            .await
            .expect("create mission");

        assert_eq!(store.list_missions(&home).await.expect("list").len(), 0);
        assert_eq!(store.list_missions(&work).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn update_and_delete_unknown_are_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("open store");
        let session = store.sign_in("default").expect("sign in");
        let ghost = Uuid::new_v4();

        let update = store
            .update_mission(
                &session,
                &UpdateMissionData::with_status(ghost, MissionStatus::Completed),
            )
            .await;
        assert!(matches!(update, Err(StoreError::NotFound(_))));

        let delete = store.delete_mission(&session, ghost).await;
        assert!(matches!(delete, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn categories_sorted_by_name_and_patchable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("open store");
        let session = store.sign_in("default").expect("sign in");

        let work = store
            .create_category(&session, &CreateCategoryData::new("Work"))
            .await
            .expect("create work");
        store
            .create_category(&session, &CreateCategoryData::new("Admin"))
            .await
            .expect("create admin");

        let mut patch = UpdateCategoryData::new(work.id);
        patch.color = Some("#ff0000".to_string());
        let updated = store
            .update_category(&session, &patch)
            .await
            .expect("update category");
        assert_eq!(updated.color, "#ff0000");

        let names: Vec<String> = store
            .list_categories(&session)
            .await
            .expect("list categories")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Admin", "Work"]);
    }

    #[test]
    fn rejects_path_like_profiles() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("open store");
        assert!(matches!(store.sign_in("../etc"), Err(StoreError::Config(_))));
        assert!(matches!(store.sign_in(""), Err(StoreError::Config(_))));
    }
}
