use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mission_core::cache::{CategoryCache, DisposeHandle, MissionCache};
use mission_core::error::{MissionError, StoreError};
use mission_core::mission::{
    Category, CreateCategoryData, CreateMissionData, Mission, MissionStatus, UpdateCategoryData,
    UpdateMissionData,
};
use mission_core::session::Session;
use mission_core::store::MissionStore;
use parking_lot::Mutex;
use uuid::Uuid;

fn stamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn mission(title: &str, date: &str, status: MissionStatus) -> Mission {
    let created = Utc
        .with_ymd_and_hms(2024, 6, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp");
    Mission {
        id: Uuid::new_v4(),
        user_id: "tester".to_string(),
        title: title.to_string(),
        description: None,
        estimated_duration: 30,
        importance: 2,
        status,
        scheduled_date: date.to_string(),
        scheduled_time: None,
        priority: None,
        tags: None,
        category_id: None,
        created_at: created,
        updated_at: created,
    }
}

/// In-memory store that stamps every write with a fixed `updated_at` and
/// can be told to fail or to dispose a cache mid-request.
#[derive(Default)]
struct ScriptedStore {
    missions: Mutex<Vec<Mission>>,
    categories: Mutex<Vec<Category>>,
    fail_writes: AtomicBool,
    calls: AtomicUsize,
    dispose_during_list: Mutex<Option<DisposeHandle>>,
}

impl ScriptedStore {
    fn seeded(missions: Vec<Mission>) -> Arc<Self> {
        let store = Self::default();
        *store.missions.lock() = missions;
        Arc::new(store)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn write_guard(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Network("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MissionStore for ScriptedStore {
    async fn list_missions(&self, _session: &Session) -> Result<Vec<Mission>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.dispose_during_list.lock().take() {
            handle.dispose();
        }
        Ok(self.missions.lock().clone())
    }

    async fn create_mission(
        &self,
        session: &Session,
        data: &CreateMissionData,
    ) -> Result<Mission, StoreError> {
        self.write_guard()?;
        let mut created = mission(&data.title, &data.scheduled_date, data.status.unwrap_or_default());
        created.user_id = session.user_id.clone();
        created.estimated_duration = data.estimated_duration;
        created.importance = data.importance;
        created.updated_at = stamp();
        self.missions.lock().push(created.clone());
        Ok(created)
    }

    async fn update_mission(
        &self,
        _session: &Session,
        data: &UpdateMissionData,
    ) -> Result<Mission, StoreError> {
        self.write_guard()?;
        let mut missions = self.missions.lock();
        let slot = missions
            .iter_mut()
            .find(|m| m.id == data.id)
            .ok_or_else(|| StoreError::NotFound(data.id.to_string()))?;
        data.apply_to(slot);
        slot.updated_at = stamp();
        Ok(slot.clone())
    }

    async fn delete_mission(&self, _session: &Session, id: Uuid) -> Result<(), StoreError> {
        self.write_guard()?;
        self.missions.lock().retain(|m| m.id != id);
        Ok(())
    }

    async fn list_categories(&self, _session: &Session) -> Result<Vec<Category>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.categories.lock().clone())
    }

    async fn create_category(
        &self,
        session: &Session,
        data: &CreateCategoryData,
    ) -> Result<Category, StoreError> {
        self.write_guard()?;
        let category = Category {
            id: Uuid::new_v4(),
            user_id: session.user_id.clone(),
            name: data.name.clone(),
            color: data.color.clone(),
            icon: data.icon.clone(),
            created_at: stamp(),
        };
        self.categories.lock().push(category.clone());
        Ok(category)
    }

    async fn update_category(
        &self,
        _session: &Session,
        data: &UpdateCategoryData,
    ) -> Result<Category, StoreError> {
        self.write_guard()?;
        let mut categories = self.categories.lock();
        let slot = categories
            .iter_mut()
            .find(|c| c.id == data.id)
            .ok_or_else(|| StoreError::NotFound(data.id.to_string()))?;
        data.apply_to(slot);
        Ok(slot.clone())
    }

    async fn delete_category(&self, _session: &Session, id: Uuid) -> Result<(), StoreError> {
        self.write_guard()?;
        self.categories.lock().retain(|c| c.id != id);
        Ok(())
    }
}

fn cache_over(store: &Arc<ScriptedStore>) -> MissionCache<ScriptedStore> {
    MissionCache::new(Arc::clone(store), Session::local("tester"))
}

#[tokio::test]
async fn writes_apply_the_record_the_store_returned() {
    let store = ScriptedStore::seeded(vec![]);
    let cache = cache_over(&store);
    cache.refresh().await.expect("refresh");
    let before = cache.version();

    let created = cache
        .create(CreateMissionData::new(
            "Draft outline",
            chrono::NaiveDate::from_ymd_opt(2024, 6, 3).expect("date"),
            45,
            3,
        ))
        .await
        .expect("create");

    let cached = cache.get(created.id).expect("cached copy");
    assert_eq!(cached, created);
    assert_eq!(cached.updated_at, stamp());
    assert_eq!(cached.status, MissionStatus::Todo);
    assert!(cache.version() > before);

    let mut patch = UpdateMissionData::new(created.id);
    patch.title = Some("Final outline".to_string());
    let updated = cache.update(patch).await.expect("update");
    assert_eq!(cache.get(created.id).expect("cached"), updated);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn update_replaces_the_mission_in_place() {
    let first = mission("First", "2024-06-03", MissionStatus::Todo);
    let second = mission("Second", "2024-06-04", MissionStatus::Todo);
    let third = mission("Third", "2024-06-05", MissionStatus::Todo);
    let store = ScriptedStore::seeded(vec![first.clone(), second.clone(), third.clone()]);
    let cache = cache_over(&store);
    cache.refresh().await.expect("refresh");

    let mut patch = UpdateMissionData::new(first.id);
    patch.scheduled_date = Some("2024-06-30".to_string());
    cache.update(patch).await.expect("move date");

    let order: Vec<Uuid> = cache.missions().iter().map(|m| m.id).collect();
    assert_eq!(order, vec![first.id, second.id, third.id]);
    assert_eq!(
        cache.get(first.id).expect("cached").scheduled_date,
        "2024-06-30"
    );
}

#[tokio::test]
async fn failing_store_leaves_cache_untouched() {
    let seed = mission("Keep me", "2024-06-03", MissionStatus::Todo);
    let store = ScriptedStore::seeded(vec![seed.clone()]);
    let cache = cache_over(&store);
    cache.refresh().await.expect("refresh");
    let version = cache.version();

    store.fail_writes.store(true, Ordering::SeqCst);

    let mut patch = UpdateMissionData::new(seed.id);
    patch.title = Some("Changed".to_string());
    let err = cache.update(patch).await.expect_err("update should fail");
    assert!(matches!(err, MissionError::Store(StoreError::Network(_))));

    let err = cache.delete(seed.id).await.expect_err("delete should fail");
    assert!(matches!(err, MissionError::Store(_)));

    assert_eq!(cache.missions(), vec![seed]);
    assert_eq!(cache.version(), version);
}

#[tokio::test]
async fn invalid_requests_never_reach_the_store() {
    let done = mission("Shipped", "2024-06-03", MissionStatus::Completed);
    let fresh = mission("Fresh", "2024-06-04", MissionStatus::Todo);
    let store = ScriptedStore::seeded(vec![done.clone(), fresh.clone()]);
    let cache = cache_over(&store);
    cache.refresh().await.expect("refresh");
    let calls = store.calls();

    let bad = CreateMissionData::new(
        "Too important",
        chrono::NaiveDate::from_ymd_opt(2024, 6, 3).expect("date"),
        30,
        9,
    );
    assert!(matches!(
        cache.create(bad).await,
        Err(MissionError::Validation(_))
    ));

    assert!(matches!(
        cache.advance(done.id).await,
        Err(MissionError::Validation(_))
    ));
    assert!(matches!(
        cache.reopen(fresh.id).await,
        Err(MissionError::Validation(_))
    ));

    let stranger = Uuid::new_v4();
    assert!(matches!(
        cache.delete(stranger).await,
        Err(MissionError::UnknownMission(id)) if id == stranger
    ));

    assert_eq!(store.calls(), calls);
}

#[tokio::test]
async fn status_walks_forward_then_reopens() {
    let task = mission("Walk", "2024-06-05", MissionStatus::Todo);
    let store = ScriptedStore::seeded(vec![task.clone()]);
    let cache = cache_over(&store);
    cache.refresh().await.expect("refresh");

    let started = cache.advance(task.id).await.expect("start");
    assert_eq!(started.status, MissionStatus::InProgress);
    let finished = cache.advance(task.id).await.expect("finish");
    assert_eq!(finished.status, MissionStatus::Completed);
    assert!(cache.advance(task.id).await.is_err());

    let reopened = cache.reopen(task.id).await.expect("reopen");
    assert_eq!(reopened.status, MissionStatus::Todo);
    assert_eq!(
        store.missions.lock()[0].status,
        MissionStatus::Todo,
        "store holds the reopened status"
    );
}

#[tokio::test]
async fn dispose_discards_results_arriving_late() {
    let store = ScriptedStore::seeded(vec![
        mission("One", "2024-06-03", MissionStatus::Todo),
        mission("Two", "2024-06-04", MissionStatus::Todo),
    ]);
    let cache = cache_over(&store);
    *store.dispose_during_list.lock() = Some(cache.dispose_handle());

    let err = cache.refresh().await.expect_err("disposed mid-request");
    assert!(matches!(err, MissionError::Disposed));
    assert!(cache.is_disposed());
    assert!(!cache.is_loading());
    assert!(cache.is_empty());

    let calls = store.calls();
    let late = CreateMissionData::new(
        "After sign-out",
        chrono::NaiveDate::from_ymd_opt(2024, 6, 5).expect("date"),
        30,
        1,
    );
    assert!(matches!(cache.create(late).await, Err(MissionError::Disposed)));
    assert_eq!(store.calls(), calls);
}

#[tokio::test]
async fn category_cache_resolves_mission_links() {
    let store = ScriptedStore::seeded(vec![]);
    let categories = CategoryCache::new(Arc::clone(&store), Session::local("tester"));
    categories.refresh().await.expect("refresh");

    let work = categories
        .create(CreateCategoryData::new("Work"))
        .await
        .expect("create category");
    let mut linked = mission("Linked", "2024-06-03", MissionStatus::Todo);
    linked.category_id = Some(work.id);
    assert_eq!(categories.category_for(&linked), Some(work.clone()));

    let mut rename = UpdateCategoryData::new(work.id);
    rename.name = Some("Office".to_string());
    categories.update(rename).await.expect("rename");
    assert_eq!(
        categories.category_for(&linked).map(|c| c.name),
        Some("Office".to_string())
    );

    let mut bad = UpdateCategoryData::new(work.id);
    bad.color = Some("blue".to_string());
    assert!(matches!(
        categories.update(bad).await,
        Err(MissionError::Validation(_))
    ));

    categories.delete(work.id).await.expect("delete");
    assert_eq!(categories.category_for(&linked), None);
}
