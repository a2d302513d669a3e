use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Weekday};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bucket::DateBucketIndex;
use crate::calendar::{CalendarMonth, DayCell, month_grid, padded_month_grid};
use crate::error::{MissionError, ValidationError};
use crate::filter::{ImportanceFilter, MissionFilter, StatusFilter};
use crate::mission::{
    Category, CreateCategoryData, CreateMissionData, Mission, MissionStatus, UpdateCategoryData,
    UpdateMissionData,
};
use crate::session::Session;
use crate::stats::{AggregateStats, MissionSummary, compute_stats, summarize};
use crate::status::{advance_status, reopen_status};
use crate::store::MissionStore;

#[derive(Debug, Default)]
struct MissionState {
    missions: Vec<Mission>,
    loading: bool,
    disposed: bool,
    version: u64,
}

impl MissionState {
    fn touch(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    fn sort(&mut self) {
        self.missions
            .sort_by(|a, b| a.scheduled_date.cmp(&b.scheduled_date));
    }
}

/// Marks a cache dead from outside, e.g. on sign-out while a request runs.
#[derive(Debug, Clone)]
pub struct DisposeHandle {
    state: Arc<Mutex<MissionState>>,
}

impl DisposeHandle {
    pub fn dispose(&self) {
        dispose_state(&self.state);
    }
}

fn dispose_state(state: &Mutex<MissionState>) {
    let mut state = state.lock();
    if state.disposed {
        return;
    }
    state.disposed = true;
    state.loading = false;
    state.missions.clear();
    state.touch();
    info!("mission cache disposed");
}

/// In-memory mirror of one user's missions.
///
/// Writes go to the store first; the cache then applies exactly the record
/// the store returned. A failed call leaves the cache as it was.
pub struct MissionCache<S: ?Sized = dyn MissionStore> {
    store: Arc<S>,
    session: Session,
    state: Arc<Mutex<MissionState>>,
}

impl<S: ?Sized> Clone for MissionCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            session: self.session.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<S: MissionStore + ?Sized> MissionCache<S> {
    pub fn new(store: Arc<S>, session: Session) -> Self {
        Self {
            store,
            session,
            state: Arc::new(Mutex::new(MissionState::default())),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn dispose_handle(&self) -> DisposeHandle {
        DisposeHandle {
            state: Arc::clone(&self.state),
        }
    }

    pub fn dispose(&self) {
        dispose_state(&self.state);
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    /// Bumped on every applied change.
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    pub fn missions(&self) -> Vec<Mission> {
        self.state.lock().missions.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().missions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().missions.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<Mission> {
        self.state
            .lock()
            .missions
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    fn ensure_live(&self) -> Result<(), MissionError> {
        if self.state.lock().disposed {
            return Err(MissionError::Disposed);
        }
        Ok(())
    }

    fn require(&self, id: Uuid) -> Result<Mission, MissionError> {
        self.ensure_live()?;
        self.get(id).ok_or(MissionError::UnknownMission(id))
    }

    #[tracing::instrument(skip(self), fields(user_id = %self.session.user_id))]
    pub async fn refresh(&self) -> Result<usize, MissionError> {
        {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(MissionError::Disposed);
            }
            state.loading = true;
        }

        let result = self.store.list_missions(&self.session).await;

        let mut state = self.state.lock();
        state.loading = false;
        if state.disposed {
            debug!("discarding mission list fetched after dispose");
            return Err(MissionError::Disposed);
        }
        let missions = result.inspect_err(|err| warn!(error = %err, "refresh failed"))?;

        let count = missions.len();
        state.missions = missions;
        state.touch();
        info!(count, "refreshed missions");
        Ok(count)
    }

    #[tracing::instrument(skip(self, data), fields(title = %data.title))]
    pub async fn create(&self, data: CreateMissionData) -> Result<Mission, MissionError> {
        data.validate()?;
        self.ensure_live()?;

        let mission = self.store.create_mission(&self.session, &data).await?;

        let mut state = self.state.lock();
        if state.disposed {
            return Err(MissionError::Disposed);
        }
        state.missions.push(mission.clone());
        state.sort();
        state.touch();
        debug!(mission_id = %mission.id, "applied created mission");
        Ok(mission)
    }

    #[tracing::instrument(skip(self, data), fields(mission_id = %data.id))]
    pub async fn update(&self, data: UpdateMissionData) -> Result<Mission, MissionError> {
        data.validate()?;
        self.require(data.id)?;

        let mission = self.store.update_mission(&self.session, &data).await?;

        let mut state = self.state.lock();
        if state.disposed {
            return Err(MissionError::Disposed);
        }
        // replaced where it sits; order is restored on the next refresh
        match state.missions.iter_mut().find(|m| m.id == mission.id) {
            Some(slot) => *slot = mission.clone(),
            None => state.missions.push(mission.clone()),
        }
        state.touch();
        debug!("applied updated mission");
        Ok(mission)
    }

    #[tracing::instrument(skip(self), fields(mission_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<(), MissionError> {
        self.require(id)?;

        self.store.delete_mission(&self.session, id).await?;

        let mut state = self.state.lock();
        if state.disposed {
            return Err(MissionError::Disposed);
        }
        state.missions.retain(|m| m.id != id);
        state.touch();
        debug!("applied deleted mission");
        Ok(())
    }

    /// One step forward: todo to in_progress, in_progress to completed.
    pub async fn advance(&self, id: Uuid) -> Result<Mission, MissionError> {
        let current = self.require(id)?.status;
        let next = advance_status(current).ok_or_else(|| {
            ValidationError::new("status", format!("cannot advance a {current} mission"))
        })?;
        self.set_status(id, next).await
    }

    /// completed back to todo.
    pub async fn reopen(&self, id: Uuid) -> Result<Mission, MissionError> {
        let current = self.require(id)?.status;
        let next = reopen_status(current).ok_or_else(|| {
            ValidationError::new(
                "status",
                format!("only completed missions can be reopened, this one is {current}"),
            )
        })?;
        self.set_status(id, next).await
    }

    async fn set_status(&self, id: Uuid, status: MissionStatus) -> Result<Mission, MissionError> {
        info!(mission_id = %id, %status, "changing mission status");
        self.update(UpdateMissionData::with_status(id, status)).await
    }

    pub fn bucket_index(&self) -> DateBucketIndex {
        DateBucketIndex::build(&self.state.lock().missions)
    }

    pub fn get_bucket(&self, day: NaiveDate) -> Vec<Mission> {
        self.bucket_index().bucket(day).to_vec()
    }

    pub fn get_filtered_missions(
        &self,
        status: StatusFilter,
        importance: ImportanceFilter,
    ) -> Vec<Mission> {
        MissionFilter::new(status, importance).apply(&self.state.lock().missions)
    }

    pub fn get_month_grid(
        &self,
        month: CalendarMonth,
        today: NaiveDate,
        selected: Option<NaiveDate>,
    ) -> Vec<DayCell> {
        month_grid(month, &self.bucket_index(), today, selected)
    }

    pub fn get_padded_month_grid(
        &self,
        month: CalendarMonth,
        today: NaiveDate,
        selected: Option<NaiveDate>,
        week_start: Weekday,
    ) -> Vec<DayCell> {
        padded_month_grid(month, &self.bucket_index(), today, selected, week_start)
    }

    pub fn get_stats(&self, now: NaiveDateTime) -> AggregateStats {
        compute_stats(&self.state.lock().missions, now)
    }

    pub fn summary(&self) -> MissionSummary {
        summarize(&self.state.lock().missions)
    }
}

#[derive(Debug, Default)]
struct CategoryState {
    categories: Vec<Category>,
    disposed: bool,
    version: u64,
}

impl CategoryState {
    fn touch(&mut self) {
        self.version = self.version.wrapping_add(1);
        self.categories.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

/// Same apply-after-success rules as [`MissionCache`], for categories.
pub struct CategoryCache<S: ?Sized = dyn MissionStore> {
    store: Arc<S>,
    session: Session,
    state: Arc<Mutex<CategoryState>>,
}

impl<S: MissionStore + ?Sized> CategoryCache<S> {
    pub fn new(store: Arc<S>, session: Session) -> Self {
        Self {
            store,
            session,
            state: Arc::new(Mutex::new(CategoryState::default())),
        }
    }

    pub fn dispose(&self) {
        let mut state = self.state.lock();
        state.disposed = true;
        state.categories.clear();
        state.touch();
    }

    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    pub fn categories(&self) -> Vec<Category> {
        self.state.lock().categories.clone()
    }

    pub fn get(&self, id: Uuid) -> Option<Category> {
        self.state
            .lock()
            .categories
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /// A mission's category, if the link still resolves.
    pub fn category_for(&self, mission: &Mission) -> Option<Category> {
        mission.category_id.and_then(|id| self.get(id))
    }

    fn ensure_live(&self) -> Result<(), MissionError> {
        if self.state.lock().disposed {
            return Err(MissionError::Disposed);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(user_id = %self.session.user_id))]
    pub async fn refresh(&self) -> Result<usize, MissionError> {
        self.ensure_live()?;
        let categories = self.store.list_categories(&self.session).await?;

        let mut state = self.state.lock();
        if state.disposed {
            return Err(MissionError::Disposed);
        }
        let count = categories.len();
        state.categories = categories;
        state.touch();
        debug!(count, "refreshed categories");
        Ok(count)
    }

    #[tracing::instrument(skip(self, data), fields(name = %data.name))]
    pub async fn create(&self, data: CreateCategoryData) -> Result<Category, MissionError> {
        data.validate()?;
        self.ensure_live()?;
        let category = self.store.create_category(&self.session, &data).await?;

        let mut state = self.state.lock();
        if state.disposed {
            return Err(MissionError::Disposed);
        }
        state.categories.push(category.clone());
        state.touch();
        Ok(category)
    }

    #[tracing::instrument(skip(self, data), fields(category_id = %data.id))]
    pub async fn update(&self, data: UpdateCategoryData) -> Result<Category, MissionError> {
        data.validate()?;
        self.ensure_live()?;
        let category = self.store.update_category(&self.session, &data).await?;

        let mut state = self.state.lock();
        if state.disposed {
            return Err(MissionError::Disposed);
        }
        match state.categories.iter_mut().find(|c| c.id == category.id) {
            Some(slot) => *slot = category.clone(),
            None => state.categories.push(category.clone()),
        }
        state.touch();
        Ok(category)
    }

    /// Missions that pointed at the category keep their dangling link.
    #[tracing::instrument(skip(self), fields(category_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<(), MissionError> {
        self.ensure_live()?;
        self.store.delete_category(&self.session, id).await?;

        let mut state = self.state.lock();
        if state.disposed {
            return Err(MissionError::Disposed);
        }
        state.categories.retain(|c| c.id != id);
        state.touch();
        Ok(())
    }
}
