//! Persistence backends.
//!
//! Both backends return the stored record after every write; callers apply
//! that record, never their own input.

mod file;
mod rest;

pub use file::FileStore;
pub use rest::{RestConfig, RestStore};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::mission::{
    Category, CreateCategoryData, CreateMissionData, Mission, UpdateCategoryData,
    UpdateMissionData,
};
use crate::session::Session;

#[async_trait]
pub trait MissionStore: Send + Sync {
    /// Missions owned by the session's user, ordered by `scheduled_date`.
    async fn list_missions(&self, session: &Session) -> Result<Vec<Mission>, StoreError>;

    /// The store assigns id and timestamps; status defaults to `todo`.
    async fn create_mission(
        &self,
        session: &Session,
        data: &CreateMissionData,
    ) -> Result<Mission, StoreError>;

    /// Refreshes `updated_at`.
    async fn update_mission(
        &self,
        session: &Session,
        data: &UpdateMissionData,
    ) -> Result<Mission, StoreError>;

    async fn delete_mission(&self, session: &Session, id: Uuid) -> Result<(), StoreError>;

    /// Ordered by name.
    async fn list_categories(&self, session: &Session) -> Result<Vec<Category>, StoreError>;

    async fn create_category(
        &self,
        session: &Session,
        data: &CreateCategoryData,
    ) -> Result<Category, StoreError>;

    async fn update_category(
        &self,
        session: &Session,
        data: &UpdateCategoryData,
    ) -> Result<Category, StoreError>;

    async fn delete_category(&self, session: &Session, id: Uuid) -> Result<(), StoreError>;
}
