//! Catalog store: persistence seam between the workflow engine and storage.
//!
//! The workflow engine only ever mutates a crop through the two conditional
//! primitives below. Each one is a single atomic read-modify-write scoped to
//! one crop record, guarded by the version the caller read. A guard miss is
//! reported as [`WriteOutcome::Conflict`] and nothing is written.
//!
//! Two implementations exist: [`crate::db::Database`] (PostgreSQL) and
//! [`MemoryCatalogStore`] (process-local, used by tests and the `memory`
//! backend).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{CropPatch, CropRecord, InterestEntry, InterestStatus, NewCrop, NewUser, User};

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Guard held, write committed.
    Applied,
    /// Guard failed because another writer got there first. Nothing written.
    Conflict,
    /// Crop (or interest entry) does not exist.
    NotFound,
}

/// Conditional status flip plus quantity write for one interest entry.
///
/// Applied only if the crop is still at `expected_version` and the entry is
/// still in `expected_status`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub crop_id: Uuid,
    pub interest_id: Uuid,
    pub new_status: InterestStatus,
    pub new_quantity: i64,
    pub expected_status: InterestStatus,
    pub expected_version: i64,
}

// LEARNING NOTE:
// Plain `async fn` in a trait can't be used behind `dyn`. #[async_trait]
// rewrites each method to return a boxed future, which is what allows the
// rest of the service to hold an `Arc<dyn CatalogStore>` and not care which
// backend is behind it.
//
// `Send + Sync` is required because the same store is shared by every
// request task on the Tokio runtime.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    // ----- workflow primitives -----

    async fn find_crop_by_id(&self, id: Uuid) -> AppResult<Option<CropRecord>>;

    /// Append `entry` to the crop's ledger if the crop is still at
    /// `expected_version` and has no entry from the same user.
    async fn append_interest(
        &self,
        crop_id: Uuid,
        entry: &InterestEntry,
        expected_version: i64,
    ) -> AppResult<WriteOutcome>;

    async fn update_interest_status_and_quantity(
        &self,
        update: &StatusUpdate,
    ) -> AppResult<WriteOutcome>;

    /// Every crop with its full ledger, in listing order.
    async fn list_crops_with_interests(&self) -> AppResult<Vec<CropRecord>>;

    // ----- catalog glue -----

    /// Crops whose name contains `search` (case-insensitive); all when `None`.
    async fn list_crops(&self, search: Option<&str>) -> AppResult<Vec<CropRecord>>;

    /// Newest crops first.
    async fn latest_crops(&self, limit: usize) -> AppResult<Vec<CropRecord>>;

    async fn crops_by_owner(&self, owner_email: &str) -> AppResult<Vec<CropRecord>>;

    async fn insert_crop(&self, crop: NewCrop) -> AppResult<CropRecord>;

    async fn update_crop(&self, id: Uuid, patch: &CropPatch) -> AppResult<Option<CropRecord>>;

    async fn delete_crop(&self, id: Uuid) -> AppResult<bool>;

    /// Register a user. Returns the existing user and `false` when the email
    /// is already known.
    async fn upsert_user(&self, user: NewUser) -> AppResult<(User, bool)>;

    async fn list_users(&self) -> AppResult<Vec<User>>;

    async fn health_check(&self) -> bool;
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    crops: HashMap<Uuid, CropRecord>,
    /// Crop ids in insertion order
    order: Vec<Uuid>,
    users: Vec<User>,
}

impl MemoryState {
    fn ordered(&self) -> impl Iterator<Item = &CropRecord> + '_ {
        self.order.iter().filter_map(|id| self.crops.get(id))
    }
}

/// Process-local catalog store.
///
/// Every write takes the single write lock, so each conditional primitive is
/// trivially atomic. The version and status guards are still checked so the
/// engine sees the same conflicts it would see from PostgreSQL.
#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    state: RwLock<MemoryState>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn find_crop_by_id(&self, id: Uuid) -> AppResult<Option<CropRecord>> {
        Ok(self.state.read().await.crops.get(&id).cloned())
    }

    async fn append_interest(
        &self,
        crop_id: Uuid,
        entry: &InterestEntry,
        expected_version: i64,
    ) -> AppResult<WriteOutcome> {
        let mut state = self.state.write().await;
        let Some(crop) = state.crops.get_mut(&crop_id) else {
            return Ok(WriteOutcome::NotFound);
        };

        if crop.version != expected_version || crop.has_interest_from(&entry.user_email) {
            return Ok(WriteOutcome::Conflict);
        }

        crop.interests.push(entry.clone());
        crop.version += 1;
        crop.updated_at = Utc::now();
        Ok(WriteOutcome::Applied)
    }

    async fn update_interest_status_and_quantity(
        &self,
        update: &StatusUpdate,
    ) -> AppResult<WriteOutcome> {
        let mut state = self.state.write().await;
        let Some(crop) = state.crops.get_mut(&update.crop_id) else {
            return Ok(WriteOutcome::NotFound);
        };

        if crop.version != update.expected_version {
            return Ok(WriteOutcome::Conflict);
        }

        let Some(entry) = crop.find_interest_mut(update.interest_id) else {
            return Ok(WriteOutcome::NotFound);
        };
        if entry.status != update.expected_status {
            return Ok(WriteOutcome::Conflict);
        }

        entry.status = update.new_status;
        crop.quantity = update.new_quantity;
        crop.version += 1;
        crop.updated_at = Utc::now();
        Ok(WriteOutcome::Applied)
    }

    async fn list_crops_with_interests(&self) -> AppResult<Vec<CropRecord>> {
        Ok(self.state.read().await.ordered().cloned().collect())
    }

    async fn list_crops(&self, search: Option<&str>) -> AppResult<Vec<CropRecord>> {
        let needle = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let state = self.state.read().await;
        Ok(state
            .ordered()
            .filter(|crop| match &needle {
                Some(needle) => crop.name.to_lowercase().contains(needle.as_str()),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn latest_crops(&self, limit: usize) -> AppResult<Vec<CropRecord>> {
        let state = self.state.read().await;
        Ok(state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.crops.get(id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn crops_by_owner(&self, owner_email: &str) -> AppResult<Vec<CropRecord>> {
        let state = self.state.read().await;
        Ok(state
            .ordered()
            .filter(|crop| crop.owner.owner_email == owner_email)
            .cloned()
            .collect())
    }

    async fn insert_crop(&self, crop: NewCrop) -> AppResult<CropRecord> {
        let record = CropRecord::from_new(crop);
        let mut state = self.state.write().await;
        state.order.push(record.id);
        state.crops.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_crop(&self, id: Uuid, patch: &CropPatch) -> AppResult<Option<CropRecord>> {
        let mut state = self.state.write().await;
        Ok(state.crops.get_mut(&id).map(|crop| {
            crop.apply_patch(patch);
            crop.clone()
        }))
    }

    async fn delete_crop(&self, id: Uuid) -> AppResult<bool> {
        let mut state = self.state.write().await;
        if state.crops.remove(&id).is_none() {
            return Ok(false);
        }
        state.order.retain(|existing| *existing != id);
        Ok(true)
    }

    async fn upsert_user(&self, user: NewUser) -> AppResult<(User, bool)> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.users.iter().find(|u| u.email == user.email) {
            return Ok((existing.clone(), false));
        }

        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            photo_url: user.photo_url,
            created_at: Utc::now(),
        };
        state.users.push(created.clone());
        Ok((created, true))
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        Ok(self.state.read().await.users.clone())
    }

    async fn health_check(&self) -> bool {
        true
    }
}
