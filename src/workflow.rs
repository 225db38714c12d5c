// =============================================================================
// INTEREST WORKFLOW ENGINE
// =============================================================================
// Creates interests, lists them, and applies owner decisions.
//
// Every mutation is an optimistic read-modify-write against one crop:
//   1. read the crop (and its version)
//   2. check the ledger rules against what was read
//   3. issue one conditional store write guarded by that version
//   4. on Conflict, go back to 1 (bounded), then give up with Unavailable
//
// Because the guard covers the whole crop, two writers on the same crop can
// never both commit from the same read. That is what keeps one interest per
// user per crop and stops two acceptances from losing each other's decrement.
// =============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{
    CropInterestView, CropRecord, Decision, DecisionOutcome, InterestEntry, InterestStatus,
    NewInterest, UserInterestView,
};
use crate::store::{CatalogStore, StatusUpdate, WriteOutcome};

/// Default number of retries after a store conflict.
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

// -----------------------------------------------------------------------------
// OVERSUBSCRIPTION POLICY
// -----------------------------------------------------------------------------
/// What to do when an accepted interest asks for more than the crop has left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversubscriptionPolicy {
    /// Accept and floor the remaining quantity at zero.
    #[default]
    Clamp,
    /// Refuse the acceptance with `InsufficientQuantity`.
    Reject,
}

impl FromStr for OversubscriptionPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "clamp" => Ok(OversubscriptionPolicy::Clamp),
            "reject" => Ok(OversubscriptionPolicy::Reject),
            other => Err(format!(
                "unknown oversubscription policy '{}', expected 'clamp' or 'reject'",
                other
            )),
        }
    }
}

impl fmt::Display for OversubscriptionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OversubscriptionPolicy::Clamp => f.write_str("clamp"),
            OversubscriptionPolicy::Reject => f.write_str("reject"),
        }
    }
}

/// Work out the conditional write for a decision on `crop` as it was read.
///
/// Pure function of the snapshot: no I/O, no mutation. The returned update
/// carries the snapshot's version so the store rejects it if anything changed
/// in between.
pub fn plan_decision(
    crop: &CropRecord,
    interest_id: Uuid,
    decision: Decision,
    policy: OversubscriptionPolicy,
) -> AppResult<StatusUpdate> {
    let entry = crop
        .find_interest(interest_id)
        .ok_or_else(|| AppError::NotFound(format!("Interest not found: {}", interest_id)))?;

    let new_status = entry.status.transition(decision)?;

    let new_quantity = match decision {
        Decision::Rejected => crop.quantity,
        Decision::Accepted => match policy {
            OversubscriptionPolicy::Clamp => crop.quantity.saturating_sub(entry.quantity).max(0),
            OversubscriptionPolicy::Reject => {
                if entry.quantity > crop.quantity {
                    return Err(AppError::InsufficientQuantity {
                        available: crop.quantity,
                        requested: entry.quantity,
                    });
                }
                crop.quantity - entry.quantity
            }
        },
    };

    Ok(StatusUpdate {
        crop_id: crop.id,
        interest_id,
        new_status,
        new_quantity,
        expected_status: InterestStatus::Pending,
        expected_version: crop.version,
    })
}

// -----------------------------------------------------------------------------
// ENGINE
// -----------------------------------------------------------------------------
#[derive(Clone)]
pub struct InterestWorkflow {
    store: Arc<dyn CatalogStore>,
    policy: OversubscriptionPolicy,
    max_conflict_retries: u32,
}

impl InterestWorkflow {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        policy: OversubscriptionPolicy,
        max_conflict_retries: u32,
    ) -> Self {
        Self {
            store,
            policy,
            max_conflict_retries,
        }
    }

    async fn load_crop(&self, crop_id: Uuid) -> AppResult<CropRecord> {
        self.store
            .find_crop_by_id(crop_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Crop not found: {}", crop_id)))
    }

    fn exhausted(&self, operation: &str, crop_id: Uuid) -> AppError {
        warn!(
            operation,
            crop_id = %crop_id,
            retries = self.max_conflict_retries,
            "Giving up after repeated store conflicts"
        );
        AppError::Unavailable(format!(
            "crop {} is busy, {} retries exhausted",
            crop_id, self.max_conflict_retries
        ))
    }

    // -------------------------------------------------------------------------
    // SUBMIT INTEREST
    // -------------------------------------------------------------------------
    /// Append a pending interest from `input.user_email` to the crop's ledger.
    ///
    /// The requested quantity is not checked against remaining stock here;
    /// oversubscription is settled when the owner decides.
    ///
    /// # Errors
    /// - `NotFound` if the crop does not exist
    /// - `DuplicateInterest` if the user already has an entry for this crop
    /// - `Unavailable` if conflicting writers exhaust the retries
    #[instrument(
        skip(self, input),
        fields(user_email = %input.user_email),
        err(level = "debug")
    )]
    pub async fn submit_interest(
        &self,
        crop_id: Uuid,
        input: NewInterest,
    ) -> AppResult<InterestEntry> {
        // One initial attempt plus `max_conflict_retries` retries. Every
        // attempt re-reads the crop, so the duplicate check always runs
        // against the version the write is guarded on.
        for attempt in 0..=self.max_conflict_retries {
            let crop = match self.load_crop(crop_id).await {
                Ok(crop) => crop,
                Err(err) => {
                    if matches!(err, AppError::NotFound(_)) {
                        metrics::record_interest_submission("not_found");
                    }
                    return Err(err);
                }
            };

            if crop.has_interest_from(&input.user_email) {
                metrics::record_interest_submission("duplicate");
                return Err(AppError::DuplicateInterest);
            }

            let entry = InterestEntry::new(input.clone());
            match self
                .store
                .append_interest(crop_id, &entry, crop.version)
                .await?
            {
                WriteOutcome::Applied => {
                    metrics::record_interest_submission("created");
                    info!(
                        crop_id = %crop_id,
                        interest_id = %entry.id,
                        quantity = entry.quantity,
                        "Interest submitted"
                    );
                    return Ok(entry);
                }
                WriteOutcome::NotFound => {
                    metrics::record_interest_submission("not_found");
                    return Err(AppError::NotFound(format!("Crop not found: {}", crop_id)));
                }
                WriteOutcome::Conflict => {
                    metrics::record_store_conflict("append_interest");
                    debug!(crop_id = %crop_id, attempt, "Append conflicted, re-reading crop");
                }
            }
        }

        metrics::record_interest_submission("unavailable");
        Err(self.exhausted("submit_interest", crop_id))
    }

    // -------------------------------------------------------------------------
    // DECIDE INTEREST
    // -------------------------------------------------------------------------
    /// Accept or reject a pending interest.
    ///
    /// The status flip and the quantity write land in one conditional store
    /// write; on any error neither is applied.
    ///
    /// # Errors
    /// - `NotFound` if the crop or the interest does not exist
    /// - `AlreadyDecided` if the interest is not pending
    /// - `InsufficientQuantity` under the reject policy
    /// - `Unavailable` if conflicting writers exhaust the retries
    #[instrument(skip(self), err(level = "debug"))]
    pub async fn decide_interest(
        &self,
        crop_id: Uuid,
        interest_id: Uuid,
        decision: Decision,
    ) -> AppResult<DecisionOutcome> {
        let result = self.try_decide(crop_id, interest_id, decision).await;

        let outcome = match &result {
            Ok(_) => "applied",
            Err(AppError::NotFound(_)) => "not_found",
            Err(AppError::AlreadyDecided) => "already_decided",
            Err(AppError::InsufficientQuantity { .. }) => "insufficient_quantity",
            Err(AppError::Unavailable(_)) => "unavailable",
            Err(_) => "error",
        };
        metrics::record_interest_decision(decision.as_str(), outcome);

        result
    }

    async fn try_decide(
        &self,
        crop_id: Uuid,
        interest_id: Uuid,
        decision: Decision,
    ) -> AppResult<DecisionOutcome> {
        for attempt in 0..=self.max_conflict_retries {
            let crop = self.load_crop(crop_id).await?;
            let update = plan_decision(&crop, interest_id, decision, self.policy)?;

            match self.store.update_interest_status_and_quantity(&update).await? {
                WriteOutcome::Applied => {
                    metrics::set_crop_quantity(crop_id, update.new_quantity);
                    info!(
                        crop_id = %crop_id,
                        interest_id = %interest_id,
                        decision = decision.as_str(),
                        previous_quantity = crop.quantity,
                        remaining_quantity = update.new_quantity,
                        "Interest decided"
                    );
                    return Ok(DecisionOutcome {
                        interest_id,
                        status: update.new_status,
                        remaining_quantity: update.new_quantity,
                    });
                }
                WriteOutcome::NotFound => {
                    return Err(AppError::NotFound(format!(
                        "Interest not found: {}",
                        interest_id
                    )));
                }
                WriteOutcome::Conflict => {
                    metrics::record_store_conflict("update_interest_status");
                    debug!(
                        crop_id = %crop_id,
                        interest_id = %interest_id,
                        attempt,
                        "Decision conflicted, re-reading crop"
                    );
                }
            }
        }

        Err(self.exhausted("decide_interest", crop_id))
    }

    // -------------------------------------------------------------------------
    // READ PROJECTIONS
    // -------------------------------------------------------------------------

    /// Owner view: every interest on one crop, in ledger order.
    pub async fn list_interests_for_crop(&self, crop_id: Uuid) -> AppResult<Vec<CropInterestView>> {
        Ok(self.load_crop(crop_id).await?.interest_views())
    }

    /// Buyer view: this user's interests across all crops. Within a crop the
    /// ledger order is kept; the order across crops is the store's listing
    /// order.
    pub async fn list_interests_for_user(&self, user_email: &str) -> AppResult<Vec<UserInterestView>> {
        let user_email = user_email.trim();
        if user_email.is_empty() {
            return Err(AppError::InvalidInput("Missing user email".to_string()));
        }

        let crops = self.store.list_crops_with_interests().await?;
        Ok(crops
            .iter()
            .flat_map(|crop| crop.user_interest_views(user_email))
            .collect())
    }
}
