// =============================================================================
// MODELS MODULE
// =============================================================================
// Data structures used throughout the service:
// - Crop Record with its embedded interest ledger
// - Interest Entry and its status state machine
// - API request bodies and the validated inputs they turn into
// - API response and projection shapes
//
// JSON field names are camelCase (pricePerUnit, userEmail, ownerEmail) so the
// wire format matches what the marketplace frontend already sends.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

// =============================================================================
// INTEREST STATUS
// =============================================================================
// pending -> accepted
// pending -> rejected
// Both targets are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl InterestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterestStatus::Pending => "pending",
            InterestStatus::Accepted => "accepted",
            InterestStatus::Rejected => "rejected",
        }
    }

    /// Parse the stored (lowercase) representation.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(InterestStatus::Pending),
            "accepted" => Some(InterestStatus::Accepted),
            "rejected" => Some(InterestStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InterestStatus::Pending)
    }

    /// Apply an owner decision to this status.
    ///
    /// Only a pending entry can be decided; anything else fails with
    /// `AlreadyDecided` and the caller must not write.
    pub fn transition(self, decision: Decision) -> AppResult<InterestStatus> {
        if self.is_terminal() {
            return Err(AppError::AlreadyDecided);
        }
        Ok(decision.target_status())
    }
}

// =============================================================================
// DECISION
// =============================================================================
/// Owner's verdict on a pending interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accepted,
    Rejected,
}

impl Decision {
    /// Parse a decision from a request body value.
    pub fn parse(raw: &str) -> AppResult<Self> {
        match raw.trim() {
            "accepted" => Ok(Decision::Accepted),
            "rejected" => Ok(Decision::Rejected),
            other => Err(AppError::InvalidInput(format!(
                "status must be 'accepted' or 'rejected', got '{}'",
                other
            ))),
        }
    }

    pub fn target_status(self) -> InterestStatus {
        match self {
            Decision::Accepted => InterestStatus::Accepted,
            Decision::Rejected => InterestStatus::Rejected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.target_status().as_str()
    }
}

// =============================================================================
// INTEREST ENTRY
// =============================================================================
// One buyer's request against one crop. Lives only inside the crop's ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterestEntry {
    pub id: Uuid,

    /// Requester. Unique within one crop's ledger.
    pub user_email: String,

    /// Requested amount, always positive
    pub quantity: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub status: InterestStatus,

    pub created_at: DateTime<Utc>,
}

impl InterestEntry {
    /// Build a fresh pending entry from a validated submission.
    pub fn new(input: NewInterest) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_email: input.user_email,
            quantity: input.quantity,
            message: input.message,
            status: InterestStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// CROP RECORD
// =============================================================================

/// Seller of a crop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub owner_name: String,
    pub owner_email: String,
}

/// A listed crop together with its interest ledger.
///
/// `quantity` is the remaining stock. It changes through owner edits and
/// through interest acceptance, never anything else. `interests` is kept in
/// submission order and is only ever appended to.
///
/// `version` starts at 1 and is bumped by every mutation. The catalog store
/// rejects conditional writes whose expected version is stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropRecord {
    pub id: Uuid,
    pub name: String,
    pub image: String,
    pub location: String,
    pub price_per_unit: f64,
    pub quantity: i64,
    pub owner: Owner,
    #[serde(default)]
    pub interests: Vec<InterestEntry>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CropRecord {
    /// Build a new record with an empty ledger.
    pub fn from_new(new: NewCrop) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: new.name,
            image: new.image,
            location: new.location,
            price_per_unit: new.price_per_unit,
            quantity: new.quantity,
            owner: new.owner,
            interests: Vec::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn find_interest(&self, interest_id: Uuid) -> Option<&InterestEntry> {
        self.interests.iter().find(|i| i.id == interest_id)
    }

    pub fn find_interest_mut(&mut self, interest_id: Uuid) -> Option<&mut InterestEntry> {
        self.interests.iter_mut().find(|i| i.id == interest_id)
    }

    /// True if `user_email` already has an entry in this crop's ledger.
    pub fn has_interest_from(&self, user_email: &str) -> bool {
        self.interests.iter().any(|i| i.user_email == user_email)
    }

    /// Apply an owner edit. Identity, owner and ledger are untouched.
    pub fn apply_patch(&mut self, patch: &CropPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(image) = &patch.image {
            self.image = image.clone();
        }
        if let Some(location) = &patch.location {
            self.location = location.clone();
        }
        if let Some(price) = patch.price_per_unit {
            self.price_per_unit = price;
        }
        if let Some(quantity) = patch.quantity {
            self.quantity = quantity;
        }
        self.version += 1;
        self.updated_at = Utc::now();
    }

    /// Owner-facing projection of every entry in ledger order.
    pub fn interest_views(&self) -> Vec<CropInterestView> {
        self.interests
            .iter()
            .map(|interest| CropInterestView {
                crop_id: self.id,
                crop_name: self.name.clone(),
                remaining_quantity: self.quantity,
                interest: interest.clone(),
            })
            .collect()
    }

    /// Buyer-facing projection of the entries submitted by `user_email`.
    pub fn user_interest_views(&self, user_email: &str) -> Vec<UserInterestView> {
        self.interests
            .iter()
            .filter(|i| i.user_email == user_email)
            .map(|interest| UserInterestView {
                crop_id: self.id,
                crop_name: self.name.clone(),
                image: self.image.clone(),
                location: self.location.clone(),
                price_per_unit: self.price_per_unit,
                owner_name: self.owner.owner_name.clone(),
                owner_email: self.owner.owner_email.clone(),
                interest_id: interest.id,
                quantity: interest.quantity,
                message: interest.message.clone(),
                status: interest.status,
            })
            .collect()
    }
}

// =============================================================================
// USER
// =============================================================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// VALIDATED INPUTS
// =============================================================================
// Request bodies arrive with every field optional and are turned into these
// typed inputs before reaching the workflow engine or the store.

#[derive(Debug, Clone, PartialEq)]
pub struct NewInterest {
    pub user_email: String,
    pub quantity: i64,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCrop {
    pub name: String,
    pub image: String,
    pub location: String,
    pub price_per_unit: f64,
    pub quantity: i64,
    pub owner: Owner,
}

/// Owner edit. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CropPatch {
    pub name: Option<String>,
    pub image: Option<String>,
    pub location: Option<String>,
    pub price_per_unit: Option<f64>,
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub photo_url: Option<String>,
}

fn required_text(field: &str, value: Option<String>) -> AppResult<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::InvalidInput(format!("{} is required", field))),
    }
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Minimal shape check: something before and after a single '@'.
pub fn validate_email(field: &str, value: Option<String>) -> AppResult<String> {
    let email = required_text(field, value)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(email)
        }
        _ => Err(AppError::InvalidInput(format!(
            "{} is not a valid email address",
            field
        ))),
    }
}

fn non_negative_quantity(field: &str, value: i64) -> AppResult<i64> {
    if value < 0 {
        return Err(AppError::InvalidInput(format!(
            "{} must not be negative",
            field
        )));
    }
    Ok(value)
}

fn valid_price(value: f64) -> AppResult<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::InvalidInput(
            "pricePerUnit must be a non-negative number".to_string(),
        ));
    }
    Ok(value)
}

// =============================================================================
// API REQUEST STRUCTURES
// =============================================================================

/// Body of `POST /crops/:id/interests`
///
/// # Example JSON
/// ```json
/// { "userEmail": "buyer@example.com", "quantity": 30, "message": "Can collect Friday" }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitInterestRequest {
    pub user_email: Option<String>,
    pub quantity: Option<i64>,
    pub message: Option<String>,
}

impl SubmitInterestRequest {
    pub fn validate(self) -> AppResult<NewInterest> {
        let user_email = validate_email("userEmail", self.user_email)?;
        let quantity = self
            .quantity
            .ok_or_else(|| AppError::InvalidInput("quantity is required".to_string()))?;
        if quantity <= 0 {
            return Err(AppError::InvalidInput(
                "quantity must be greater than zero".to_string(),
            ));
        }
        Ok(NewInterest {
            user_email,
            quantity,
            message: optional_text(self.message),
        })
    }
}

/// Body of `PUT /crops/:id/interests/:interest_id`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecideInterestRequest {
    pub status: Option<String>,
}

impl DecideInterestRequest {
    pub fn validate(self) -> AppResult<Decision> {
        let raw = self
            .status
            .ok_or_else(|| AppError::InvalidInput("status is required".to_string()))?;
        Decision::parse(&raw)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerRequest {
    pub owner_name: Option<String>,
    pub owner_email: Option<String>,
}

/// Body of `POST /crops`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCropRequest {
    pub name: Option<String>,
    pub image: Option<String>,
    pub location: Option<String>,
    pub price_per_unit: Option<f64>,
    pub quantity: Option<i64>,
    pub owner: Option<OwnerRequest>,
}

impl CreateCropRequest {
    pub fn validate(self) -> AppResult<NewCrop> {
        let name = required_text("name", self.name)?;
        let quantity = self
            .quantity
            .ok_or_else(|| AppError::InvalidInput("quantity is required".to_string()))?;
        let price = self
            .price_per_unit
            .ok_or_else(|| AppError::InvalidInput("pricePerUnit is required".to_string()))?;
        let owner = self
            .owner
            .ok_or_else(|| AppError::InvalidInput("owner is required".to_string()))?;

        Ok(NewCrop {
            name,
            image: optional_text(self.image).unwrap_or_default(),
            location: optional_text(self.location).unwrap_or_default(),
            price_per_unit: valid_price(price)?,
            quantity: non_negative_quantity("quantity", quantity)?,
            owner: Owner {
                owner_name: required_text("owner.ownerName", owner.owner_name)?,
                owner_email: validate_email("owner.ownerEmail", owner.owner_email)?,
            },
        })
    }
}

/// Body of `PATCH /crops/:id`. Unknown fields (owner, interests, id) are
/// ignored; they are not editable through this route.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCropRequest {
    pub name: Option<String>,
    pub image: Option<String>,
    pub location: Option<String>,
    pub price_per_unit: Option<f64>,
    pub quantity: Option<i64>,
}

impl UpdateCropRequest {
    pub fn validate(self) -> AppResult<CropPatch> {
        let patch = CropPatch {
            name: match self.name {
                Some(name) => Some(required_text("name", Some(name))?),
                None => None,
            },
            image: self.image.map(|v| v.trim().to_string()),
            location: self.location.map(|v| v.trim().to_string()),
            price_per_unit: self.price_per_unit.map(valid_price).transpose()?,
            quantity: self
                .quantity
                .map(|q| non_negative_quantity("quantity", q))
                .transpose()?,
        };

        if patch == CropPatch::default() {
            return Err(AppError::InvalidInput(
                "update must change at least one field".to_string(),
            ));
        }
        Ok(patch)
    }
}

/// Body of `POST /users`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
}

impl RegisterUserRequest {
    pub fn validate(self) -> AppResult<NewUser> {
        Ok(NewUser {
            name: required_text("name", self.name)?,
            email: validate_email("email", self.email)?,
            photo_url: optional_text(self.photo_url),
        })
    }
}

// =============================================================================
// API RESPONSE STRUCTURES
// =============================================================================

/// Response of `POST /crops/:id/interests`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitInterestResponse {
    pub inserted_id: Uuid,
    pub interest: InterestEntry,
}

/// Result of a decision as seen right after the write
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionOutcome {
    pub interest_id: Uuid,
    pub status: InterestStatus,
    pub remaining_quantity: i64,
}

/// Response of `PUT /crops/:id/interests/:interest_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: DecisionOutcome,
}

/// Owner view of one interest, with the crop it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropInterestView {
    pub crop_id: Uuid,
    pub crop_name: String,
    pub remaining_quantity: i64,
    #[serde(flatten)]
    pub interest: InterestEntry,
}

/// Buyer view of one of their interests ("my interests")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInterestView {
    pub crop_id: Uuid,
    pub crop_name: String,
    pub image: String,
    pub location: String,
    pub price_per_unit: f64,
    pub owner_name: String,
    pub owner_email: String,
    pub interest_id: Uuid,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: InterestStatus,
}

/// Response of `POST /users`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserResponse {
    pub message: String,
    pub user_id: Uuid,
}

/// Response of `DELETE /crops/:id`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCropResponse {
    pub deleted_count: u64,
}

// =============================================================================
// HEALTH CHECK RESPONSES
// =============================================================================

/// Simple health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Detailed readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

/// Individual dependency health checks. `redis` is absent when the crop
/// cache is disabled.
#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub catalog: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<bool>,
}

// =============================================================================
// ERROR RESPONSES
// =============================================================================

/// API error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type/code
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error: impl Into<String>,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details.into()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn sample_crop(quantity: i64) -> CropRecord {
        CropRecord::from_new(NewCrop {
            name: "Basmati Rice".to_string(),
            image: "https://img.example/rice.png".to_string(),
            location: "Bogura".to_string(),
            price_per_unit: 62.5,
            quantity,
            owner: Owner {
                owner_name: "Rahim".to_string(),
                owner_email: "rahim@farm.example".to_string(),
            },
        })
    }

    #[test]
    fn pending_can_move_to_either_terminal_state() {
        assert_eq!(
            InterestStatus::Pending.transition(Decision::Accepted).unwrap(),
            InterestStatus::Accepted
        );
        assert_eq!(
            InterestStatus::Pending.transition(Decision::Rejected).unwrap(),
            InterestStatus::Rejected
        );
    }

    #[test]
    fn terminal_states_never_transition() {
        for status in [InterestStatus::Accepted, InterestStatus::Rejected] {
            assert!(status.is_terminal());
            for decision in [Decision::Accepted, Decision::Rejected] {
                assert!(matches!(
                    status.transition(decision),
                    Err(AppError::AlreadyDecided)
                ));
            }
        }
    }

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in [
            InterestStatus::Pending,
            InterestStatus::Accepted,
            InterestStatus::Rejected,
        ] {
            assert_eq!(InterestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(InterestStatus::parse("cancelled"), None);
    }

    #[test]
    fn decision_parse_rejects_unknown_values() {
        assert_eq!(Decision::parse("accepted").unwrap(), Decision::Accepted);
        assert_eq!(Decision::parse(" rejected ").unwrap(), Decision::Rejected);
        assert!(matches!(
            Decision::parse("pending"),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn submit_request_requires_email_and_positive_quantity() {
        let missing_email = SubmitInterestRequest {
            user_email: None,
            quantity: Some(5),
            message: None,
        };
        assert!(matches!(
            missing_email.validate(),
            Err(AppError::InvalidInput(_))
        ));

        let zero = SubmitInterestRequest {
            user_email: Some("buyer@example.com".to_string()),
            quantity: Some(0),
            message: None,
        };
        assert!(matches!(zero.validate(), Err(AppError::InvalidInput(_))));

        let bad_email = SubmitInterestRequest {
            user_email: Some("not-an-email".to_string()),
            quantity: Some(3),
            message: None,
        };
        assert!(matches!(bad_email.validate(), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn submit_request_trims_and_drops_blank_message() {
        let input = SubmitInterestRequest {
            user_email: Some("  buyer@example.com ".to_string()),
            quantity: Some(12),
            message: Some("   ".to_string()),
        }
        .validate()
        .unwrap();

        assert_eq!(input.user_email, "buyer@example.com");
        assert_eq!(input.quantity, 12);
        assert_eq!(input.message, None);
    }

    #[test]
    fn submit_request_reads_camel_case_json() {
        let body: SubmitInterestRequest = serde_json::from_str(
            r#"{"userEmail":"a@b.co","quantity":7,"message":"hello"}"#,
        )
        .unwrap();
        let input = body.validate().unwrap();
        assert_eq!(input.user_email, "a@b.co");
        assert_eq!(input.message.as_deref(), Some("hello"));
    }

    #[test]
    fn decide_request_requires_status() {
        assert!(matches!(
            DecideInterestRequest { status: None }.validate(),
            Err(AppError::InvalidInput(_))
        ));
        assert_eq!(
            DecideInterestRequest {
                status: Some("accepted".to_string())
            }
            .validate()
            .unwrap(),
            Decision::Accepted
        );
    }

    #[test]
    fn create_crop_request_validates_owner_and_amounts() {
        let request = CreateCropRequest {
            name: Some("Potato".to_string()),
            image: None,
            location: Some("Rangpur".to_string()),
            price_per_unit: Some(20.0),
            quantity: Some(-1),
            owner: Some(OwnerRequest {
                owner_name: Some("Karim".to_string()),
                owner_email: Some("karim@farm.example".to_string()),
            }),
        };
        assert!(matches!(request.validate(), Err(AppError::InvalidInput(_))));

        let no_owner = CreateCropRequest {
            name: Some("Potato".to_string()),
            price_per_unit: Some(20.0),
            quantity: Some(10),
            ..Default::default()
        };
        assert!(matches!(no_owner.validate(), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn empty_update_is_rejected() {
        assert!(matches!(
            UpdateCropRequest::default().validate(),
            Err(AppError::InvalidInput(_))
        ));

        let patch = UpdateCropRequest {
            quantity: Some(40),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(patch.quantity, Some(40));
    }

    #[test]
    fn new_entry_starts_pending() {
        let entry = InterestEntry::new(NewInterest {
            user_email: "buyer@example.com".to_string(),
            quantity: 4,
            message: None,
        });
        assert_eq!(entry.status, InterestStatus::Pending);
    }

    #[test]
    fn patch_bumps_version_and_keeps_ledger() {
        let mut crop = sample_crop(100);
        crop.interests.push(InterestEntry::new(NewInterest {
            user_email: "buyer@example.com".to_string(),
            quantity: 4,
            message: None,
        }));

        crop.apply_patch(&CropPatch {
            quantity: Some(80),
            ..Default::default()
        });

        assert_eq!(crop.quantity, 80);
        assert_eq!(crop.version, 2);
        assert_eq!(crop.interests.len(), 1);
    }

    #[test]
    fn user_projection_filters_by_email() {
        let mut crop = sample_crop(100);
        for email in ["a@x.co", "b@x.co"] {
            crop.interests.push(InterestEntry::new(NewInterest {
                user_email: email.to_string(),
                quantity: 1,
                message: None,
            }));
        }

        let views = crop.user_interest_views("b@x.co");
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].owner_email, "rahim@farm.example");
        assert_eq!(views[0].interest_id, crop.interests[1].id);
        assert_eq!(crop.interest_views().len(), 2);
    }
}
