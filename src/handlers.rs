// =============================================================================
// HANDLERS MODULE
// =============================================================================
// HTTP request handlers (controller layer).
//
// Handlers only translate between HTTP and the service: they parse and
// validate input, call the workflow engine or the catalog store, keep the
// crop cache honest, and record request metrics. Business rules live in
// workflow.rs.
// =============================================================================

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::app::AppState;
use crate::cache::CacheLookup;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::*;

// -----------------------------------------------------------------------------
// HELPERS
// -----------------------------------------------------------------------------

/// Record the request counter/latency for a handler result. `ok_status` is
/// what the handler answers on success (200, or 201 for creations).
fn observe<T>(
    method: &str,
    endpoint: &str,
    start: Instant,
    result: &AppResult<T>,
    ok_status: StatusCode,
) {
    let status = match result {
        Ok(_) => ok_status.as_u16(),
        Err(err) => err.status_and_code().0.as_u16(),
    };
    metrics::record_http_request(method, endpoint, status, start.elapsed().as_secs_f64());
}

fn parse_id(raw: &str, what: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::InvalidInput(format!("{} is not a valid id: {}", what, raw)))
}

/// Unwrap a JSON body, turning axum's rejection into `InvalidInput`.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::InvalidInput(rejection.body_text()))
}

// =============================================================================
// HEALTH CHECK ENDPOINTS
// =============================================================================

/// GET /
pub async fn root() -> &'static str {
    "KrishiLink server is running"
}

/// Liveness probe
///
/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "krishilink-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness probe - catalog store reachable and, if configured, Redis too.
///
/// GET /ready
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReadinessResponse>, StatusCode> {
    let catalog_healthy = state.catalog.health_check().await;
    let redis_healthy = state.cache.ping().await;

    let all_healthy = catalog_healthy && redis_healthy.unwrap_or(true);
    let status = if all_healthy { "ready" } else { "not_ready" };

    let response = ReadinessResponse {
        status: status.to_string(),
        checks: ReadinessChecks {
            catalog: catalog_healthy,
            redis: redis_healthy,
        },
    };

    if all_healthy {
        Ok(Json(response))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// Prometheus metrics endpoint
///
/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}

// =============================================================================
// USER ENDPOINTS
// =============================================================================

/// Register a user; an already known email returns the existing id.
///
/// POST /users
/// - 201 Created: new user
/// - 200 OK: user already exists
pub async fn register_user(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterUserRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<RegisterUserResponse>)> {
    let start = Instant::now();

    let result: AppResult<_> = async {
        let new_user = json_body(payload)?.validate()?;
        state.catalog.upsert_user(new_user).await
    }
    .await;
    let ok_status = match &result {
        Ok((_, true)) => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    observe("POST", "/users", start, &result, ok_status);

    let (user, created) = result?;
    let (status, message) = if created {
        tracing::info!(user_id = %user.id, "User created");
        (StatusCode::CREATED, "User created")
    } else {
        (StatusCode::OK, "User already exists")
    };

    Ok((
        status,
        Json(RegisterUserResponse {
            message: message.to_string(),
            user_id: user.id,
        }),
    ))
}

/// GET /users
pub async fn list_users(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<User>>> {
    let start = Instant::now();
    let result = state.catalog.list_users().await;
    observe("GET", "/users", start, &result, StatusCode::OK);
    Ok(Json(result?))
}

// =============================================================================
// CROP ENDPOINTS
// =============================================================================

/// Query parameters for the crop list
///
/// # Example
/// GET /crops?search=rice
#[derive(Debug, Deserialize)]
pub struct CropSearchParams {
    pub search: Option<String>,
}

/// GET /crops
pub async fn list_crops(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CropSearchParams>,
) -> AppResult<Json<Vec<CropRecord>>> {
    let start = Instant::now();
    let result = state.catalog.list_crops(params.search.as_deref()).await;
    observe("GET", "/crops", start, &result, StatusCode::OK);
    Ok(Json(result?))
}

#[derive(Debug, Deserialize)]
pub struct LatestParams {
    /// Number of crops (default: 6, max: 50)
    #[serde(default = "default_latest_limit")]
    pub limit: usize,
}

fn default_latest_limit() -> usize {
    6
}

/// GET /crops/latest
pub async fn latest_crops(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LatestParams>,
) -> AppResult<Json<Vec<CropRecord>>> {
    let start = Instant::now();
    let limit = params.limit.clamp(1, 50);
    let result = state.catalog.latest_crops(limit).await;
    observe("GET", "/crops/latest", start, &result, StatusCode::OK);
    Ok(Json(result?))
}

/// Single crop with its ledger. Served from the Redis cache when possible.
///
/// GET /crops/:id
pub async fn get_crop(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<CropRecord>> {
    let start = Instant::now();

    let result: AppResult<_> = async {
        let crop_id = parse_id(&raw_id, "crop id")?;
        // The ticket is taken before the store read; see cache.rs.
        let ticket = match state.cache.get(crop_id).await {
            CacheLookup::Hit(crop) => return Ok(crop),
            CacheLookup::Miss { ticket } => ticket,
        };

        let crop = state
            .catalog
            .find_crop_by_id(crop_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Crop not found".to_string()))?;
        if let Some(ticket) = ticket {
            state.cache.put(&crop, ticket).await;
        }
        Ok(crop)
    }
    .await;
    observe("GET", "/crops/:id", start, &result, StatusCode::OK);

    Ok(Json(result?))
}

/// POST /crops
pub async fn create_crop(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateCropRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<CropRecord>)> {
    let start = Instant::now();

    let result: AppResult<_> = async {
        let new_crop = json_body(payload)?.validate()?;
        state.catalog.insert_crop(new_crop).await
    }
    .await;
    observe("POST", "/crops", start, &result, StatusCode::CREATED);

    let crop = result?;
    tracing::info!(crop_id = %crop.id, owner = %crop.owner.owner_email, "Crop listed");
    Ok((StatusCode::CREATED, Json(crop)))
}

/// Owner edit of descriptive fields and quantity.
///
/// PATCH /crops/:id
pub async fn update_crop(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    payload: Result<Json<UpdateCropRequest>, JsonRejection>,
) -> AppResult<Json<CropRecord>> {
    let start = Instant::now();

    let result: AppResult<_> = async {
        let crop_id = parse_id(&raw_id, "crop id")?;
        let patch = json_body(payload)?.validate()?;
        let crop = state
            .catalog
            .update_crop(crop_id, &patch)
            .await?
            .ok_or_else(|| AppError::NotFound("Crop not found".to_string()))?;
        state.cache.invalidate(crop_id).await;
        Ok(crop)
    }
    .await;
    observe("PATCH", "/crops/:id", start, &result, StatusCode::OK);

    Ok(Json(result?))
}

/// DELETE /crops/:id
pub async fn delete_crop(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<DeleteCropResponse>> {
    let start = Instant::now();

    let result: AppResult<_> = async {
        let crop_id = parse_id(&raw_id, "crop id")?;
        if !state.catalog.delete_crop(crop_id).await? {
            return Err(AppError::NotFound("Crop not found".to_string()));
        }
        state.cache.invalidate(crop_id).await;
        metrics::retire_crop_quantity(crop_id);
        tracing::info!(crop_id = %crop_id, "Crop deleted");
        Ok(DeleteCropResponse { deleted_count: 1 })
    }
    .await;
    observe("DELETE", "/crops/:id", start, &result, StatusCode::OK);

    Ok(Json(result?))
}

/// GET /my-crops/:email
pub async fn my_crops(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> AppResult<Json<Vec<CropRecord>>> {
    let start = Instant::now();
    let result = state.catalog.crops_by_owner(email.trim()).await;
    observe("GET", "/my-crops/:email", start, &result, StatusCode::OK);
    Ok(Json(result?))
}

// =============================================================================
// INTEREST ENDPOINTS
// =============================================================================

/// Send interest in a crop
///
/// POST /crops/:id/interests
///
/// # Request Body
/// ```json
/// { "userEmail": "buyer@example.com", "quantity": 30, "message": "..." }
/// ```
///
/// # Response
/// - 200 OK: `{ "insertedId": "...", "interest": { ... } }`
/// - 400 Bad Request: duplicate interest or invalid body
/// - 404 Not Found: crop doesn't exist
pub async fn submit_interest(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    payload: Result<Json<SubmitInterestRequest>, JsonRejection>,
) -> AppResult<Json<SubmitInterestResponse>> {
    let start = Instant::now();

    let result: AppResult<_> = async {
        let crop_id = parse_id(&raw_id, "crop id")?;
        let input = json_body(payload)?.validate()?;
        let entry = state.workflow.submit_interest(crop_id, input).await?;
        state.cache.invalidate(crop_id).await;
        Ok(entry)
    }
    .await;
    observe("POST", "/crops/:id/interests", start, &result, StatusCode::OK);

    let entry = result?;
    Ok(Json(SubmitInterestResponse {
        inserted_id: entry.id,
        interest: entry,
    }))
}

/// Owner accepts or rejects an interest
///
/// PUT /crops/:id/interests/:interest_id
///
/// # Request Body
/// ```json
/// { "status": "accepted" }
/// ```
///
/// # Response
/// - 200 OK: `{ "success": true, "interestId": "...", "status": "accepted", "remainingQuantity": 70 }`
/// - 400 Bad Request: already decided or invalid status
/// - 404 Not Found: crop or interest doesn't exist
/// - 409 Conflict: not enough stock (reject policy only)
/// - 503 Service Unavailable: too many concurrent writers on this crop
pub async fn decide_interest(
    State(state): State<Arc<AppState>>,
    Path((raw_crop_id, raw_interest_id)): Path<(String, String)>,
    payload: Result<Json<DecideInterestRequest>, JsonRejection>,
) -> AppResult<Json<DecisionResponse>> {
    let start = Instant::now();

    let result: AppResult<_> = async {
        let crop_id = parse_id(&raw_crop_id, "crop id")?;
        let interest_id = parse_id(&raw_interest_id, "interest id")?;
        let decision = json_body(payload)?.validate()?;
        let outcome = state
            .workflow
            .decide_interest(crop_id, interest_id, decision)
            .await?;
        state.cache.invalidate(crop_id).await;
        Ok(outcome)
    }
    .await;
    observe("PUT", "/crops/:id/interests/:interest_id", start, &result, StatusCode::OK);

    Ok(Json(DecisionResponse {
        success: true,
        outcome: result?,
    }))
}

/// Owner view of all interests on a crop
///
/// GET /crops/:id/interests
pub async fn crop_interests(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<Vec<CropInterestView>>> {
    let start = Instant::now();

    let result: AppResult<_> = async {
        let crop_id = parse_id(&raw_id, "crop id")?;
        state.workflow.list_interests_for_crop(crop_id).await
    }
    .await;
    observe("GET", "/crops/:id/interests", start, &result, StatusCode::OK);

    Ok(Json(result?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInterestsParams {
    pub user_email: Option<String>,
}

/// GET /interests?userEmail=...
pub async fn user_interests(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserInterestsParams>,
) -> AppResult<Json<Vec<UserInterestView>>> {
    let start = Instant::now();
    let email = params.user_email.unwrap_or_default();
    let result = state.workflow.list_interests_for_user(&email).await;
    observe("GET", "/interests", start, &result, StatusCode::OK);
    Ok(Json(result?))
}

/// GET /my-interests/:email
pub async fn my_interests(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> AppResult<Json<Vec<UserInterestView>>> {
    let start = Instant::now();
    let result = state.workflow.list_interests_for_user(&email).await;
    observe("GET", "/my-interests/:email", start, &result, StatusCode::OK);
    Ok(Json(result?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_reports_invalid_input() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&format!(" {} ", id), "crop id").unwrap(), id);
        assert!(matches!(
            parse_id("65f0c0ffee", "crop id"),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn request_metrics_carry_the_status_actually_sent() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            let created: AppResult<()> = Ok(());
            observe("POST", "/crops", Instant::now(), &created, StatusCode::CREATED);

            let duplicate: AppResult<()> = Err(AppError::DuplicateInterest);
            observe(
                "POST",
                "/crops/:id/interests",
                Instant::now(),
                &duplicate,
                StatusCode::OK,
            );
        });

        let rendered = handle.render();
        let line_for = |endpoint: &str| {
            rendered
                .lines()
                .find(|l| {
                    l.starts_with("http_requests_total{")
                        && l.contains(&format!("endpoint=\"{}\"", endpoint))
                })
                .unwrap_or_else(|| panic!("no counter for {}", endpoint))
                .to_string()
        };
        assert!(line_for("/crops").contains("status=\"201\""));
        assert!(line_for("/crops/:id/interests").contains("status=\"400\""));
    }
}
