// =============================================================================
// APPLICATION STATE AND ROUTES
// =============================================================================
// Shared state handed to every handler, and the router wiring URLs to
// handlers. main.rs and the integration tests both build the app from here.
// =============================================================================

use axum::{
    routing::{get, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::cache::CropCache;
use crate::handlers;
use crate::store::CatalogStore;
use crate::workflow::{InterestWorkflow, OversubscriptionPolicy};

#[derive(Clone)]
pub struct AppState {
    /// Crop, interest and user records
    pub catalog: Arc<dyn CatalogStore>,

    /// Interest submission and decision engine over `catalog`
    pub workflow: InterestWorkflow,

    /// Redis crop cache (may be disabled)
    pub cache: CropCache,

    /// Used to render metrics in Prometheus format
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        cache: CropCache,
        metrics_handle: PrometheusHandle,
        policy: OversubscriptionPolicy,
        max_conflict_retries: u32,
    ) -> Self {
        let workflow = InterestWorkflow::new(catalog.clone(), policy, max_conflict_retries);
        Self {
            catalog,
            workflow,
            cache,
            metrics_handle,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // ----- Health, Readiness & Metrics -----
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        // ----- Users -----
        .route(
            "/users",
            get(handlers::list_users).post(handlers::register_user),
        )
        // ----- Crops -----
        .route(
            "/crops",
            get(handlers::list_crops).post(handlers::create_crop),
        )
        .route("/crops/latest", get(handlers::latest_crops))
        .route(
            "/crops/:id",
            get(handlers::get_crop)
                .patch(handlers::update_crop)
                .delete(handlers::delete_crop),
        )
        .route("/my-crops/:email", get(handlers::my_crops))
        // ----- Interests -----
        .route(
            "/crops/:id/interests",
            get(handlers::crop_interests).post(handlers::submit_interest),
        )
        .route(
            "/crops/:id/interests/:interest_id",
            put(handlers::decide_interest),
        )
        .route("/interests", get(handlers::user_interests))
        .route("/my-interests/:email", get(handlers::my_interests))
        // ----- Middleware -----
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::detached_handle;
    use crate::store::MemoryCatalogStore;

    #[test]
    fn router_builds_with_every_route() {
        let catalog: Arc<dyn CatalogStore> = Arc::new(MemoryCatalogStore::new());
        let state = AppState::new(
            catalog,
            CropCache::disabled(),
            detached_handle().unwrap(),
            OversubscriptionPolicy::Reject,
            1,
        );

        // Route table must build without conflicting paths.
        let _ = router(Arc::new(state));
    }
}
