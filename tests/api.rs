use std::sync::Arc;

use krishilink_service::app::{router, AppState};
use krishilink_service::cache::CropCache;
use krishilink_service::metrics::detached_handle;
use krishilink_service::store::{CatalogStore, MemoryCatalogStore};
use krishilink_service::workflow::OversubscriptionPolicy;
use reqwest::StatusCode;
use serde_json::{json, Value};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(policy: OversubscriptionPolicy) -> Self {
        // Same router as prod, in-memory store, ephemeral port.
        let catalog: Arc<dyn CatalogStore> = Arc::new(MemoryCatalogStore::new());
        let state = AppState::new(
            catalog,
            CropCache::disabled(),
            detached_handle().expect("failed to build metrics handle"),
            policy,
            3,
        );
        let app = router(Arc::new(state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn create_crop(client: &reqwest::Client, srv: &TestServer, quantity: i64) -> Value {
    let res = client
        .post(srv.url("/crops"))
        .json(&json!({
            "name": "Basmati Rice",
            "image": "https://img.example/rice.png",
            "location": "Bogura",
            "pricePerUnit": 62.5,
            "quantity": quantity,
            "owner": { "ownerName": "Rahim", "ownerEmail": "rahim@farm.example" }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

async fn submit(
    client: &reqwest::Client,
    srv: &TestServer,
    crop_id: &str,
    email: &str,
    quantity: i64,
) -> reqwest::Response {
    client
        .post(srv.url(&format!("/crops/{}/interests", crop_id)))
        .json(&json!({ "userEmail": email, "quantity": quantity, "message": "Can collect Friday" }))
        .send()
        .await
        .unwrap()
}

async fn decide(
    client: &reqwest::Client,
    srv: &TestServer,
    crop_id: &str,
    interest_id: &str,
    status: &str,
) -> reqwest::Response {
    client
        .put(srv.url(&format!("/crops/{}/interests/{}", crop_id, interest_id)))
        .json(&json!({ "status": status }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_and_metrics_endpoints_respond() {
    let srv = TestServer::spawn(OversubscriptionPolicy::Clamp).await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    let res = client.get(srv.url("/ready")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["checks"]["catalog"], true);
    assert!(body["checks"].get("redis").is_none());

    let res = client.get(srv.url("/metrics")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn interest_lifecycle_submit_accept_and_list() {
    let srv = TestServer::spawn(OversubscriptionPolicy::Clamp).await;
    let client = reqwest::Client::new();

    let crop = create_crop(&client, &srv, 100).await;
    let crop_id = crop["id"].as_str().unwrap().to_string();
    assert_eq!(crop["quantity"], 100);
    assert_eq!(crop["interests"].as_array().unwrap().len(), 0);

    let res = submit(&client, &srv, &crop_id, "buyer@example.com", 30).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let interest_id = body["insertedId"].as_str().unwrap().to_string();
    assert_eq!(body["interest"]["id"], interest_id.as_str());
    assert_eq!(body["interest"]["status"], "pending");

    // Submitting never touches stock.
    let crop: Value = client
        .get(srv.url(&format!("/crops/{}", crop_id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(crop["quantity"], 100);
    assert_eq!(crop["interests"].as_array().unwrap().len(), 1);

    let res = decide(&client, &srv, &crop_id, &interest_id, "accepted").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["remainingQuantity"], 70);

    let owner_view: Value = client
        .get(srv.url(&format!("/crops/{}/interests", crop_id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let owner_view = owner_view.as_array().unwrap();
    assert_eq!(owner_view.len(), 1);
    assert_eq!(owner_view[0]["remainingQuantity"], 70);
    assert_eq!(owner_view[0]["status"], "accepted");

    let buyer_view: Value = client
        .get(srv.url("/my-interests/buyer@example.com"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let buyer_view = buyer_view.as_array().unwrap();
    assert_eq!(buyer_view.len(), 1);
    assert_eq!(buyer_view[0]["cropName"], "Basmati Rice");
    assert_eq!(buyer_view[0]["ownerEmail"], "rahim@farm.example");
    assert_eq!(buyer_view[0]["interestId"], interest_id.as_str());

    let by_query: Value = client
        .get(srv.url("/interests?userEmail=buyer@example.com"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(by_query.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_and_redecided_interests_are_rejected() {
    let srv = TestServer::spawn(OversubscriptionPolicy::Clamp).await;
    let client = reqwest::Client::new();

    let crop = create_crop(&client, &srv, 50).await;
    let crop_id = crop["id"].as_str().unwrap().to_string();

    let res = submit(&client, &srv, &crop_id, "buyer@example.com", 10).await;
    let body: Value = res.json().await.unwrap();
    let interest_id = body["insertedId"].as_str().unwrap().to_string();

    let res = submit(&client, &srv, &crop_id, "buyer@example.com", 5).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "DUPLICATE_INTEREST");

    let res = decide(&client, &srv, &crop_id, &interest_id, "rejected").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["remainingQuantity"], 50);

    let res = decide(&client, &srv, &crop_id, &interest_id, "accepted").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "ALREADY_DECIDED");
}

#[tokio::test]
async fn oversized_acceptance_follows_policy() {
    let client = reqwest::Client::new();

    let clamp = TestServer::spawn(OversubscriptionPolicy::Clamp).await;
    let crop = create_crop(&client, &clamp, 20).await;
    let crop_id = crop["id"].as_str().unwrap().to_string();
    let body: Value = submit(&client, &clamp, &crop_id, "bulk@example.com", 35)
        .await
        .json()
        .await
        .unwrap();
    let res = decide(
        &client,
        &clamp,
        &crop_id,
        body["insertedId"].as_str().unwrap(),
        "accepted",
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["remainingQuantity"], 0);

    let reject = TestServer::spawn(OversubscriptionPolicy::Reject).await;
    let crop = create_crop(&client, &reject, 20).await;
    let crop_id = crop["id"].as_str().unwrap().to_string();
    let body: Value = submit(&client, &reject, &crop_id, "bulk@example.com", 35)
        .await
        .json()
        .await
        .unwrap();
    let res = decide(
        &client,
        &reject,
        &crop_id,
        body["insertedId"].as_str().unwrap(),
        "accepted",
    )
    .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "INSUFFICIENT_QUANTITY");
    assert_eq!(body["details"], "available=20 requested=35");
}

#[tokio::test]
async fn bad_input_and_missing_records() {
    let srv = TestServer::spawn(OversubscriptionPolicy::Clamp).await;
    let client = reqwest::Client::new();

    let crop = create_crop(&client, &srv, 10).await;
    let crop_id = crop["id"].as_str().unwrap().to_string();
    let body: Value = submit(&client, &srv, &crop_id, "buyer@example.com", 1)
        .await
        .json()
        .await
        .unwrap();
    let interest_id = body["insertedId"].as_str().unwrap().to_string();

    let res = decide(&client, &srv, &crop_id, &interest_id, "maybe").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = submit(&client, &srv, &crop_id, "other@example.com", 0).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let missing = uuid::Uuid::new_v4().to_string();
    let res = submit(&client, &srv, &missing, "buyer@example.com", 1).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = decide(&client, &srv, &crop_id, &missing, "accepted").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(srv.url("/crops/not-a-uuid"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client.get(srv.url("/interests")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn crop_edit_delete_and_user_registration() {
    let srv = TestServer::spawn(OversubscriptionPolicy::Clamp).await;
    let client = reqwest::Client::new();

    let crop = create_crop(&client, &srv, 10).await;
    let crop_id = crop["id"].as_str().unwrap().to_string();

    let res = client
        .patch(srv.url(&format!("/crops/{}", crop_id)))
        .json(&json!({ "quantity": 25, "location": "Rajshahi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["quantity"], 25);
    assert_eq!(body["location"], "Rajshahi");

    let mine: Value = client
        .get(srv.url("/my-crops/rahim@farm.example"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let found: Value = client
        .get(srv.url("/crops?search=basmati"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(found.as_array().unwrap().len(), 1);

    let res = client
        .delete(srv.url(&format!("/crops/{}", crop_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = client
        .get(srv.url(&format!("/crops/{}", crop_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let user = json!({ "name": "Karim", "email": "karim@example.com" });
    let res = client.post(srv.url("/users")).json(&user).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let first: Value = res.json().await.unwrap();

    let res = client.post(srv.url("/users")).json(&user).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let second: Value = res.json().await.unwrap();
    assert_eq!(first["userId"], second["userId"]);
}
