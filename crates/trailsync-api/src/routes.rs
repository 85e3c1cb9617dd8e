use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use trailsync_core::models::{
    Collection, KnownMarker, QuotaCounter, Submission, SyncResult, TrailTag, TrailTagDto,
};
use trailsync_core::services::provision_account;
use trailsync_core::stores::{
    CollectionStore, PhotoStore, ShareStore, TagStore, TrackStore, TrailStore, TrailTagStore,
};
use trailsync_core::util::normalize_id;
use trailsync_core::{
    with_retry, BulkCreated, BulkEngine, Database, Error, ItemError, QuotaLedger, ResourceStore,
    RetryPolicy,
};

use crate::auth::{extract_bearer_token, AuthenticatedUser, JwtVerifier};
use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<Database>,
    jwt_verifier: Arc<JwtVerifier>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, db: Arc<Database>) -> Self {
        Self {
            jwt_verifier: Arc::new(JwtVerifier::new(&config)),
            config,
            db,
        }
    }

    fn engine(&self) -> BulkEngine<'_> {
        BulkEngine::new(self.db.connection(), &self.config.engine)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_config(&self.config.engine)
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .nest("/collections", resource_routes::<CollectionStore>())
        .nest("/trails", resource_routes::<TrailStore>())
        .nest("/tracks", resource_routes::<TrackStore>())
        .nest("/tags", resource_routes::<TagStore>())
        .nest("/photos", resource_routes::<PhotoStore>())
        .nest("/shares", resource_routes::<ShareStore>())
        .route("/trail-tags", get(list_trail_tags))
        .route("/trail-tags/_bulkCreate", post(create_trail_tags))
        .route("/trail-tags/_bulkDelete", post(delete_trail_tags))
        .route("/quotas", get(list_quotas))
        .route("/account", post(provision))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

/// Bulk and single-record endpoints for one resource kind.
fn resource_routes<S>() -> Router<AppState>
where
    S: ResourceStore + Default + 'static,
    S::Record: Serialize,
    S::Dto: DeserializeOwned,
{
    Router::new()
        .route("/_bulkCreate", post(bulk_create::<S>))
        .route("/_bulkUpdate", put(bulk_update::<S>))
        .route("/_bulkDelete", post(bulk_delete::<S>))
        .route("/_bulkGetUpdates", post(bulk_get_updates::<S>))
        .route("/{id}", put(update_one::<S>))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    database: &'static str,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        database: if state.db.is_remote() { "remote" } else { "local" },
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let user = state.jwt_verifier.verify_access_token(token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[derive(Debug, Serialize)]
struct ItemErrorBody {
    id: Option<String>,
    code: String,
    status: u16,
}

#[derive(Debug, Serialize)]
struct BulkCreateResponse<R> {
    items: Vec<R>,
    errors: Vec<ItemErrorBody>,
}

impl<R> From<BulkCreated<R>> for BulkCreateResponse<R> {
    fn from(created: BulkCreated<R>) -> Self {
        Self {
            items: created.records,
            errors: created
                .errors
                .into_iter()
                .map(|ItemError { id, error }| ItemErrorBody {
                    id,
                    code: error.code(),
                    status: error.status(),
                })
                .collect(),
        }
    }
}

async fn bulk_create<S>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<Vec<S::Dto>>, JsonRejection>,
) -> Result<Json<BulkCreateResponse<S::Record>>, AppError>
where
    S: ResourceStore + Default,
    S::Record: Serialize,
{
    let Json(dtos) = payload?;
    let store = S::default();
    let engine = state.engine();
    let created = with_retry(state.retry_policy(), "bulk_create", || {
        engine.bulk_create(&store, &user.owner, dtos.clone())
    })
    .await?;
    Ok(Json(created.into()))
}

async fn bulk_update<S>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<Vec<S::Dto>>, JsonRejection>,
) -> Result<Json<Vec<S::Record>>, AppError>
where
    S: ResourceStore + Default,
    S::Record: Serialize,
{
    let Json(dtos) = payload?;
    let store = S::default();
    let engine = state.engine();
    let records = with_retry(state.retry_policy(), "bulk_update", || {
        engine.bulk_update(&store, &user.owner, dtos.clone())
    })
    .await?;
    Ok(Json(records))
}

async fn bulk_delete<S>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<Vec<String>>, JsonRejection>,
) -> Result<StatusCode, AppError>
where
    S: ResourceStore + Default,
{
    let Json(ids) = payload?;
    let store = S::default();
    let engine = state.engine();
    with_retry(state.retry_policy(), "bulk_delete", || {
        engine.bulk_delete(&store, &user.owner, ids.clone())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn bulk_get_updates<S>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<Vec<KnownMarker>>, JsonRejection>,
) -> Result<Json<SyncResult<S::Record>>, AppError>
where
    S: ResourceStore + Default,
    S::Record: Serialize,
{
    let Json(known) = payload?;
    let store = S::default();
    let engine = state.engine();
    let diff = with_retry(state.retry_policy(), "bulk_get_updates", || {
        engine.get_updates(&store, &user.owner, known.clone())
    })
    .await?;
    Ok(Json(diff))
}

async fn update_one<S>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    payload: Result<Json<S::Dto>, JsonRejection>,
) -> Result<Json<S::Record>, AppError>
where
    S: ResourceStore + Default,
    S::Record: Serialize,
{
    let Json(dto) = payload?;
    match dto.submitted_id() {
        Some(submitted) if normalize_id(submitted) == normalize_id(&id) => {}
        Some(_) => return Err(Error::Invalid("id").into()),
        None => return Err(Error::Missing("id").into()),
    }
    let store = S::default();
    let engine = state.engine();
    let record = with_retry(state.retry_policy(), "update", || {
        engine.update_strict(&store, &user.owner, dto.clone())
    })
    .await?;
    Ok(Json(record))
}

async fn list_trail_tags(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<TrailTag>>, AppError> {
    let store = TrailTagStore::new(state.db.connection());
    let links = with_retry(state.retry_policy(), "list_trail_tags", || {
        store.list(&user.owner)
    })
    .await?;
    Ok(Json(links))
}

async fn create_trail_tags(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<Vec<TrailTagDto>>, JsonRejection>,
) -> Result<Json<BulkCreateResponse<TrailTag>>, AppError> {
    let Json(dtos) = payload?;
    let store = TrailTagStore::new(state.db.connection());
    let created = with_retry(state.retry_policy(), "create_trail_tags", || {
        store.bulk_create(&user.owner, dtos.clone())
    })
    .await?;
    Ok(Json(created.into()))
}

async fn delete_trail_tags(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<Vec<TrailTagDto>>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(dtos) = payload?;
    let store = TrailTagStore::new(state.db.connection());
    with_retry(state.retry_policy(), "delete_trail_tags", || {
        store.bulk_delete(&user.owner, dtos.clone())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_quotas(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<QuotaCounter>>, AppError> {
    let ledger = QuotaLedger::new(state.db.connection());
    let counters = with_retry(state.retry_policy(), "list_quotas", || {
        ledger.list(&user.owner)
    })
    .await?;
    Ok(Json(counters))
}

/// Create the caller's quota counters and default collection, if missing.
async fn provision(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Collection>, AppError> {
    let collection = with_retry(state.retry_policy(), "provision_account", || {
        provision_account(
            state.db.connection(),
            &user.owner,
            &state.config.engine.quota_plan,
        )
    })
    .await?;
    Ok(Json(collection))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Method;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::tests::{test_config, token_for};

    const ISSUER: &str = "https://id.trailsync.test";
    const COLLECTION: &str = "0190a1b2-c3d4-7e5f-8a9b-000000000001";

    async fn test_router() -> Router {
        let db = Database::open_in_memory().await.unwrap();
        app_router(AppState::new(Arc::new(test_config()), Arc::new(db)))
    }

    fn token() -> String {
        token_for("ann@example.com", ISSUER, 300)
    }

    async fn send(
        router: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {token}"));
        }
        let request = request
            .body(Body::from(body.unwrap_or_default().to_string()))
            .unwrap();

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create_collection(router: &Router, token: &str) -> Value {
        let body = json!([{ "id": COLLECTION, "name": "Alps", "type": "CUSTOM" }]).to_string();
        let (status, created) = send(
            router,
            Method::POST,
            "/v1/collections/_bulkCreate",
            Some(token),
            Some(&body),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        created
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn health_needs_no_token() {
        let router = test_router().await;
        let (status, body) = send(&router, Method::GET, "/healthz", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], "local");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn protected_routes_require_a_token() {
        let router = test_router().await;
        let (status, body) = send(&router, Method::GET, "/v1/quotas", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "unauthenticated");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unprovisioned_account_has_no_quota() {
        let router = test_router().await;
        let token = token();
        let body = json!([{ "id": COLLECTION, "name": "Alps", "type": "CUSTOM" }]).to_string();
        let (status, body) = send(
            &router,
            Method::POST,
            "/v1/collections/_bulkCreate",
            Some(&token),
            Some(&body),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "quota-exceeded-collections");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_update_and_sync_round_trip() {
        let router = test_router().await;
        let token = token();
        let (status, _) = send(&router, Method::POST, "/v1/account", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let created = create_collection(&router, &token).await;
        assert_eq!(created["items"][0]["version"], 1);
        assert_eq!(created["errors"], json!([]));

        let update = json!({ "id": COLLECTION, "version": 1, "name": "Alps 2026", "type": "CUSTOM" })
            .to_string();
        let uri = format!("/v1/collections/{COLLECTION}");
        let (status, updated) = send(&router, Method::PUT, &uri, Some(&token), Some(&update)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["version"], 2);

        let (status, conflict) = send(&router, Method::PUT, &uri, Some(&token), Some(&update)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(conflict["code"], "conflict");

        let known = json!([{ "id": COLLECTION, "owner": "ann@example.com", "version": 1 }]).to_string();
        let (status, diff) = send(
            &router,
            Method::POST,
            "/v1/collections/_bulkGetUpdates",
            Some(&token),
            Some(&known),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(diff["updated"][0]["name"], "Alps 2026");
        // the default collection is new to this client
        assert_eq!(diff["created"].as_array().unwrap().len(), 1);

        let ids = json!([COLLECTION]).to_string();
        let (status, _) = send(
            &router,
            Method::POST,
            "/v1/collections/_bulkDelete",
            Some(&token),
            Some(&ids),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, diff) = send(
            &router,
            Method::POST,
            "/v1/collections/_bulkGetUpdates",
            Some(&token),
            Some(&known),
        )
        .await;
        assert_eq!(diff["deleted"][0]["id"], COLLECTION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn path_id_must_match_body() {
        let router = test_router().await;
        let token = token();
        let update = json!({ "id": COLLECTION, "version": 1, "name": "x", "type": "CUSTOM" })
            .to_string();
        let (status, body) = send(
            &router,
            Method::PUT,
            "/v1/collections/0190a1b2-c3d4-7e5f-8a9b-000000000002",
            Some(&token),
            Some(&update),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid-id");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_json_is_a_bad_request() {
        let router = test_router().await;
        let token = token();
        let (status, body) = send(
            &router,
            Method::POST,
            "/v1/trails/_bulkCreate",
            Some(&token),
            Some("{not json"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "bad-request");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn quotas_list_the_callers_counters() {
        let router = test_router().await;
        let token = token();
        send(&router, Method::POST, "/v1/account", Some(&token), None).await;

        let (status, counters) = send(&router, Method::GET, "/v1/quotas", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let counters = counters.as_array().unwrap();
        assert_eq!(counters.len(), 7);
        assert_eq!(counters[0]["kind"], "collections");
        assert_eq!(counters[0]["used"], 1);
    }
}
