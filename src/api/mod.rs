use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;
use validator::Validate;

use crate::config::ServerConfig;
use crate::food::api::wire::RecipeSummary;
use crate::food::error::{MatchError, PipelineError};
use crate::food::ingredients::IngredientSet;
use crate::food::pipeline::{Pipeline, RefreshOutcome, RunOutcome, SelectionPolicy, Session};
use crate::food::types::{
    Availability, Detection, DetectionBatch, DetectorStatus, ImageUpload, PipelineResult,
    RecipeCandidate, RecipeId, RecipeSelection,
};

const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

type SessionHandle = Arc<Mutex<Session>>;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    sessions: Arc<RwLock<HashMap<Uuid, SessionHandle>>>,
    session_idle: Duration,
}

impl AppState {
    pub fn new(pipeline: Pipeline, session_idle: Duration) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            session_idle,
        }
    }

    async fn session(&self, id: Uuid) -> Result<SessionHandle, ApiError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ApiError::SessionNotFound(id))
    }

    /// Drop every session idle for longer than the configured window. Returns how many went.
    pub async fn purge_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let mut kept = HashMap::with_capacity(before);
        for (id, handle) in sessions.drain() {
            // A locked session is in use, so it is not idle.
            let idle = match handle.try_lock() {
                Ok(session) => session.is_idle(self.session_idle),
                Err(_) => false,
            };
            if !idle {
                kept.insert(id, handle);
            }
        }
        *sessions = kept;
        before - sessions.len()
    }
}

/// Periodically purge idle sessions for as long as the server runs.
pub fn spawn_session_reaper(state: AppState) -> tokio::task::JoinHandle<()> {
    let period = (state.session_idle / 2).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let purged = state.purge_idle().await;
            if purged > 0 {
                info!("Purged {} idle session(s)", purged);
            }
        }
    })
}

#[derive(Debug)]
pub enum ApiError {
    SessionNotFound(Uuid),
    BadRequest(String),
    Unavailable(String),
    Pipeline(PipelineError),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Pipeline(e)
    }
}

#[derive(Serialize)]
struct ApiResponse {
    status: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::SessionNotFound(id) => (StatusCode::NOT_FOUND, format!("Session {} not found", id)),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Unavailable(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
            ApiError::Pipeline(e) => {
                let status = match &e {
                    PipelineError::Detection(_) | PipelineError::Match(MatchError::Malformed(_)) => {
                        StatusCode::BAD_GATEWAY
                    }
                    PipelineError::Match(_) => StatusCode::BAD_REQUEST,
                    PipelineError::NoCandidates | PipelineError::StaleCandidates => StatusCode::CONFLICT,
                    PipelineError::UnknownRecipe(_) => StatusCode::NOT_FOUND,
                };
                if status == StatusCode::BAD_GATEWAY {
                    warn!("Upstream protocol error: {}", e);
                }
                (status, e.to_string())
            }
        };
        (status, Json(ApiResponse { status: message })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Serialize)]
pub struct SessionView {
    id: Uuid,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
    ingredients: IngredientSet,
    candidates: Vec<RecipeCandidate>,
    selection: Option<RecipeSelection>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id(),
            created_at: session.created_at(),
            last_active: session.last_active(),
            ingredients: session.ingredients().clone(),
            candidates: session.candidates().to_vec(),
            selection: session.selection().cloned(),
        }
    }
}

#[derive(Serialize)]
pub struct BatchView {
    index: usize,
    image_name: String,
    status: DetectorStatus,
    detections: Vec<Detection>,
    /// Base64 of the annotated image.
    annotated_image: Option<String>,
    annotated_format: Option<String>,
}

impl From<&DetectionBatch> for BatchView {
    fn from(batch: &DetectionBatch) -> Self {
        Self {
            index: batch.index,
            image_name: batch.image_name.clone(),
            status: batch.status.clone(),
            detections: batch.detections.clone(),
            annotated_image: batch.annotated_image.as_deref().map(|bytes| STANDARD.encode(bytes)),
            annotated_format: batch
                .annotated_format()
                .and_then(|format| format.extensions_str().first())
                .map(|ext| ext.to_string()),
        }
    }
}

#[derive(Deserialize, Validate)]
pub struct IngredientsRequest {
    #[validate(length(min = 1, max = 1000))]
    text: String,
}

#[derive(Serialize)]
pub struct IngredientsResponse {
    added: usize,
    ingredients: IngredientSet,
}

#[derive(Deserialize, Serialize)]
pub struct ImagePayload {
    name: Option<String>,
    /// Base64 of the raw image file.
    data: String,
}

#[derive(Deserialize, Validate)]
pub struct ImagesRequest {
    #[validate(length(min = 1, max = 10))]
    images: Vec<ImagePayload>,
}

#[derive(Serialize)]
pub struct ImagesResponse {
    batches: Vec<BatchView>,
    ingredients: IngredientSet,
}

/// Selection by id, by title, or the top candidate when neither is given.
#[derive(Deserialize, Default)]
pub struct SelectRequest {
    recipe_id: Option<i64>,
    title: Option<String>,
}

impl SelectRequest {
    fn policy(self, default: SelectionPolicy) -> SelectionPolicy {
        match (self.recipe_id, self.title) {
            (Some(id), _) => SelectionPolicy::Id(RecipeId(id)),
            (None, Some(title)) => SelectionPolicy::Title(title),
            (None, None) => default,
        }
    }
}

#[derive(Serialize)]
pub struct CookResponse {
    #[serde(flatten)]
    outcome: RefreshOutcome,
    result: Option<PipelineResult>,
}

#[derive(Serialize)]
pub struct SummaryResponse {
    id: RecipeId,
    title: String,
    summary: String,
    text: String,
}

impl From<RecipeSummary> for SummaryResponse {
    fn from(summary: RecipeSummary) -> Self {
        Self {
            text: summary.plain_text(),
            id: summary.id,
            title: summary.title,
            summary: summary.summary,
        }
    }
}

/// Create and configure the API router
pub fn create_api(state: AppState, config: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_check))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route(
            "/sessions/:id/ingredients",
            post(add_ingredients).delete(clear_ingredients),
        )
        .route("/sessions/:id/images", post(submit_images))
        .route("/sessions/:id/cook", post(cook))
        .route("/sessions/:id/select", post(select_recipe))
        .route("/recipes/:id/summary", get(recipe_summary))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(ConcurrencyLimitLayer::new(config.concurrency_limit))
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> Json<ApiResponse> {
    Json(ApiResponse {
        status: "Server is running and healthy".to_string(),
    })
}

async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionView>) {
    let session = Session::new();
    let view = SessionView::from(&session);
    state
        .sessions
        .write()
        .await
        .insert(session.id(), Arc::new(Mutex::new(session)));
    info!("Created session {}", view.id);
    (StatusCode::CREATED, Json(view))
}

async fn get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SessionView> {
    let handle = state.session(id).await?;
    let session = handle.lock().await;
    Ok(Json(SessionView::from(&*session)))
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .write()
        .await
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(ApiError::SessionNotFound(id))
}

async fn add_ingredients(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<IngredientsRequest>,
) -> ApiResult<IngredientsResponse> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let handle = state.session(id).await?;
    let mut session = handle.lock().await;
    let added = state.pipeline.submit_text(&mut session, &request.text);
    Ok(Json(IngredientsResponse {
        added,
        ingredients: session.ingredients().clone(),
    }))
}

async fn clear_ingredients(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<SessionView> {
    let handle = state.session(id).await?;
    let mut session = handle.lock().await;
    state.pipeline.clear(&mut session);
    Ok(Json(SessionView::from(&*session)))
}

async fn submit_images(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ImagesRequest>,
) -> ApiResult<ImagesResponse> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let uploads = request
        .images
        .into_iter()
        .enumerate()
        .map(|(index, image)| {
            let name = image
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("image-{}", index + 1));
            STANDARD
                .decode(image.data.trim())
                .map(|bytes| ImageUpload::new(name.clone(), bytes))
                .map_err(|e| ApiError::BadRequest(format!("{} is not valid base64: {}", name, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let handle = state.session(id).await?;
    let mut session = handle.lock().await;
    let batches = state.pipeline.submit_images(&mut session, &uploads).await?;
    Ok(Json(ImagesResponse {
        batches: batches.iter().map(BatchView::from).collect(),
        ingredients: session.ingredients().clone(),
    }))
}

async fn cook(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    request: Option<Json<SelectRequest>>,
) -> ApiResult<CookResponse> {
    let policy = request
        .map(|Json(r)| r)
        .unwrap_or_default()
        .policy(SelectionPolicy::FirstByTitle);
    let handle = state.session(id).await?;
    let mut session = handle.lock().await;

    let (outcome, result) = match state.pipeline.run(&mut session, &policy).await? {
        RunOutcome::Ready(result) => (
            RefreshOutcome::Matched {
                candidates: result.candidates.len(),
            },
            Some(result),
        ),
        RunOutcome::Unchanged => {
            let result = session.selection().cloned().map(|selection| PipelineResult {
                ingredients: session.ingredients().clone(),
                candidates: session.candidates().to_vec(),
                selection,
            });
            let candidates = session.candidates().len();
            (RefreshOutcome::Unchanged { candidates }, result)
        }
        RunOutcome::NoIngredients => (RefreshOutcome::NoIngredients, None),
        RunOutcome::NoRecipe => (RefreshOutcome::NoRecipe, None),
        RunOutcome::CatalogUnavailable(reason) => (RefreshOutcome::CatalogUnavailable { reason }, None),
    };
    Ok(Json(CookResponse { outcome, result }))
}

async fn select_recipe(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SelectRequest>,
) -> ApiResult<PipelineResult> {
    let handle = state.session(id).await?;
    let mut session = handle.lock().await;
    let policy = request.policy(SelectionPolicy::Top);
    Ok(Json(state.pipeline.select(&mut session, &policy).await?))
}

async fn recipe_summary(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<SummaryResponse> {
    match state.pipeline.instructions(RecipeId(id)).await? {
        Availability::Available(summary) => Ok(Json(SummaryResponse::from(summary))),
        Availability::Unavailable(reason) => Err(ApiError::Unavailable(reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::food::matcher::tests::{row, FakeCatalog};
    use crate::food::pipeline::tests::pipeline;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(catalog: Arc<FakeCatalog>) -> (Router, AppState) {
        let state = AppState::new(pipeline(catalog), Duration::from_secs(60));
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        (create_api(state.clone(), &config), state)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn new_session(app: &Router) -> String {
        let (status, body) = call(app, Method::POST, "/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    fn cake_catalog() -> Arc<FakeCatalog> {
        Arc::new(FakeCatalog::new(vec![
            Ok(vec![row(1, "Apple Cake", &["apple"], &["flour"], &["banana"])]),
            Ok(vec![row(2, "Banana Bread", &["banana"], &["flour"], &[])]),
        ]))
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(cake_catalog());
        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["status"].as_str().unwrap().contains("healthy"));
    }

    #[tokio::test]
    async fn test_cook_flow() {
        let catalog = cake_catalog();
        let (app, _) = app(catalog.clone());
        let id = new_session(&app).await;

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/sessions/{}/ingredients", id),
            Some(json!({"text": "Apple, banana"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["added"], 2);
        assert_eq!(body["ingredients"], json!(["apple", "banana"]));

        let (status, body) = call(&app, Method::POST, &format!("/sessions/{}/cook", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "matched");
        let selection = &body["result"]["selection"];
        assert_eq!(selection["recipe"]["title"], "Apple Cake");
        assert_eq!(selection["recipe"]["missed"], json!(["flour"]));
        assert_eq!(selection["leftover"]["kind"], "recipe");
        assert_eq!(selection["leftover"]["value"]["title"], "Banana Bread");

        // same set again: served from the session
        let (_, body) = call(&app, Method::POST, &format!("/sessions/{}/cook", id), None).await;
        assert_eq!(body["outcome"], "unchanged");
        assert_eq!(body["result"]["selection"]["recipe"]["id"], 1);
        assert_eq!(catalog.calls(), 2);
    }

    #[tokio::test]
    async fn test_images_are_decoded_and_merged() {
        let (app, _) = app(cake_catalog());
        let id = new_session(&app).await;
        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/sessions/{}/images", id),
            Some(json!({"images": [
                {"name": "fridge.jpg", "data": STANDARD.encode([1u8])},
                {"data": STANDARD.encode([0u8])}
            ]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["batches"][0]["detections"][0]["label"], "Apple");
        assert_eq!(body["batches"][1]["image_name"], "image-2");
        assert_eq!(body["batches"][1]["annotated_image"], Value::Null);
        assert_eq!(body["ingredients"], json!(["apple"]));
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let (app, _) = app(cake_catalog());
        let id = new_session(&app).await;

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/sessions/{}/ingredients", id),
            Some(json!({"text": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/sessions/{}/images", id),
            Some(json!({"images": [{"data": "%%%"}]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/sessions/{}/select", id),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&app, Method::GET, &format!("/sessions/{}", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_select_after_ingredients_change_conflicts() {
        let (app, _) = app(cake_catalog());
        let id = new_session(&app).await;
        let ingredients = format!("/sessions/{}/ingredients", id);
        call(&app, Method::POST, &ingredients, Some(json!({"text": "apple, banana"}))).await;
        let (_, body) = call(&app, Method::POST, &format!("/sessions/{}/cook", id), None).await;
        assert_eq!(body["outcome"], "matched");

        call(&app, Method::POST, &ingredients, Some(json!({"text": "pear"}))).await;
        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/sessions/{}/select", id),
            Some(json!({"recipe_id": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["status"].as_str().unwrap().contains("Ingredients changed"));
    }

    #[tokio::test]
    async fn test_too_many_images_rejected() {
        let (app, _) = app(cake_catalog());
        let id = new_session(&app).await;
        let images: Vec<Value> = (0..11).map(|_| json!({"data": STANDARD.encode([1u8])})).collect();
        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/sessions/{}/images", id),
            Some(json!({ "images": images })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_empty_cook_and_delete() {
        let (app, _) = app(cake_catalog());
        let id = new_session(&app).await;
        let (_, body) = call(&app, Method::POST, &format!("/sessions/{}/cook", id), None).await;
        assert_eq!(body["outcome"], "no_ingredients");
        assert_eq!(body["result"], Value::Null);

        let (status, _) = call(&app, Method::DELETE, &format!("/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, Method::DELETE, &format!("/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_summary_route() {
        let (app, _) = app(cake_catalog());
        let (status, body) = call(&app, Method::GET, "/recipes/7/summary", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "Bake it.");
    }

    #[tokio::test]
    async fn test_purge_idle_sessions() {
        let state = AppState::new(pipeline(cake_catalog()), Duration::ZERO);
        let config = ServerConfig::from_lookup(|_| None).unwrap();
        let app = create_api(state.clone(), &config);
        new_session(&app).await;
        new_session(&app).await;
        assert_eq!(state.purge_idle().await, 2);
        assert!(state.sessions.read().await.is_empty());
    }
}
