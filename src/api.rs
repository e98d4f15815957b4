use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::cache::CacheStatus;
use crate::classify::CategoryClassifier;
use crate::content_ideas::{ContentIdeaGenerator, GenerateIdeasRequest};
use crate::enhanced::{DiscoverRequest, EnhancedAffiliateResearchService};
use crate::error::ResearchError;
use crate::offer::PreferencesUpdate;
use crate::research::{AffiliateResearchService, SearchRequest};
use crate::store::DynStore;

pub const CACHE_HEADER: &str = "x-research-cache";
const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub research: Arc<AffiliateResearchService>,
    pub enhanced: Arc<EnhancedAffiliateResearchService>,
    pub ideas: Arc<ContentIdeaGenerator>,
    pub classifier: CategoryClassifier,
    pub store: DynStore,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/affiliate-research/search", post(search))
        .route("/api/affiliate-research/history", get(history))
        .route("/api/affiliate-research/history/{id}", get(history_item))
        .route("/api/affiliate-research/classify", post(classify))
        .route("/api/enhanced-affiliate/discover", post(discover))
        .route("/api/enhanced-affiliate/cache/stats", get(cache_stats))
        .route("/api/enhanced-affiliate/cache/clear", post(cache_clear))
        .route("/api/enhanced-affiliate/cache/clear-all", delete(cache_clear_all))
        .route(
            "/api/enhanced-affiliate/preferences/{user_id}",
            get(get_preferences).put(put_preferences),
        )
        .route("/api/content-ideas/generate", post(generate_ideas))
        .route("/api/content-ideas", get(list_ideas))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn with_cache_header<T: serde::Serialize>(status: CacheStatus, body: T) -> Response {
    (
        [(
            HeaderName::from_static(CACHE_HEADER),
            HeaderValue::from_static(status.as_header()),
        )],
        Json(body),
    )
        .into_response()
}

async fn search(
    State(state): State<AppState>,
    Json(body): Json<SearchRequest>,
) -> Result<Response, ResearchError> {
    let (resp, status) = state.research.search(body).await?;
    Ok(with_cache_header(status, resp))
}

#[derive(Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>, ResearchError> {
    let limit = q
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let user = q.user_id.as_deref().map(str::trim).filter(|u| !u.is_empty());
    let rows = state.store.list_research(user, limit).await?;
    Ok(Json(json!({ "success": true, "total": rows.len(), "data": rows })))
}

async fn history_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ResearchError> {
    let row = state.store.get_research(&id).await?;
    Ok(Json(json!({ "success": true, "data": row })))
}

#[derive(Deserialize)]
struct ClassifyReq {
    topic: String,
}

async fn classify(
    State(state): State<AppState>,
    Json(body): Json<ClassifyReq>,
) -> Result<Json<serde_json::Value>, ResearchError> {
    let topic = body.topic.trim();
    if topic.is_empty() {
        return Err(ResearchError::invalid("topic must not be empty"));
    }
    let category = state.classifier.classify(topic).await;
    Ok(Json(json!({
        "success": true,
        "category": category,
        "label": category.label(),
    })))
}

async fn discover(
    State(state): State<AppState>,
    Json(body): Json<DiscoverRequest>,
) -> Result<Response, ResearchError> {
    let (resp, status) = state.enhanced.discover(body).await?;
    Ok(with_cache_header(status, resp))
}

async fn cache_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "discover": state.enhanced.cache_stats(),
        "search": state.research.cache().stats(),
    }))
}

async fn cache_clear(
    State(state): State<AppState>,
    Json(body): Json<DiscoverRequest>,
) -> Result<Json<serde_json::Value>, ResearchError> {
    let cleared = state.enhanced.clear_cache(body)?;
    Ok(Json(json!({ "success": true, "cleared": cleared })))
}

async fn cache_clear_all(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cleared = state.enhanced.clear_all_cache() + state.research.cache().invalidate_all();
    Json(json!({ "success": true, "cleared": cleared }))
}

async fn get_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, ResearchError> {
    let prefs = state.enhanced.preferences(&user_id).await?;
    Ok(Json(json!({ "success": true, "data": prefs })))
}

async fn put_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(update): Json<PreferencesUpdate>,
) -> Result<Json<serde_json::Value>, ResearchError> {
    let prefs = state.enhanced.update_preferences(&user_id, update).await?;
    Ok(Json(json!({ "success": true, "data": prefs })))
}

async fn generate_ideas(
    State(state): State<AppState>,
    Json(body): Json<GenerateIdeasRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ResearchError> {
    let ideas = state.ideas.generate(body).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "total": ideas.len(), "data": ideas })),
    ))
}

#[derive(Deserialize)]
struct IdeasQuery {
    user_id: String,
}

async fn list_ideas(
    State(state): State<AppState>,
    Query(q): Query<IdeasQuery>,
) -> Result<Json<serde_json::Value>, ResearchError> {
    let ideas = state.ideas.list(&q.user_id).await?;
    Ok(Json(json!({ "success": true, "total": ideas.len(), "data": ideas })))
}
