use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DecayConfig;
use crate::gateway::Validation;
use crate::memory::{
    ConsolidateRequest, DecayReport, Memory, MemoryStats, MemoryStore, MemoryUpdate, Metadata,
    NewMemory, RelatedMemory, Relationship, SearchQuery, saturating_days,
};
use crate::server::ApiError;
use crate::storage::MemoryFilter;

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Memory fields for API responses
///
/// Excludes the embedding vector to keep payloads small
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryView {
    pub id: Uuid,
    pub content: String,
    pub metadata: Metadata,
    pub importance: u8,
    pub categories: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub archived: bool,
}

impl From<Memory> for MemoryView {
    fn from(memory: Memory) -> Self {
        Self {
            id: memory.id,
            content: memory.content,
            metadata: memory.metadata,
            importance: memory.importance,
            categories: memory.categories,
            created_at: memory.created_at,
            updated_at: memory.updated_at,
            expires_at: memory.expires_at,
            archived: memory.archived,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdsRequest {
    pub ids: Vec<Uuid>,
}

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub async fn store_handler(
    State(store): State<Arc<MemoryStore>>,
    Json(request): Json<NewMemory>,
) -> std::result::Result<(StatusCode, Json<IdResponse>), ApiError> {
    let id = store.store(request).await?;
    Ok((StatusCode::CREATED, Json(IdResponse { id })))
}

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    #[serde(default)]
    pub include_archived: bool,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    pub category: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub memories: Vec<MemoryView>,
    pub limit: Option<usize>,
    pub offset: usize,
}

pub async fn list_handler(
    State(store): State<Arc<MemoryStore>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<ListResponse> {
    let mut filter = MemoryFilter::new();
    if let Some(category) = query.category {
        filter = filter.with_category(category);
    }

    let memories = store
        .list(&filter, query.include_archived, query.limit, query.offset)
        .await?
        .into_iter()
        .map(MemoryView::from)
        .collect();

    Ok(Json(ListResponse {
        memories,
        limit: query.limit,
        offset: query.offset,
    }))
}

#[derive(Debug, Deserialize, Default)]
pub struct GetQuery {
    #[serde(default)]
    pub include_archived: bool,
}

pub async fn get_handler(
    State(store): State<Arc<MemoryStore>>,
    Path(id): Path<Uuid>,
    Query(query): Query<GetQuery>,
) -> ApiResult<MemoryView> {
    let memory = store.get(id, query.include_archived).await?;
    Ok(Json(memory.into()))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdatedResponse {
    pub updated: bool,
}

pub async fn update_handler(
    State(store): State<Arc<MemoryStore>>,
    Path(id): Path<Uuid>,
    Json(update): Json<MemoryUpdate>,
) -> ApiResult<UpdatedResponse> {
    let updated = store.update(id, update).await?;
    Ok(Json(UpdatedResponse { updated }))
}

pub async fn delete_handler(
    State(store): State<Arc<MemoryStore>>,
    Path(id): Path<Uuid>,
) -> ApiResult<CountResponse> {
    let count = store.delete(Some(id), &MemoryFilter::new()).await?;
    Ok(Json(CountResponse { count }))
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct DeleteRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub filter: MemoryFilter,
}

pub async fn bulk_delete_handler(
    State(store): State<Arc<MemoryStore>>,
    Json(request): Json<DeleteRequest>,
) -> ApiResult<CountResponse> {
    let count = store.delete(request.id, &request.filter).await?;
    Ok(Json(CountResponse { count }))
}

pub async fn archive_handler(
    State(store): State<Arc<MemoryStore>>,
    Json(request): Json<IdsRequest>,
) -> ApiResult<CountResponse> {
    let count = store.archive(&request.ids).await?;
    Ok(Json(CountResponse { count }))
}

pub async fn restore_handler(
    State(store): State<Arc<MemoryStore>>,
    Json(request): Json<IdsRequest>,
) -> ApiResult<CountResponse> {
    let count = store.restore(&request.ids).await?;
    Ok(Json(CountResponse { count }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResult {
    pub memory: MemoryView,
    pub score: f32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

pub async fn search_handler(
    State(store): State<Arc<MemoryStore>>,
    Json(query): Json<SearchQuery>,
) -> ApiResult<SearchResponse> {
    let results = store
        .search(query)
        .await?
        .into_iter()
        .map(|hit| SearchResult {
            memory: hit.memory.into(),
            score: hit.score,
        })
        .collect();
    Ok(Json(SearchResponse { results }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategorizeResponse {
    pub categories: BTreeMap<Uuid, BTreeSet<String>>,
}

pub async fn categorize_handler(
    State(store): State<Arc<MemoryStore>>,
    Json(request): Json<IdsRequest>,
) -> ApiResult<CategorizeResponse> {
    let categories = store.categorize(&request.ids).await?;
    Ok(Json(CategorizeResponse { categories }))
}

pub async fn consolidate_handler(
    State(store): State<Arc<MemoryStore>>,
    Json(request): Json<ConsolidateRequest>,
) -> std::result::Result<(StatusCode, Json<IdResponse>), ApiError> {
    let id = store.consolidate(request).await?;
    Ok((StatusCode::CREATED, Json(IdResponse { id })))
}

/// Decay parameters; absent fields use the store's configuration
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct DecayRequest {
    pub age_threshold_days: Option<i64>,
    pub decay_factor: Option<f64>,
    pub min_importance: Option<u8>,
    pub archive_decayed: Option<bool>,
}

impl DecayRequest {
    fn resolve(self, defaults: &DecayConfig) -> DecayConfig {
        DecayConfig {
            age_threshold_days: self
                .age_threshold_days
                .unwrap_or(defaults.age_threshold_days),
            decay_factor: self.decay_factor.unwrap_or(defaults.decay_factor),
            min_importance: self.min_importance.unwrap_or(defaults.min_importance),
            archive_decayed: self.archive_decayed.unwrap_or(defaults.archive_decayed),
        }
    }
}

pub async fn decay_handler(
    State(store): State<Arc<MemoryStore>>,
    Json(request): Json<DecayRequest>,
) -> ApiResult<DecayReport> {
    let config = request.resolve(&store.settings().decay);
    Ok(Json(store.decay(&config).await?))
}

pub async fn expire_handler(State(store): State<Arc<MemoryStore>>) -> ApiResult<CountResponse> {
    let count = store.archive_expired().await?;
    Ok(Json(CountResponse { count }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompactResponse {
    pub entries: usize,
}

pub async fn compact_handler(State(store): State<Arc<MemoryStore>>) -> ApiResult<CompactResponse> {
    let entries = store.compact().await?;
    Ok(Json(CompactResponse { entries }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LinkRequest {
    pub ids: Vec<Uuid>,
    #[serde(default)]
    pub relationship: Relationship,
    #[serde(default = "default_bidirectional")]
    pub bidirectional: bool,
}

fn default_bidirectional() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LinkResponse {
    pub created: bool,
}

pub async fn link_handler(
    State(store): State<Arc<MemoryStore>>,
    Json(request): Json<LinkRequest>,
) -> ApiResult<LinkResponse> {
    let created = store
        .link(&request.ids, request.relationship, request.bidirectional)
        .await?;
    Ok(Json(LinkResponse { created }))
}

#[derive(Debug, Deserialize)]
pub struct RelatedQuery {
    #[serde(default = "default_depth")]
    pub depth: u32,
    /// Comma-separated relationship labels
    pub relationship: Option<String>,
    #[serde(default)]
    pub include_archived: bool,
}

fn default_depth() -> u32 {
    1
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RelatedResponse {
    pub related: Vec<RelatedMemory>,
}

pub async fn related_handler(
    State(store): State<Arc<MemoryStore>>,
    Path(id): Path<Uuid>,
    Query(query): Query<RelatedQuery>,
) -> ApiResult<RelatedResponse> {
    let relationships: Option<Vec<Relationship>> = query.relationship.map(|labels| {
        labels
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(Relationship::from)
            .collect()
    });

    let related = store
        .related_memories(
            id,
            query.depth,
            relationships.as_deref(),
            query.include_archived,
        )
        .await?;
    Ok(Json(RelatedResponse { related }))
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ValidateRequest {
    #[serde(default)]
    pub context: Option<String>,
}

pub async fn validate_handler(
    State(store): State<Arc<MemoryStore>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ValidateRequest>,
) -> ApiResult<Validation> {
    let validation = store.validate(id, request.context.as_deref()).await?;
    Ok(Json(validation))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReflectRequest {
    pub ids: Vec<Uuid>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReflectResponse {
    pub insights: Vec<String>,
}

pub async fn reflect_handler(
    State(store): State<Arc<MemoryStore>>,
    Json(request): Json<ReflectRequest>,
) -> ApiResult<ReflectResponse> {
    let insights = store
        .reflect(&request.ids, request.context.as_deref())
        .await?;
    Ok(Json(ReflectResponse { insights }))
}

#[derive(Debug, Deserialize, Default)]
pub struct StatsQuery {
    /// Overrides the configured "expiring soon" window
    pub horizon_days: Option<i64>,
}

pub async fn stats_handler(
    State(store): State<Arc<MemoryStore>>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<MemoryStats> {
    let stats = store
        .stats(query.horizon_days.map(saturating_days))
        .await?;
    Ok(Json(stats))
}
