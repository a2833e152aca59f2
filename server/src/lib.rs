use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use gramsearch_core::{
    Index, PostingStore, SearchError, Snippet, StoreError, DEFAULT_CONTEXT_LENGTH,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}
fn default_limit() -> usize {
    10
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: String,
    pub score: f64,
    pub offset_start: usize,
    pub offset_end: usize,
    pub snippet: Option<Snippet>,
}

#[derive(Deserialize)]
pub struct IndexRequest {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

#[derive(Serialize)]
pub struct IndexResponse {
    pub doc_id: String,
    pub indexed: bool,
}

#[derive(Deserialize)]
pub struct SnippetParams {
    pub doc_id: String,
    pub start: usize,
    pub end: usize,
    #[serde(default = "default_context")]
    pub context: usize,
}
fn default_context() -> usize {
    DEFAULT_CONTEXT_LENGTH
}

pub fn build_app<S: PostingStore + 'static>(index: Index<S>) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods(Any)
                    .allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/documents", post(index_handler::<S>))
        .route("/search", get(search_handler::<S>))
        .route("/snippet", get(snippet_handler::<S>))
        .with_state(Arc::new(index))
        .layer(cors)
}

pub async fn index_handler<S: PostingStore + 'static>(
    State(index): State<Arc<Index<S>>>,
    Json(req): Json<IndexRequest>,
) -> Result<Json<IndexResponse>, (StatusCode, String)> {
    index
        .index_document(&req.id, &req.meta, &req.text)
        .map_err(error_response)?;
    Ok(Json(IndexResponse {
        doc_id: req.id,
        indexed: true,
    }))
}

pub async fn search_handler<S: PostingStore + 'static>(
    State(index): State<Arc<Index<S>>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    let sequences = index.search_phrase(&params.q).map_err(error_response)?;
    let total_hits = sequences.len();

    let limit = params.limit.max(1).min(100);
    let results: Vec<SearchHit> = sequences
        .into_iter()
        .take(limit)
        .map(|hit| {
            let snippet = index
                .get_snippet(&hit.doc_id, hit.offset_start, hit.offset_end, DEFAULT_CONTEXT_LENGTH)
                .ok();
            SearchHit {
                doc_id: hit.doc_id,
                score: hit.score,
                offset_start: hit.offset_start,
                offset_end: hit.offset_end,
                snippet,
            }
        })
        .collect();

    Ok(Json(SearchResponse {
        query: params.q,
        took_s: start.elapsed().as_secs_f64(),
        total_hits,
        results,
    }))
}

pub async fn snippet_handler<S: PostingStore + 'static>(
    State(index): State<Arc<Index<S>>>,
    Query(params): Query<SnippetParams>,
) -> Result<Json<Snippet>, (StatusCode, String)> {
    let snippet = index
        .get_snippet(&params.doc_id, params.start, params.end, params.context)
        .map_err(error_response)?;
    Ok(Json(snippet))
}

fn error_response(err: SearchError) -> (StatusCode, String) {
    let status = match &err {
        SearchError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
        SearchError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}
