use crate::aggregator::{GenreFamily, SectionAggregator, SectionId, Settled};
use crate::catalog::{CatalogApi, ContentKind, PageResult, PageStatus, TmdbCatalog};
use crate::config::Config;
use crate::embed::{self, EpisodeRef, StreamServer};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogApi>,
    pub aggregator: Arc<SectionAggregator>,
}

impl AppState {
    pub fn new(catalog: Arc<dyn CatalogApi>) -> Self {
        let aggregator = Arc::new(SectionAggregator::new(catalog.clone()));
        Self {
            catalog,
            aggregator,
        }
    }
}

pub async fn run_server(config: Config) -> Result<()> {
    let catalog: Arc<dyn CatalogApi> = Arc::new(TmdbCatalog::new(&config)?);
    info!(
        "Using catalog at {} (regional language '{}')",
        config.base_url, config.regional_language
    );
    let state = AppState::new(catalog);

    // A failed warm-up only leaves sections empty; they stay retryable.
    state.aggregator.initialize().await;

    let app = build_router(state);

    info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/movies/popular", get(popular_movies))
        .route("/api/tv/popular", get(popular_tv))
        .route("/api/movies/bollywood", get(regional_movies))
        .route("/api/tv/bollywood", get(regional_tv))
        .route("/api/movies/genre", get(movies_by_genre))
        .route("/api/tv/genre", get(tv_by_genre))
        .route("/api/search", get(search_proxy).post(search).delete(clear_search))
        .route("/api/genres", get(genres))
        .route("/api/embed", get(embed_links))
        .route("/api/initialize", post(initialize))
        .route("/api/sections", get(sections))
        .route("/api/sections/:name", get(section))
        .route("/api/sections/:name/page", post(change_page))
        .route("/api/sections/:name/retry", post(retry))
        .route("/api/sections/:name/genre", post(select_genre))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
struct PageParams {
    page: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenreParams {
    genre_id: Option<String>,
    bollywood: Option<String>,
    page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KindParams {
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedParams {
    id: Option<i64>,
    #[serde(rename = "type")]
    kind: Option<String>,
    season: Option<u32>,
    episode: Option<u32>,
    server: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageBody {
    page: u32,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    query: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenreBody {
    genre_id: i64,
}

/// Page numbers arrive as free text; anything unusable means page 1.
fn parse_page(raw: Option<&str>) -> u32 {
    raw.and_then(|p| p.trim().parse::<u32>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1)
}

fn parse_kind(raw: Option<&str>) -> Result<ContentKind, Response> {
    match raw {
        None => Ok(ContentKind::Movie),
        Some(value) => value
            .parse()
            .map_err(|e: anyhow::Error| bad_request(&e.to_string())),
    }
}

fn bad_request(message: &str) -> Response {
    warn!("Rejecting request: {}", message);
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn page_response(result: PageResult) -> Response {
    let status = match result.status() {
        PageStatus::Failed => StatusCode::BAD_GATEWAY,
        PageStatus::Results | PageStatus::NoResults => StatusCode::OK,
    };
    (status, Json(result)).into_response()
}

fn section_from_path(name: &str) -> Result<SectionId, Response> {
    name.parse().map_err(|e: anyhow::Error| {
        (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response()
    })
}

async fn popular_movies(State(state): State<AppState>, Query(q): Query<PageParams>) -> Response {
    let page = parse_page(q.page.as_deref());
    page_response(state.catalog.fetch_popular(ContentKind::Movie, page).await)
}

async fn popular_tv(State(state): State<AppState>, Query(q): Query<PageParams>) -> Response {
    let page = parse_page(q.page.as_deref());
    page_response(state.catalog.fetch_popular(ContentKind::Tv, page).await)
}

async fn regional_movies(State(state): State<AppState>, Query(q): Query<PageParams>) -> Response {
    let page = parse_page(q.page.as_deref());
    page_response(state.catalog.fetch_regional(ContentKind::Movie, page).await)
}

async fn regional_tv(State(state): State<AppState>, Query(q): Query<PageParams>) -> Response {
    let page = parse_page(q.page.as_deref());
    page_response(state.catalog.fetch_regional(ContentKind::Tv, page).await)
}

async fn movies_by_genre(State(state): State<AppState>, Query(q): Query<GenreParams>) -> Response {
    by_genre(&state, ContentKind::Movie, q).await
}

async fn tv_by_genre(State(state): State<AppState>, Query(q): Query<GenreParams>) -> Response {
    by_genre(&state, ContentKind::Tv, q).await
}

async fn by_genre(state: &AppState, kind: ContentKind, q: GenreParams) -> Response {
    let Some(genre_id) = q
        .genre_id
        .as_deref()
        .and_then(|g| g.trim().parse::<i64>().ok())
    else {
        return bad_request("Genre ID is required");
    };
    let regional = q.bollywood.as_deref() == Some("true");
    let page = parse_page(q.page.as_deref());
    page_response(
        state
            .catalog
            .fetch_by_genre(kind, genre_id, page, regional)
            .await,
    )
}

async fn search_proxy(State(state): State<AppState>, Query(q): Query<SearchParams>) -> Response {
    let query = q.query.unwrap_or_default();
    if query.trim().is_empty() {
        return bad_request("Search query is required");
    }
    let kind = match parse_kind(q.kind.as_deref()) {
        Ok(kind) => kind,
        Err(res) => return res,
    };
    let page = parse_page(q.page.as_deref());
    page_response(state.catalog.search(kind, &query, page).await)
}

async fn genres(State(state): State<AppState>, Query(q): Query<KindParams>) -> Response {
    let kind = match parse_kind(q.kind.as_deref()) {
        Ok(kind) => kind,
        Err(res) => return res,
    };
    let list = state.aggregator.genres(kind).await;
    let status = if list.error.is_some() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };
    (status, Json(list)).into_response()
}

async fn embed_links(Query(q): Query<EmbedParams>) -> Response {
    let Some(id) = q.id else {
        return bad_request("Content ID is required");
    };
    let kind = match parse_kind(q.kind.as_deref()) {
        Ok(kind) => kind,
        Err(res) => return res,
    };
    let episode = match (q.season, q.episode) {
        (Some(season), Some(episode)) => Some(EpisodeRef { season, episode }),
        _ => None,
    };
    match q.server.as_deref() {
        None => Json(embed::embed_links(id, kind, episode)).into_response(),
        Some(raw) => match raw.parse::<StreamServer>() {
            Ok(server) => Json(json!({
                "server": server,
                "label": server.label(),
                "url": embed::embed_url(server, id, kind, episode),
            }))
            .into_response(),
            Err(e) => bad_request(&e.to_string()),
        },
    }
}

async fn initialize(State(state): State<AppState>) -> Response {
    state.aggregator.initialize().await;
    Json(state.aggregator.snapshot().await).into_response()
}

async fn sections(State(state): State<AppState>) -> Response {
    Json(state.aggregator.snapshot().await).into_response()
}

async fn section(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let id = match section_from_path(&name) {
        Ok(id) => id,
        Err(res) => return res,
    };
    Json(state.aggregator.section(id).await).into_response()
}

async fn change_page(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<PageBody>,
) -> Response {
    let id = match section_from_path(&name) {
        Ok(id) => id,
        Err(res) => return res,
    };
    let outcome = state.aggregator.change_page(id, body.page).await;
    section_outcome(&state, id, outcome).await
}

async fn retry(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let id = match section_from_path(&name) {
        Ok(id) => id,
        Err(res) => return res,
    };
    let outcome = state.aggregator.retry(id).await;
    section_outcome(&state, id, outcome).await
}

async fn select_genre(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<GenreBody>,
) -> Response {
    let id = match section_from_path(&name) {
        Ok(id) => id,
        Err(res) => return res,
    };
    let Some(family) = GenreFamily::from_section(id) else {
        return bad_request("Genre filters apply to home sections only");
    };
    let outcome = state.aggregator.select_genre(family, body.genre_id).await;
    section_outcome(&state, id, outcome).await
}

async fn search(State(state): State<AppState>, Json(body): Json<SearchBody>) -> Response {
    state.aggregator.search(&body.query).await;
    Json(state.aggregator.snapshot().await).into_response()
}

async fn clear_search(State(state): State<AppState>) -> Response {
    state.aggregator.clear_search().await;
    Json(state.aggregator.snapshot().await).into_response()
}

/// The section as it stands after the operation. A failed fetch still
/// answers 200: the failure is part of the section state the UI renders.
async fn section_outcome(state: &AppState, id: SectionId, outcome: Settled) -> Response {
    let view = state.aggregator.section(id).await;
    let status = match outcome {
        Settled::Superseded => StatusCode::ACCEPTED,
        Settled::Loaded | Settled::Failed | Settled::Skipped => StatusCode::OK,
    };
    (status, Json(view)).into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
