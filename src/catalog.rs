use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;

pub const POSTER_BASE: &str = "https://image.tmdb.org/t/p/w500";
/// TMDB refuses pages past this.
pub const MAX_PAGE: u32 = 500;
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Movie,
    Tv,
}

impl ContentKind {
    pub fn as_path(self) -> &'static str {
        match self {
            ContentKind::Movie => "movie",
            ContentKind::Tv => "tv",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path())
    }
}

impl FromStr for ContentKind {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "movie" => Ok(ContentKind::Movie),
            "tv" => Ok(ContentKind::Tv),
            _ => Err(anyhow!("content kind must be 'movie' or 'tv'")),
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Transport(String),
    #[error("catalog returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("invalid catalog request: {0}")]
    Validation(String),
    #[error("catalog response could not be parsed: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: i64,
    pub kind: ContentKind,
    pub title: String,
    pub release_year: Option<i32>,
    pub rating: Option<f32>,
    pub poster_path: Option<String>,
    pub overview: String,
    pub genre_ids: Vec<i64>,
}

impl CatalogItem {
    pub fn poster_url(&self) -> Option<String> {
        self.poster_path
            .as_ref()
            .map(|p| format!("{POSTER_BASE}{p}"))
    }
}

/// How a [`PageResult`] should be read. A failure is signalled by the error
/// field alone; a zero page count without an error is an empty result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    Results,
    NoResults,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub items: Vec<CatalogItem>,
    pub current_page: u32,
    pub total_pages: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageResult {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            items: Vec::new(),
            current_page: 1,
            total_pages: 0,
            error: Some(message.into()),
        }
    }

    pub fn status(&self) -> PageStatus {
        if self.error.is_some() {
            PageStatus::Failed
        } else if self.items.is_empty() {
            PageStatus::NoResults
        } else {
            PageStatus::Results
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreList {
    pub genres: Vec<Genre>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Paginated catalog queries. Implementations never fail: every problem is
/// reported through the `error` field of the returned value.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn fetch_popular(&self, kind: ContentKind, page: u32) -> PageResult;
    async fn fetch_regional(&self, kind: ContentKind, page: u32) -> PageResult;
    async fn fetch_by_genre(
        &self,
        kind: ContentKind,
        genre_id: i64,
        page: u32,
        regional: bool,
    ) -> PageResult;
    async fn search(&self, kind: ContentKind, query: &str, page: u32) -> PageResult;
    async fn fetch_genres(&self, kind: ContentKind) -> GenreList;
}

#[derive(Debug, Clone)]
pub struct TmdbCatalog {
    client: Client,
    api_key: String,
    base_url: String,
    regional_language: String,
}

impl TmdbCatalog {
    pub fn new(config: &Config) -> Result<Self> {
        let user_agent = format!("moviestream/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(config.timeout.min(Duration::from_secs(5)))
            .timeout(config.timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to build catalog HTTP client")?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            regional_language: config.regional_language.clone(),
        })
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> String {
        let mut url = format!(
            "{}/{}?api_key={}",
            self.base_url,
            path,
            urlencoding::encode(&self.api_key)
        );
        for (key, value) in params {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, CatalogError> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;
        let status = res.status();
        let text = res.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(CatalogError::Upstream {
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY),
            });
        }
        serde_json::from_str(&text).map_err(|e| CatalogError::Decode(e.to_string()))
    }

    async fn get_page(
        &self,
        kind: ContentKind,
        path: &str,
        mut params: Vec<(&str, String)>,
        page: u32,
    ) -> PageResult {
        let page = normalize_page(page);
        params.push(("page", page.to_string()));
        let url = self.url(path, &params);
        debug!(path = %path, page, "Catalog request");
        match self.get_json::<RawPage>(&url).await {
            Ok(raw) => raw.into_page(kind, page),
            Err(e) => {
                warn!("Catalog request {} (page {}) failed: {}", path, page, e);
                PageResult::failed(e.to_string())
            }
        }
    }

    fn discover_params(&self, regional: bool) -> Vec<(&'static str, String)> {
        let mut params = vec![("sort_by", "popularity.desc".to_string())];
        if regional {
            params.push(("with_original_language", self.regional_language.clone()));
        }
        params
    }
}

#[async_trait]
impl CatalogApi for TmdbCatalog {
    async fn fetch_popular(&self, kind: ContentKind, page: u32) -> PageResult {
        let path = format!("discover/{}", kind.as_path());
        self.get_page(kind, &path, self.discover_params(false), page)
            .await
    }

    async fn fetch_regional(&self, kind: ContentKind, page: u32) -> PageResult {
        let path = format!("discover/{}", kind.as_path());
        self.get_page(kind, &path, self.discover_params(true), page)
            .await
    }

    async fn fetch_by_genre(
        &self,
        kind: ContentKind,
        genre_id: i64,
        page: u32,
        regional: bool,
    ) -> PageResult {
        let path = format!("discover/{}", kind.as_path());
        let mut params = self.discover_params(regional);
        params.push(("with_genres", genre_id.to_string()));
        self.get_page(kind, &path, params, page).await
    }

    async fn search(&self, kind: ContentKind, query: &str, page: u32) -> PageResult {
        let query = query.trim();
        if query.is_empty() {
            let err = CatalogError::Validation("search query is required".to_string());
            warn!("Rejected {} search: {}", kind, err);
            return PageResult::failed(err.to_string());
        }
        let path = format!("search/{}", kind.as_path());
        self.get_page(kind, &path, vec![("query", query.to_string())], page)
            .await
    }

    async fn fetch_genres(&self, kind: ContentKind) -> GenreList {
        #[derive(Deserialize)]
        struct GenreResponse {
            #[serde(default)]
            genres: Vec<Genre>,
        }

        let path = format!("genre/{}/list", kind.as_path());
        let url = self.url(&path, &[]);
        match self.get_json::<GenreResponse>(&url).await {
            Ok(data) => GenreList {
                genres: data.genres,
                error: None,
            },
            Err(e) => {
                warn!("Failed to fetch {} genres: {}", kind, e);
                GenreList {
                    genres: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Clamps a requested page into the range the catalog accepts.
pub fn normalize_page(page: u32) -> u32 {
    page.clamp(1, MAX_PAGE)
}

fn transport_error(e: reqwest::Error) -> CatalogError {
    let timed_out = e.is_timeout();
    // Request URLs carry the API key; keep them out of messages.
    let e = e.without_url();
    if timed_out {
        CatalogError::Transport(format!("timed out: {}", e))
    } else {
        CatalogError::Transport(e.to_string())
    }
}

fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct RawPage {
    #[serde(default)]
    results: Vec<RawItem>,
    page: Option<u32>,
    total_pages: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    id: i64,
    title: Option<String>,
    name: Option<String>,
    release_date: Option<String>,
    first_air_date: Option<String>,
    vote_average: Option<f32>,
    poster_path: Option<String>,
    overview: Option<String>,
    #[serde(default)]
    genre_ids: Vec<i64>,
}

impl RawPage {
    fn into_page(self, kind: ContentKind, requested: u32) -> PageResult {
        let total_pages = self.total_pages.unwrap_or(0);
        let current_page = self
            .page
            .unwrap_or(requested)
            .clamp(1, total_pages.max(1));
        PageResult {
            items: self
                .results
                .into_iter()
                .map(|raw| raw.into_item(kind))
                .collect(),
            current_page,
            total_pages,
            error: None,
        }
    }
}

impl RawItem {
    fn into_item(self, kind: ContentKind) -> CatalogItem {
        let (title, date) = match kind {
            ContentKind::Movie => (self.title.or(self.name), self.release_date),
            ContentKind::Tv => (self.name.or(self.title), self.first_air_date),
        };
        CatalogItem {
            id: self.id,
            kind,
            title: title.unwrap_or_default(),
            release_year: date.as_deref().and_then(extract_year),
            rating: self.vote_average,
            poster_path: self.poster_path.filter(|p| !p.is_empty()),
            overview: self.overview.unwrap_or_default(),
            genre_ids: self.genre_ids,
        }
    }
}

fn extract_year(date: &str) -> Option<i32> {
    date.get(..4).and_then(|y| y.parse().ok())
}
