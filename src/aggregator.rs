//! Section state for the catalog browser.
//!
//! The aggregator owns one record per [`SectionId`] and is the only writer of
//! them. Every fetch is issued under a ticket carrying the section's
//! generation at issue time; when the fetch settles, its result is applied
//! only if no newer ticket was issued for that section in the meantime.
//! Requests are never cancelled, superseded results are simply dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogApi, CatalogItem, ContentKind, GenreList, PageResult};
use crate::pager::PagerView;

pub const INITIAL_LOAD_WARNING: &str = "Some content failed to load. Please refresh the page.";
pub const SEARCH_WARNING: &str = "Search failed. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionId {
    #[serde(rename = "movies")]
    Movies,
    #[serde(rename = "tv")]
    Tv,
    #[serde(rename = "bollywoodMovies")]
    RegionalMovies,
    #[serde(rename = "bollywoodTV")]
    RegionalTv,
    #[serde(rename = "searchMovies")]
    SearchMovies,
    #[serde(rename = "searchTV")]
    SearchTv,
}

impl SectionId {
    pub const ALL: [SectionId; 6] = [
        SectionId::Movies,
        SectionId::Tv,
        SectionId::RegionalMovies,
        SectionId::RegionalTv,
        SectionId::SearchMovies,
        SectionId::SearchTv,
    ];
    pub const HOME: [SectionId; 4] = [
        SectionId::Movies,
        SectionId::Tv,
        SectionId::RegionalMovies,
        SectionId::RegionalTv,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SectionId::Movies => "movies",
            SectionId::Tv => "tv",
            SectionId::RegionalMovies => "bollywoodMovies",
            SectionId::RegionalTv => "bollywoodTV",
            SectionId::SearchMovies => "searchMovies",
            SectionId::SearchTv => "searchTV",
        }
    }

    pub fn kind(self) -> ContentKind {
        match self {
            SectionId::Movies | SectionId::RegionalMovies | SectionId::SearchMovies => {
                ContentKind::Movie
            }
            SectionId::Tv | SectionId::RegionalTv | SectionId::SearchTv => ContentKind::Tv,
        }
    }

    pub fn is_search(self) -> bool {
        matches!(self, SectionId::SearchMovies | SectionId::SearchTv)
    }

    pub fn is_regional(self) -> bool {
        matches!(self, SectionId::RegionalMovies | SectionId::RegionalTv)
    }

    fn index(self) -> usize {
        match self {
            SectionId::Movies => 0,
            SectionId::Tv => 1,
            SectionId::RegionalMovies => 2,
            SectionId::RegionalTv => 3,
            SectionId::SearchMovies => 4,
            SectionId::SearchTv => 5,
        }
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionId {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        let id = match s {
            "movies" => SectionId::Movies,
            "tv" => SectionId::Tv,
            "bollywoodMovies" | "bollywood-movies" => SectionId::RegionalMovies,
            "bollywoodTV" | "bollywood-tv" => SectionId::RegionalTv,
            "searchMovies" => SectionId::SearchMovies,
            "searchTV" => SectionId::SearchTv,
            _ => return Err(anyhow::anyhow!("unknown section '{}'", s)),
        };
        Ok(id)
    }
}

/// The home sections a genre filter can be applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenreFamily {
    Movie,
    Tv,
    BollywoodMovie,
    BollywoodTv,
}

impl GenreFamily {
    pub fn section(self) -> SectionId {
        match self {
            GenreFamily::Movie => SectionId::Movies,
            GenreFamily::Tv => SectionId::Tv,
            GenreFamily::BollywoodMovie => SectionId::RegionalMovies,
            GenreFamily::BollywoodTv => SectionId::RegionalTv,
        }
    }

    pub fn from_section(id: SectionId) -> Option<Self> {
        match id {
            SectionId::Movies => Some(GenreFamily::Movie),
            SectionId::Tv => Some(GenreFamily::Tv),
            SectionId::RegionalMovies => Some(GenreFamily::BollywoodMovie),
            SectionId::RegionalTv => Some(GenreFamily::BollywoodTv),
            SectionId::SearchMovies | SectionId::SearchTv => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionStatus {
    Empty,
    Loading,
    Loaded,
    Failed,
}

/// How an operation ended for the section(s) it touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Loaded,
    Failed,
    /// A newer request for the section was issued before this one finished.
    Superseded,
    /// Nothing was issued.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionView {
    pub name: SectionId,
    pub items: Vec<CatalogItem>,
    pub current_page: u32,
    pub total_pages: u32,
    pub is_loading: bool,
    pub status: SectionStatus,
    pub warning: Option<String>,
    pub genre_id: Option<i64>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pager: PagerView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogView {
    pub sections: Vec<SectionView>,
    pub query: Option<String>,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Fetch {
    Popular {
        kind: ContentKind,
        page: u32,
    },
    Regional {
        kind: ContentKind,
        page: u32,
    },
    Genre {
        kind: ContentKind,
        genre_id: i64,
        regional: bool,
        page: u32,
    },
    Search {
        kind: ContentKind,
        query: String,
        page: u32,
    },
}

impl Fetch {
    fn base(id: SectionId, page: u32) -> Self {
        if id.is_regional() {
            Fetch::Regional {
                kind: id.kind(),
                page,
            }
        } else {
            Fetch::Popular {
                kind: id.kind(),
                page,
            }
        }
    }

    async fn run(&self, catalog: &dyn CatalogApi) -> PageResult {
        match self {
            Fetch::Popular { kind, page } => catalog.fetch_popular(*kind, *page).await,
            Fetch::Regional { kind, page } => catalog.fetch_regional(*kind, *page).await,
            Fetch::Genre {
                kind,
                genre_id,
                regional,
                page,
            } => {
                catalog
                    .fetch_by_genre(*kind, *genre_id, *page, *regional)
                    .await
            }
            Fetch::Search { kind, query, page } => catalog.search(*kind, query, *page).await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GenreFilter {
    genre_id: i64,
    /// Page of the unfiltered view to return to when the filter is dropped.
    base_page: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnFailure {
    KeepItems,
    ClearItems,
}

/// What a settled request does to the section's genre filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterChange {
    Keep,
    /// Committed only when the fetch succeeds.
    Set(Option<GenreFilter>),
}

#[derive(Debug, Clone, PartialEq)]
struct Request {
    fetch: Fetch,
    filter: FilterChange,
}

impl From<Fetch> for Request {
    fn from(fetch: Fetch) -> Self {
        Self {
            fetch,
            filter: FilterChange::Keep,
        }
    }
}

#[derive(Debug, Clone)]
struct Ticket {
    section: SectionId,
    generation: u64,
    request: Request,
}

#[derive(Debug, Clone)]
struct Section {
    id: SectionId,
    items: Vec<CatalogItem>,
    current_page: u32,
    total_pages: u32,
    status: SectionStatus,
    warning: Option<String>,
    /// Filter behind the items on show.
    filter: Option<GenreFilter>,
    /// Filter of the newest genre selection, settled or not.
    requested: Option<GenreFilter>,
    generation: u64,
    last_request: Option<Request>,
    updated_at: Option<DateTime<Utc>>,
}

impl Section {
    fn new(id: SectionId) -> Self {
        Self {
            id,
            items: Vec::new(),
            current_page: 1,
            total_pages: 0,
            status: SectionStatus::Empty,
            warning: None,
            filter: None,
            requested: None,
            generation: 0,
            last_request: None,
            updated_at: None,
        }
    }

    fn fetch_for_page(&self, page: u32, query: Option<&str>) -> Option<Fetch> {
        let kind = self.id.kind();
        if self.id.is_search() {
            return query.map(|q| Fetch::Search {
                kind,
                query: q.to_string(),
                page,
            });
        }
        Some(match self.filter {
            Some(filter) => Fetch::Genre {
                kind,
                genre_id: filter.genre_id,
                regional: self.id.is_regional(),
                page,
            },
            None => Fetch::base(self.id, page),
        })
    }

    fn reset(&mut self) {
        let generation = self.generation + 1;
        *self = Section::new(self.id);
        self.generation = generation;
    }

    fn view(&self) -> SectionView {
        SectionView {
            name: self.id,
            items: self.items.clone(),
            current_page: self.current_page,
            total_pages: self.total_pages,
            is_loading: self.status == SectionStatus::Loading,
            status: self.status,
            warning: self.warning.clone(),
            genre_id: self.filter.map(|f| f.genre_id),
            updated_at: self.updated_at,
            pager: PagerView::new(self.current_page, self.total_pages),
        }
    }
}

#[derive(Debug)]
struct Board {
    sections: Vec<Section>,
    query: Option<String>,
    warning: Option<String>,
}

impl Board {
    fn new() -> Self {
        Self {
            sections: SectionId::ALL.iter().map(|&id| Section::new(id)).collect(),
            query: None,
            warning: None,
        }
    }

    fn section(&self, id: SectionId) -> &Section {
        &self.sections[id.index()]
    }

    fn section_mut(&mut self, id: SectionId) -> &mut Section {
        &mut self.sections[id.index()]
    }

    fn issue(&mut self, id: SectionId, request: impl Into<Request>) -> Ticket {
        let request = request.into();
        let section = self.section_mut(id);
        section.generation += 1;
        section.status = SectionStatus::Loading;
        if let FilterChange::Set(filter) = request.filter {
            section.requested = filter;
        }
        section.last_request = Some(request.clone());
        debug!(section = %id, generation = section.generation, fetch = ?request.fetch, "Issued fetch");
        Ticket {
            section: id,
            generation: section.generation,
            request,
        }
    }

    fn is_current(&self, ticket: &Ticket) -> bool {
        self.section(ticket.section).generation == ticket.generation
    }

    fn apply(&mut self, ticket: &Ticket, result: PageResult, on_failure: OnFailure) -> Settled {
        let section = self.section_mut(ticket.section);
        if section.generation != ticket.generation {
            debug!(
                section = %ticket.section,
                stale = ticket.generation,
                current = section.generation,
                "Discarding superseded result"
            );
            return Settled::Superseded;
        }
        section.updated_at = Some(Utc::now());
        let outcome = match result.error {
            Some(err) => {
                warn!("Section {} failed to load: {}", ticket.section, err);
                section.status = SectionStatus::Failed;
                section.warning = Some(err);
                if on_failure == OnFailure::ClearItems {
                    section.items.clear();
                    section.current_page = 1;
                    section.total_pages = 0;
                }
                Settled::Failed
            }
            None => {
                section.current_page = result.current_page.clamp(1, result.total_pages.max(1));
                section.total_pages = result.total_pages;
                section.items = result.items;
                section.status = SectionStatus::Loaded;
                section.warning = None;
                if let FilterChange::Set(filter) = ticket.request.filter {
                    section.filter = filter;
                }
                Settled::Loaded
            }
        };
        section.requested = section.filter;
        outcome
    }
}

pub struct SectionAggregator {
    catalog: Arc<dyn CatalogApi>,
    board: Arc<Mutex<Board>>,
}

impl SectionAggregator {
    pub fn new(catalog: Arc<dyn CatalogApi>) -> Self {
        Self {
            catalog,
            board: Arc::new(Mutex::new(Board::new())),
        }
    }

    /// Loads the first page of every home section concurrently. One failing
    /// section never holds back the others.
    pub async fn initialize(&self) {
        let tickets = {
            let mut board = self.board.lock().await;
            board.warning = None;
            SectionId::HOME.map(|id| {
                let section = board.section_mut(id);
                section.filter = None;
                section.requested = None;
                board.issue(id, Fetch::base(id, 1))
            })
        };
        let issued = tickets.clone();
        let [movies, tv, regional_movies, regional_tv] = tickets;
        let outcomes = tokio::join!(
            self.settle(movies, OnFailure::ClearItems),
            self.settle(tv, OnFailure::ClearItems),
            self.settle(regional_movies, OnFailure::ClearItems),
            self.settle(regional_tv, OnFailure::ClearItems),
        );
        let outcomes = [outcomes.0, outcomes.1, outcomes.2, outcomes.3];
        let failed = outcomes.iter().filter(|o| **o == Settled::Failed).count();
        if failed == 0 {
            info!("Home sections loaded");
            return;
        }
        warn!("{} of {} home sections failed to load", failed, outcomes.len());
        let mut board = self.board.lock().await;
        // A later request for a failed section owns its state, warning included.
        let still_failed = issued
            .iter()
            .zip(outcomes)
            .any(|(ticket, outcome)| outcome == Settled::Failed && board.is_current(ticket));
        if still_failed {
            board.warning = Some(INITIAL_LOAD_WARNING.to_string());
        }
    }

    /// Moves `section` to `page`, clamped to the pages it is known to have.
    pub async fn change_page(&self, section: SectionId, page: u32) -> Settled {
        let ticket = {
            let mut board = self.board.lock().await;
            let query = board.query.clone();
            let current = board.section(section);
            let page = page.clamp(1, current.total_pages.max(1));
            let Some(fetch) = current.fetch_for_page(page, query.as_deref()) else {
                debug!(section = %section, "No active search, page change ignored");
                return Settled::Skipped;
            };
            board.issue(section, fetch)
        };
        self.settle(ticket, OnFailure::KeepItems).await
    }

    /// Runs a movie and a TV search for `query`. Blank queries do nothing.
    pub async fn search(&self, query: &str) -> Settled {
        let query = query.trim();
        if query.is_empty() {
            return Settled::Skipped;
        }
        info!("Searching catalog for '{}'", query);
        let (movies, tv) = {
            let mut board = self.board.lock().await;
            board.query = Some(query.to_string());
            board.warning = None;
            let movies = board.issue(
                SectionId::SearchMovies,
                Fetch::Search {
                    kind: ContentKind::Movie,
                    query: query.to_string(),
                    page: 1,
                },
            );
            let tv = board.issue(
                SectionId::SearchTv,
                Fetch::Search {
                    kind: ContentKind::Tv,
                    query: query.to_string(),
                    page: 1,
                },
            );
            (movies, tv)
        };
        let issued = [movies.clone(), tv.clone()];
        let (movies, tv) = tokio::join!(
            self.settle(movies, OnFailure::ClearItems),
            self.settle(tv, OnFailure::ClearItems),
        );
        if movies == Settled::Failed || tv == Settled::Failed {
            let mut board = self.board.lock().await;
            let still_failed = issued
                .iter()
                .zip([movies, tv])
                .any(|(ticket, outcome)| outcome == Settled::Failed && board.is_current(ticket));
            if still_failed {
                board.warning = Some(SEARCH_WARNING.to_string());
            }
            return Settled::Failed;
        }
        if movies == Settled::Superseded && tv == Settled::Superseded {
            return Settled::Superseded;
        }
        Settled::Loaded
    }

    /// Drops the active query and empties both search sections. Searches
    /// still in flight finish later and are discarded.
    pub async fn clear_search(&self) {
        let mut board = self.board.lock().await;
        board.query = None;
        board.warning = None;
        board.section_mut(SectionId::SearchMovies).reset();
        board.section_mut(SectionId::SearchTv).reset();
        debug!("Search cleared");
    }

    /// Toggles a genre filter on a home section. Picking the active genre
    /// again restores the unfiltered page the section showed before. The
    /// filter only takes effect once its first page has loaded.
    pub async fn select_genre(&self, family: GenreFamily, genre_id: i64) -> Settled {
        let id = family.section();
        let ticket = {
            let mut board = self.board.lock().await;
            let section = board.section(id);
            let request = match section.requested {
                Some(filter) if filter.genre_id == genre_id => Request {
                    fetch: Fetch::base(id, filter.base_page),
                    filter: FilterChange::Set(None),
                },
                active => {
                    let base_page = active
                        .map(|f| f.base_page)
                        .unwrap_or(section.current_page.max(1));
                    Request {
                        fetch: Fetch::Genre {
                            kind: id.kind(),
                            genre_id,
                            regional: id.is_regional(),
                            page: 1,
                        },
                        filter: FilterChange::Set(Some(GenreFilter {
                            genre_id,
                            base_page,
                        })),
                    }
                }
            };
            board.issue(id, request)
        };
        self.settle(ticket, OnFailure::KeepItems).await
    }

    /// Re-issues the last request made for `section`.
    pub async fn retry(&self, section: SectionId) -> Settled {
        let ticket = {
            let mut board = self.board.lock().await;
            let request = match board.section(section).last_request.clone() {
                Some(request) => request,
                None if !section.is_search() => Fetch::base(section, 1).into(),
                None => return Settled::Skipped,
            };
            board.issue(section, request)
        };
        let outcome = self.settle(ticket, OnFailure::KeepItems).await;
        if outcome == Settled::Loaded {
            let mut board = self.board.lock().await;
            let any_failed = board
                .sections
                .iter()
                .any(|s| s.status == SectionStatus::Failed);
            if !any_failed {
                board.warning = None;
            }
        }
        outcome
    }

    pub async fn genres(&self, kind: ContentKind) -> GenreList {
        self.catalog.fetch_genres(kind).await
    }

    pub async fn section(&self, id: SectionId) -> SectionView {
        self.board.lock().await.section(id).view()
    }

    pub async fn snapshot(&self) -> CatalogView {
        let board = self.board.lock().await;
        CatalogView {
            sections: board.sections.iter().map(Section::view).collect(),
            query: board.query.clone(),
            warning: board.warning.clone(),
        }
    }

    /// Fetches and applies on a detached task, so a caller that stops
    /// waiting never leaves the section loading.
    async fn settle(&self, ticket: Ticket, on_failure: OnFailure) -> Settled {
        let catalog = Arc::clone(&self.catalog);
        let board = Arc::clone(&self.board);
        let pending = ticket.clone();
        let task = tokio::spawn(async move {
            let result = pending.request.fetch.run(catalog.as_ref()).await;
            board.lock().await.apply(&pending, result, on_failure)
        });
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Fetch for section {} aborted: {}", ticket.section, e);
                self.board.lock().await.apply(
                    &ticket,
                    PageResult::failed(format!("fetch aborted: {}", e)),
                    on_failure,
                )
            }
        }
    }
}
