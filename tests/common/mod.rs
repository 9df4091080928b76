#![allow(dead_code)]

use moviestream::catalog::{CatalogApi, CatalogItem, ContentKind, Genre, GenreList, PageResult};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

pub const TOTAL_PAGES: u32 = 10;

/// Catalog double. Every call is recorded under a key such as
/// `popular:movie:2`; the single item it returns is titled with that key so
/// tests can tell which request a section ended up showing.
#[derive(Default)]
pub struct FakeCatalog {
    pub calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
}

impl FakeCatalog {
    pub fn fail(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    pub fn recover(&self, key: &str) {
        self.failing.lock().unwrap().remove(key);
    }

    /// Holds the next call with `key` until the returned sender fires.
    pub fn gate(&self, key: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(key.to_string(), rx);
        tx
    }

    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_call(&self) -> Option<String> {
        self.calls.lock().unwrap().last().cloned()
    }

    async fn respond(&self, key: String, kind: ContentKind, page: u32) -> PageResult {
        let id = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(key.clone());
            calls.len() as i64
        };
        let gate = self.gates.lock().unwrap().remove(&key);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.failing.lock().unwrap().contains(&key) {
            return PageResult::failed("catalog returned HTTP 500: upstream down");
        }
        PageResult {
            items: vec![item(id, kind, &key)],
            current_page: page,
            total_pages: TOTAL_PAGES,
            error: None,
        }
    }
}

pub fn item(id: i64, kind: ContentKind, title: &str) -> CatalogItem {
    CatalogItem {
        id,
        kind,
        title: title.to_string(),
        release_year: Some(2024),
        rating: Some(7.5),
        poster_path: Some("/poster.jpg".to_string()),
        overview: "Overview".to_string(),
        genre_ids: vec![18],
    }
}

#[async_trait::async_trait]
impl CatalogApi for FakeCatalog {
    async fn fetch_popular(&self, kind: ContentKind, page: u32) -> PageResult {
        self.respond(format!("popular:{}:{}", kind, page), kind, page)
            .await
    }

    async fn fetch_regional(&self, kind: ContentKind, page: u32) -> PageResult {
        self.respond(format!("regional:{}:{}", kind, page), kind, page)
            .await
    }

    async fn fetch_by_genre(
        &self,
        kind: ContentKind,
        genre_id: i64,
        page: u32,
        regional: bool,
    ) -> PageResult {
        self.respond(
            format!("genre:{}:{}:{}:{}", kind, genre_id, page, regional),
            kind,
            page,
        )
        .await
    }

    async fn search(&self, kind: ContentKind, query: &str, page: u32) -> PageResult {
        self.respond(format!("search:{}:{}:{}", kind, query, page), kind, page)
            .await
    }

    async fn fetch_genres(&self, kind: ContentKind) -> GenreList {
        self.calls.lock().unwrap().push(format!("genres:{}", kind));
        if self.failing.lock().unwrap().contains(&format!("genres:{}", kind)) {
            return GenreList {
                genres: Vec::new(),
                error: Some("catalog returned HTTP 500: upstream down".to_string()),
            };
        }
        GenreList {
            genres: vec![
                Genre {
                    id: 28,
                    name: "Action".to_string(),
                },
                Genre {
                    id: 18,
                    name: "Drama".to_string(),
                },
            ],
            error: None,
        }
    }
}

pub async fn wait_for_calls(catalog: &FakeCatalog, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if catalog.calls.lock().unwrap().len() >= expected {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "timed out waiting for {} calls (got {})",
                expected,
                catalog.calls.lock().unwrap().len()
            );
        }
        tokio::task::yield_now().await;
    }
}
