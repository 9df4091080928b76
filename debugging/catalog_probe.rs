//! Run the home-section warm-up (or a search) against the live catalog and
//! print the resulting section state.
//! Usage:
//!   cargo run --bin catalog_probe
//!   cargo run --bin catalog_probe -- search "<query>"
//!   cargo run --bin catalog_probe -- genres <movie|tv>
//! Requires TMDB_API_KEY in the environment (.env supported).

use anyhow::{bail, Result};
use dotenvy::dotenv;
use moviestream::aggregator::{CatalogView, SectionAggregator};
use moviestream::catalog::{CatalogApi, ContentKind, TmdbCatalog};
use moviestream::config::Config;
use serde_json::{json, Value};
use std::env;
use std::sync::Arc;

fn summarize(view: &CatalogView) -> Value {
    let sections: Vec<Value> = view
        .sections
        .iter()
        .map(|s| {
            json!({
                "name": s.name,
                "status": s.status,
                "page": format!("{}/{}", s.current_page, s.total_pages),
                "warning": s.warning,
                "titles": s.items.iter().take(5).map(|i| i.title.clone()).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({
        "query": view.query,
        "warning": view.warning,
        "sections": sections,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    let config = Config::from_env()?;
    let catalog: Arc<dyn CatalogApi> = Arc::new(TmdbCatalog::new(&config)?);
    let aggregator = SectionAggregator::new(catalog);

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None => aggregator.initialize().await,
        Some("search") => {
            let query = args[1..].join(" ");
            if query.trim().is_empty() {
                bail!("search needs a query");
            }
            aggregator.search(&query).await;
        }
        Some("genres") => {
            let kind: ContentKind = args
                .get(1)
                .map(String::as_str)
                .unwrap_or("movie")
                .parse()?;
            let list = aggregator.genres(kind).await;
            println!("{}", serde_json::to_string_pretty(&list)?);
            return Ok(());
        }
        Some(other) => bail!("unknown command '{}'", other),
    }

    let view = aggregator.snapshot().await;
    println!("{}", serde_json::to_string_pretty(&summarize(&view))?);
    Ok(())
}
