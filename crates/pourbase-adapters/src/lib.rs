//! Source adapter contract and the feed adapters that implement it.

use std::future::Future;

use async_trait::async_trait;
use pourbase_core::{CanonicalRecord, FieldBounds};
use pourbase_storage::{FetchError, HttpFetcher};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

pub mod brewery;
pub mod cocktails;
pub mod iowa;

pub use brewery::{BrewerySettings, OpenBreweryAdapter};
pub use cocktails::{BostonCocktailsAdapter, CocktailSettings};
pub use iowa::{IowaCatalogAdapter, IowaCatalogSettings};

pub const CRATE_NAME: &str = "pourbase-adapters";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedShape {
    DelimitedText,
    PaginatedJson,
    GroupedRows,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterContext {
    pub run_id: Uuid,
}

impl AdapterContext {
    pub fn new(run_id: Uuid) -> Self {
        Self { run_id }
    }
}

/// Raw content handed from `fetch` to `parse`.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFeed {
    Delimited(String),
    JsonPages(Vec<Vec<JsonValue>>),
}

impl RawFeed {
    pub fn describe(&self) -> &'static str {
        match self {
            RawFeed::Delimited(_) => "delimited text",
            RawFeed::JsonPages(_) => "json pages",
        }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unexpected response shape from {feed}: {detail}")]
    Shape { feed: &'static str, detail: String },
}

impl AdapterError {
    pub fn shape(feed: &'static str, detail: impl Into<String>) -> Self {
        AdapterError::Shape {
            feed,
            detail: detail.into(),
        }
    }
}

/// One external feed. `fetch` does all network I/O; `parse` is pure and
/// skips malformed rows instead of failing.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> &'static str;
    fn shape(&self) -> FeedShape;

    async fn fetch(&self, http: &HttpFetcher, ctx: &AdapterContext) -> Result<RawFeed, AdapterError>;

    fn parse(&self, raw: &RawFeed) -> Result<Vec<CanonicalRecord>, AdapterError>;
}

/// Per-source settings; every source is enabled unless switched off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub iowa: IowaCatalogSettings,
    pub brewery: BrewerySettings,
    pub cocktails: CocktailSettings,
}

pub fn enabled_adapters(settings: &SourceSettings, bounds: FieldBounds) -> Vec<Box<dyn SourceAdapter>> {
    let mut adapters: Vec<Box<dyn SourceAdapter>> = Vec::new();
    if settings.iowa.enabled {
        adapters.push(Box::new(IowaCatalogAdapter::new(settings.iowa.clone(), bounds)));
    }
    if settings.brewery.enabled {
        adapters.push(Box::new(OpenBreweryAdapter::new(settings.brewery.clone(), bounds)));
    }
    if settings.cocktails.enabled {
        adapters.push(Box::new(BostonCocktailsAdapter::new(settings.cocktails.clone(), bounds)));
    }
    adapters
}

pub fn adapter_for_source(
    source: &str,
    settings: &SourceSettings,
    bounds: FieldBounds,
) -> Option<Box<dyn SourceAdapter>> {
    match source {
        iowa::SOURCE => Some(Box::new(IowaCatalogAdapter::new(settings.iowa.clone(), bounds))),
        brewery::SOURCE => Some(Box::new(OpenBreweryAdapter::new(settings.brewery.clone(), bounds))),
        cocktails::SOURCE => Some(Box::new(BostonCocktailsAdapter::new(
            settings.cocktails.clone(),
            bounds,
        ))),
        _ => None,
    }
}

/// Fetch pages `1..=max_pages` in order, stopping at the first empty page.
pub async fn collect_pages<F, Fut>(max_pages: usize, mut fetch_page: F) -> Result<Vec<Vec<JsonValue>>, AdapterError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Vec<JsonValue>, AdapterError>>,
{
    let mut pages = Vec::new();
    for page in 1..=max_pages {
        let items = fetch_page(page).await?;
        if items.is_empty() {
            break;
        }
        pages.push(items);
    }
    Ok(pages)
}

fn expect_delimited<'a>(feed: &'static str, raw: &'a RawFeed) -> Result<&'a str, AdapterError> {
    match raw {
        RawFeed::Delimited(text) => Ok(text),
        other => Err(AdapterError::shape(
            feed,
            format!("expected delimited text, got {}", other.describe()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn pagination_stops_at_first_empty_page() {
        let calls = AtomicUsize::new(0);
        let pages = collect_pages(50, |page| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if page <= 2 {
                    Ok(vec![json!({ "page": page })])
                } else {
                    Ok(Vec::new())
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn pagination_respects_page_ceiling() {
        let calls = AtomicUsize::new(0);
        let pages = collect_pages(4, |page| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(vec![json!({ "page": page })]) }
        })
        .await
        .unwrap();
        assert_eq!(pages.len(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn pagination_error_fails_the_source() {
        let result = collect_pages(10, |page| async move {
            if page == 2 {
                Err(AdapterError::shape("test", "boom"))
            } else {
                Ok(vec![json!({})])
            }
        })
        .await;
        assert!(matches!(result, Err(AdapterError::Shape { .. })));
    }

    #[test]
    fn registry_honours_enabled_flags() {
        let mut settings = SourceSettings::default();
        assert_eq!(enabled_adapters(&settings, FieldBounds::default()).len(), 3);

        settings.brewery.enabled = false;
        let sources: Vec<_> = enabled_adapters(&settings, FieldBounds::default())
            .iter()
            .map(|a| a.source())
            .collect();
        assert_eq!(sources, vec!["iowa_catalog", "boston_cocktails"]);
    }

    #[test]
    fn adapter_lookup_by_source_name() {
        let settings = SourceSettings::default();
        let adapter = adapter_for_source("openbrewerydb", &settings, FieldBounds::default()).unwrap();
        assert_eq!(adapter.shape(), FeedShape::PaginatedJson);
        assert!(adapter_for_source("nope", &settings, FieldBounds::default()).is_none());
    }

    #[test]
    fn delimited_adapters_reject_json_pages() {
        let err = expect_delimited("iowa_catalog", &RawFeed::JsonPages(vec![])).unwrap_err();
        assert!(err.to_string().contains("expected delimited text"));
    }
}
