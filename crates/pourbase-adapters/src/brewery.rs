//! Open Brewery DB listing: paginated JSON, one record per brewery.

use async_trait::async_trait;
use pourbase_core::{truncate, CanonicalRecord, Category, FieldBounds};
use pourbase_storage::HttpFetcher;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info};

use crate::{collect_pages, AdapterContext, AdapterError, FeedShape, RawFeed, SourceAdapter};

pub const SOURCE: &str = "openbrewerydb";

const DEFAULT_SUBCATEGORY: &str = "Brewery";
const DEFAULT_COUNTRY: &str = "United States";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrewerySettings {
    pub enabled: bool,
    pub url: String,
    pub per_page: usize,
    /// Hard ceiling on requests regardless of upstream behaviour.
    pub max_pages: usize,
}

impl Default for BrewerySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://api.openbrewerydb.org/v1/breweries".to_string(),
            per_page: 200,
            max_pages: 50,
        }
    }
}

impl BrewerySettings {
    pub fn page_url(&self, page: usize) -> String {
        let joiner = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{joiner}per_page={}&page={page}", self.url, self.per_page)
    }
}

#[derive(Debug, Clone)]
pub struct OpenBreweryAdapter {
    settings: BrewerySettings,
    bounds: FieldBounds,
}

impl OpenBreweryAdapter {
    pub fn new(settings: BrewerySettings, bounds: FieldBounds) -> Self {
        Self { settings, bounds }
    }

    fn parse_item(&self, item: &JsonValue) -> Option<CanonicalRecord> {
        let id = json_text(item, "id")?;
        let name = json_text(item, "name")?;
        let brewery_type = json_text(item, "brewery_type");
        let city = json_text(item, "city");
        let state = json_text(item, "state");
        let country = json_text(item, "country");

        let mut record = CanonicalRecord::new(
            truncate(Some(&name), self.bounds.name)?,
            Category::Beer,
            SOURCE,
            format!("obdb_{id}"),
        );
        record.subcategory = truncate(
            Some(brewery_type.as_deref().unwrap_or(DEFAULT_SUBCATEGORY)),
            self.bounds.short,
        );
        record.brand = truncate(Some(&name), self.bounds.short);
        record.country = truncate(
            Some(country.as_deref().unwrap_or(DEFAULT_COUNTRY)),
            self.bounds.short,
        );
        record.region = truncate(display_region(city.as_deref(), state.as_deref()).as_deref(), self.bounds.short);
        record.metadata = Some(json!({
            "brewery_type": brewery_type,
            "city": city,
            "state": state,
            "is_brewery": true,
        }));
        Some(record)
    }
}

/// `"City, ST"` when both are known, otherwise whichever one is present.
pub fn display_region(city: Option<&str>, region_code: Option<&str>) -> Option<String> {
    match (city, region_code) {
        (Some(city), Some(code)) => Some(format!("{city}, {code}")),
        (Some(city), None) => Some(city.to_string()),
        (None, Some(code)) => Some(code.to_string()),
        (None, None) => None,
    }
}

fn json_text(item: &JsonValue, key: &str) -> Option<String> {
    match item.get(key)? {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl SourceAdapter for OpenBreweryAdapter {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn shape(&self) -> FeedShape {
        FeedShape::PaginatedJson
    }

    async fn fetch(&self, http: &HttpFetcher, ctx: &AdapterContext) -> Result<RawFeed, AdapterError> {
        let pages = collect_pages(self.settings.max_pages, |page| {
            let url = self.settings.page_url(page);
            async move {
                let body = http.fetch_json(ctx.run_id, SOURCE, &url).await?;
                match body {
                    JsonValue::Array(items) => {
                        debug!(page, items = items.len(), "fetched listing page");
                        Ok(items)
                    }
                    other => Err(AdapterError::shape(
                        SOURCE,
                        format!("page {page}: expected a JSON array, got {}", json_kind(&other)),
                    )),
                }
            }
        })
        .await?;
        info!(source = SOURCE, pages = pages.len(), "listing pagination finished");
        Ok(RawFeed::JsonPages(pages))
    }

    fn parse(&self, raw: &RawFeed) -> Result<Vec<CanonicalRecord>, AdapterError> {
        let RawFeed::JsonPages(pages) = raw else {
            return Err(AdapterError::shape(
                SOURCE,
                format!("expected json pages, got {}", raw.describe()),
            ));
        };
        let mut records = Vec::new();
        let mut skipped = 0usize;
        for item in pages.iter().flatten() {
            match self.parse_item(item) {
                Some(record) => records.push(record),
                None => skipped += 1,
            }
        }
        debug!(source = SOURCE, parsed = records.len(), skipped, "parsed listing items");
        Ok(records)
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
