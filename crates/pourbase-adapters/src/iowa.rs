//! Iowa liquor products export: one large CSV, fixed column positions.

use async_trait::async_trait;
use pourbase_core::{
    data_lines, format_size, non_negative, parse_line, parse_number, truncate, CanonicalRecord,
    Category, FieldBounds, DEFAULT_SEPARATOR,
};
use pourbase_storage::HttpFetcher;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{expect_delimited, AdapterContext, AdapterError, FeedShape, RawFeed, SourceAdapter};

pub const SOURCE: &str = "iowa_catalog";

const COL_ITEM_NUMBER: usize = 0;
const COL_CATEGORY_NAME: usize = 1;
const COL_ITEM_DESCRIPTION: usize = 2;
const COL_VENDOR_NAME: usize = 4;
const COL_VOLUME_ML: usize = 5;
const COL_PROOF: usize = 9;
const COL_BOTTLE_RETAIL: usize = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IowaCatalogSettings {
    pub enabled: bool,
    pub url: String,
    /// Data rows read per run; the export is far larger than one run can hold.
    pub max_rows: usize,
    /// Rows with fewer positional fields are skipped.
    pub min_fields: usize,
}

impl Default for IowaCatalogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://data.iowa.gov/api/views/gckp-fe7r/rows.csv?accessType=DOWNLOAD".to_string(),
            max_rows: 5000,
            min_fields: 16,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IowaCatalogAdapter {
    settings: IowaCatalogSettings,
    bounds: FieldBounds,
}

impl IowaCatalogAdapter {
    pub fn new(settings: IowaCatalogSettings, bounds: FieldBounds) -> Self {
        Self { settings, bounds }
    }

    fn parse_row(&self, fields: &[String]) -> Option<CanonicalRecord> {
        if fields.len() < self.settings.min_fields {
            return None;
        }
        let field = |idx: usize| fields.get(idx).map(String::as_str).filter(|s| !s.is_empty());

        let name = truncate(field(COL_ITEM_DESCRIPTION), self.bounds.name)?;
        let item_number = field(COL_ITEM_NUMBER)?;

        let mut record = CanonicalRecord::new(name, Category::Spirits, SOURCE, format!("iac_{item_number}"));
        record.subcategory = truncate(field(COL_CATEGORY_NAME), self.bounds.short);
        record.brand = truncate(field(COL_VENDOR_NAME), self.bounds.short);
        record.price = non_negative(parse_number(field(COL_BOTTLE_RETAIL)));
        record.alcohol_content = parse_number(field(COL_PROOF))
            .filter(|proof| *proof > 0.0)
            .map(|proof| proof / 2.0);
        record.size = format_size(field(COL_VOLUME_ML), "ml");
        Some(record)
    }
}

#[async_trait]
impl SourceAdapter for IowaCatalogAdapter {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn shape(&self) -> FeedShape {
        FeedShape::DelimitedText
    }

    async fn fetch(&self, http: &HttpFetcher, ctx: &AdapterContext) -> Result<RawFeed, AdapterError> {
        // header line + row cap
        let max_lines = self.settings.max_rows.saturating_add(1);
        let text = http
            .fetch_line_prefix(ctx.run_id, SOURCE, &self.settings.url, max_lines)
            .await?;
        Ok(RawFeed::Delimited(text))
    }

    fn parse(&self, raw: &RawFeed) -> Result<Vec<CanonicalRecord>, AdapterError> {
        let text = expect_delimited(SOURCE, raw)?;
        let mut records = Vec::new();
        let mut skipped = 0usize;
        for line in data_lines(text).take(self.settings.max_rows) {
            match self.parse_row(&parse_line(line, DEFAULT_SEPARATOR)) {
                Some(record) => records.push(record),
                None => skipped += 1,
            }
        }
        debug!(source = SOURCE, parsed = records.len(), skipped, "parsed catalog rows");
        Ok(records)
    }
}
