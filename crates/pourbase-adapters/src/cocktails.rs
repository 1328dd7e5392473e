//! Boston cocktails export: one CSV row per ingredient line, grouped by recipe.

use std::collections::HashMap;

use async_trait::async_trait;
use pourbase_core::{data_lines, parse_line, truncate, CanonicalRecord, Category, FieldBounds, DEFAULT_SEPARATOR};
use pourbase_storage::HttpFetcher;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::{expect_delimited, AdapterContext, AdapterError, FeedShape, RawFeed, SourceAdapter};

pub const SOURCE: &str = "boston_cocktails";

const COL_NAME: usize = 0;
const COL_CATEGORY: usize = 1;
const COL_ROW_ID: usize = 2;
const COL_INGREDIENT: usize = 4;
const COL_MEASURE: usize = 5;

const COMPONENT_SEPARATOR: &str = ", ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CocktailSettings {
    pub enabled: bool,
    pub url: String,
}

impl Default for CocktailSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://raw.githubusercontent.com/rfordatascience/tidytuesday/master/data/2020/2020-05-26/boston_cocktails.csv"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub ingredient: Option<String>,
    pub measure: Option<String>,
}

impl Component {
    fn display(&self) -> String {
        let parts = [self.measure.as_deref(), self.ingredient.as_deref()];
        parts.into_iter().flatten().collect::<Vec<_>>().join(" ")
    }
}

#[derive(Debug, Clone)]
struct RecipeGroup {
    id: String,
    name: String,
    category: Option<String>,
    components: Vec<Component>,
}

#[derive(Debug, Clone)]
pub struct BostonCocktailsAdapter {
    settings: CocktailSettings,
    bounds: FieldBounds,
}

impl BostonCocktailsAdapter {
    pub fn new(settings: CocktailSettings, bounds: FieldBounds) -> Self {
        Self { settings, bounds }
    }

    fn to_record(&self, group: RecipeGroup) -> Option<CanonicalRecord> {
        let description = group
            .components
            .iter()
            .map(Component::display)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(COMPONENT_SEPARATOR);

        let mut record = CanonicalRecord::new(
            truncate(Some(&group.name), self.bounds.name)?,
            Category::Cocktails,
            SOURCE,
            format!("bc_{}", group.id),
        );
        record.subcategory = truncate(group.category.as_deref(), self.bounds.short);
        record.description = truncate(Some(&description), self.bounds.description);
        record.metadata = Some(json!({ "ingredients": group.components }));
        Some(record)
    }
}

/// Accumulate rows into recipes keyed by row id, preserving first-seen order.
/// Rows of one recipe need not be adjacent.
fn group_rows<'a>(lines: impl Iterator<Item = &'a str>) -> (Vec<RecipeGroup>, usize) {
    let mut groups: Vec<RecipeGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0usize;

    for line in lines {
        let fields = parse_line(line, DEFAULT_SEPARATOR);
        let field = |idx: usize| {
            fields
                .get(idx)
                .map(String::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let (Some(name), Some(id)) = (field(COL_NAME), field(COL_ROW_ID)) else {
            skipped += 1;
            continue;
        };
        let component = Component {
            ingredient: field(COL_INGREDIENT),
            measure: field(COL_MEASURE),
        };
        match index.get(&id).copied() {
            Some(pos) => groups[pos].components.push(component),
            None => {
                index.insert(id.clone(), groups.len());
                groups.push(RecipeGroup {
                    id,
                    name,
                    category: field(COL_CATEGORY),
                    components: vec![component],
                });
            }
        }
    }
    (groups, skipped)
}

#[async_trait]
impl SourceAdapter for BostonCocktailsAdapter {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn shape(&self) -> FeedShape {
        FeedShape::GroupedRows
    }

    async fn fetch(&self, http: &HttpFetcher, ctx: &AdapterContext) -> Result<RawFeed, AdapterError> {
        let text = http.fetch_text(ctx.run_id, SOURCE, &self.settings.url).await?;
        Ok(RawFeed::Delimited(text))
    }

    fn parse(&self, raw: &RawFeed) -> Result<Vec<CanonicalRecord>, AdapterError> {
        let text = expect_delimited(SOURCE, raw)?;
        let (groups, skipped_rows) = group_rows(data_lines(text));
        let records: Vec<_> = groups.into_iter().filter_map(|g| self.to_record(g)).collect();
        debug!(source = SOURCE, parsed = records.len(), skipped_rows, "grouped recipe rows");
        Ok(records)
    }
}
