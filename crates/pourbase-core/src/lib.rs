//! Canonical catalog model shared by every ingestion stage.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod normalize;
pub mod tabular;

pub use normalize::{format_size, non_negative, parse_number, truncate};
pub use tabular::{data_lines, parse_line, DEFAULT_SEPARATOR};

pub const CRATE_NAME: &str = "pourbase-core";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Spirits,
    Beer,
    Cocktails,
    Wine,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Spirits => "spirits",
            Category::Beer => "beer",
            Category::Cocktails => "cocktails",
            Category::Wine => "wine",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maximum character lengths applied to text fields before persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldBounds {
    /// `name`
    pub name: usize,
    /// `subcategory`, `brand`, `country`, `region`
    pub short: usize,
    /// `description`
    pub description: usize,
}

impl Default for FieldBounds {
    fn default() -> Self {
        Self::COLUMN_WIDTHS
    }
}

impl FieldBounds {
    /// Widths of the catalog columns these bounds protect.
    pub const COLUMN_WIDTHS: FieldBounds = FieldBounds {
        name: 255,
        short: 100,
        description: 2000,
    };

    /// Each bound kept between one character and its column width, so a
    /// truncated value is never empty and always fits its column.
    pub fn clamped(self) -> Self {
        let widths = Self::COLUMN_WIDTHS;
        Self {
            name: self.name.clamp(1, widths.name),
            short: self.short.clamp(1, widths.short),
            description: self.description.clamp(1, widths.description),
        }
    }
}

/// `(source, source_id)`: the only key used to resolve persistence conflicts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    pub source: String,
    pub source_id: String,
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.source_id)
    }
}

/// Unified record every source adapter emits.
///
/// Optional fields are `None` when the source has no value; adapters never
/// store an empty string in their place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub name: String,
    pub category: Category,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
    pub price: Option<f64>,
    pub alcohol_content: Option<f64>,
    pub size: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub description: Option<String>,
    pub source: String,
    pub source_id: String,
    pub metadata: Option<JsonValue>,
}

impl CanonicalRecord {
    /// Record carrying only the required fields; optional fields start absent.
    pub fn new(
        name: impl Into<String>,
        category: Category,
        source: impl Into<String>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            subcategory: None,
            brand: None,
            price: None,
            alcohol_content: None,
            size: None,
            country: None,
            region: None,
            description: None,
            source: source.into(),
            source_id: source_id.into(),
            metadata: None,
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            source: self.source.clone(),
            source_id: self.source_id.clone(),
        }
    }
}
