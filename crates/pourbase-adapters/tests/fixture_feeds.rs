use std::fs;
use std::path::{Path, PathBuf};

use pourbase_adapters::{
    BostonCocktailsAdapter, CocktailSettings, IowaCatalogAdapter, IowaCatalogSettings, OpenBreweryAdapter,
    BrewerySettings, RawFeed, SourceAdapter,
};
use pourbase_core::{CanonicalRecord, FieldBounds};
use serde::Deserialize;
use serde_json::Value as JsonValue;

#[derive(Debug, PartialEq, Deserialize)]
struct GoldenRecord {
    source_id: String,
    name: String,
    category: String,
    subcategory: Option<String>,
    brand: Option<String>,
    price: Option<f64>,
    alcohol_content: Option<f64>,
    size: Option<String>,
    region: Option<String>,
    description: Option<String>,
}

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn fixture(source: &str, file: &str) -> PathBuf {
    workspace_root().join("fixtures").join(source).join("sample").join(file)
}

fn read_snapshot(source: &str) -> Vec<GoldenRecord> {
    let text = fs::read_to_string(fixture(source, "snapshot.json")).expect("read snapshot");
    serde_json::from_str(&text).expect("parse snapshot")
}

fn to_golden(records: &[CanonicalRecord]) -> Vec<GoldenRecord> {
    records
        .iter()
        .map(|r| GoldenRecord {
            source_id: r.source_id.clone(),
            name: r.name.clone(),
            category: r.category.to_string(),
            subcategory: r.subcategory.clone(),
            brand: r.brand.clone(),
            price: r.price,
            alcohol_content: r.alcohol_content,
            size: r.size.clone(),
            region: r.region.clone(),
            description: r.description.clone(),
        })
        .collect()
}

fn delimited(source: &str, file: &str) -> RawFeed {
    RawFeed::Delimited(fs::read_to_string(fixture(source, file)).expect("read fixture"))
}

fn json_page(file: &str) -> Vec<JsonValue> {
    let text = fs::read_to_string(fixture("openbrewerydb", file)).expect("read page");
    serde_json::from_str(&text).expect("parse page")
}

#[test]
fn golden_snapshot_iowa_catalog() {
    let adapter = IowaCatalogAdapter::new(IowaCatalogSettings::default(), FieldBounds::default());
    let records = adapter.parse(&delimited("iowa_catalog", "products.csv")).unwrap();
    assert!(records.iter().all(|r| r.source == "iowa_catalog"));
    assert_eq!(to_golden(&records), read_snapshot("iowa_catalog"));
}

#[test]
fn golden_snapshot_openbrewerydb() {
    let adapter = OpenBreweryAdapter::new(BrewerySettings::default(), FieldBounds::default());
    let raw = RawFeed::JsonPages(vec![json_page("page1.json"), json_page("page2.json")]);
    let records = adapter.parse(&raw).unwrap();
    assert!(records.iter().all(|r| r.country.as_deref() == Some("United States")));
    assert_eq!(to_golden(&records), read_snapshot("openbrewerydb"));
}

#[test]
fn golden_snapshot_boston_cocktails() {
    let adapter = BostonCocktailsAdapter::new(CocktailSettings::default(), FieldBounds::default());
    let records = adapter.parse(&delimited("boston_cocktails", "cocktails.csv")).unwrap();
    assert_eq!(to_golden(&records), read_snapshot("boston_cocktails"));

    let ingredients = &records[0].metadata.as_ref().unwrap()["ingredients"];
    assert_eq!(ingredients.as_array().map(Vec::len), Some(3));
}

#[test]
fn every_fixture_key_is_unique_within_its_source() {
    let iowa = IowaCatalogAdapter::new(IowaCatalogSettings::default(), FieldBounds::default())
        .parse(&delimited("iowa_catalog", "products.csv"))
        .unwrap();
    let mut keys: Vec<_> = iowa.iter().map(CanonicalRecord::natural_key).collect();
    let before = keys.len();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), before);
}
