//! Catalog record persistence.
//!
//! The only write primitive is an insert that ignores natural-key conflicts:
//! existing rows are never updated, so repeated and concurrent ingestion runs
//! converge on the same stored set without coordination.

use std::collections::BTreeMap;

use async_trait::async_trait;
use pourbase_core::{CanonicalRecord, NaturalKey};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("{0}")]
    Message(String),
}

/// Column a record count can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountFacet {
    Category,
    Source,
}

impl CountFacet {
    fn column(self) -> &'static str {
        match self {
            CountFacet::Category => "category",
            CountFacet::Source => "source",
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert every record whose `(source, source_id)` is not stored yet and
    /// return how many rows were actually inserted.
    async fn insert_new(&self, records: &[CanonicalRecord]) -> Result<usize, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    async fn count_by(&self, facet: CountFacet) -> Result<BTreeMap<String, u64>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Pool that opens connections on first use, so an unreachable database
    /// surfaces as a query error rather than here.
    pub fn connect_lazy(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_lazy(database_url)?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert_new(&self, records: &[CanonicalRecord]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            INSERT INTO products (
                name,
                category,
                subcategory,
                brand,
                price,
                alcohol_content,
                size,
                country,
                region,
                description,
                source,
                source_id,
                metadata
            )
            "#,
        );

        query_builder.push_values(records, |mut b, record| {
            b.push_bind(&record.name)
                .push_bind(record.category.as_str())
                .push_bind(&record.subcategory)
                .push_bind(&record.brand)
                .push_bind(record.price)
                .push_bind(record.alcohol_content)
                .push_bind(&record.size)
                .push_bind(&record.country)
                .push_bind(&record.region)
                .push_bind(&record.description)
                .push_bind(&record.source)
                .push_bind(&record.source_id)
                .push_bind(record.metadata.clone());
        });

        query_builder.push(
            r#"
            ON CONFLICT (source, source_id) DO NOTHING
            RETURNING id
            "#,
        );

        let inserted = query_builder.build().fetch_all(&self.pool).await?.len();
        debug!(submitted = records.len(), inserted, "insert_new chunk committed");
        Ok(inserted)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(total.max(0) as u64)
    }

    async fn count_by(&self, facet: CountFacet) -> Result<BTreeMap<String, u64>, StoreError> {
        let column = facet.column();
        let sql = format!(
            "SELECT {column} AS facet, COUNT(*) AS n FROM products GROUP BY {column}"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut out = BTreeMap::new();
        for row in rows {
            let key: String = row.try_get("facet")?;
            let n: i64 = row.try_get("n")?;
            out.insert(key, n.max(0) as u64);
        }
        Ok(out)
    }
}

/// Process-local store with the same conflict semantics as Postgres.
///
/// Backs dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    rows: Mutex<BTreeMap<NaturalKey, CanonicalRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<CanonicalRecord> {
        self.rows.lock().await.values().cloned().collect()
    }

    pub async fn get(&self, source: &str, source_id: &str) -> Option<CanonicalRecord> {
        let key = NaturalKey {
            source: source.to_string(),
            source_id: source_id.to_string(),
        };
        self.rows.lock().await.get(&key).cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_new(&self, records: &[CanonicalRecord]) -> Result<usize, StoreError> {
        let mut rows = self.rows.lock().await;
        let mut inserted = 0;
        for record in records {
            if let std::collections::btree_map::Entry::Vacant(slot) = rows.entry(record.natural_key()) {
                slot.insert(record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.rows.lock().await.len() as u64)
    }

    async fn count_by(&self, facet: CountFacet) -> Result<BTreeMap<String, u64>, StoreError> {
        let rows = self.rows.lock().await;
        let mut out = BTreeMap::new();
        for record in rows.values() {
            let key = match facet {
                CountFacet::Category => record.category.as_str().to_string(),
                CountFacet::Source => record.source.clone(),
            };
            *out.entry(key).or_default() += 1;
        }
        Ok(out)
    }
}
