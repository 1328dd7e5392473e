//! Network fetch utilities and the catalog record store.

pub mod http;
pub mod store;

pub use http::{
    classify_reqwest_error, classify_status, BackoffPolicy, FetchError, FetchedResponse,
    HttpClientConfig, HttpFetcher, RetryDisposition, SimpleTokenBucket, TokenBucketConfig,
};
pub use store::{CountFacet, MemoryRecordStore, PgRecordStore, RecordStore, StoreError};

pub const CRATE_NAME: &str = "pourbase-storage";
