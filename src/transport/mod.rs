// Transport layer module
// This file defines the document store seam used by the query engine
// and re-exports the HTTP implementation
//
// Numan Thabit 2025 Nov

pub mod elastic;

use crate::errors::ExporterError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

pub use elastic::{ElasticClient, ElasticSettings};

/// One entry of the store's index listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IndexInfo {
    pub index: String,
}

/// Minimal surface of the search engine the exporter drives.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Run a search request body against `index` and return the raw response.
    async fn search(&self, index: &str, body: &Value) -> Result<Value, ExporterError>;

    /// List every index known to the store.
    async fn list_indices(&self) -> Result<Vec<IndexInfo>, ExporterError>;
}
