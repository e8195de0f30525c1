// Index resolution
// Time-series indices are named with a sortable date suffix, so the newest
// index for a prefix is the lexicographically greatest one.
//
// Numan Thabit 2025 Nov

use crate::errors::ExporterError;
use crate::transport::DocumentStore;
use tracing::debug;

/// How a target names the index it queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSelector {
    Exact(String),
    Prefix(String),
}

impl IndexSelector {
    pub async fn resolve<S>(&self, store: &S) -> Result<String, ExporterError>
    where
        S: DocumentStore + ?Sized,
    {
        match self {
            IndexSelector::Exact(name) => Ok(name.clone()),
            IndexSelector::Prefix(prefix) => resolve_latest_index(store, prefix).await,
        }
    }
}

pub async fn resolve_latest_index<S>(store: &S, prefix: &str) -> Result<String, ExporterError>
where
    S: DocumentStore + ?Sized,
{
    let indices = store
        .list_indices()
        .await
        .map_err(|e| e.context("failed to list indexes"))?;
    let latest = latest_matching(indices.iter().map(|i| i.index.as_str()), prefix)?;
    debug!(prefix = prefix, index = %latest, candidates = indices.len(), "resolved latest index");
    Ok(latest)
}

/// Last name, in ascending lexicographic order, starting with `prefix`.
pub fn latest_matching<'a, I>(names: I, prefix: &str) -> Result<String, ExporterError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut matching: Vec<&str> = names
        .into_iter()
        .filter(|name| name.starts_with(prefix))
        .collect();
    matching.sort_unstable();
    matching
        .last()
        .map(|name| name.to_string())
        .ok_or_else(|| ExporterError::IndexNotFound {
            prefix: prefix.to_string(),
        })
}
