// Aggregation query builder
// This file builds the bounded-time, filtered terms aggregation request
// and decodes its buckets into term -> document count
//
// Numan Thabit 2025 Nov

use crate::errors::ExporterError;
use crate::transport::DocumentStore;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Name of the single terms aggregation in every request.
pub const AGGREGATION_NAME: &str = "documents";
/// Maximum number of buckets requested per aggregation.
pub const MAX_BUCKETS: usize = 100;
pub const DEFAULT_TIMESTAMP_FIELD: &str = "@timestamp";

/// Term value -> document count. Keys are unique, order is unspecified.
pub type AggregationResult = HashMap<String, u64>;

/// Exact-match filters, document field -> value.
pub type ExactFilters = BTreeMap<String, String>;

/// Open interval `(gt, lt)` in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub gt_millis: u64,
    pub lt_millis: u64,
}

impl TimeRange {
    pub fn ending_at(now: SystemTime, window: Duration) -> Self {
        let lt_millis = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let gt_millis = lt_millis.saturating_sub(window.as_millis() as u64);
        Self {
            gt_millis,
            lt_millis,
        }
    }
}

/// The time axis shared by every query of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    pub timestamp_field: String,
    pub window: Duration,
}

impl TimeWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            timestamp_field: DEFAULT_TIMESTAMP_FIELD.to_string(),
            window,
        }
    }

    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }

    pub fn range_ending_at(&self, now: SystemTime) -> TimeRange {
        TimeRange::ending_at(now, self.window)
    }
}

/// A terms aggregation over one field within a time window.
#[derive(Debug, Clone)]
pub struct AggregationQuery {
    field: String,
    window: TimeWindow,
}

impl AggregationQuery {
    pub fn new(field: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            field: field.into(),
            window,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Request body for the given range and filters.
    pub fn build_body(&self, range: TimeRange, filters: &ExactFilters) -> Value {
        let mut must = Vec::with_capacity(filters.len() + 1);
        must.push(json!({
            "range": {
                self.window.timestamp_field.as_str(): {
                    "gt": range.gt_millis,
                    "lt": range.lt_millis,
                    "format": "epoch_millis",
                }
            }
        }));
        for (field, value) in filters {
            must.push(json!({ "term": { field.as_str(): value } }));
        }

        json!({
            "size": 0,
            "query": { "bool": { "must": must } },
            "aggs": {
                AGGREGATION_NAME: {
                    "terms": { "field": self.field, "size": MAX_BUCKETS }
                }
            }
        })
    }

    /// Run the aggregation against `index`. Both range bounds are fixed at call start.
    pub async fn run<S>(
        &self,
        store: &S,
        index: &str,
        filters: &ExactFilters,
    ) -> Result<AggregationResult, ExporterError>
    where
        S: DocumentStore + ?Sized,
    {
        let range = self.window.range_ending_at(SystemTime::now());
        let body = self.build_body(range, filters);
        let response = store
            .search(index, &body)
            .await
            .map_err(|e| e.context("failed to get result"))?;
        decode_buckets(&response)
    }
}

/// Convenience entry point: one aggregation on `field` in `index`.
pub async fn run_aggregation<S>(
    store: &S,
    index: &str,
    field: &str,
    window: &TimeWindow,
    filters: &ExactFilters,
) -> Result<AggregationResult, ExporterError>
where
    S: DocumentStore + ?Sized,
{
    AggregationQuery::new(field, window.clone())
        .run(store, index, filters)
        .await
}

#[derive(Debug, Deserialize)]
struct BucketItems {
    buckets: Vec<Bucket>,
}

#[derive(Debug, Deserialize)]
struct Bucket {
    key: Value,
    doc_count: u64,
}

/// Decode `aggregations.documents.buckets`. Non-string keys are rejected.
pub fn decode_buckets(response: &Value) -> Result<AggregationResult, ExporterError> {
    let raw = response
        .get("aggregations")
        .and_then(|aggs| aggs.get(AGGREGATION_NAME))
        .ok_or_else(|| {
            ExporterError::Decode(format!("response has no aggregation {AGGREGATION_NAME}"))
        })?;

    let items = BucketItems::deserialize(raw)
        .map_err(|e| ExporterError::Decode(format!("failed to unmarshal result: {e}")))?;

    let mut result = AggregationResult::with_capacity(items.buckets.len());
    for bucket in items.buckets {
        match bucket.key {
            Value::String(key) => {
                result.insert(key, bucket.doc_count);
            }
            other => {
                return Err(ExporterError::Decode(format!(
                    "failed to convert key {other} to string"
                )))
            }
        }
    }
    Ok(result)
}
