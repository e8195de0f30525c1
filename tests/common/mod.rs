//! In-memory document store answering terms aggregations from fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use logs_exporter::errors::ExporterError;
use logs_exporter::transport::{DocumentStore, IndexInfo};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;

pub type Filters = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct RecordedSearch {
    pub index: String,
    pub field: String,
    pub filters: Filters,
    pub body: Value,
}

#[derive(Default)]
pub struct FakeStore {
    indices: Vec<String>,
    /// (aggregation field, exact filters) -> buckets
    answers: Vec<(String, Filters, Vec<(String, u64)>)>,
    /// queries matching these (field, filters) fail with a transport error
    failures: Vec<(String, Filters)>,
    searches: Mutex<Vec<RecordedSearch>>,
}

pub fn filters(pairs: &[(&str, &str)]) -> Filters {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_indices(mut self, names: &[&str]) -> Self {
        self.indices = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Buckets returned for `field` under exactly `filter_pairs`.
    pub fn answer(mut self, field: &str, filter_pairs: &[(&str, &str)], buckets: &[(&str, u64)]) -> Self {
        self.answers.push((
            field.to_string(),
            filters(filter_pairs),
            buckets.iter().map(|(k, c)| (k.to_string(), *c)).collect(),
        ));
        self
    }

    pub fn fail(mut self, field: &str, filter_pairs: &[(&str, &str)]) -> Self {
        self.failures.push((field.to_string(), filters(filter_pairs)));
        self
    }

    pub fn searches(&self) -> Vec<RecordedSearch> {
        self.searches.lock().unwrap().clone()
    }
}

fn parse_request(body: &Value) -> (String, Filters) {
    let field = body["aggs"]["documents"]["terms"]["field"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let mut filters = Filters::new();
    if let Some(must) = body["query"]["bool"]["must"].as_array() {
        for clause in must {
            if let Some(term) = clause.get("term").and_then(Value::as_object) {
                for (k, v) in term {
                    filters.insert(k.clone(), v.as_str().unwrap_or_default().to_string());
                }
            }
        }
    }
    (field, filters)
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn search(&self, index: &str, body: &Value) -> Result<Value, ExporterError> {
        let (field, filters) = parse_request(body);
        self.searches.lock().unwrap().push(RecordedSearch {
            index: index.to_string(),
            field: field.clone(),
            filters: filters.clone(),
            body: body.clone(),
        });

        if self
            .failures
            .iter()
            .any(|(f, fl)| *f == field && *fl == filters)
        {
            return Err(ExporterError::Transport("connection refused".into()));
        }

        let buckets: Vec<Value> = self
            .answers
            .iter()
            .find(|(f, fl, _)| *f == field && *fl == filters)
            .map(|(_, _, buckets)| {
                buckets
                    .iter()
                    .map(|(key, count)| json!({ "key": key, "doc_count": count }))
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({
            "took": 1,
            "hits": { "hits": [] },
            "aggregations": { "documents": { "buckets": buckets } }
        }))
    }

    async fn list_indices(&self) -> Result<Vec<IndexInfo>, ExporterError> {
        Ok(self
            .indices
            .iter()
            .map(|index| IndexInfo {
                index: index.clone(),
            })
            .collect())
    }
}
