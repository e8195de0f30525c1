// Metric gauge cache
// This file keeps exactly one registered gauge family per label-name set and
// hands it out to every tuple that produces that set
//
// Numan Thabit 2025 Nov

use crate::errors::ExporterError;
use blake2::{Blake2s256, Digest};
use prometheus::{GaugeVec, Opts, Registry};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::info;

pub const GAUGE_HELP: &str = "A gauge representing documents count by field";

/// Separator used when hashing label names. Label names are assumed not to contain it.
const SIGNATURE_SEPARATOR: &str = "/";

/// A gauge family with a fixed, sorted set of label names.
pub struct GaugeSeries {
    name: String,
    label_names: Vec<String>,
    gauge: GaugeVec,
}

impl std::fmt::Debug for GaugeSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaugeSeries")
            .field("name", &self.name)
            .field("label_names", &self.label_names)
            .finish()
    }
}

impl GaugeSeries {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Set the value of one concrete label-value combination. Series not
    /// written this cycle keep their previous value.
    pub fn set(&self, labels: &BTreeMap<String, String>, value: u64) -> Result<(), ExporterError> {
        self.series(labels)?.set(value as f64);
        Ok(())
    }

    /// Current value of one concrete label-value combination.
    pub fn get(&self, labels: &BTreeMap<String, String>) -> Result<f64, ExporterError> {
        Ok(self.series(labels)?.get())
    }

    fn series(&self, labels: &BTreeMap<String, String>) -> Result<prometheus::Gauge, ExporterError> {
        let labels: HashMap<&str, &str> = labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        self.gauge.get_metric_with(&labels).map_err(|e| {
            ExporterError::Registry(format!("gauge {} labels {:?}: {e}", self.name, labels))
        })
    }
}

/// Digest of the sorted, joined label names.
pub fn label_set_signature(sorted_label_names: &[String]) -> String {
    let joined = sorted_label_names.join(SIGNATURE_SEPARATOR);
    hex::encode(Blake2s256::digest(joined.as_bytes()))
}

/// Label-name-set signature -> gauge family.
///
/// The name passed on a cache hit is ignored: the first registration for a
/// label set wins, even if a later tuple asks for a different metric name.
pub struct GaugeCache {
    registry: Registry,
    gauges: Mutex<HashMap<String, Arc<GaugeSeries>>>,
}

impl GaugeCache {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            gauges: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn get_gauge<L: AsRef<str>>(
        &self,
        name: &str,
        label_names: &[L],
    ) -> Result<Arc<GaugeSeries>, ExporterError> {
        let mut sorted: Vec<String> = label_names.iter().map(|l| l.as_ref().to_string()).collect();
        sorted.sort();
        let signature = label_set_signature(&sorted);

        let mut gauges = self.gauges.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(existing) = gauges.get(&signature) {
            return Ok(Arc::clone(existing));
        }

        let label_refs: Vec<&str> = sorted.iter().map(String::as_str).collect();
        let gauge = GaugeVec::new(Opts::new(name, GAUGE_HELP), &label_refs)?;
        self.registry.register(Box::new(gauge.clone()))?;
        info!(metric = name, labels = ?sorted, "registered gauge");

        let series = Arc::new(GaugeSeries {
            name: name.to_string(),
            label_names: sorted,
            gauge,
        });
        gauges.insert(signature, Arc::clone(&series));
        Ok(series)
    }

    pub fn len(&self) -> usize {
        self.gauges.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
