// Reconciliation driver
// This file runs one pass over the configured targets: resolve the index,
// expand each tuple's filter dimensions, query every combination and write
// the resulting buckets into the cached gauges
//
// Numan Thabit 2025 Nov

use crate::config::{TargetConfig, TupleConfig};
use crate::credentials::SecretStore;
use crate::errors::ExporterError;
use crate::gauges::{GaugeCache, GaugeSeries};
use crate::metrics::{COMBINATIONS, CYCLE_DURATION};
use crate::query::{for_each_combination_with, AggregationQuery, Combination, TimeWindow};
use crate::transport::{DocumentStore, ElasticClient};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What one combination's query produced.
#[derive(Debug)]
pub enum CombinationOutcome {
    Updated { observations: usize },
    Failed { error: ExporterError },
}

/// Per-tuple tally of one pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TupleReport {
    pub metric: String,
    pub combinations_ok: usize,
    pub combinations_failed: usize,
    pub observations: usize,
    /// Set when the tuple was abandoned before querying combinations
    pub error: Option<String>,
}

impl TupleReport {
    fn from_outcomes(metric: &str, outcomes: Vec<CombinationOutcome>) -> Self {
        let mut report = TupleReport {
            metric: metric.to_string(),
            ..TupleReport::default()
        };
        for outcome in outcomes {
            match outcome {
                CombinationOutcome::Updated { observations } => {
                    report.combinations_ok += 1;
                    report.observations += observations;
                }
                CombinationOutcome::Failed { .. } => report.combinations_failed += 1,
            }
        }
        report
    }

    fn abandoned(metric: &str, error: &ExporterError) -> Self {
        TupleReport {
            metric: metric.to_string(),
            error: Some(error.to_string()),
            ..TupleReport::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-target result of one pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TargetReport {
    pub target: String,
    pub index: Option<String>,
    pub tuples: Vec<TupleReport>,
    /// Set when the whole target was abandoned (credentials, client, index)
    pub error: Option<String>,
    pub error_kind: Option<&'static str>,
    pub duration_ms: u64,
}

impl TargetReport {
    fn failed(target: &str, error: &ExporterError) -> Self {
        TargetReport {
            target: target.to_string(),
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            ..TargetReport::default()
        }
    }

    pub fn tuples_failed(&self) -> usize {
        self.tuples.iter().filter(|t| !t.is_success()).count()
    }

    pub fn combinations_ok(&self) -> usize {
        self.tuples.iter().map(|t| t.combinations_ok).sum()
    }

    pub fn combinations_failed(&self) -> usize {
        self.tuples.iter().map(|t| t.combinations_failed).sum()
    }

    pub fn observations(&self) -> usize {
        self.tuples.iter().map(|t| t.observations).sum()
    }
}

/// Result of one pass over every target.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub targets: Vec<TargetReport>,
}

impl CycleReport {
    pub fn has_credential_failure(&self) -> bool {
        self.targets
            .iter()
            .any(|t| t.error_kind == Some("credential"))
    }

    pub fn targets_failed(&self) -> usize {
        self.targets.iter().filter(|t| t.error.is_some()).count()
    }

    pub fn observations(&self) -> usize {
        self.targets.iter().map(TargetReport::observations).sum()
    }
}

/// Owns the gauge cache for the process lifetime and drives passes.
pub struct Driver {
    gauges: Arc<GaugeCache>,
    window: Duration,
    secrets: SecretStore,
}

impl Driver {
    pub fn new(gauges: Arc<GaugeCache>, window: Duration, secrets: SecretStore) -> Self {
        Self {
            gauges,
            window,
            secrets,
        }
    }

    pub fn gauges(&self) -> &Arc<GaugeCache> {
        &self.gauges
    }

    /// One pass over every target, strictly sequential.
    pub async fn run_cycle(&self, targets: &[TargetConfig]) -> CycleReport {
        let mut report = CycleReport::default();
        for target in targets {
            report.targets.push(self.reconcile_target(target).await);
        }
        report
    }

    /// Resolve credentials, build a client and reconcile one target.
    pub async fn reconcile_target(&self, target: &TargetConfig) -> TargetReport {
        let started = Instant::now();
        let _timer = CYCLE_DURATION
            .with_label_values(&[target.name.as_str()])
            .start_timer();

        let result = match self.connect(target) {
            Ok(client) => self.reconcile_with_store(&client, target).await,
            Err(err) => Err(err),
        };

        let mut report = match result {
            Ok(report) => report,
            Err(err) => {
                warn!(target_name = %target.name, error = %err, "target abandoned for this pass");
                TargetReport::failed(&target.name, &err)
            }
        };
        report.duration_ms = started.elapsed().as_millis() as u64;
        report
    }

    fn connect(&self, target: &TargetConfig) -> Result<ElasticClient, ExporterError> {
        let password = target
            .password
            .as_ref()
            .map(|source| self.secrets.resolve(source))
            .transpose()
            .map_err(|e| e.context(format!("target {}", target.name)))?;
        ElasticClient::new(target.elastic_settings(password))
            .map_err(|e| e.context(format!("target {}", target.name)))
    }

    /// Reconcile one target against an already connected store.
    pub async fn reconcile_with_store<S>(
        &self,
        store: &S,
        target: &TargetConfig,
    ) -> Result<TargetReport, ExporterError>
    where
        S: DocumentStore + ?Sized,
    {
        let index = target
            .index_selector()?
            .resolve(store)
            .await
            .map_err(|e| e.context(format!("target {}: resolve index", target.name)))?;
        info!(target_name = %target.name, index = %index, tuples = target.tuples.len(), "reconciling target");

        let window = target.time_window(self.window);
        let mut report = TargetReport {
            target: target.name.clone(),
            index: Some(index.clone()),
            ..TargetReport::default()
        };

        for tuple in &target.tuples {
            let tuple_report = match self
                .reconcile_tuple(store, &target.name, &index, &window, tuple)
                .await
            {
                Ok(tuple_report) => tuple_report,
                Err(err) => {
                    warn!(
                        target_name = %target.name,
                        metric = %tuple.metric_name,
                        error = %err,
                        "failed to query tuple"
                    );
                    TupleReport::abandoned(&tuple.metric_name, &err)
                }
            };
            report.tuples.push(tuple_report);
        }

        info!(
            target_name = %target.name,
            index = %index,
            combinations_ok = report.combinations_ok(),
            combinations_failed = report.combinations_failed(),
            tuples_failed = report.tuples_failed(),
            observations = report.observations(),
            "target reconciled"
        );
        Ok(report)
    }

    /// Query every combination of one tuple. Only enumeration and gauge
    /// lookup failures abort the tuple; query failures are per combination.
    pub async fn reconcile_tuple<S>(
        &self,
        store: &S,
        target: &str,
        index: &str,
        window: &TimeWindow,
        tuple: &TupleConfig,
    ) -> Result<TupleReport, ExporterError>
    where
        S: DocumentStore + ?Sized,
    {
        let gauge = self
            .gauges
            .get_gauge(&tuple.metric_name, tuple.gauge_label_names().as_slice())?;
        let query = AggregationQuery::new(&tuple.aggregate.field, window.clone());

        let outcomes = if tuple.filters.is_empty() {
            vec![
                self.observe(store, target, index, &query, tuple, &gauge, Combination::default())
                    .await,
            ]
        } else {
            let query = &query;
            let gauge = &gauge;
            for_each_combination_with(
                store,
                index,
                &tuple.filters,
                &tuple.values,
                window,
                move |combination| {
                    self.observe(store, target, index, query, tuple, gauge, combination)
                },
            )
            .await
            .map_err(|e| e.context("failed to run all combinations"))?
        };

        Ok(TupleReport::from_outcomes(&tuple.metric_name, outcomes))
    }

    #[allow(clippy::too_many_arguments)]
    async fn observe<S>(
        &self,
        store: &S,
        target: &str,
        index: &str,
        query: &AggregationQuery,
        tuple: &TupleConfig,
        gauge: &GaugeSeries,
        combination: Combination,
    ) -> CombinationOutcome
    where
        S: DocumentStore + ?Sized,
    {
        let filters = combination.exact_filters();
        debug!(target_name = target, metric = %tuple.metric_name, filters = ?filters, "query");

        let outcome = match query.run(store, index, &filters).await {
            Ok(buckets) => {
                let common = combination.label_values();
                let mut written = 0;
                let mut failure = None;
                for (value, count) in buckets {
                    let mut labels = common.clone();
                    labels.insert(tuple.aggregate.name.clone(), value);
                    if let Err(err) = gauge.set(&labels, count) {
                        failure = Some(err);
                        break;
                    }
                    written += 1;
                }
                match failure {
                    None => CombinationOutcome::Updated {
                        observations: written,
                    },
                    Some(error) => CombinationOutcome::Failed { error },
                }
            }
            Err(error) => CombinationOutcome::Failed {
                error: error.context(format!("query {} on {index}", query.field())),
            },
        };

        match &outcome {
            CombinationOutcome::Updated { observations } => {
                COMBINATIONS.with_label_values(&[target, "ok"]).inc();
                debug!(
                    target_name = target,
                    metric = %tuple.metric_name,
                    observations = *observations,
                    "combination updated"
                );
            }
            CombinationOutcome::Failed { error } => {
                COMBINATIONS.with_label_values(&[target, "error"]).inc();
                warn!(
                    target_name = target,
                    metric = %tuple.metric_name,
                    filters = ?filters,
                    error = %error,
                    "failed to query"
                );
            }
        }
        outcome
    }
}
