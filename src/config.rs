// Configuration management module
// This file handles process settings from the environment and the desired
// state (targets and metric tuples) read from a YAML file on every cycle
//
// Numan Thabit 2025 Nov

use crate::errors::ExporterError;
use crate::query::{IndexSelector, TimeWindow};
use crate::transport::ElasticSettings;
use anyhow::{bail, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:2112";
const DEFAULT_TARGETS_FILE: &str = "exporter.yaml";
const DEFAULT_SECRETS_DIR: &str = "/var/run/secrets/logs-exporter";
/// Env var naming an optional YAML file of process settings
pub const SETTINGS_FILE_ENV: &str = "EXPORTER_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Scrape and control endpoint, e.g. 0.0.0.0:2112
    pub listen_address: Option<SocketAddr>,
    /// Seconds between reconciliation passes (defaults 60)
    pub interval_secs: Option<u64>,
    /// Look-back window of every aggregation in seconds (defaults 900)
    pub window_secs: Option<u64>,
    /// YAML file holding targets and tuples, re-read each pass
    pub targets_file: Option<PathBuf>,
    /// Mounted secrets, laid out <dir>/<namespace>/<name>/<key>
    pub secrets_dir: Option<PathBuf>,
    /// Single-process polling mode: exit when a credential cannot be fetched
    pub exit_on_credential_error: Option<bool>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let settings_file = std::env::var_os(SETTINGS_FILE_ENV).map(PathBuf::from);
        Self::load_from(settings_file.as_deref())
    }

    /// Optional YAML settings file, overridden by `EXPORTER__*` env vars.
    pub fn load_from(settings_file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = settings_file {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(false),
            );
        }
        let cfg = builder
            .add_source(config::Environment::with_prefix("EXPORTER").separator("__"))
            .build()?;
        let app: AppConfig = cfg.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == Some(0) {
            bail!("interval_secs must be greater than zero");
        }
        if self.window_secs == Some(0) {
            bail!("window_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn listen_address(&self) -> SocketAddr {
        self.listen_address.unwrap_or_else(|| {
            DEFAULT_LISTEN_ADDRESS
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 2112)))
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.unwrap_or(60))
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs.unwrap_or(15 * 60))
    }

    pub fn targets_file(&self) -> PathBuf {
        self.targets_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TARGETS_FILE))
    }

    pub fn secrets_dir(&self) -> PathBuf {
        self.secrets_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SECRETS_DIR))
    }

    pub fn exit_on_credential_error(&self) -> bool {
        self.exit_on_credential_error.unwrap_or(false)
    }
}

/// Everything the exporter should reconcile. Re-read each pass, never diffed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DesiredState {
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl DesiredState {
    pub fn load(path: &Path) -> Result<Self, ExporterError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ExporterError::Config(format!("read targets file {}: {e}", path.display()))
        })?;
        Self::from_yaml(&raw)
            .map_err(|e| e.context(format!("targets file {}", path.display())))
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ExporterError> {
        let state: DesiredState = serde_yaml::from_str(raw)
            .map_err(|e| ExporterError::Config(format!("parse targets: {e}")))?;
        state.validate()?;
        Ok(state)
    }

    pub fn validate(&self) -> Result<(), ExporterError> {
        if self.targets.is_empty() {
            return Err(ExporterError::Config("no targets configured".into()));
        }
        let mut names = HashSet::new();
        for target in &self.targets {
            if !names.insert(target.name.as_str()) {
                return Err(ExporterError::Config(format!(
                    "duplicate target name {}",
                    target.name
                )));
            }
            target.validate()?;
        }
        Ok(())
    }
}

/// One document store to reconcile.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub url: Url,
    pub username: Option<String>,
    pub password: Option<CredentialSource>,
    /// Exact index name
    pub index: Option<String>,
    /// Index prefix; the lexicographically last match is queried
    #[serde(alias = "indexPrefix")]
    pub index_prefix: Option<String>,
    /// Timestamp field of the range predicate (defaults @timestamp)
    pub timestamp_field: Option<String>,
    pub insecure_skip_verify: Option<bool>,
    pub max_retries: Option<u32>,
    pub timeout_secs: Option<u64>,
    #[serde(default, alias = "tuple")]
    pub tuples: Vec<TupleConfig>,
}

impl TargetConfig {
    pub fn validate(&self) -> Result<(), ExporterError> {
        let invalid = |msg: String| ExporterError::Config(format!("target {}: {msg}", self.name));

        if self.name.trim().is_empty() {
            return Err(ExporterError::Config("target name must not be empty".into()));
        }
        self.index_selector()?;
        if self.timeout_secs == Some(0) {
            return Err(invalid("timeout_secs must be greater than zero".into()));
        }
        if let Some(source) = &self.password {
            source.validate().map_err(|e| e.context(format!("target {}", self.name)))?;
        }
        for tuple in &self.tuples {
            tuple
                .validate()
                .map_err(|e| e.context(format!("target {}", self.name)))?;
        }
        Ok(())
    }

    pub fn index_selector(&self) -> Result<IndexSelector, ExporterError> {
        match (&self.index, &self.index_prefix) {
            (Some(index), None) => Ok(IndexSelector::Exact(index.clone())),
            (None, Some(prefix)) => Ok(IndexSelector::Prefix(prefix.clone())),
            _ => Err(ExporterError::Config(format!(
                "target {}: exactly one of index or index_prefix must be set",
                self.name
            ))),
        }
    }

    pub fn time_window(&self, window: Duration) -> TimeWindow {
        match &self.timestamp_field {
            Some(field) => TimeWindow::new(window).with_timestamp_field(field.clone()),
            None => TimeWindow::new(window),
        }
    }

    pub fn elastic_settings(&self, password: Option<String>) -> ElasticSettings {
        let mut settings = ElasticSettings::new(self.url.clone());
        settings.username = self.username.clone();
        settings.password = password;
        settings.insecure_skip_verify = self.insecure_skip_verify.unwrap_or(false);
        if let Some(retries) = self.max_retries {
            settings.max_retries = retries;
        }
        if let Some(secs) = self.timeout_secs {
            settings.timeout = Duration::from_secs(secs);
        }
        settings
    }
}

/// Where a password comes from. Exactly one field must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CredentialSource {
    pub value: Option<String>,
    pub env: Option<String>,
    pub secret: Option<SecretRef>,
}

impl CredentialSource {
    pub fn validate(&self) -> Result<(), ExporterError> {
        let set = [self.value.is_some(), self.env.is_some(), self.secret.is_some()]
            .iter()
            .filter(|s| **s)
            .count();
        if set != 1 {
            return Err(ExporterError::Config(
                "password needs exactly one of value, env or secret".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SecretRef {
    pub name: String,
    pub namespace: String,
    pub key: String,
}

/// One exported metric.
#[derive(Debug, Clone, Deserialize)]
pub struct TupleConfig {
    #[serde(alias = "metricName")]
    pub metric_name: String,
    /// Filter dimensions, label -> field
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    /// Fixed values for some filter labels, label -> values. These labels
    /// are walked over the listed values instead of discovered ones.
    #[serde(default)]
    pub values: BTreeMap<String, Vec<String>>,
    /// Bucket axis
    pub aggregate: DimensionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DimensionConfig {
    pub name: String,
    pub field: String,
}

impl TupleConfig {
    pub fn validate(&self) -> Result<(), ExporterError> {
        if self.metric_name.trim().is_empty() {
            return Err(ExporterError::Config("metric_name must not be empty".into()));
        }
        if self.aggregate.name.is_empty() || self.aggregate.field.is_empty() {
            return Err(ExporterError::Config(format!(
                "metric {}: aggregate needs a name and a field",
                self.metric_name
            )));
        }
        if self.filters.contains_key(&self.aggregate.name) {
            return Err(ExporterError::Config(format!(
                "metric {}: aggregate label {} shadows a filter label",
                self.metric_name, self.aggregate.name
            )));
        }
        for (label, values) in &self.values {
            if !self.filters.contains_key(label) {
                return Err(ExporterError::Config(format!(
                    "metric {}: fixed values for {label}, which is not a filter label",
                    self.metric_name
                )));
            }
            if values.is_empty() {
                return Err(ExporterError::Config(format!(
                    "metric {}: fixed values for {label} must not be empty",
                    self.metric_name
                )));
            }
        }
        Ok(())
    }

    /// Filter labels plus the aggregate label, sorted.
    pub fn gauge_label_names(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.filters.keys().cloned().collect();
        labels.push(self.aggregate.name.clone());
        labels.sort();
        labels
    }
}
