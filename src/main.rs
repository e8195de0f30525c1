use anyhow::{anyhow, bail, Context, Result};
use logs_exporter::api::{create_api_router, ApiState};
use logs_exporter::config::{AppConfig, DesiredState};
use logs_exporter::credentials::SecretStore;
use logs_exporter::driver::Driver;
use logs_exporter::gauges::GaugeCache;
use logs_exporter::state::{pass_ticker, ReconcileState};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("initialize tracing subscriber")?;

    if let Err(err) = run().await {
        tracing::error!(error = ?err, "fatal exporter error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let config = AppConfig::load().context("load configuration")?;

    // Fail at startup on a desired state that cannot be parsed at all; later
    // passes only log and skip.
    let targets_file = config.targets_file();
    let initial = DesiredState::load(&targets_file)
        .with_context(|| format!("load targets from {}", targets_file.display()))?;

    let registry = prometheus::default_registry().clone();
    let gauges = Arc::new(GaugeCache::new(registry.clone()));
    let driver = Driver::new(
        gauges,
        config.window(),
        SecretStore::new(config.secrets_dir()),
    );

    let app = App {
        config: Arc::new(config),
        driver,
        state: ReconcileState::new(),
        registry,
    };

    info!(
        targets = initial.targets.len(),
        tuples = initial
            .targets
            .iter()
            .map(|t| t.tuples.len())
            .sum::<usize>(),
        "desired state loaded"
    );

    app.run().await
}

struct App {
    config: Arc<AppConfig>,
    driver: Driver,
    state: ReconcileState,
    registry: prometheus::Registry,
}

impl App {
    async fn run(self) -> Result<()> {
        let api_router = create_api_router(ApiState {
            registry: self.registry.clone(),
            reconcile: self.state.clone(),
        });
        let api_addr = self.config.listen_address();
        let listener = tokio::net::TcpListener::bind(&api_addr)
            .await
            .with_context(|| format!("bind HTTP listener {api_addr}"))?;

        info!(address = %api_addr, "HTTP API server starting");
        let _api_handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, api_router).await {
                warn!(error = %e, "API server error");
            }
        });

        info!(
            interval_secs = self.config.interval().as_secs(),
            window_secs = self.config.window().as_secs(),
            targets_file = %self.config.targets_file().display(),
            "logs exporter online"
        );

        let mut ticker = pass_ticker(self.config.interval());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.reconcile().await?;
                }
                _ = self.state.reconcile_requested() => {
                    info!("reconcile requested over API");
                    self.reconcile().await?;
                }
                res = tokio::signal::ctrl_c() => {
                    if let Err(err) = res {
                        warn!(error = %err, "ctrl_c listener error");
                    }
                    info!("Shutdown signal received, exiting");
                    break;
                }
            }
        }
        Ok(())
    }

    /// One full pass. Only a credential failure in polling mode is fatal.
    async fn reconcile(&self) -> Result<()> {
        let desired = match DesiredState::load(&self.config.targets_file()) {
            Ok(desired) => desired,
            Err(err) => {
                warn!(error = %err, "desired state unavailable; skipping pass");
                return Ok(());
            }
        };

        let report = self.driver.run_cycle(&desired.targets).await;
        info!(
            targets = report.targets.len(),
            targets_failed = report.targets_failed(),
            observations = report.observations(),
            gauges = self.driver.gauges().len(),
            "reconciliation pass finished"
        );

        let credential_failure = report.has_credential_failure();
        self.state.record(report).await;

        if credential_failure && self.config.exit_on_credential_error() {
            bail!("credential fetch failed in polling mode");
        }
        Ok(())
    }
}

fn init_tracing() -> Result<()> {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,hyper=warn,reqwest=warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("tracing subscriber init: {err}"))
}
