// Reconciliation state shared with the HTTP API
//
// Keeps the last report of every target and a completed-pass counter, and
// carries "reconcile now" requests from the API to the scheduling loop.
//
// Numan Thabit 2025 Nov

use crate::driver::{CycleReport, TargetReport};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
	pub cycles: u64,
	pub targets: Vec<TargetReport>,
}

#[derive(Default)]
struct Inner {
	cycles: u64,
	last: BTreeMap<String, TargetReport>,
}

#[derive(Clone, Default)]
pub struct ReconcileState {
	inner: Arc<RwLock<Inner>>,
	trigger: Arc<Notify>,
}

impl ReconcileState {
	pub fn new() -> Self {
		Self::default()
	}

	/// Store the outcome of a finished pass. Targets missing from `report`
	/// keep their previous entry.
	pub async fn record(&self, report: CycleReport) {
		let mut guard = self.inner.write().await;
		guard.cycles += 1;
		for target in report.targets {
			guard.last.insert(target.target.clone(), target);
		}
		debug!(cycles = guard.cycles, "reconcile state updated");
	}

	pub async fn completed_cycles(&self) -> u64 {
		self.inner.read().await.cycles
	}

	pub async fn snapshot(&self) -> StatusSnapshot {
		let guard = self.inner.read().await;
		StatusSnapshot {
			cycles: guard.cycles,
			targets: guard.last.values().cloned().collect(),
		}
	}

	/// Ask the scheduling loop for an extra pass. Requests made while no one
	/// waits coalesce into one.
	pub fn request_reconcile(&self) {
		self.trigger.notify_one();
	}

	pub async fn reconcile_requested(&self) {
		self.trigger.notified().await;
	}
}

/// Ticker for scheduled passes. A pass that overruns the period pushes the
/// next tick back rather than firing the missed ticks back to back.
pub fn pass_ticker(period: Duration) -> Interval {
	let mut ticker = tokio::time::interval(period);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
	ticker
}
