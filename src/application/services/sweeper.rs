//! Reconciliation Sweeper
//!
//! Periodically expires sessions whose connections vanished without a close
//! frame (tab crash, laptop sleep, network partition). Without it the online
//! count would only ever grow.
//!
//! A vanished client inflates the count for at most
//! `sweep_interval + staleness_threshold`, and is never expired before
//! `staleness_threshold` has passed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::broadcaster::PresenceBroadcaster;
use crate::config::PresenceSettings;
use crate::domain::SessionStore;
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// Where the sweeper is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepPhase {
    Idle,
    Scanning,
    Updating,
    Broadcasting,
}

/// Outcome of one sweep cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Active sessions older than the cutoff at scan time
    pub stale_found: usize,
    /// Sessions this cycle actually marked inactive
    pub expired: u64,
    /// Per-record expiry writes that failed
    pub failed: u64,
    /// Inactive records deleted by retention pruning
    pub pruned: u64,
    /// Whether a broadcast went out
    pub broadcast: bool,
}

/// Sweep timings.
#[derive(Debug, Clone, Copy)]
pub struct SweepConfig {
    pub interval: Duration,
    pub staleness_threshold: Duration,
    pub retention: Option<Duration>,
}

impl From<&PresenceSettings> for SweepConfig {
    fn from(settings: &PresenceSettings) -> Self {
        Self {
            interval: settings.sweep_interval(),
            staleness_threshold: settings.staleness_threshold(),
            retention: settings.retention(),
        }
    }
}

/// Resets the phase to Idle however the cycle ends.
struct PhaseGuard<'a>(&'a Mutex<SweepPhase>);

impl PhaseGuard<'_> {
    fn enter(&self, phase: SweepPhase) {
        *self.0.lock() = phase;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock() = SweepPhase::Idle;
    }
}

/// Background reconciliation of stale sessions.
pub struct ReconciliationSweeper {
    store: Arc<dyn SessionStore>,
    broadcaster: Arc<PresenceBroadcaster>,
    config: SweepConfig,
    phase: Mutex<SweepPhase>,
    cycle: tokio::sync::Mutex<()>,
}

impl ReconciliationSweeper {
    pub fn new(
        store: Arc<dyn SessionStore>,
        broadcaster: Arc<PresenceBroadcaster>,
        config: SweepConfig,
    ) -> Self {
        Self {
            store,
            broadcaster,
            config,
            phase: Mutex::new(SweepPhase::Idle),
            cycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn phase(&self) -> SweepPhase {
        *self.phase.lock()
    }

    pub fn config(&self) -> SweepConfig {
        self.config
    }

    /// Run one cycle against the current wall clock.
    pub async fn sweep(&self) -> Result<SweepReport, AppError> {
        self.sweep_at(Utc::now()).await
    }

    /// Run one cycle as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// Returns an error only when the scan itself fails; per-record failures
    /// are counted in the report.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, AppError> {
        let _cycle = self.cycle.lock().await;
        let phase = PhaseGuard(&self.phase);
        let mut report = SweepReport::default();

        let cutoff = before(now, self.config.staleness_threshold);

        phase.enter(SweepPhase::Scanning);
        let stale = self.store.find_stale(cutoff).await?;
        report.stale_found = stale.len();

        phase.enter(SweepPhase::Updating);
        for session_id in stale {
            match self.store.expire(session_id, cutoff, now).await {
                Ok(true) => {
                    report.expired += 1;
                    // Closes the connection if its socket is somehow still open
                    self.broadcaster.unsubscribe(&session_id);
                    tracing::debug!(session_id = %session_id, "Session expired");
                }
                // Heartbeat or disconnect got there first
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(session_id = %session_id, error = %e, "Failed to expire session");
                }
            }
        }

        if let Some(retention) = self.config.retention {
            match self.store.prune_inactive(before(now, retention)).await {
                Ok(pruned) => report.pruned = pruned,
                Err(e) => tracing::warn!(error = %e, "Failed to prune inactive sessions"),
            }
        }

        phase.enter(SweepPhase::Broadcasting);
        report.broadcast = self.broadcaster.broadcast_if_changed().await?.is_some();

        Ok(report)
    }

    /// Sweep forever on the configured interval.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // Skip first immediate tick

        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            staleness_threshold_secs = self.config.staleness_threshold.as_secs(),
            "Reconciliation sweeper started"
        );

        loop {
            ticker.tick().await;
            match self.sweep().await {
                Ok(report) => {
                    metrics::record_sweep("ok", report.expired);
                    if report.expired > 0 || report.failed > 0 || report.pruned > 0 {
                        tracing::info!(
                            stale = report.stale_found,
                            expired = report.expired,
                            failed = report.failed,
                            pruned = report.pruned,
                            broadcast = report.broadcast,
                            "Sweep cycle finished"
                        );
                    } else {
                        tracing::trace!("Sweep cycle found nothing stale");
                    }
                }
                Err(e) => {
                    metrics::record_sweep("failed", 0);
                    tracing::warn!(error = %e, "Sweep cycle failed, retrying next interval");
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) onto the runtime.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

fn before(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
