//! Fleet coordination.
//!
//! The coordinator owns the worker set: it refreshes already-expired
//! credentials before any worker starts, spawns one independent supervisor
//! task per credential, runs the hourly fleet-wide refresh sweep and the
//! periodic statistics report, and drives coordinated shutdown with a
//! bounded grace period.

pub mod stats;

use std::sync::Arc;
use std::time::Duration;

use futures::future;

use crate::client::TaskApi;
use crate::shutdown::Shutdown;
use crate::token::claims;
use crate::token::refresh::TokenRefresh;
use crate::token::store::TokenStore;
use crate::worker::{Worker, WorkerConfig};
use stats::{FleetStats, WorkerStats};

/// Timing knobs for the coordinator.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Interval of the fleet-wide credential refresh sweep.
    pub refresh_sweep_interval: Duration,
    /// Interval of the statistics report.
    pub report_interval: Duration,
    /// How long to wait for workers to wind down after shutdown.
    pub shutdown_grace: Duration,
    /// Per-worker policy, shared by every supervisor.
    pub worker: WorkerConfig,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            refresh_sweep_interval: Duration::from_secs(3600),
            report_interval: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(10),
            worker: WorkerConfig::default(),
        }
    }
}

/// Owner of the worker fleet and its background timers.
pub struct FleetCoordinator {
    store: Arc<TokenStore>,
    refresher: Arc<dyn TokenRefresh>,
    api: Arc<dyn TaskApi>,
    config: FleetConfig,
}

impl FleetCoordinator {
    pub fn new(
        store: Arc<TokenStore>,
        refresher: Arc<dyn TokenRefresh>,
        api: Arc<dyn TaskApi>,
        config: FleetConfig,
    ) -> Self {
        Self {
            store,
            refresher,
            api,
            config,
        }
    }

    /// Run the fleet until `shutdown` fires.
    pub async fn run(self, shutdown: Shutdown) -> anyhow::Result<()> {
        // Startup pass: bring every already-expired credential up to date
        // before the workers begin hammering the task endpoint.
        let refreshed = self.refresh_pass().await;
        tracing::info!(
            credentials = self.store.len(),
            refreshed,
            "starting fleet"
        );

        let mut fleet_stats = FleetStats::new();
        let mut handles = Vec::with_capacity(self.store.len());
        for slot in self.store.slots() {
            let label = format!("{}:{}", slot.index(), slot.label().await);
            let worker_stats = Arc::new(WorkerStats::new());
            fleet_stats.register(label.clone(), worker_stats.clone());

            let worker = Worker::new(
                label,
                slot,
                self.store.clone(),
                self.refresher.clone(),
                self.api.clone(),
                self.config.worker.clone(),
                worker_stats,
                shutdown.clone(),
            );
            handles.push(tokio::spawn(worker.run()));
        }

        let mut sweep = tokio::time::interval(self.config.refresh_sweep_interval);
        let mut report = tokio::time::interval(self.config.report_interval);
        // Both intervals fire immediately; the startup pass and startup logs
        // already cover that, so consume the first tick of each.
        sweep.tick().await;
        report.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = sweep.tick() => {
                    tracing::info!("running scheduled credential refresh sweep");
                    self.refresh_pass().await;
                }
                _ = report.tick() => fleet_stats.report(),
            }
        }

        tracing::info!("shutting down, waiting for workers");
        if tokio::time::timeout(self.config.shutdown_grace, future::join_all(handles))
            .await
            .is_err()
        {
            tracing::warn!("some workers did not stop within the grace period");
        }

        tracing::info!("final fleet statistics");
        fleet_stats.report();
        Ok(())
    }

    /// Check every credential and refresh the expired ones, holding each
    /// slot's lock for the duration of its own refresh only.
    ///
    /// The store is persisted once at the end of the pass whether or not
    /// every refresh succeeded, so failed refreshes keep their old value.
    async fn refresh_pass(&self) -> usize {
        let mut refreshed = 0;
        for slot in self.store.slots() {
            let mut guard = slot.lock().await;
            if !claims::is_expired(&guard, self.config.worker.expiry_lead_secs) {
                continue;
            }
            let label = claims::label(&guard);
            match self.refresher.refresh(&guard).await {
                Ok(new_token) => {
                    *guard = new_token;
                    refreshed += 1;
                }
                Err(e) => {
                    tracing::warn!(token = %label, "refresh failed during sweep: {e}");
                }
            }
        }
        if let Err(e) = self.store.persist().await {
            tracing::error!("failed to persist credential set after sweep: {e}");
        }
        refreshed
    }
}
