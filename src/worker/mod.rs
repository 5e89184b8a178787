//! Per-credential worker supervisor.
//!
//! Each worker runs the same cycle forever: check (and if needed refresh)
//! its credential, fetch a task, compute, submit, sleep, repeat. Failure
//! policy is adaptive: a consecutive-failure circuit breaker pauses a worker
//! that keeps hammering a failing endpoint, credential rejections route into
//! the refresh path instead of the breaker, and compute errors are treated
//! as neither. The loop has no terminal state short of fleet shutdown.

use std::sync::Arc;
use std::time::Duration;

use crate::client::TaskApi;
use crate::compute;
use crate::error::ClientError;
use crate::fleet::stats::WorkerStats;
use crate::shutdown::Shutdown;
use crate::token::claims;
use crate::token::refresh::TokenRefresh;
use crate::token::store::{TokenSlot, TokenStore};

/// Timing and breaker knobs for one worker. Defaults match production
/// policy; tests shrink them.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Refresh lead time: a credential expiring within this window counts
    /// as expired.
    pub expiry_lead_secs: i64,
    /// Wait after a failed refresh before re-checking the credential.
    pub refresh_retry_delay: Duration,
    /// Consecutive failures that trip the circuit breaker.
    pub breaker_threshold: u32,
    /// Cooldown once the breaker trips.
    pub breaker_cooldown: Duration,
    /// Wait after the service rejects the credential on fetch.
    pub rejection_delay: Duration,
    /// Wait after a fetch gives up its retry budget.
    pub fetch_failure_delay: Duration,
    /// Wait after a compute failure.
    pub compute_failure_delay: Duration,
    /// Wait after a submission gives up its retry budget.
    pub submit_failure_delay: Duration,
    /// Pacing delay after an accepted submission.
    pub success_delay: Duration,
    /// Wait after an unexpected failure (e.g. a panic in the compute task).
    pub recover_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            expiry_lead_secs: claims::EXPIRY_LEAD_SECS,
            refresh_retry_delay: Duration::from_secs(60),
            breaker_threshold: 5,
            breaker_cooldown: Duration::from_secs(300),
            rejection_delay: Duration::from_secs(3),
            fetch_failure_delay: Duration::from_secs(3),
            compute_failure_delay: Duration::from_secs(1),
            submit_failure_delay: Duration::from_secs(3),
            success_delay: Duration::from_millis(500),
            recover_delay: Duration::from_secs(10),
        }
    }
}

/// Supervisor for a single credential.
pub struct Worker {
    label: String,
    slot: Arc<TokenSlot>,
    store: Arc<TokenStore>,
    refresher: Arc<dyn TokenRefresh>,
    api: Arc<dyn TaskApi>,
    config: WorkerConfig,
    stats: Arc<WorkerStats>,
    shutdown: Shutdown,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        label: String,
        slot: Arc<TokenSlot>,
        store: Arc<TokenStore>,
        refresher: Arc<dyn TokenRefresh>,
        api: Arc<dyn TaskApi>,
        config: WorkerConfig,
        stats: Arc<WorkerStats>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            label,
            slot,
            store,
            refresher,
            api,
            config,
            stats,
            shutdown,
        }
    }

    /// Run the worker loop until fleet shutdown.
    pub async fn run(self) {
        tracing::info!(worker = %self.label, "worker started");
        while !self.shutdown.is_shutdown() {
            let delay = self.cycle().await;
            self.stats.touch();
            if !delay.is_zero() && !self.shutdown.sleep(delay).await {
                break;
            }
        }
        tracing::info!(
            worker = %self.label,
            success = self.stats.successes(),
            failure = self.stats.failures(),
            "worker stopped"
        );
    }

    /// One pass through the state machine. Returns the delay before the
    /// next pass.
    async fn cycle(&self) -> Duration {
        // CheckCredential
        let token = match self.ensure_credential().await {
            Ok(token) => token,
            Err(delay) => return delay,
        };

        // Circuit breaker, evaluated before every fetch.
        let streak = self.stats.consecutive_failures();
        if streak >= self.config.breaker_threshold {
            tracing::warn!(
                worker = %self.label,
                consecutive_failures = streak,
                cooldown_secs = self.config.breaker_cooldown.as_secs(),
                "circuit breaker open, pausing worker"
            );
            if !self.shutdown.sleep(self.config.breaker_cooldown).await {
                return Duration::ZERO;
            }
            self.stats.reset_consecutive();
            return Duration::ZERO;
        }

        // Fetching
        let task = match self.api.fetch_task(&token, &self.shutdown).await {
            Ok(task) => task,
            Err(ClientError::CredentialRejected) => {
                // A credential problem, not a service problem: handled by
                // the next CheckCredential pass, exempt from the breaker.
                tracing::warn!(worker = %self.label, "credential rejected by service");
                return self.config.rejection_delay;
            }
            Err(ClientError::Cancelled) => return Duration::ZERO,
            Err(e) => {
                tracing::warn!(worker = %self.label, "task fetch failed: {e}");
                self.stats.record_fetch_failure();
                return self.config.fetch_failure_delay;
            }
        };

        // Computing, off the async threads since it is CPU-bound.
        let spec = task.clone();
        let result = match tokio::task::spawn_blocking(move || compute::compute_result(&spec)).await
        {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!(worker = %self.label, task_id = %task.task_id, "compute failed: {e}");
                return self.config.compute_failure_delay;
            }
            Err(e) => {
                tracing::error!(worker = %self.label, "compute task panicked: {e}");
                return self.config.recover_delay;
            }
        };

        // Submitting
        match self
            .api
            .submit_result(&token, &result, &task.task_id, &self.shutdown)
            .await
        {
            Ok(()) => {
                self.stats.record_success();
                self.config.success_delay
            }
            Err(ClientError::Cancelled) => Duration::ZERO,
            Err(e) => {
                tracing::warn!(worker = %self.label, task_id = %task.task_id, "submission failed: {e}");
                self.stats.record_submit_failure();
                self.config.submit_failure_delay
            }
        }
    }

    /// Return a usable credential, refreshing it in place when expired.
    ///
    /// On refresh failure the worker waits and re-enters the credential
    /// check; this can repeat indefinitely. Either way the store is
    /// persisted, so a failed refresh keeps the old value on disk.
    async fn ensure_credential(&self) -> Result<String, Duration> {
        let current = self.slot.get().await;
        if !claims::is_expired(&current, self.config.expiry_lead_secs) {
            return Ok(current);
        }

        let mut guard = self.slot.lock().await;
        // The fleet sweep may have refreshed while we waited for the lock.
        if !claims::is_expired(&guard, self.config.expiry_lead_secs) {
            return Ok(guard.clone());
        }

        tracing::info!(worker = %self.label, "credential expiring, refreshing");
        match self.refresher.refresh(&guard).await {
            Ok(new_token) => {
                *guard = new_token.clone();
                drop(guard);
                if let Err(e) = self.store.persist().await {
                    tracing::error!(worker = %self.label, "failed to persist refreshed credential: {e}");
                }
                Ok(new_token)
            }
            Err(e) => {
                tracing::warn!(worker = %self.label, "credential refresh failed: {e}");
                drop(guard);
                if let Err(e) = self.store.persist().await {
                    tracing::error!(worker = %self.label, "failed to persist credential set: {e}");
                }
                Err(self.config.refresh_retry_delay)
            }
        }
    }
}
