//! Per-worker and fleet-wide statistics.
//!
//! Workers report completions through an explicit counter API; reporting is
//! read-only and never perturbs worker state. The coordinator aggregates the
//! counters on its periodic tick and once more at shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};

/// Counters for one worker. Mutated only by its own supervisor.
#[derive(Debug, Default)]
pub struct WorkerStats {
    success: AtomicU64,
    failure: AtomicU64,
    consecutive_failures: AtomicU32,
    last_activity_ms: AtomicI64,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A submission was accepted: clears the consecutive-failure streak.
    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.touch();
    }

    /// A fetch failed after retries: counts toward the breaker only.
    pub fn record_fetch_failure(&self) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// A submission failed after retries: counts toward both the breaker
    /// and the cumulative failure total.
    pub fn record_submit_failure(&self) {
        self.failure.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Clear the streak after a circuit-breaker cooldown.
    pub fn reset_consecutive(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn successes(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failure.load(Ordering::Relaxed)
    }

    /// Mark the worker as alive right now.
    pub fn touch(&self) {
        self.last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        match self.last_activity_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }

    /// Success percentage over all completed submissions.
    pub fn success_rate(&self) -> f64 {
        let success = self.successes();
        let total = success + self.failures();
        if total == 0 {
            0.0
        } else {
            success as f64 / total as f64 * 100.0
        }
    }
}

/// Aggregator over every worker's counters, owned by the coordinator.
#[derive(Debug)]
pub struct FleetStats {
    started_at: Instant,
    workers: Vec<(String, Arc<WorkerStats>)>,
}

impl FleetStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            workers: Vec::new(),
        }
    }

    /// Register a worker's counters under a display label.
    pub fn register(&mut self, label: String, stats: Arc<WorkerStats>) {
        self.workers.push((label, stats));
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Aggregate success and failure totals across the fleet.
    pub fn totals(&self) -> (u64, u64) {
        self.workers.iter().fold((0, 0), |(s, f), (_, w)| {
            (s + w.successes(), f + w.failures())
        })
    }

    /// Emit one structured line per worker plus a fleet summary.
    pub fn report(&self) {
        for (label, stats) in &self.workers {
            tracing::info!(
                worker = %label,
                success = stats.successes(),
                failure = stats.failures(),
                consecutive_failures = stats.consecutive_failures(),
                success_rate = format!("{:.1}%", stats.success_rate()),
                last_activity = stats
                    .last_activity()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string()),
                "worker statistics"
            );
        }
        let (success, failure) = self.totals();
        tracing::info!(
            workers = self.workers.len(),
            success,
            failure,
            uptime = %format_uptime(self.uptime()),
            "fleet statistics"
        );
    }
}

/// Render a duration as `1h 02m 03s`.
pub fn format_uptime(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}
