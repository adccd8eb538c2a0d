//! Execution statistics

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What one worker did in one superstep or compensation round
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub worker: usize,
    /// Vertices resident on the worker
    pub vertex_count: u64,
    /// Vertices compute (or compensate) ran on
    pub computed_count: u64,
    /// Vertices left active afterwards
    pub active_count: u64,
    /// Messages sent by the worker's vertices
    pub sent_count: u64,
    /// Messages read by the worker's vertices
    pub received_count: u64,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

/// Totals of one global superstep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperstepStats {
    pub global_superstep: u64,
    pub computed_count: u64,
    pub active_count: u64,
    pub sent_count: u64,
    pub received_count: u64,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

impl SuperstepStats {
    /// Fold the per-worker numbers of one superstep
    pub fn from_workers(global_superstep: u64, workers: &[WorkerStats], elapsed: Duration) -> Self {
        let mut stats = Self {
            global_superstep,
            elapsed,
            ..Self::default()
        };
        for worker in workers {
            stats.computed_count += worker.computed_count;
            stats.active_count += worker.active_count;
            stats.sent_count += worker.sent_count;
            stats.received_count += worker.received_count;
        }
        stats
    }
}

/// Statistics of a whole job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatistics {
    pub supersteps: Vec<SuperstepStats>,
    /// Times the job entered recovery
    pub recoveries: usize,
    /// Compensation rounds over all recoveries
    pub compensation_rounds: usize,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

impl JobStatistics {
    pub fn record(&mut self, superstep: SuperstepStats) {
        self.supersteps.push(superstep);
    }

    pub fn total_sent(&self) -> u64 {
        self.supersteps.iter().map(|s| s.sent_count).sum()
    }

    pub fn total_computed(&self) -> u64 {
        self.supersteps.iter().map(|s| s.computed_count).sum()
    }

    /// Log a one-line summary of the job
    pub fn log_summary(&self, algorithm: &str) {
        tracing::info!(
            algorithm,
            supersteps = self.supersteps.len(),
            computed = self.total_computed(),
            messages = self.total_sent(),
            recoveries = self.recoveries,
            compensation_rounds = self.compensation_rounds,
            elapsed = ?self.elapsed,
            "Pregel job statistics"
        );
    }
}
