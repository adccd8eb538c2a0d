//! Pregel engine configuration
//!
//! Configuration for the superstep engine including worker layout,
//! parallelism, message batching, checkpointing and recovery bounds.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::PregelError;

/// Pregel engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PregelConfig {
    /// Number of graph partitions, one worker each
    pub num_workers: usize,

    /// Maximum number of workers computing concurrently
    pub parallelism: usize,

    /// Global superstep limit; the job stops after this many supersteps
    pub max_global_supersteps: u64,

    /// Buffered remote messages per worker before a batch is flushed
    pub message_batch_size: usize,

    /// Checkpoint frequency (every N supersteps, 0 = disabled)
    pub checkpoint_interval: u64,

    /// How often a job may enter recovery before giving up
    pub max_recovery_attempts: usize,

    /// Upper bound on compensation rounds per recovery
    pub max_compensation_rounds: usize,

    /// Timeout for the entire job (none by default)
    #[serde(with = "humantime_serde")]
    pub job_timeout: Option<Duration>,
}

impl Default for PregelConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get(),
            parallelism: num_cpus::get(),
            max_global_supersteps: 500,
            message_batch_size: 500,
            checkpoint_interval: 10,
            max_recovery_attempts: 3,
            max_compensation_rounds: 16,
            job_timeout: None,
        }
    }
}

impl PregelConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PregelError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PregelError::config_error(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: PregelConfig = serde_json::from_str(&raw).map_err(|e| {
            PregelError::config_error(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Set the number of workers
    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    /// Set parallelism level
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Set the global superstep limit
    pub fn with_max_global_supersteps(mut self, max: u64) -> Self {
        self.max_global_supersteps = max;
        self
    }

    /// Set the remote message batch size
    pub fn with_message_batch_size(mut self, size: usize) -> Self {
        self.message_batch_size = size.max(1);
        self
    }

    /// Set checkpoint interval (0 to disable)
    pub fn with_checkpoint_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Set the recovery attempt limit
    pub fn with_max_recovery_attempts(mut self, attempts: usize) -> Self {
        self.max_recovery_attempts = attempts;
        self
    }

    /// Set the compensation round limit
    pub fn with_max_compensation_rounds(mut self, rounds: usize) -> Self {
        self.max_compensation_rounds = rounds.max(1);
        self
    }

    /// Set job timeout
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    /// Check if checkpointing is enabled
    pub fn checkpointing_enabled(&self) -> bool {
        self.checkpoint_interval > 0
    }

    /// Check if a checkpoint should be taken after this superstep
    #[allow(clippy::manual_is_multiple_of)]
    pub fn should_checkpoint(&self, superstep: u64) -> bool {
        self.checkpointing_enabled() && superstep > 0 && superstep % self.checkpoint_interval == 0
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), PregelError> {
        if self.num_workers == 0 {
            return Err(PregelError::config_error("num_workers must be at least 1"));
        }
        if self.parallelism == 0 {
            return Err(PregelError::config_error("parallelism must be at least 1"));
        }
        if self.message_batch_size == 0 {
            return Err(PregelError::config_error(
                "message_batch_size must be at least 1",
            ));
        }
        if self.max_global_supersteps == 0 {
            return Err(PregelError::config_error(
                "max_global_supersteps must be at least 1",
            ));
        }
        Ok(())
    }
}
