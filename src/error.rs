//! Error types for the Pregel engine
//!
//! Malformed input, infrastructure failures and partition loss all surface
//! as a [`PregelError`]. Algorithmic misuse (reading an unregistered
//! aggregator) is not an error: those accessors return `None`.

use std::time::Duration;
use thiserror::Error;

use crate::vertex::PregelId;

/// Errors that can occur while setting up or running a Pregel job
#[derive(Debug, Error)]
pub enum PregelError {
    /// A wire batch violated the batch layout
    #[error("Malformed message batch: {0}")]
    MalformedBatch(String),

    /// A message payload could not be decoded by the message format
    #[error("Message decode error: {0}")]
    MessageDecode(String),

    /// A job parameter was missing or invalid
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The graph source could not be turned into vertices
    #[error("Graph load error: {0}")]
    GraphLoad(String),

    /// A vertex document could not be decoded
    #[error("Vertex {vertex_id} could not be decoded: {message}")]
    VertexDecode { vertex_id: PregelId, message: String },

    /// An aggregator value could not be parsed
    #[error("Aggregator '{name}': {message}")]
    Aggregator { name: String, message: String },

    /// Batch delivery through the transport failed
    #[error("Message delivery failed: {0}")]
    Transport(String),

    /// A worker partition was lost and the algorithm cannot compensate
    #[error("Partition of worker {worker} lost")]
    PartitionLost { worker: usize },

    /// Recovery was attempted too many times
    #[error("Max recoveries exceeded: {attempts} attempts")]
    MaxRecoveriesExceeded { attempts: usize },

    /// A worker task failed without a recoverable cause
    #[error("Worker {worker} failed: {message}")]
    WorkerFailed { worker: usize, message: String },

    /// Error in checkpointing
    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    /// Job aborted between supersteps
    #[error("Job cancelled")]
    Cancelled,

    /// Job execution timed out
    #[error("Job timeout after {0:?}")]
    JobTimeout(Duration),
}

impl PregelError {
    /// Create a malformed batch error
    pub fn malformed_batch(message: impl Into<String>) -> Self {
        Self::MalformedBatch(message.into())
    }

    /// Create a message decode error
    pub fn message_decode(message: impl Into<String>) -> Self {
        Self::MessageDecode(message.into())
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    /// Create a config error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a graph load error
    pub fn graph_load(message: impl Into<String>) -> Self {
        Self::GraphLoad(message.into())
    }

    /// Create a vertex decode error
    pub fn vertex_decode(vertex_id: PregelId, message: impl Into<String>) -> Self {
        Self::VertexDecode {
            vertex_id,
            message: message.into(),
        }
    }

    /// Create an aggregator error
    pub fn aggregator(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Aggregator {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a checkpoint error
    pub fn checkpoint_error(message: impl Into<String>) -> Self {
        Self::CheckpointError(message.into())
    }

    /// Create a worker failure
    pub fn worker_failed(worker: usize, message: impl Into<String>) -> Self {
        Self::WorkerFailed {
            worker,
            message: message.into(),
        }
    }

    /// Check if the error can be handled by the recovery path
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PregelError::PartitionLost { .. } | PregelError::WorkerFailed { .. }
        )
    }

    /// Check if the error was caused by bad input rather than by the run
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            PregelError::MalformedBatch(_)
                | PregelError::MessageDecode(_)
                | PregelError::InvalidParameter(_)
                | PregelError::ConfigError(_)
                | PregelError::GraphLoad(_)
                | PregelError::VertexDecode { .. }
        )
    }
}
