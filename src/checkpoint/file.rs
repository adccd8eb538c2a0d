//! File-based Checkpointer Implementation
//!
//! Stores checkpoints as JSON files, one directory per worker.
//! Supports optional compression via zstd for reduced storage.
//!
//! # Directory Structure
//!
//! ```text
//! checkpoints/
//! └── {job_id}/
//!     ├── worker_000/
//!     │   ├── checkpoint_00010.json[.zst]
//!     │   └── checkpoint_00020.json[.zst]
//!     └── worker_001/
//!         └── checkpoint_00010.json[.zst]
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{Checkpoint, Checkpointer};
use crate::error::PregelError;

/// File-based checkpointer that stores checkpoints as JSON files.
///
/// Atomic writes are ensured via temporary file + rename pattern.
#[derive(Debug)]
pub struct FileCheckpointer {
    /// Job-specific subdirectory
    job_path: PathBuf,
    /// Whether to compress checkpoints with zstd
    compression: bool,
}

impl FileCheckpointer {
    /// Create a new file-based checkpointer.
    ///
    /// # Arguments
    ///
    /// * `base_path` - Base directory for storing checkpoints
    /// * `job_id` - Unique identifier of the job
    /// * `compression` - Whether to compress checkpoint data
    pub fn new(base_path: impl Into<PathBuf>, job_id: impl AsRef<str>, compression: bool) -> Self {
        let base_path = base_path.into();
        Self {
            job_path: base_path.join(job_id.as_ref()),
            compression,
        }
    }

    fn worker_path(&self, worker: usize) -> PathBuf {
        self.job_path.join(format!("worker_{:03}", worker))
    }

    /// Get the file path for a checkpoint at a given superstep
    fn checkpoint_path(&self, worker: usize, superstep: u64) -> PathBuf {
        let filename = if self.compression {
            format!("checkpoint_{:05}.json.zst", superstep)
        } else {
            format!("checkpoint_{:05}.json", superstep)
        };
        self.worker_path(worker).join(filename)
    }

    /// Get the temporary file path for atomic writes
    fn temp_path(&self, worker: usize, superstep: u64) -> PathBuf {
        self.worker_path(worker)
            .join(format!("checkpoint_{:05}.tmp", superstep))
    }

    /// Compress data using zstd
    fn compress(data: &[u8]) -> Result<Vec<u8>, PregelError> {
        let mut encoder = zstd::stream::Encoder::new(Vec::new(), 3)
            .map_err(|e| PregelError::checkpoint_error(format!("Compression init failed: {}", e)))?;
        encoder
            .write_all(data)
            .map_err(|e| PregelError::checkpoint_error(format!("Compression write failed: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| PregelError::checkpoint_error(format!("Compression finish failed: {}", e)))
    }

    /// Decompress data using zstd
    fn decompress(data: &[u8]) -> Result<Vec<u8>, PregelError> {
        zstd::stream::decode_all(data)
            .map_err(|e| PregelError::checkpoint_error(format!("Decompression failed: {}", e)))
    }

    /// Parse superstep number from a finished checkpoint filename
    fn parse_superstep(path: &Path) -> Option<u64> {
        let filename = path.file_name()?.to_str()?;
        let rest = filename.strip_prefix("checkpoint_")?;
        let (num_part, extension) = rest.split_once('.')?;
        if !extension.starts_with("json") {
            return None;
        }
        num_part.parse().ok()
    }

    async fn list_supersteps(&self, worker: usize) -> Result<Vec<u64>, PregelError> {
        let dir = self.worker_path(worker);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| PregelError::checkpoint_error(format!("Failed to read directory: {}", e)))?;

        let mut supersteps = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PregelError::checkpoint_error(format!("Failed to read entry: {}", e)))?
        {
            if let Some(superstep) = Self::parse_superstep(&entry.path()) {
                supersteps.push(superstep);
            }
        }

        supersteps.sort_unstable();
        Ok(supersteps)
    }
}

#[async_trait]
impl<V, E> Checkpointer<V, E> for FileCheckpointer
where
    V: Serialize + DeserializeOwned + Send + Sync,
    E: Serialize + DeserializeOwned + Send + Sync,
{
    async fn save(&self, checkpoint: &Checkpoint<V, E>) -> Result<(), PregelError> {
        fs::create_dir_all(self.worker_path(checkpoint.worker))
            .await
            .map_err(|e| PregelError::checkpoint_error(format!("Failed to create directory: {}", e)))?;

        let json = serde_json::to_vec(checkpoint)
            .map_err(|e| PregelError::checkpoint_error(format!("Serialization failed: {}", e)))?;

        let data = if self.compression {
            Self::compress(&json)?
        } else {
            json
        };

        // Write to temp file first, then rename into place
        let temp_path = self.temp_path(checkpoint.worker, checkpoint.superstep);
        let final_path = self.checkpoint_path(checkpoint.worker, checkpoint.superstep);

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| PregelError::checkpoint_error(format!("Failed to create temp file: {}", e)))?;

        file.write_all(&data)
            .await
            .map_err(|e| PregelError::checkpoint_error(format!("Failed to write data: {}", e)))?;

        file.sync_all()
            .await
            .map_err(|e| PregelError::checkpoint_error(format!("Failed to sync file: {}", e)))?;

        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| PregelError::checkpoint_error(format!("Failed to rename file: {}", e)))?;

        Ok(())
    }

    async fn load(&self, worker: usize, superstep: u64) -> Result<Option<Checkpoint<V, E>>, PregelError> {
        let path = self.checkpoint_path(worker, superstep);
        if !path.exists() {
            return Ok(None);
        }

        let mut file = fs::File::open(&path)
            .await
            .map_err(|e| PregelError::checkpoint_error(format!("Failed to open file: {}", e)))?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .await
            .map_err(|e| PregelError::checkpoint_error(format!("Failed to read file: {}", e)))?;

        let json = if self.compression {
            Self::decompress(&data)?
        } else {
            data
        };

        let checkpoint = serde_json::from_slice(&json)
            .map_err(|e| PregelError::checkpoint_error(format!("Deserialization failed: {}", e)))?;

        Ok(Some(checkpoint))
    }

    async fn latest(&self, worker: usize) -> Result<Option<Checkpoint<V, E>>, PregelError> {
        match self.list_supersteps(worker).await?.last() {
            Some(&superstep) => self.load(worker, superstep).await,
            None => Ok(None),
        }
    }

    async fn list(&self, worker: usize) -> Result<Vec<u64>, PregelError> {
        self.list_supersteps(worker).await
    }

    async fn delete(&self, worker: usize, superstep: u64) -> Result<(), PregelError> {
        let path = self.checkpoint_path(worker, superstep);
        if path.exists() {
            fs::remove_file(&path)
                .await
                .map_err(|e| PregelError::checkpoint_error(format!("Failed to delete file: {}", e)))?;
        }
        Ok(())
    }
}
