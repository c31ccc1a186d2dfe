//! Crate-wide error handling
//!
//! Runtime conditions the streaming core recovers from (missing pager data,
//! stale extraction results) are not errors here; they degrade to air or are
//! dropped. These variants cover construction and configuration failures.

use glam::IVec3;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or configuring the voxel streaming core
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid region: mins {mins} exceed maxs {maxs}")]
    InvalidRegion { mins: IVec3, maxs: IVec3 },

    #[error("region {mins}..={maxs} exceeds the maximum extent of {max_extent} voxels")]
    RegionTooLarge {
        mins: IVec3,
        maxs: IVec3,
        max_extent: i32,
    },

    #[error("chunk side length {side} must be a power of two between 2 and 256")]
    InvalidChunkSideLength { side: u32 },

    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("failed to read config file {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to build extraction worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type for the streaming core
pub type StreamResult<T> = Result<T, StreamError>;

/// Create a config validation error
pub fn invalid_config(field: &'static str, reason: impl std::fmt::Display) -> StreamError {
    StreamError::InvalidConfig {
        field,
        reason: reason.to_string(),
    }
}
