//! Renderer subsystem error handling
//!
//! GPU failures are recoverable per chunk: the streaming cache keeps the mesh
//! and retries the upload on the next frame.

use crate::renderer::gpu::BufferHandle;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GpuError {
    #[error("out of GPU memory while allocating {bytes} bytes")]
    OutOfMemory { bytes: u64 },

    #[error("GPU operation '{operation}' failed: {error}")]
    OperationFailed { operation: String, error: String },

    #[error("unknown buffer handle {0:?}")]
    UnknownHandle(BufferHandle),
}

/// Type alias for renderer operation results
pub type GpuResult<T> = Result<T, GpuError>;

/// Create a GPU operation error
pub fn gpu_operation_error(operation: &str, error: impl std::fmt::Display) -> GpuError {
    GpuError::OperationFailed {
        operation: operation.to_string(),
        error: error.to_string(),
    }
}
