//! Mesh extraction and the streaming render cache

pub mod error;
mod frustum;
mod gpu;
mod mesh;
mod mesh_extractor;
pub mod mesher;
pub mod spiral;
mod streaming_cache;
mod vertex;
mod view_distance;
#[cfg(feature = "wgpu-backend")]
mod wgpu_backend;

pub use error::{GpuError, GpuResult};
pub use frustum::{Aabb, Frustum};
pub use gpu::{BufferHandle, DrawCall, GpuChunkBuffers, GraphicsBackend, HeadlessBackend, ReleaseQueue};
pub use mesh::{ChunkMeshData, Mesh, MeshKind};
pub use mesh_extractor::MeshExtractor;
pub use mesher::extract_chunk_mesh;
pub use streaming_cache::{
    CacheStats, FrameReport, RenderChunkEntry, RenderStats, StreamingRenderCache, UploadFailure, Viewer,
};
pub use vertex::VoxelVertex;
pub use view_distance::ViewDistanceRamp;
#[cfg(feature = "wgpu-backend")]
pub use wgpu_backend::WgpuBackend;
