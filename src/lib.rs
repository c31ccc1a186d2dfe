pub mod config;
pub mod error;
pub mod renderer;
pub mod time;
pub mod world;

pub use config::{EngineConfig, ExtractionConfig, StreamingConfig, VolumeConfig, WorldConfig};
pub use error::{StreamError, StreamResult};
pub use renderer::{
    CacheStats, ChunkMeshData, FrameReport, GraphicsBackend, HeadlessBackend, MeshExtractor, MeshKind, RenderStats,
    StreamingRenderCache, Viewer,
};
pub use time::{Clock, ManualClock, SystemClock};
pub use world::{
    ChunkData, ChunkPos, MemoryPager, NoisePager, PagedVolume, Pager, Region, Voxel, VoxelType, WorldFacade,
};

/// Install `env_logger` with `info` as the default level
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}
