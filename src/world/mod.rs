//! Voxel data model, the paged volume store and world queries

mod chunk;
mod face;
mod floor_finder;
pub mod generation;
mod paged_volume;
mod pager;
mod position;
mod raycast;
mod region;
mod sampler;
mod voxel;
mod world_facade;

pub use chunk::{ChunkData, ExtractionSnapshot};
pub use face::BlockFace;
pub use floor_finder::find_walkable_floor;
pub use generation::{NoisePager, TerrainSettings};
pub use paged_volume::{PagedVolume, VolumeStats};
pub use pager::{MemoryPager, Pager};
pub use position::{local_offset, voxel_at, ChunkPos};
pub use raycast::{RayStep, RayWalk, RaycastHit};
pub use region::Region;
pub use sampler::VolumeSampler;
pub use voxel::{Voxel, VoxelType};
pub use world_facade::WorldFacade;
