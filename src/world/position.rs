use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

/// Position of a chunk in the world (chunk coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Chunk containing the given voxel
    pub fn from_voxel(pos: IVec3, chunk_side: u32) -> Self {
        let side = chunk_side as i32;
        Self::new(
            pos.x.div_euclid(side),
            pos.y.div_euclid(side),
            pos.z.div_euclid(side),
        )
    }

    /// Chunk containing the given world-space point
    pub fn from_world(pos: Vec3, chunk_side: u32) -> Self {
        Self::from_voxel(pos.floor().as_ivec3(), chunk_side)
    }

    /// World-space translation (min corner) of this chunk
    pub fn origin(&self, chunk_side: u32) -> IVec3 {
        IVec3::new(self.x, self.y, self.z) * chunk_side as i32
    }

    /// Create a new chunk position offset by the given amounts
    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

/// Offset of a voxel inside its chunk
pub fn local_offset(pos: IVec3, chunk_side: u32) -> (u32, u32, u32) {
    let side = chunk_side as i32;
    (
        pos.x.rem_euclid(side) as u32,
        pos.y.rem_euclid(side) as u32,
        pos.z.rem_euclid(side) as u32,
    )
}

/// Voxel containing the given world-space point
pub fn voxel_at(pos: Vec3) -> IVec3 {
    pos.floor().as_ivec3()
}
