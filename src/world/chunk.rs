use crate::world::{local_offset, ChunkPos, Voxel};
use glam::IVec3;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Voxel contents of one chunk
///
/// This is the unit exchanged with a [`Pager`](crate::world::Pager). Inside
/// the store it is shared through an `Arc` so readers and extraction jobs can
/// hold on to it while writers clone on write.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkData {
    position: ChunkPos,
    side: u32,
    voxels: Vec<Voxel>,
}

impl ChunkData {
    /// Create a chunk filled with air
    pub fn new(position: ChunkPos, side: u32) -> Self {
        Self::filled(position, side, Voxel::AIR)
    }

    pub fn filled(position: ChunkPos, side: u32, voxel: Voxel) -> Self {
        Self {
            position,
            side,
            voxels: vec![voxel; (side * side * side) as usize],
        }
    }

    pub fn position(&self) -> ChunkPos {
        self.position
    }

    pub fn side(&self) -> u32 {
        self.side
    }

    /// World-space min corner of this chunk
    pub fn origin(&self) -> IVec3 {
        self.position.origin(self.side)
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32, z: u32) -> usize {
        (x + y * self.side + z * self.side * self.side) as usize
    }

    /// Get voxel at local position, air when out of bounds
    pub fn get(&self, x: u32, y: u32, z: u32) -> Voxel {
        if x >= self.side || y >= self.side || z >= self.side {
            return Voxel::AIR;
        }
        self.voxels[self.index(x, y, z)]
    }

    /// Set voxel at local position, ignored when out of bounds
    pub fn set(&mut self, x: u32, y: u32, z: u32, voxel: Voxel) {
        if x >= self.side || y >= self.side || z >= self.side {
            return;
        }
        let index = self.index(x, y, z);
        self.voxels[index] = voxel;
    }

    /// Get voxel by world position, which must lie inside this chunk
    pub fn get_world(&self, pos: IVec3) -> Voxel {
        let (x, y, z) = local_offset(pos, self.side);
        self.get(x, y, z)
    }

    pub fn set_world(&mut self, pos: IVec3, voxel: Voxel) {
        let (x, y, z) = local_offset(pos, self.side);
        self.set(x, y, z, voxel);
    }

    #[inline]
    pub fn voxel_at_index(&self, index: usize) -> Voxel {
        self.voxels.get(index).copied().unwrap_or(Voxel::AIR)
    }

    pub fn voxels(&self) -> &[Voxel] {
        &self.voxels
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.iter().all(Voxel::is_air)
    }
}

/// A resident chunk as tracked by the paged volume
pub(crate) struct Chunk {
    pub(crate) data: Arc<ChunkData>,
    pub(crate) dirty: bool,
    pub(crate) pins: u32,
    last_touched: AtomicU64,
}

impl Chunk {
    pub(crate) fn new(data: ChunkData, stamp: u64) -> Self {
        Self {
            data: Arc::new(data),
            dirty: false,
            pins: 0,
            last_touched: AtomicU64::new(stamp),
        }
    }

    /// Record an access, callable under a shared lock
    pub(crate) fn touch(&self, stamp: u64) {
        self.last_touched.fetch_max(stamp, Ordering::Relaxed);
    }

    pub(crate) fn last_touched(&self) -> u64 {
        self.last_touched.load(Ordering::Relaxed)
    }

    /// Mutable access to the voxels, cloning them if a snapshot still holds them
    pub(crate) fn data_mut(&mut self) -> &mut ChunkData {
        self.dirty = true;
        Arc::make_mut(&mut self.data)
    }
}

/// Immutable copy of a chunk plus a one voxel border taken from its neighbours
///
/// Extraction jobs own one of these, so they never touch the live store.
#[derive(Debug, Clone)]
pub struct ExtractionSnapshot {
    position: ChunkPos,
    side: u32,
    padded_side: u32,
    voxels: Vec<Voxel>,
}

impl ExtractionSnapshot {
    /// Build a snapshot from the 3x3x3 block of chunks around `center`
    ///
    /// `neighbours` is indexed `(dx+1) + (dy+1)*3 + (dz+1)*9`; missing
    /// neighbours contribute air.
    pub(crate) fn assemble(center: &ChunkData, neighbours: &[Option<Arc<ChunkData>>; 27]) -> Self {
        let side = center.side();
        let padded_side = side + 2;
        let mut voxels = vec![Voxel::AIR; (padded_side * padded_side * padded_side) as usize];
        let s = side as i32;

        for pz in 0..padded_side as i32 {
            for py in 0..padded_side as i32 {
                for px in 0..padded_side as i32 {
                    let (lx, ly, lz) = (px - 1, py - 1, pz - 1);
                    let (cx, cy, cz) = (lx.div_euclid(s), ly.div_euclid(s), lz.div_euclid(s));
                    let slot = ((cx + 1) + (cy + 1) * 3 + (cz + 1) * 9) as usize;
                    let voxel = if slot == 13 {
                        center.get(lx as u32, ly as u32, lz as u32)
                    } else {
                        match &neighbours[slot] {
                            Some(chunk) => chunk.get(
                                lx.rem_euclid(s) as u32,
                                ly.rem_euclid(s) as u32,
                                lz.rem_euclid(s) as u32,
                            ),
                            None => Voxel::AIR,
                        }
                    };
                    let index = (px as u32 + py as u32 * padded_side + pz as u32 * padded_side * padded_side) as usize;
                    voxels[index] = voxel;
                }
            }
        }

        Self {
            position: center.position(),
            side,
            padded_side,
            voxels,
        }
    }

    pub fn position(&self) -> ChunkPos {
        self.position
    }

    pub fn side(&self) -> u32 {
        self.side
    }

    /// Voxel at a chunk-local coordinate, `-1..=side` is valid on every axis
    #[inline]
    pub fn get(&self, x: i32, y: i32, z: i32) -> Voxel {
        let p = self.padded_side as i32;
        let (px, py, pz) = (x + 1, y + 1, z + 1);
        if px < 0 || py < 0 || pz < 0 || px >= p || py >= p || pz >= p {
            return Voxel::AIR;
        }
        self.voxels[(px + py * p + pz * p * p) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::VoxelType;

    #[test]
    fn test_get_set_local() {
        let mut chunk = ChunkData::new(ChunkPos::new(0, 0, 0), 8);
        let rock = Voxel::new(VoxelType::Rock, 1);
        chunk.set(1, 2, 3, rock);
        assert_eq!(chunk.get(1, 2, 3), rock);
        assert_eq!(chunk.get(3, 2, 1), Voxel::AIR);
        assert_eq!(chunk.get(8, 0, 0), Voxel::AIR);
        assert!(!chunk.is_empty());
    }

    #[test]
    fn test_world_addressing_for_negative_chunk() {
        let mut chunk = ChunkData::new(ChunkPos::new(-1, 0, 0), 8);
        let dirt = Voxel::new(VoxelType::Dirt, 0);
        chunk.set_world(IVec3::new(-1, 0, 0), dirt);
        assert_eq!(chunk.get(7, 0, 0), dirt);
        assert_eq!(chunk.origin(), IVec3::new(-8, 0, 0));
    }

    #[test]
    fn test_snapshot_reads_border_from_neighbours() {
        let side = 4;
        let center = ChunkData::new(ChunkPos::new(0, 0, 0), side);
        let rock = Voxel::new(VoxelType::Rock, 0);
        let mut east = ChunkData::new(ChunkPos::new(1, 0, 0), side);
        east.set(0, 2, 1, rock);

        let mut neighbours: [Option<Arc<ChunkData>>; 27] = Default::default();
        neighbours[2 + 3 + 9] = Some(Arc::new(east));

        let snapshot = ExtractionSnapshot::assemble(&center, &neighbours);
        assert_eq!(snapshot.get(4, 2, 1), rock);
        assert_eq!(snapshot.get(3, 2, 1), Voxel::AIR);
        assert_eq!(snapshot.get(-1, 2, 1), Voxel::AIR);
        assert_eq!(snapshot.get(6, 0, 0), Voxel::AIR);
    }

    #[test]
    fn test_data_mut_clones_shared_voxels() {
        let mut chunk = Chunk::new(ChunkData::new(ChunkPos::new(0, 0, 0), 4), 1);
        let held = Arc::clone(&chunk.data);
        chunk.data_mut().set(0, 0, 0, Voxel::new(VoxelType::Sand, 0));

        assert!(chunk.dirty);
        assert_eq!(held.get(0, 0, 0), Voxel::AIR);
        assert_eq!(chunk.data.get(0, 0, 0).material(), VoxelType::Sand);
    }
}
