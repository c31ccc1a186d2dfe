use crate::world::{local_offset, BlockFace, ChunkData, ChunkPos, PagedVolume, Voxel};
use glam::IVec3;
use std::sync::Arc;

/// Stateful cursor over a [`PagedVolume`]
///
/// Caches the addressed chunk and the voxel index inside it, so moving one
/// voxel along an axis only goes back to the store when it crosses a chunk
/// boundary. Not meant to be shared between threads; create one per traversal.
pub struct VolumeSampler<'a> {
    volume: &'a PagedVolume,
    position: IVec3,
    chunk_pos: ChunkPos,
    chunk: Option<Arc<ChunkData>>,
    local: (u32, u32, u32),
    index: usize,
}

impl<'a> VolumeSampler<'a> {
    pub fn new(volume: &'a PagedVolume) -> Self {
        let mut sampler = Self {
            volume,
            position: IVec3::ZERO,
            chunk_pos: ChunkPos::new(0, 0, 0),
            chunk: None,
            local: (0, 0, 0),
            index: 0,
        };
        sampler.set_position(IVec3::ZERO);
        sampler
    }

    pub fn volume(&self) -> &'a PagedVolume {
        self.volume
    }

    pub fn position(&self) -> IVec3 {
        self.position
    }

    /// Jump to an arbitrary voxel, resolving its chunk through the store
    pub fn set_position(&mut self, pos: IVec3) {
        let side = self.volume.chunk_side();
        self.position = pos;
        self.local = local_offset(pos, side);
        let chunk_pos = ChunkPos::from_voxel(pos, side);
        if self.chunk.is_none() || chunk_pos != self.chunk_pos {
            self.chunk_pos = chunk_pos;
            self.chunk = self.volume.chunk(chunk_pos);
        }
        self.update_index();
    }

    /// Step one voxel in `direction`
    pub fn move_in_direction(&mut self, direction: BlockFace) {
        let side = self.volume.chunk_side();
        let axis = direction.axis();
        let local = match axis {
            0 => &mut self.local.0,
            1 => &mut self.local.1,
            _ => &mut self.local.2,
        };

        let crosses = if direction.is_positive() {
            *local + 1 >= side
        } else {
            *local == 0
        };

        if crosses {
            self.set_position(self.position + direction.offset());
            return;
        }

        if direction.is_positive() {
            *local += 1;
        } else {
            *local -= 1;
        }
        self.position += direction.offset();
        self.update_index();
    }

    /// Voxel at the current position, air when the chunk has no data
    pub fn voxel(&self) -> Voxel {
        match &self.chunk {
            Some(chunk) => chunk.voxel_at_index(self.index),
            None => Voxel::AIR,
        }
    }

    /// Voxel next to the current position, without moving
    pub fn peek(&self, direction: BlockFace) -> Voxel {
        let target = self.position + direction.offset();
        let side = self.volume.chunk_side();
        if ChunkPos::from_voxel(target, side) == self.chunk_pos {
            if let Some(chunk) = &self.chunk {
                return chunk.get_world(target);
            }
        }
        self.volume.voxel(target)
    }

    /// Whether the addressed chunk had data in the pager
    pub fn current_position_valid(&self) -> bool {
        self.chunk.is_some()
    }

    /// Write through to the store and refresh the cached chunk
    pub fn set_voxel(&mut self, voxel: Voxel) -> bool {
        let written = self.volume.set_voxel(self.position, voxel);
        if written {
            self.chunk = self.volume.chunk(self.chunk_pos);
        }
        written
    }

    fn update_index(&mut self) {
        if let Some(chunk) = &self.chunk {
            let (x, y, z) = self.local;
            self.index = chunk.index(x, y, z);
        }
    }
}
