use crate::world::{ChunkData, ChunkPos, Region};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Supplies and persists chunk contents for the paged volume
///
/// The store never assumes where the data comes from: a procedural generator,
/// a network fetcher and a disk loader all fit behind this trait.
pub trait Pager: Send + Sync {
    /// Produce the contents of `region` (always exactly one chunk), or `None`
    /// when no data is available
    fn page_in(&self, region: &Region) -> Option<ChunkData>;

    /// Persist or discard a chunk that is leaving the cache
    ///
    /// Returning `false` keeps a dirty chunk resident.
    fn page_out(&self, region: &Region, chunk: &ChunkData) -> bool;

    /// Reseed a procedural source, ignored by pagers without one
    fn set_seed(&self, _seed: u64) {}
}

/// Pager that keeps paged-out chunks in memory
///
/// Chunks it has never seen come from the fallback pager, or are filled with
/// air when there is none.
pub struct MemoryPager {
    chunk_side: u32,
    stored: Mutex<FxHashMap<ChunkPos, ChunkData>>,
    fallback: Option<Arc<dyn Pager>>,
}

impl MemoryPager {
    pub fn new(chunk_side: u32) -> Self {
        Self {
            chunk_side,
            stored: Mutex::new(FxHashMap::default()),
            fallback: None,
        }
    }

    pub fn with_fallback(chunk_side: u32, fallback: Arc<dyn Pager>) -> Self {
        Self {
            fallback: Some(fallback),
            ..Self::new(chunk_side)
        }
    }

    /// Number of chunks written back so far
    pub fn stored_chunks(&self) -> usize {
        self.stored.lock().len()
    }

    pub fn stored_chunk(&self, pos: ChunkPos) -> Option<ChunkData> {
        self.stored.lock().get(&pos).cloned()
    }
}

impl Pager for MemoryPager {
    fn page_in(&self, region: &Region) -> Option<ChunkData> {
        let pos = ChunkPos::from_voxel(region.mins(), self.chunk_side);
        if let Some(chunk) = self.stored.lock().get(&pos) {
            return Some(chunk.clone());
        }
        match &self.fallback {
            Some(fallback) => fallback.page_in(region),
            None => Some(ChunkData::new(pos, self.chunk_side)),
        }
    }

    fn page_out(&self, _region: &Region, chunk: &ChunkData) -> bool {
        log::debug!("[MemoryPager::page_out] Storing chunk {:?}", chunk.position());
        self.stored.lock().insert(chunk.position(), chunk.clone());
        true
    }

    fn set_seed(&self, seed: u64) {
        if let Some(fallback) = &self.fallback {
            fallback.set_seed(seed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Voxel, VoxelType};
    use glam::IVec3;

    #[test]
    fn test_unknown_chunks_are_air() {
        let pager = MemoryPager::new(8);
        let chunk = pager
            .page_in(&Region::for_chunk(ChunkPos::new(2, -1, 0), 8))
            .expect("memory pager always has data");
        assert_eq!(chunk.position(), ChunkPos::new(2, -1, 0));
        assert!(chunk.is_empty());
    }

    #[test]
    fn test_paged_out_chunks_come_back() {
        let pager = MemoryPager::new(8);
        let pos = ChunkPos::new(0, 1, 0);
        let region = Region::for_chunk(pos, 8);
        let mut chunk = ChunkData::new(pos, 8);
        chunk.set_world(IVec3::new(1, 9, 1), Voxel::new(VoxelType::Wood, 4));

        assert!(pager.page_out(&region, &chunk));
        assert_eq!(pager.stored_chunks(), 1);
        assert_eq!(pager.page_in(&region), Some(chunk));
    }
}
