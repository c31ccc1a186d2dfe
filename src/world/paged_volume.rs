//! Paged Volume Store
//!
//! Sparse, unbounded grid of chunks backed by a bounded in-memory cache. Chunks
//! are paged in through a [`Pager`] on first access and paged out again (when
//! dirty) as the least recently touched ones are evicted.

use crate::config::VolumeConfig;
use crate::error::StreamResult;
use crate::world::chunk::Chunk;
use crate::world::{ChunkData, ChunkPos, ExtractionSnapshot, Pager, Region, Voxel};
use glam::IVec3;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Cache counters for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeStats {
    pub resident_chunks: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub page_outs: u64,
    pub failed_page_outs: u64,
    pub missing_data: u64,
}

#[derive(Default)]
struct VolumeCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    page_outs: AtomicU64,
    failed_page_outs: AtomicU64,
    missing_data: AtomicU64,
}

/// Outcome of trying to make a chunk resident under the write lock
enum Residency {
    Resident,
    Uncached(ChunkData),
    NoData,
}

pub struct PagedVolume {
    pager: Arc<dyn Pager>,
    chunk_side: u32,
    max_resident_chunks: usize,
    chunks: RwLock<FxHashMap<ChunkPos, Chunk>>,
    timestamper: AtomicU64,
    counters: VolumeCounters,
}

impl PagedVolume {
    pub fn new(pager: Arc<dyn Pager>, config: &VolumeConfig) -> StreamResult<Self> {
        config.validate()?;
        log::info!(
            "[PagedVolume::new] Chunk side {}, budget {} chunks",
            config.chunk_side,
            config.max_resident_chunks
        );
        Ok(Self {
            pager,
            chunk_side: config.chunk_side,
            max_resident_chunks: config.max_resident_chunks,
            chunks: RwLock::new(FxHashMap::default()),
            timestamper: AtomicU64::new(0),
            counters: VolumeCounters::default(),
        })
    }

    pub fn chunk_side(&self) -> u32 {
        self.chunk_side
    }

    pub fn max_resident_chunks(&self) -> usize {
        self.max_resident_chunks
    }

    pub fn pager(&self) -> &Arc<dyn Pager> {
        &self.pager
    }

    pub fn resident_chunks(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn is_resident(&self, pos: ChunkPos) -> bool {
        self.chunks.read().contains_key(&pos)
    }

    pub fn is_dirty(&self, pos: ChunkPos) -> bool {
        self.chunks.read().get(&pos).map_or(false, |chunk| chunk.dirty)
    }

    fn next_stamp(&self) -> u64 {
        self.timestamper.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Read a voxel, paging its chunk in on a miss
    ///
    /// Positions whose chunk the pager has no data for read as air.
    pub fn voxel(&self, pos: IVec3) -> Voxel {
        match self.chunk(ChunkPos::from_voxel(pos, self.chunk_side)) {
            Some(chunk) => chunk.get_world(pos),
            None => Voxel::AIR,
        }
    }

    /// Write a voxel, paging its chunk in on a miss
    ///
    /// Returns `false` when the write was dropped because the pager had no data
    /// for the chunk (or an uncached write could not be paged out).
    pub fn set_voxel(&self, pos: IVec3, voxel: Voxel) -> bool {
        let chunk_pos = ChunkPos::from_voxel(pos, self.chunk_side);
        let mut chunks = self.chunks.write();

        match self.make_resident(&mut chunks, chunk_pos) {
            Residency::Resident => {
                let stamp = self.next_stamp();
                match chunks.get_mut(&chunk_pos) {
                    Some(chunk) => {
                        chunk.touch(stamp);
                        chunk.data_mut().set_world(pos, voxel);
                        true
                    }
                    None => false,
                }
            }
            Residency::Uncached(mut data) => {
                // Cache is full of pinned or unflushable chunks, write straight through
                data.set_world(pos, voxel);
                let region = Region::for_chunk(chunk_pos, self.chunk_side);
                if self.page_out(&region, &data) {
                    true
                } else {
                    log::warn!(
                        "[PagedVolume::set_voxel] Dropped write at {} (chunk {:?} could not be cached or paged out)",
                        pos,
                        chunk_pos
                    );
                    false
                }
            }
            Residency::NoData => {
                log::warn!(
                    "[PagedVolume::set_voxel] Dropped write at {}: no data for chunk {:?}",
                    pos,
                    chunk_pos
                );
                false
            }
        }
    }

    /// Shared handle to a chunk's voxels, paging it in on a miss
    pub fn chunk(&self, pos: ChunkPos) -> Option<Arc<ChunkData>> {
        if let Some(data) = self.chunk_snapshot(pos) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Some(data);
        }

        let mut chunks = self.chunks.write();
        match self.make_resident(&mut chunks, pos) {
            Residency::Resident => chunks.get(&pos).map(|chunk| Arc::clone(&chunk.data)),
            Residency::Uncached(data) => Some(Arc::new(data)),
            Residency::NoData => None,
        }
    }

    /// Shared handle to a resident chunk, without paging
    pub fn chunk_snapshot(&self, pos: ChunkPos) -> Option<Arc<ChunkData>> {
        let chunks = self.chunks.read();
        let chunk = chunks.get(&pos)?;
        chunk.touch(self.next_stamp());
        Some(Arc::clone(&chunk.data))
    }

    /// Make sure a chunk is resident, returns whether the pager had data for it
    pub fn prefetch(&self, pos: ChunkPos) -> bool {
        self.chunk(pos).is_some()
    }

    /// Copy a resident chunk plus a one voxel border out of the store
    ///
    /// Neighbours that are not resident contribute air. Returns `None` when
    /// the chunk itself is not resident.
    pub fn extraction_snapshot(&self, pos: ChunkPos) -> Option<ExtractionSnapshot> {
        let mut neighbours: [Option<Arc<ChunkData>>; 27] = Default::default();
        let center = {
            let chunks = self.chunks.read();
            let center = Arc::clone(&chunks.get(&pos)?.data);
            for dz in -1..=1 {
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        if (dx, dy, dz) == (0, 0, 0) {
                            continue;
                        }
                        let slot = ((dx + 1) + (dy + 1) * 3 + (dz + 1) * 9) as usize;
                        neighbours[slot] = chunks
                            .get(&pos.offset(dx, dy, dz))
                            .map(|chunk| Arc::clone(&chunk.data));
                    }
                }
            }
            center
        };

        Some(ExtractionSnapshot::assemble(&center, &neighbours))
    }

    /// Keep a chunk from being evicted until a matching [`PagedVolume::unpin`]
    pub fn pin(&self, pos: ChunkPos) -> bool {
        let mut chunks = self.chunks.write();
        if !matches!(self.make_resident(&mut chunks, pos), Residency::Resident) {
            return false;
        }
        match chunks.get_mut(&pos) {
            Some(chunk) => {
                chunk.pins += 1;
                true
            }
            None => false,
        }
    }

    pub fn unpin(&self, pos: ChunkPos) {
        if let Some(chunk) = self.chunks.write().get_mut(&pos) {
            chunk.pins = chunk.pins.saturating_sub(1);
        }
    }

    /// Page out every dirty chunk and empty the cache
    ///
    /// Chunks whose page-out fails stay resident. Returns the number of
    /// chunks paged out.
    pub fn flush_all(&self) -> usize {
        let mut chunks = self.chunks.write();
        let before = chunks.len();
        let mut paged_out = 0;

        chunks.retain(|pos, chunk| {
            if !chunk.dirty {
                return false;
            }
            let region = Region::for_chunk(*pos, self.chunk_side);
            if self.page_out(&region, &chunk.data) {
                paged_out += 1;
                false
            } else {
                true
            }
        });

        log::info!(
            "[PagedVolume::flush_all] Paged out {} of {} chunks, {} kept after failed page-out",
            paged_out,
            before,
            chunks.len()
        );
        paged_out
    }

    /// Page out every dirty chunk, keeping it resident as a clean chunk
    pub fn flush_dirty(&self) -> usize {
        let mut chunks = self.chunks.write();
        let mut paged_out = 0;
        for (pos, chunk) in chunks.iter_mut().filter(|(_, chunk)| chunk.dirty) {
            let region = Region::for_chunk(*pos, self.chunk_side);
            if self.page_out(&region, &chunk.data) {
                chunk.dirty = false;
                paged_out += 1;
            }
        }
        log::debug!("[PagedVolume::flush_dirty] Paged out {} chunks", paged_out);
        paged_out
    }

    pub fn stats(&self) -> VolumeStats {
        VolumeStats {
            resident_chunks: self.resident_chunks(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            page_outs: self.counters.page_outs.load(Ordering::Relaxed),
            failed_page_outs: self.counters.failed_page_outs.load(Ordering::Relaxed),
            missing_data: self.counters.missing_data.load(Ordering::Relaxed),
        }
    }

    fn make_resident(&self, chunks: &mut FxHashMap<ChunkPos, Chunk>, pos: ChunkPos) -> Residency {
        // Another thread may have paged it in while we waited for the lock
        if let Some(chunk) = chunks.get(&pos) {
            chunk.touch(self.next_stamp());
            return Residency::Resident;
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let region = Region::for_chunk(pos, self.chunk_side);
        let data = match self.pager.page_in(&region) {
            Some(data) => data,
            None => {
                self.counters.missing_data.fetch_add(1, Ordering::Relaxed);
                log::debug!("[PagedVolume::make_resident] No data for chunk {:?}", pos);
                return Residency::NoData;
            }
        };
        if data.side() != self.chunk_side || data.position() != pos {
            log::error!(
                "[PagedVolume::make_resident] Pager returned chunk {:?} (side {}) for {:?} (side {})",
                data.position(),
                data.side(),
                pos,
                self.chunk_side
            );
            self.counters.missing_data.fetch_add(1, Ordering::Relaxed);
            return Residency::NoData;
        }

        while chunks.len() >= self.max_resident_chunks {
            if !self.evict_oldest(chunks) {
                log::debug!(
                    "[PagedVolume::make_resident] No evictable chunk, serving {:?} uncached",
                    pos
                );
                return Residency::Uncached(data);
            }
        }

        chunks.insert(pos, Chunk::new(data, self.next_stamp()));
        Residency::Resident
    }

    /// Evict the least recently touched chunk that is not pinned
    ///
    /// Dirty chunks are only dropped after a successful page-out.
    fn evict_oldest(&self, chunks: &mut FxHashMap<ChunkPos, Chunk>) -> bool {
        let mut candidates: Vec<(u64, ChunkPos)> = chunks
            .iter()
            .filter(|(_, chunk)| chunk.pins == 0)
            .map(|(pos, chunk)| (chunk.last_touched(), *pos))
            .collect();
        candidates.sort_unstable();

        for (_, pos) in candidates {
            let Some(chunk) = chunks.get(&pos) else {
                continue;
            };
            if chunk.dirty {
                let region = Region::for_chunk(pos, self.chunk_side);
                if !self.page_out(&region, &chunk.data) {
                    continue;
                }
            }
            chunks.remove(&pos);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            log::debug!("[PagedVolume::evict_oldest] Evicted chunk {:?}", pos);
            return true;
        }
        false
    }

    fn page_out(&self, region: &Region, data: &ChunkData) -> bool {
        if self.pager.page_out(region, data) {
            self.counters.page_outs.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.counters.failed_page_outs.fetch_add(1, Ordering::Relaxed);
            log::error!(
                "[PagedVolume::page_out] Pager refused chunk {:?}, keeping it",
                data.position()
            );
            false
        }
    }
}
