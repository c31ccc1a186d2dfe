//! Streaming render cache
//!
//! Keeps the set of GPU-resident chunk meshes in step with a moving viewer.
//! Per chunk coordinate the cache walks `NotTracked -> Scheduled -> MeshReady
//! -> Resident -> Evicted`:
//!
//! - `update` schedules extraction for every coordinate in range, nearest
//!   first, and uploads at most `max_meshes_per_frame` completed meshes.
//! - `render` evicts entries beyond `view distance + culling threshold`,
//!   skips entries outside the frustum and draws the rest.
//!
//! Scheduling and eviction share one distance test, so a coordinate at the
//! boundary is either kept or dropped, never both on alternating frames.

use crate::config::{ExtractionConfig, StreamingConfig};
use crate::error::StreamResult;
use crate::renderer::error::GpuError;
use crate::renderer::frustum::{Aabb, Frustum};
use crate::renderer::gpu::{BufferHandle, GpuChunkBuffers, GraphicsBackend, ReleaseQueue};
use crate::renderer::mesh::{ChunkMeshData, MeshKind};
use crate::renderer::mesh_extractor::MeshExtractor;
use crate::renderer::spiral::spiral;
use crate::renderer::view_distance::ViewDistanceRamp;
use crate::time::Clock;
use crate::world::{ChunkPos, PagedVolume};
use glam::{IVec3, Mat4, Vec3};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::sync::Arc;

/// Camera state the cache streams around
#[derive(Debug, Clone, Copy)]
pub struct Viewer {
    pub position: Vec3,
    pub frustum: Frustum,
}

impl Viewer {
    /// Viewer that sees in every direction
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            frustum: Frustum::everything(),
        }
    }

    pub fn with_frustum(position: Vec3, frustum: Frustum) -> Self {
        Self { position, frustum }
    }

    pub fn from_view_projection(position: Vec3, view_proj: &Mat4) -> Self {
        Self::with_frustum(position, Frustum::from_view_projection(view_proj))
    }
}

/// A mesh that could not be uploaded this frame, retried on the next one
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFailure {
    pub chunk_pos: ChunkPos,
    pub error: GpuError,
}

/// What one `update` call did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub view_distance: f32,
    pub scheduled: usize,
    pub uploaded: usize,
    pub empty: usize,
    pub stale: usize,
    pub released: usize,
    pub failures: Vec<UploadFailure>,
}

/// What one `render` call did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub visible_chunks: usize,
    pub frustum_culled: usize,
    pub evicted: usize,
    pub draw_calls: usize,
}

/// Diagnostics for overlays and logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub resident_chunks: usize,
    pub pending_jobs: usize,
    pub queued_meshes: usize,
}

/// GPU-resident mesh of one chunk
pub struct RenderChunkEntry {
    buffers: GpuChunkBuffers,
    translation: IVec3,
    aabb: Aabb,
}

impl RenderChunkEntry {
    pub fn translation(&self) -> IVec3 {
        self.translation
    }

    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    pub fn handles(&self) -> impl Iterator<Item = BufferHandle> + '_ {
        self.buffers.handles()
    }

    pub fn has_kind(&self, kind: MeshKind) -> bool {
        self.buffers.has_kind(kind)
    }
}

enum MeshOutcome {
    Uploaded,
    Empty,
    Stale,
    Failed(ChunkMeshData, GpuError),
}

pub struct StreamingRenderCache<B: GraphicsBackend> {
    volume: Arc<PagedVolume>,
    extractor: MeshExtractor,
    backend: B,
    clock: Box<dyn Clock>,
    config: StreamingConfig,
    chunk_side: u32,
    culling_threshold: f32,
    ramp: ViewDistanceRamp,
    entries: FxHashMap<ChunkPos, RenderChunkEntry>,
    /// Coordinates scheduled since they last came into range
    extracted: FxHashSet<ChunkPos>,
    invalidated: FxHashSet<ChunkPos>,
    retry_queue: VecDeque<ChunkMeshData>,
    release_queue: ReleaseQueue,
    viewer_cell: Option<ChunkPos>,
    last_scan: Option<(Vec3, f32)>,
}

impl<B: GraphicsBackend> StreamingRenderCache<B> {
    pub fn new(
        volume: Arc<PagedVolume>,
        backend: B,
        clock: Box<dyn Clock>,
        config: StreamingConfig,
        extraction: &ExtractionConfig,
    ) -> StreamResult<Self> {
        config.validate()?;
        let chunk_side = volume.chunk_side();
        let extractor = MeshExtractor::new(Arc::clone(&volume), extraction)?;
        let culling_threshold = config.culling_threshold(chunk_side);
        let mut ramp = ViewDistanceRamp::new(config.initial_view_distance, config.target_view_distance, chunk_side);
        ramp.on_spawn(clock.now_millis());

        log::info!(
            "[StreamingRenderCache::new] View distance {} -> {}, culling threshold {}, {} meshes per frame",
            config.initial_view_distance,
            config.target_view_distance,
            culling_threshold,
            config.max_meshes_per_frame
        );

        Ok(Self {
            volume,
            extractor,
            backend,
            clock,
            config,
            chunk_side,
            culling_threshold,
            ramp,
            entries: FxHashMap::default(),
            extracted: FxHashSet::default(),
            invalidated: FxHashSet::default(),
            retry_queue: VecDeque::new(),
            release_queue: ReleaseQueue::new(),
            viewer_cell: None,
            last_scan: None,
        })
    }

    pub fn volume(&self) -> &Arc<PagedVolume> {
        &self.volume
    }

    pub fn extractor(&self) -> &MeshExtractor {
        &self.extractor
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    pub fn culling_threshold(&self) -> f32 {
        self.culling_threshold
    }

    pub fn view_distance(&self) -> f32 {
        self.ramp.current()
    }

    pub fn set_target_view_distance(&mut self, target: f32) {
        self.ramp.set_target(target);
        self.last_scan = None;
    }

    /// Restart the view distance ramp after a spawn or teleport
    pub fn on_spawn(&mut self) {
        self.ramp.on_spawn(self.clock.now_millis());
        self.last_scan = None;
    }

    pub fn entry(&self, pos: ChunkPos) -> Option<&RenderChunkEntry> {
        self.entries.get(&pos)
    }

    pub fn entries(&self) -> impl Iterator<Item = (ChunkPos, &RenderChunkEntry)> {
        self.entries.iter().map(|(pos, entry)| (*pos, entry))
    }

    pub fn is_resident(&self, pos: ChunkPos) -> bool {
        self.entries.contains_key(&pos)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            resident_chunks: self.entries.len(),
            pending_jobs: self.extractor.pending_jobs(),
            queued_meshes: self.extractor.queued_meshes() + self.retry_queue.len(),
        }
    }

    /// True when a chunk translated to `translation` is out of range
    pub fn is_distance_culled(&self, translation: IVec3, viewer: Vec3) -> bool {
        let limit = self.ramp.current() + self.culling_threshold;
        (translation.as_vec3() - viewer).length_squared() > limit * limit
    }

    /// Stream towards `viewer`: schedule extraction and upload finished meshes
    pub fn update(&mut self, viewer: &Viewer) -> FrameReport {
        let mut report = FrameReport {
            released: self.release_queue.drain_into(&mut self.backend),
            ..FrameReport::default()
        };

        let view_distance = self.ramp.advance(self.clock.now_millis());
        report.view_distance = view_distance;

        let cell = ChunkPos::from_world(viewer.position, self.chunk_side);
        if self.viewer_cell != Some(cell) {
            log::debug!("[StreamingRenderCache::update] Re-centering on {:?}", cell);
            self.viewer_cell = Some(cell);
            self.last_scan = None;
        }

        let moved = match self.last_scan {
            Some((position, distance)) => {
                distance != view_distance || position.distance_squared(viewer.position) >= 1.0
            }
            None => true,
        };
        if moved || !self.invalidated.is_empty() {
            report.scheduled = self.schedule_around(cell, viewer.position);
            self.last_scan = Some((viewer.position, view_distance));
        }

        self.drain_completed(viewer.position, &mut report);

        for failure in &report.failures {
            log::warn!(
                "[StreamingRenderCache::update] Upload of {:?} failed, retrying next frame: {}",
                failure.chunk_pos,
                failure.error
            );
        }

        report
    }

    /// Evict out-of-range entries and draw the visible ones
    ///
    /// Opaque meshes are drawn first, translucent meshes after them from
    /// back to front.
    pub fn render(&mut self, viewer: &Viewer) -> RenderStats {
        let mut stats = RenderStats {
            evicted: self.evict_distant(viewer.position),
            ..RenderStats::default()
        };

        let mut visible: Vec<(f32, ChunkPos)> = Vec::with_capacity(self.entries.len());
        for (pos, entry) in &self.entries {
            if viewer.frustum.intersects_aabb(&entry.aabb) {
                visible.push((entry.aabb.center().distance_squared(viewer.position), *pos));
            } else {
                stats.frustum_culled += 1;
            }
        }
        visible.sort_by(|a, b| a.0.total_cmp(&b.0));
        stats.visible_chunks = visible.len();

        for (_, pos) in &visible {
            if let Some(entry) = self.entries.get(pos) {
                if entry.buffers.draw_kind(&mut self.backend, MeshKind::Opaque, entry.translation) {
                    stats.draw_calls += 1;
                }
            }
        }
        for (_, pos) in visible.iter().rev() {
            if let Some(entry) = self.entries.get(pos) {
                if entry.buffers.draw_kind(&mut self.backend, MeshKind::Translucent, entry.translation) {
                    stats.draw_calls += 1;
                }
            }
        }

        stats
    }

    /// Re-extract a chunk after its voxels changed
    ///
    /// The current entry keeps drawing until the new mesh replaces it.
    pub fn invalidate(&mut self, pos: ChunkPos) {
        if self.extracted.contains(&pos) {
            self.invalidated.insert(pos);
        }
    }

    /// Release every entry and forget all streaming state
    pub fn reset(&mut self) {
        let released = self.entries.len();
        self.release_all();
        self.extracted.clear();
        self.invalidated.clear();
        self.retry_queue.clear();
        self.extractor.reset();
        self.viewer_cell = None;
        self.last_scan = None;
        self.ramp.on_spawn(self.clock.now_millis());
        log::info!("[StreamingRenderCache::reset] Released {} entries", released);
    }

    fn release_all(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.buffers.release(&mut self.backend);
        }
        self.release_queue.drain_into(&mut self.backend);
    }

    fn schedule_around(&mut self, cell: ChunkPos, viewer: Vec3) -> usize {
        let side = self.chunk_side;
        let reach = self.ramp.current() + self.culling_threshold;
        let radius = (reach / side as f32).floor() as i32 + 1;

        let mut scheduled = 0;
        for offset in spiral(radius) {
            let pos = cell.offset(offset.x, offset.y, offset.z);
            if self.extracted.contains(&pos) && !self.invalidated.contains(&pos) {
                continue;
            }
            if self.is_distance_culled(pos.origin(side), viewer) {
                continue;
            }

            self.prefetch_neighbourhood(pos);
            if self.extractor.schedule_extraction(pos) {
                scheduled += 1;
                self.invalidated.remove(&pos);
            }
            // A job already in flight for `pos` delivers just as well
            self.extracted.insert(pos);
        }

        if scheduled > 0 {
            log::debug!(
                "[StreamingRenderCache::schedule_around] Scheduled {} chunks within radius {}",
                scheduled,
                radius
            );
        }
        scheduled
    }

    fn prefetch_neighbourhood(&self, pos: ChunkPos) {
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    self.volume.prefetch(pos.offset(dx, dy, dz));
                }
            }
        }
    }

    fn drain_completed(&mut self, viewer: Vec3, report: &mut FrameReport) {
        let budget = self.config.max_meshes_per_frame;
        let mut retries = self.retry_queue.len();
        let mut failed = Vec::new();

        for _ in 0..budget {
            let mesh = if retries > 0 {
                retries -= 1;
                self.retry_queue.pop_front()
            } else {
                self.extractor.pop_completed()
            };
            let Some(mesh) = mesh else {
                break;
            };

            match self.apply_mesh(mesh, viewer) {
                MeshOutcome::Uploaded => report.uploaded += 1,
                MeshOutcome::Empty => report.empty += 1,
                MeshOutcome::Stale => report.stale += 1,
                MeshOutcome::Failed(mesh, error) => {
                    report.failures.push(UploadFailure {
                        chunk_pos: mesh.chunk_pos,
                        error,
                    });
                    failed.push(mesh);
                }
            }
        }

        self.retry_queue.extend(failed);
    }

    fn apply_mesh(&mut self, mesh: ChunkMeshData, viewer: Vec3) -> MeshOutcome {
        let pos = mesh.chunk_pos;

        if !self.extracted.contains(&pos) || self.is_distance_culled(mesh.translation, viewer) {
            log::debug!("[StreamingRenderCache::apply_mesh] Dropping stale mesh for {:?}", pos);
            self.extracted.remove(&pos);
            self.invalidated.remove(&pos);
            self.last_scan = None;
            if let Some(entry) = self.entries.remove(&pos) {
                entry.buffers.release(&mut self.backend);
            }
            return MeshOutcome::Stale;
        }

        let Some(aabb) = mesh.aabb() else {
            if let Some(entry) = self.entries.remove(&pos) {
                entry.buffers.release(&mut self.backend);
            }
            return MeshOutcome::Empty;
        };

        match self.entries.get_mut(&pos) {
            Some(entry) => match entry.buffers.upload(&mut self.backend, &mesh) {
                Ok(()) => {
                    entry.translation = mesh.translation;
                    entry.aabb = aabb;
                    MeshOutcome::Uploaded
                }
                Err(error) => MeshOutcome::Failed(mesh, error),
            },
            None => {
                let mut buffers = GpuChunkBuffers::new(pos, self.release_queue.clone());
                match buffers.upload(&mut self.backend, &mesh) {
                    Ok(()) => {
                        self.entries.insert(
                            pos,
                            RenderChunkEntry {
                                buffers,
                                translation: mesh.translation,
                                aabb,
                            },
                        );
                        MeshOutcome::Uploaded
                    }
                    Err(error) => {
                        buffers.release(&mut self.backend);
                        MeshOutcome::Failed(mesh, error)
                    }
                }
            }
        }
    }

    fn evict_distant(&mut self, viewer: Vec3) -> usize {
        let side = self.chunk_side;
        let culled: Vec<ChunkPos> = self
            .extracted
            .iter()
            .copied()
            .filter(|pos| self.is_distance_culled(pos.origin(side), viewer))
            .collect();

        if !culled.is_empty() {
            // Dropped coordinates are rescheduled once back in range
            self.last_scan = None;
        }

        let mut evicted = 0;
        for pos in culled {
            self.extracted.remove(&pos);
            self.invalidated.remove(&pos);
            if let Some(entry) = self.entries.remove(&pos) {
                entry.buffers.release(&mut self.backend);
                evicted += 1;
            }
        }

        if evicted > 0 {
            log::debug!("[StreamingRenderCache::render] Evicted {} chunks", evicted);
        }
        evicted
    }
}

impl<B: GraphicsBackend> Drop for StreamingRenderCache<B> {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VolumeConfig;
    use crate::renderer::gpu::HeadlessBackend;
    use crate::time::ManualClock;
    use crate::world::{MemoryPager, Voxel, VoxelType};
    use std::time::{Duration, Instant};

    const SIDE: u32 = 8;

    fn cache_with(config: StreamingConfig) -> (StreamingRenderCache<HeadlessBackend>, ManualClock) {
        let pager = Arc::new(MemoryPager::new(SIDE));
        let volume = Arc::new(
            PagedVolume::new(
                pager,
                &VolumeConfig {
                    chunk_side: SIDE,
                    max_resident_chunks: 512,
                },
            )
            .expect("valid volume"),
        );
        let clock = ManualClock::new();
        let cache = StreamingRenderCache::new(
            volume,
            HeadlessBackend::new(),
            Box::new(clock.clone()),
            config,
            &ExtractionConfig {
                worker_threads: Some(2),
            },
        )
        .expect("valid cache");
        (cache, clock)
    }

    fn fixed_distance(distance: f32) -> StreamingConfig {
        StreamingConfig {
            initial_view_distance: distance,
            target_view_distance: distance,
            culling_threshold: Some(SIDE as f32),
            max_meshes_per_frame: 8,
        }
    }

    fn pump_until<F>(cache: &mut StreamingRenderCache<HeadlessBackend>, viewer: &Viewer, mut done: F)
    where
        F: FnMut(&StreamingRenderCache<HeadlessBackend>) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(cache) {
            assert!(Instant::now() < deadline, "cache did not settle: {:?}", cache.stats());
            cache.update(viewer);
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn idle(cache: &StreamingRenderCache<HeadlessBackend>) -> bool {
        let stats = cache.stats();
        stats.pending_jobs == 0 && stats.queued_meshes == 0
    }

    #[test]
    fn test_streams_solid_chunk_into_residency() {
        let (mut cache, _clock) = cache_with(fixed_distance(8.0));
        cache.volume().set_voxel(IVec3::new(2, 2, 2), Voxel::new(VoxelType::Rock, 1));

        let viewer = Viewer::new(Vec3::new(4.0, 4.0, 4.0));
        pump_until(&mut cache, &viewer, |c| c.is_resident(ChunkPos::new(0, 0, 0)) && idle(c));

        assert_eq!(cache.stats().resident_chunks, 1);
        assert_eq!(cache.backend().live_buffers(), 1);

        let stats = cache.render(&viewer);
        assert_eq!(stats.visible_chunks, 1);
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(cache.backend().draw_calls()[0].translation, IVec3::ZERO);
    }

    #[test]
    fn test_empty_chunks_get_no_entry() {
        let (mut cache, _clock) = cache_with(fixed_distance(8.0));
        let viewer = Viewer::new(Vec3::new(4.0, 4.0, 4.0));
        cache.update(&viewer);
        pump_until(&mut cache, &viewer, idle);
        assert_eq!(cache.stats().resident_chunks, 0);
        assert_eq!(cache.backend().live_buffers(), 0);
    }

    #[test]
    fn test_frame_drain_is_bounded() {
        let mut config = fixed_distance(24.0);
        config.max_meshes_per_frame = 2;
        let (mut cache, _clock) = cache_with(config);
        let viewer = Viewer::new(Vec3::splat(4.0));

        let first = cache.update(&viewer);
        assert!(first.scheduled > 2);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !idle(&cache) {
            assert!(Instant::now() < deadline);
            let report = cache.update(&viewer);
            assert!(report.uploaded + report.empty + report.stale + report.failures.len() <= 2);
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_upload_failure_is_retried() {
        let (mut cache, _clock) = cache_with(fixed_distance(8.0));
        cache.volume().set_voxel(IVec3::new(1, 1, 1), Voxel::new(VoxelType::Dirt, 3));
        cache.backend_mut().set_memory_limit(Some(0));

        let viewer = Viewer::new(Vec3::splat(4.0));
        let deadline = Instant::now() + Duration::from_secs(5);
        let failure = loop {
            assert!(Instant::now() < deadline, "no upload failure reported");
            let report = cache.update(&viewer);
            if let Some(failure) = report.failures.into_iter().next() {
                break failure;
            }
            std::thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(failure.chunk_pos, ChunkPos::new(0, 0, 0));
        assert!(matches!(failure.error, GpuError::OutOfMemory { .. }));
        assert!(!cache.is_resident(ChunkPos::new(0, 0, 0)));
        assert!(cache.stats().queued_meshes >= 1);

        cache.backend_mut().set_memory_limit(None);
        let report = cache.update(&viewer);
        assert_eq!(report.uploaded, 1);
        assert!(cache.is_resident(ChunkPos::new(0, 0, 0)));
    }

    #[test]
    fn test_invalidate_updates_entry_in_place() {
        let (mut cache, _clock) = cache_with(fixed_distance(8.0));
        let pos = ChunkPos::new(0, 0, 0);
        cache.volume().set_voxel(IVec3::new(1, 1, 1), Voxel::new(VoxelType::Rock, 1));

        let viewer = Viewer::new(Vec3::splat(4.0));
        pump_until(&mut cache, &viewer, |c| c.is_resident(pos) && idle(c));
        let handles: Vec<_> = cache.entry(pos).expect("resident").handles().collect();

        cache.volume().set_voxel(IVec3::new(1, 2, 1), Voxel::new(VoxelType::Rock, 1));
        cache.invalidate(pos);
        let deadline = Instant::now() + Duration::from_secs(5);
        while cache.backend().buffers_updated() == 0 {
            assert!(Instant::now() < deadline, "entry was never updated");
            cache.update(&viewer);
            std::thread::sleep(Duration::from_millis(1));
        }

        let after: Vec<_> = cache.entry(pos).expect("still resident").handles().collect();
        assert_eq!(handles, after);
        assert_eq!(cache.backend().live_buffers(), 1);
    }

    #[test]
    fn test_reset_releases_everything() {
        let (mut cache, _clock) = cache_with(fixed_distance(8.0));
        cache.volume().set_voxel(IVec3::new(1, 1, 1), Voxel::new(VoxelType::Rock, 1));
        let viewer = Viewer::new(Vec3::splat(4.0));
        pump_until(&mut cache, &viewer, |c| c.stats().resident_chunks == 1 && idle(c));

        cache.reset();
        assert_eq!(cache.stats(), CacheStats::default());
        assert_eq!(cache.backend().live_buffers(), 0);

        pump_until(&mut cache, &viewer, |c| c.stats().resident_chunks == 1);
    }

    #[test]
    fn test_view_distance_follows_clock() {
        let config = StreamingConfig {
            initial_view_distance: 1.0,
            target_view_distance: 64.0,
            culling_threshold: None,
            max_meshes_per_frame: 8,
        };
        let (mut cache, clock) = cache_with(config);
        let viewer = Viewer::new(Vec3::ZERO);

        assert_eq!(cache.update(&viewer).view_distance, 1.0);
        clock.advance(2_000);
        assert_eq!(cache.update(&viewer).view_distance, 17.0);
        clock.advance(60_000);
        assert_eq!(cache.update(&viewer).view_distance, 64.0);

        cache.on_spawn();
        assert_eq!(cache.update(&viewer).view_distance, 1.0);
    }
}
