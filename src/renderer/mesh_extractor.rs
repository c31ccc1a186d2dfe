//! Background mesh extraction
//!
//! Jobs run on a dedicated rayon pool and report through a single crossbeam
//! channel. A coordinate has at most one job in flight: its pending entry is
//! only cleared once the consumer pops the result.

use crate::config::ExtractionConfig;
use crate::error::StreamResult;
use crate::renderer::mesh::ChunkMeshData;
use crate::renderer::mesher::extract_chunk_mesh;
use crate::world::{ChunkPos, PagedVolume};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct CompletedMesh {
    generation: u64,
    mesh: ChunkMeshData,
}

#[derive(Default)]
struct JobTable {
    /// Pending coordinates and the generation they were scheduled in
    pending: DashMap<ChunkPos, u64>,
    generation: AtomicU64,
}

impl JobTable {
    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

pub struct MeshExtractor {
    volume: Arc<PagedVolume>,
    pool: rayon::ThreadPool,
    jobs: Arc<JobTable>,
    completed_sender: Sender<CompletedMesh>,
    completed_receiver: Receiver<CompletedMesh>,
}

impl MeshExtractor {
    pub fn new(volume: Arc<PagedVolume>, config: &ExtractionConfig) -> StreamResult<Self> {
        config.validate()?;
        let threads = config.thread_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("mesh-extractor-{}", idx))
            .build()?;
        let (completed_sender, completed_receiver) = unbounded();

        log::info!("[MeshExtractor::new] Started {} extraction workers", threads);

        Ok(Self {
            volume,
            pool,
            jobs: Arc::new(JobTable::default()),
            completed_sender,
            completed_receiver,
        })
    }

    pub fn volume(&self) -> &Arc<PagedVolume> {
        &self.volume
    }

    /// Queue an extraction of `pos`
    ///
    /// Returns false when a job for `pos` is already pending. The job reads
    /// whatever is resident when it runs; a chunk that is not resident by
    /// then yields an empty mesh.
    pub fn schedule_extraction(&self, pos: ChunkPos) -> bool {
        let generation = self.jobs.current_generation();
        match self.jobs.pending.entry(pos) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                slot.insert(generation);
            }
        }

        let volume = Arc::clone(&self.volume);
        let jobs = Arc::clone(&self.jobs);
        let sender = self.completed_sender.clone();

        self.pool.spawn(move || {
            if jobs.current_generation() != generation {
                return;
            }

            let mesh = match volume.extraction_snapshot(pos) {
                Some(snapshot) => extract_chunk_mesh(&snapshot),
                None => {
                    log::debug!("[MeshExtractor] Chunk {:?} not resident, emitting empty mesh", pos);
                    ChunkMeshData::empty(pos, pos.origin(volume.chunk_side()))
                }
            };

            if jobs.current_generation() != generation {
                log::debug!("[MeshExtractor] Dropping result for {:?} from an old generation", pos);
                return;
            }
            // The receiver lives as long as the extractor
            let _ = sender.send(CompletedMesh { generation, mesh });
        });

        true
    }

    /// Next completed mesh, never blocks
    pub fn pop_completed(&self) -> Option<ChunkMeshData> {
        while let Ok(completed) = self.completed_receiver.try_recv() {
            if let Some(mesh) = self.accept(completed) {
                return Some(mesh);
            }
        }
        None
    }

    /// Next completed mesh, waiting at most `timeout`
    pub fn pop_completed_timeout(&self, timeout: Duration) -> Option<ChunkMeshData> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.completed_receiver.recv_timeout(remaining) {
                Ok(completed) => {
                    if let Some(mesh) = self.accept(completed) {
                        return Some(mesh);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    fn accept(&self, completed: CompletedMesh) -> Option<ChunkMeshData> {
        if completed.generation != self.jobs.current_generation() {
            return None;
        }
        let pos = completed.mesh.chunk_pos;
        self.jobs
            .pending
            .remove_if(&pos, |_, generation| *generation == completed.generation);
        Some(completed.mesh)
    }

    pub fn is_pending(&self, pos: ChunkPos) -> bool {
        self.jobs.pending.contains_key(&pos)
    }

    /// Jobs scheduled but not yet popped
    pub fn pending_jobs(&self) -> usize {
        self.jobs.pending.len()
    }

    /// Results waiting in the completion queue
    pub fn queued_meshes(&self) -> usize {
        self.completed_receiver.len()
    }

    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Forget every pending job and queued result
    ///
    /// Jobs still running finish but their results are dropped.
    pub fn reset(&self) {
        let generation = self.jobs.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let dropped_jobs = self.jobs.pending.len();
        self.jobs.pending.clear();

        let mut dropped_meshes = 0;
        while self.completed_receiver.try_recv().is_ok() {
            dropped_meshes += 1;
        }

        log::info!(
            "[MeshExtractor::reset] Generation {}, dropped {} pending jobs and {} queued meshes",
            generation,
            dropped_jobs,
            dropped_meshes
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VolumeConfig;
    use crate::renderer::mesh::MeshKind;
    use crate::world::{MemoryPager, Voxel, VoxelType};
    use glam::IVec3;

    const WAIT: Duration = Duration::from_secs(5);

    fn setup() -> (Arc<PagedVolume>, MeshExtractor) {
        let pager = Arc::new(MemoryPager::new(8));
        let config = VolumeConfig {
            chunk_side: 8,
            max_resident_chunks: 64,
        };
        let volume = Arc::new(PagedVolume::new(pager, &config).expect("valid config"));
        let extractor = MeshExtractor::new(
            Arc::clone(&volume),
            &ExtractionConfig {
                worker_threads: Some(2),
            },
        )
        .expect("pool");
        (volume, extractor)
    }

    #[test]
    fn test_at_most_one_job_per_chunk() {
        let (volume, extractor) = setup();
        let pos = ChunkPos::new(0, 0, 0);
        volume.prefetch(pos);

        assert!(extractor.schedule_extraction(pos));
        assert!(!extractor.schedule_extraction(pos));
        assert!(!extractor.schedule_extraction(pos));
        assert_eq!(extractor.pending_jobs(), 1);

        let mesh = extractor.pop_completed_timeout(WAIT).expect("job completes");
        assert_eq!(mesh.chunk_pos, pos);
        assert_eq!(extractor.pending_jobs(), 0);
        assert!(extractor.schedule_extraction(pos));
    }

    #[test]
    fn test_job_meshes_resident_chunk() {
        let (volume, extractor) = setup();
        volume.set_voxel(IVec3::new(9, 1, 1), Voxel::new(VoxelType::Rock, 2));

        let pos = ChunkPos::new(1, 0, 0);
        assert!(extractor.schedule_extraction(pos));
        let mesh = extractor.pop_completed_timeout(WAIT).expect("job completes");

        assert_eq!(mesh.translation, IVec3::new(8, 0, 0));
        assert_eq!(mesh.mesh(MeshKind::Opaque).vertices.len(), 24);
    }

    #[test]
    fn test_non_resident_chunk_yields_empty_mesh() {
        let (_volume, extractor) = setup();
        let pos = ChunkPos::new(5, 5, 5);
        assert!(extractor.schedule_extraction(pos));
        let mesh = extractor.pop_completed_timeout(WAIT).expect("job completes");
        assert!(mesh.is_empty());
        assert_eq!(mesh.translation, IVec3::new(40, 40, 40));
    }

    #[test]
    fn test_reset_discards_results() {
        let (volume, extractor) = setup();
        for x in 0..4 {
            let pos = ChunkPos::new(x, 0, 0);
            volume.prefetch(pos);
            assert!(extractor.schedule_extraction(pos));
        }
        extractor.reset();
        assert_eq!(extractor.pending_jobs(), 0);
        assert!(extractor.pop_completed_timeout(Duration::from_millis(200)).is_none());

        assert!(extractor.schedule_extraction(ChunkPos::new(0, 0, 0)));
        let mesh = extractor.pop_completed_timeout(WAIT).expect("new generation completes");
        assert_eq!(mesh.chunk_pos, ChunkPos::new(0, 0, 0));
    }

    #[test]
    fn test_pop_completed_never_blocks() {
        let (_volume, extractor) = setup();
        assert!(extractor.pop_completed().is_none());
        assert_eq!(extractor.queued_meshes(), 0);
        assert_eq!(extractor.worker_count(), 2);
    }
}
