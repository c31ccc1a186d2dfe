use crate::config::WorldConfig;
use crate::world::{
    find_walkable_floor, ChunkPos, PagedVolume, RayStep, RayWalk, RaycastHit, Region, Voxel,
};
use glam::{IVec3, Vec3};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Attempts `random_pos` makes before giving up
const RANDOM_POS_ATTEMPTS: usize = 16;

/// Game-logic entry point to the voxel world
///
/// Composes the paged volume with samplers to answer ray and floor queries.
pub struct WorldFacade {
    volume: Arc<PagedVolume>,
    config: WorldConfig,
    seed: AtomicU64,
    rng: Mutex<StdRng>,
}

impl WorldFacade {
    pub fn new(volume: Arc<PagedVolume>, config: WorldConfig) -> Self {
        let seed = config.seed;
        volume.pager().set_seed(seed);
        Self {
            volume,
            config,
            seed: AtomicU64::new(seed),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn volume(&self) -> &Arc<PagedVolume> {
        &self.volume
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed.load(Ordering::Relaxed)
    }

    pub fn voxel(&self, pos: IVec3) -> Voxel {
        self.volume.voxel(pos)
    }

    pub fn set_voxel(&self, pos: IVec3, voxel: Voxel) -> bool {
        self.volume.set_voxel(pos, voxel)
    }

    /// Page in every chunk overlapping `region`, returns how many had data
    pub fn prefetch_region(&self, region: &Region) -> usize {
        let side = self.volume.chunk_side();
        let lo = ChunkPos::from_voxel(region.mins(), side);
        let hi = ChunkPos::from_voxel(region.maxs(), side);
        let mut loaded = 0;
        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    if self.volume.prefetch(ChunkPos::new(x, y, z)) {
                        loaded += 1;
                    }
                }
            }
        }
        loaded
    }

    /// Lazily walk the voxels along a ray
    pub fn ray_walk(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> RayWalk<'_> {
        RayWalk::new(&self.volume, origin, direction, max_distance)
    }

    /// Walk a ray until `stop` returns true for a step
    ///
    /// Returns the step that stopped the walk, or `None` if the ray ran out
    /// of distance first.
    pub fn raycast<F>(&self, origin: Vec3, direction: Vec3, max_distance: f32, mut stop: F) -> Option<RaycastHit>
    where
        F: FnMut(&RayStep) -> bool,
    {
        self.ray_walk(origin, direction, max_distance)
            .find(|step| stop(step))
            .map(RaycastHit::from)
    }

    /// Raycast that stops on the first solid voxel
    pub fn raycast_solid(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RaycastHit> {
        self.raycast(origin, direction, max_distance, |step| step.voxel.is_solid())
    }

    /// Floor height below (or above, when buried) `position`
    pub fn find_walkable_floor(&self, position: Vec3, max_upward_distance: f32) -> Option<i32> {
        find_walkable_floor(
            &self.volume,
            position,
            max_upward_distance,
            self.config.max_floor_search_depth,
        )
    }

    /// Reseed the facade's random source and the pager
    pub fn set_seed(&self, seed: u64) {
        log::info!("[WorldFacade::set_seed] Seed {}", seed);
        self.seed.store(seed, Ordering::Relaxed);
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self.volume.pager().set_seed(seed);
    }

    /// Flush every dirty chunk and drop the cache
    pub fn reset(&self) -> usize {
        let paged_out = self.volume.flush_all();
        log::info!("[WorldFacade::reset] World reset, {} chunks paged out", paged_out);
        paged_out
    }

    /// Pick a random point a body can stand on
    ///
    /// Samples x and z uniformly within the configured extent and searches
    /// for a floor from the configured start height.
    pub fn random_pos(&self) -> Option<IVec3> {
        let extent = self.config.random_extent;
        for _ in 0..RANDOM_POS_ATTEMPTS {
            let (x, z) = {
                let mut rng = self.rng.lock();
                (rng.gen_range(-extent..=extent), rng.gen_range(-extent..=extent))
            };
            let start = Vec3::new(
                x as f32 + 0.5,
                self.config.random_start_height as f32 + 0.5,
                z as f32 + 0.5,
            );
            if let Some(y) = self.find_walkable_floor(start, self.config.max_walk_height) {
                return Some(IVec3::new(x, y, z));
            }
        }
        log::debug!(
            "[WorldFacade::random_pos] No floor found after {} attempts",
            RANDOM_POS_ATTEMPTS
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VolumeConfig;
    use crate::world::{MemoryPager, VoxelType};

    fn facade(config: WorldConfig) -> WorldFacade {
        let volume_config = VolumeConfig {
            chunk_side: 8,
            max_resident_chunks: 128,
        };
        let volume = PagedVolume::new(Arc::new(MemoryPager::new(8)), &volume_config).expect("valid config");
        WorldFacade::new(Arc::new(volume), config)
    }

    #[test]
    fn test_raycast_reports_hit_and_previous_voxel() {
        let world = facade(WorldConfig::default());
        world.set_voxel(IVec3::ZERO, Voxel::new(VoxelType::Generic, 1));

        let hit = world
            .raycast(Vec3::new(0.0, 3.0, 0.0), Vec3::NEG_Y, 100.0, |step| !step.voxel.is_air())
            .expect("solid voxel below");
        assert_eq!(hit.position, IVec3::new(0, 0, 0));
        assert_eq!(hit.previous, Some(IVec3::new(0, 1, 0)));
    }

    #[test]
    fn test_raycast_misses_empty_world() {
        let world = facade(WorldConfig::default());
        assert!(world.raycast_solid(Vec3::new(0.5, 3.5, 0.5), Vec3::X, 20.0).is_none());
    }

    #[test]
    fn test_random_pos_lands_on_floor() {
        let world = facade(WorldConfig {
            random_extent: 4,
            random_start_height: 6,
            ..WorldConfig::default()
        });
        for x in -4..=4 {
            for z in -4..=4 {
                world.set_voxel(IVec3::new(x, 0, z), Voxel::new(VoxelType::Grass, 0));
            }
        }

        let pos = world.random_pos().expect("floor everywhere");
        assert_eq!(pos.y, 1);
        assert!(pos.x.abs() <= 4 && pos.z.abs() <= 4);
        assert!(world.voxel(pos - IVec3::Y).is_walkable());
    }

    #[test]
    fn test_set_seed_makes_random_pos_repeatable() {
        let world = facade(WorldConfig {
            random_extent: 20,
            random_start_height: 2,
            ..WorldConfig::default()
        });
        for x in -20..=20 {
            for z in -20..=20 {
                world.set_voxel(IVec3::new(x, 0, z), Voxel::new(VoxelType::Rock, 0));
            }
        }

        world.set_seed(5);
        let first = world.random_pos();
        world.set_seed(5);
        assert_eq!(world.random_pos(), first);
        assert_eq!(world.seed(), 5);
    }

    #[test]
    fn test_reset_flushes_store() {
        let world = facade(WorldConfig::default());
        world.set_voxel(IVec3::new(1, 1, 1), Voxel::new(VoxelType::Wood, 0));
        assert_eq!(world.reset(), 1);
        assert_eq!(world.volume().resident_chunks(), 0);
        // Paged out to memory, so the edit survives the reset
        assert_eq!(world.voxel(IVec3::new(1, 1, 1)).material(), VoxelType::Wood);
    }

    #[test]
    fn test_prefetch_region() {
        let world = facade(WorldConfig::default());
        let region = Region::new(IVec3::new(-1, 0, 0), IVec3::new(8, 7, 7));
        assert_eq!(world.prefetch_region(&region), 3);
        assert!(world.volume().is_resident(ChunkPos::new(-1, 0, 0)));
    }
}
