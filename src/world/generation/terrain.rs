use crate::world::{ChunkData, ChunkPos, Pager, Region, Voxel, VoxelType};
use noise::{NoiseFn, Perlin};
use parking_lot::RwLock;

/// Height map built from layered Perlin noise
pub struct TerrainGenerator {
    height_noise: Perlin,
    detail_noise: Perlin,
    seed: u32,
}

impl TerrainGenerator {
    pub fn new(seed: u32) -> Self {
        Self {
            height_noise: Perlin::new(seed),
            detail_noise: Perlin::new(seed.wrapping_add(1)),
            seed,
        }
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn get_height(&self, world_x: f64, world_z: f64, base_height: i32) -> i32 {
        let scale1 = 0.01; // Large features (mountains, valleys)
        let scale2 = 0.05; // Medium features (hills)
        let scale3 = 0.1; // Small features (bumps)

        let height1 = self.height_noise.get([world_x * scale1, world_z * scale1]) * 32.0;
        let height2 = self.detail_noise.get([world_x * scale2, world_z * scale2]) * 8.0;
        let height3 = self.height_noise.get([world_x * scale3, world_z * scale3]) * 2.0;

        base_height + (height1 + height2 + height3) as i32
    }
}

/// Terrain shape used by [`NoisePager`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainSettings {
    /// Average surface height
    pub base_height: i32,
    /// Columns below this height are flooded with water
    pub water_level: i32,
    /// Chunks starting below this height have no data
    pub min_y: i32,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            base_height: 64,
            water_level: 58,
            min_y: 0,
        }
    }
}

/// Procedural pager synthesising chunks from a seeded height map
///
/// Paging out discards the chunk, it is regenerated on the next page-in.
/// Wrap it in a [`MemoryPager`](crate::world::MemoryPager) to keep edits.
pub struct NoisePager {
    chunk_side: u32,
    settings: TerrainSettings,
    generator: RwLock<TerrainGenerator>,
}

impl NoisePager {
    pub fn new(seed: u64, chunk_side: u32) -> Self {
        Self::with_settings(seed, chunk_side, TerrainSettings::default())
    }

    pub fn with_settings(seed: u64, chunk_side: u32, settings: TerrainSettings) -> Self {
        Self {
            chunk_side,
            settings,
            generator: RwLock::new(TerrainGenerator::new(fold_seed(seed))),
        }
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    /// Surface height of the column at (x, z)
    pub fn surface_height(&self, x: i32, z: i32) -> i32 {
        self.generator
            .read()
            .get_height(x as f64, z as f64, self.settings.base_height)
    }

    fn voxel_for(&self, y: i32, surface: i32) -> Voxel {
        let water_level = self.settings.water_level;
        if y > surface {
            if y <= water_level {
                Voxel::new(VoxelType::Water, 0)
            } else {
                Voxel::AIR
            }
        } else if y == surface {
            if surface <= water_level + 1 {
                Voxel::new(VoxelType::Sand, 1)
            } else {
                Voxel::new(VoxelType::Grass, 2)
            }
        } else if y > surface - 4 {
            Voxel::new(VoxelType::Dirt, 3)
        } else {
            Voxel::new(VoxelType::Rock, 4)
        }
    }
}

impl Pager for NoisePager {
    fn page_in(&self, region: &Region) -> Option<ChunkData> {
        if region.mins().y < self.settings.min_y {
            return None;
        }

        let side = self.chunk_side;
        let origin = region.mins();
        let mut chunk = ChunkData::new(ChunkPos::from_voxel(origin, side), side);
        let generator = self.generator.read();

        for z in 0..side {
            for x in 0..side {
                let wx = origin.x + x as i32;
                let wz = origin.z + z as i32;
                let surface = generator.get_height(wx as f64, wz as f64, self.settings.base_height);
                for y in 0..side {
                    let voxel = self.voxel_for(origin.y + y as i32, surface);
                    if !voxel.is_air() {
                        chunk.set(x, y, z, voxel);
                    }
                }
            }
        }

        Some(chunk)
    }

    fn page_out(&self, _region: &Region, _chunk: &ChunkData) -> bool {
        true
    }

    fn set_seed(&self, seed: u64) {
        log::info!("[NoisePager::set_seed] Reseeding terrain with {}", seed);
        *self.generator.write() = TerrainGenerator::new(fold_seed(seed));
    }
}

fn fold_seed(seed: u64) -> u32 {
    (seed ^ (seed >> 32)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec3;

    #[test]
    fn test_no_data_below_min_y() {
        let pager = NoisePager::new(7, 16);
        assert!(pager.page_in(&Region::for_chunk(ChunkPos::new(0, -1, 0), 16)).is_none());
        assert!(pager.page_in(&Region::for_chunk(ChunkPos::new(0, 0, 0), 16)).is_some());
    }

    #[test]
    fn test_columns_follow_surface_height() {
        let pager = NoisePager::new(7, 16);
        let surface = pager.surface_height(3, 5);
        let chunk_pos = ChunkPos::from_voxel(IVec3::new(3, surface, 5), 16);
        let chunk = pager
            .page_in(&Region::for_chunk(chunk_pos, 16))
            .expect("above min_y");

        assert!(chunk.get_world(IVec3::new(3, surface, 5)).is_solid());
        let above = chunk_pos.origin(16).y + 15;
        if above > surface.max(pager.settings().water_level) {
            assert!(chunk.get_world(IVec3::new(3, above, 5)).is_air());
        }
    }

    #[test]
    fn test_same_seed_same_terrain() {
        let a = NoisePager::new(99, 8);
        let b = NoisePager::new(99, 8);
        let region = Region::for_chunk(ChunkPos::new(1, 7, -2), 8);
        assert_eq!(a.page_in(&region), b.page_in(&region));
    }

    #[test]
    fn test_reseed_changes_terrain() {
        let pager = NoisePager::new(1, 8);
        let before: Vec<i32> = (0..32).map(|x| pager.surface_height(x * 13, x * 7)).collect();
        pager.set_seed(2);
        let after: Vec<i32> = (0..32).map(|x| pager.surface_height(x * 13, x * 7)).collect();
        assert_ne!(before, after);
    }
}
