use crate::error::{StreamError, StreamResult};
use crate::world::ChunkPos;
use glam::IVec3;

/// Axis-aligned integer box in voxel coordinates, both corners inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    mins: IVec3,
    maxs: IVec3,
}

impl Region {
    /// Largest allowed extent along any axis
    pub const MAX_EXTENT: i32 = 1 << 16;

    /// Create a region, panicking on inverted or oversized bounds
    ///
    /// Invalid bounds are a programming error. Use [`Region::try_new`] for
    /// bounds that come from outside the program.
    pub fn new(mins: IVec3, maxs: IVec3) -> Self {
        match Self::try_new(mins, maxs) {
            Ok(region) => region,
            Err(err) => panic!("{}", err),
        }
    }

    pub fn try_new(mins: IVec3, maxs: IVec3) -> StreamResult<Self> {
        if mins.cmpgt(maxs).any() {
            return Err(StreamError::InvalidRegion { mins, maxs });
        }
        let extent = maxs.as_i64vec3() - mins.as_i64vec3() + 1;
        if extent.max_element() > Self::MAX_EXTENT as i64 {
            return Err(StreamError::RegionTooLarge {
                mins,
                maxs,
                max_extent: Self::MAX_EXTENT,
            });
        }
        Ok(Self { mins, maxs })
    }

    /// The voxels covered by one chunk
    pub fn for_chunk(pos: ChunkPos, chunk_side: u32) -> Self {
        let mins = pos.origin(chunk_side);
        Self::new(mins, mins + IVec3::splat(chunk_side as i32 - 1))
    }

    pub fn mins(&self) -> IVec3 {
        self.mins
    }

    pub fn maxs(&self) -> IVec3 {
        self.maxs
    }

    pub fn width_in_voxels(&self) -> i32 {
        self.maxs.x - self.mins.x + 1
    }

    pub fn height_in_voxels(&self) -> i32 {
        self.maxs.y - self.mins.y + 1
    }

    pub fn depth_in_voxels(&self) -> i32 {
        self.maxs.z - self.mins.z + 1
    }

    pub fn voxel_count(&self) -> u64 {
        self.width_in_voxels() as u64 * self.height_in_voxels() as u64 * self.depth_in_voxels() as u64
    }

    pub fn contains_point(&self, pos: IVec3) -> bool {
        pos.cmpge(self.mins).all() && pos.cmple(self.maxs).all()
    }

    pub fn center(&self) -> IVec3 {
        self.mins + (self.maxs - self.mins) / 2
    }

    /// Grow (or shrink, for negative amounts) the region on every side
    pub fn grown(&self, amount: i32) -> Self {
        Self::new(self.mins - IVec3::splat(amount), self.maxs + IVec3::splat(amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_region() {
        let region = Region::for_chunk(ChunkPos::new(-1, 0, 2), 32);
        assert_eq!(region.mins(), IVec3::new(-32, 0, 64));
        assert_eq!(region.maxs(), IVec3::new(-1, 31, 95));
        assert_eq!(region.width_in_voxels(), 32);
        assert_eq!(region.voxel_count(), 32 * 32 * 32);
        assert!(region.contains_point(IVec3::new(-1, 31, 64)));
        assert!(!region.contains_point(IVec3::new(0, 31, 64)));
    }

    #[test]
    fn test_try_new_rejects_inverted_bounds() {
        let err = Region::try_new(IVec3::new(0, 5, 0), IVec3::new(4, 4, 4)).unwrap_err();
        assert!(matches!(err, StreamError::InvalidRegion { .. }));
    }

    #[test]
    fn test_try_new_rejects_huge_bounds() {
        let err = Region::try_new(IVec3::ZERO, IVec3::new(Region::MAX_EXTENT, 0, 0)).unwrap_err();
        assert!(matches!(err, StreamError::RegionTooLarge { .. }));
        assert!(Region::try_new(IVec3::ZERO, IVec3::new(Region::MAX_EXTENT - 1, 0, 0)).is_ok());
    }

    #[test]
    #[should_panic(expected = "invalid region")]
    fn test_new_panics_on_inverted_bounds() {
        Region::new(IVec3::ONE, IVec3::ZERO);
    }

    #[test]
    fn test_grown() {
        let region = Region::new(IVec3::ZERO, IVec3::splat(3)).grown(1);
        assert_eq!(region.mins(), IVec3::splat(-1));
        assert_eq!(region.maxs(), IVec3::splat(4));
        assert_eq!(region.center(), IVec3::splat(1));
    }
}
