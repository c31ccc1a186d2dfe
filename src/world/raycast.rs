use crate::world::{voxel_at, BlockFace, PagedVolume, Voxel, VolumeSampler};
use glam::{IVec3, Vec3};

/// One voxel visited by a [`RayWalk`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayStep {
    pub position: IVec3,
    /// Voxel visited just before this one, `None` for the start voxel
    pub previous: Option<IVec3>,
    pub voxel: Voxel,
    /// Ray parameter at which the ray entered this voxel
    pub distance: f32,
    /// Face of this voxel the ray came in through
    pub entered_through: Option<BlockFace>,
}

/// Result of a raycast that was stopped by its predicate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub position: IVec3,
    pub previous: Option<IVec3>,
    pub voxel: Voxel,
    pub distance: f32,
    pub face: Option<BlockFace>,
}

impl From<RayStep> for RaycastHit {
    fn from(step: RayStep) -> Self {
        Self {
            position: step.position,
            previous: step.previous,
            voxel: step.voxel,
            distance: step.distance,
            face: step.entered_through,
        }
    }
}

/// Lazy walk over every voxel a ray passes through, nearest first
///
/// Uniform grid traversal: each step moves the underlying sampler by exactly
/// one voxel along the axis whose boundary the ray crosses next. The walk ends
/// once the next boundary lies beyond `max_distance`.
pub struct RayWalk<'a> {
    sampler: VolumeSampler<'a>,
    step: IVec3,
    t_max: Vec3,
    t_delta: Vec3,
    max_distance: f32,
    distance: f32,
    previous: Option<IVec3>,
    entered_through: Option<BlockFace>,
    started: bool,
    finished: bool,
}

impl<'a> RayWalk<'a> {
    pub fn new(volume: &'a PagedVolume, origin: Vec3, direction: Vec3, max_distance: f32) -> Self {
        let mut sampler = VolumeSampler::new(volume);
        let start = voxel_at(origin);
        sampler.set_position(start);

        let direction = direction.normalize_or_zero();
        let mut step = IVec3::ZERO;
        let mut t_max = Vec3::splat(f32::INFINITY);
        let mut t_delta = Vec3::splat(f32::INFINITY);

        for axis in 0..3 {
            let d = direction[axis];
            let o = origin[axis];
            if d > 0.0 {
                step[axis] = 1;
                t_delta[axis] = 1.0 / d;
                t_max[axis] = (start[axis] as f32 + 1.0 - o) / d;
            } else if d < 0.0 {
                step[axis] = -1;
                t_delta[axis] = -1.0 / d;
                t_max[axis] = (o - start[axis] as f32) / -d;
            }
        }

        Self {
            sampler,
            step,
            t_max,
            t_delta,
            max_distance,
            distance: 0.0,
            previous: None,
            entered_through: None,
            started: false,
            finished: max_distance < 0.0,
        }
    }

    fn current(&self) -> RayStep {
        RayStep {
            position: self.sampler.position(),
            previous: self.previous,
            voxel: self.sampler.voxel(),
            distance: self.distance,
            entered_through: self.entered_through,
        }
    }
}

impl Iterator for RayWalk<'_> {
    type Item = RayStep;

    fn next(&mut self) -> Option<RayStep> {
        if self.finished {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(self.current());
        }

        let axis = if self.t_max.x <= self.t_max.y && self.t_max.x <= self.t_max.z {
            0
        } else if self.t_max.y <= self.t_max.z {
            1
        } else {
            2
        };

        let t = self.t_max[axis];
        if !t.is_finite() || t > self.max_distance {
            self.finished = true;
            return None;
        }

        let direction = BlockFace::from_axis(axis, self.step[axis] > 0);
        self.previous = Some(self.sampler.position());
        self.sampler.move_in_direction(direction);
        self.distance = t;
        self.entered_through = Some(direction.opposite());
        self.t_max[axis] += self.t_delta[axis];

        Some(self.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VolumeConfig;
    use crate::world::{MemoryPager, VoxelType};
    use std::sync::Arc;

    fn volume() -> PagedVolume {
        let config = VolumeConfig {
            chunk_side: 8,
            max_resident_chunks: 32,
        };
        PagedVolume::new(Arc::new(MemoryPager::new(8)), &config).expect("valid config")
    }

    #[test]
    fn test_walk_visits_neighbouring_voxels() {
        let volume = volume();
        let steps: Vec<RayStep> =
            RayWalk::new(&volume, Vec3::new(0.5, 0.5, 0.5), Vec3::new(1.0, 0.3, 0.0), 12.0).collect();

        assert_eq!(steps[0].position, IVec3::ZERO);
        assert_eq!(steps[0].previous, None);
        for pair in steps.windows(2) {
            let delta = pair[1].position - pair[0].position;
            assert_eq!(delta.x.abs() + delta.y.abs() + delta.z.abs(), 1);
            assert_eq!(pair[1].previous, Some(pair[0].position));
            assert!(pair[1].distance >= pair[0].distance);
        }
        assert!(steps.last().map_or(false, |s| s.distance <= 12.0));
    }

    #[test]
    fn test_walk_stops_at_max_distance() {
        let volume = volume();
        let count = RayWalk::new(&volume, Vec3::new(0.5, 0.5, 0.5), Vec3::X, 3.0).count();
        // Start voxel plus boundaries at 0.5, 1.5 and 2.5
        assert_eq!(count, 4);
    }

    #[test]
    fn test_walk_is_lazy_and_stops_early() {
        let volume = volume();
        volume.set_voxel(IVec3::new(-20, 0, 0), Voxel::new(VoxelType::Rock, 0));
        let hit = RayWalk::new(&volume, Vec3::new(0.5, 0.5, 0.5), Vec3::NEG_X, 1000.0)
            .find(|step| step.voxel.is_solid())
            .expect("rock should be hit");
        assert_eq!(hit.position, IVec3::new(-20, 0, 0));
        assert_eq!(hit.previous, Some(IVec3::new(-19, 0, 0)));
        assert_eq!(hit.entered_through, Some(BlockFace::Right));
        // Nothing past the hit was paged in
        assert!(!volume.is_resident(crate::world::ChunkPos::new(-4, 0, 0)));
    }

    #[test]
    fn test_zero_direction_yields_only_start() {
        let volume = volume();
        let steps: Vec<_> = RayWalk::new(&volume, Vec3::new(2.0, 3.0, 4.0), Vec3::ZERO, 10.0).collect();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].position, IVec3::new(2, 3, 4));
    }
}
