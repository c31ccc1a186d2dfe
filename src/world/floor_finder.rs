//! Walkable floor search
//!
//! A floor is the lowest enterable voxel directly above a walkable one, i.e.
//! the voxel a body's feet occupy when standing on the ground.

use crate::world::{voxel_at, PagedVolume, RayWalk};
use glam::Vec3;

/// Find the floor height for a body at `position`
///
/// If the start voxel is enterable the search walks down at most
/// `max_depth` voxels to the first walkable voxel and returns the height
/// just above it. If the start voxel is walkable (the body is buried) it
/// walks up at most `max_upward_distance` voxels to the first enterable one.
/// Returns `None` when no floor lies within range.
pub fn find_walkable_floor(
    volume: &PagedVolume,
    position: Vec3,
    max_upward_distance: f32,
    max_depth: f32,
) -> Option<i32> {
    let start = voxel_at(position);
    let origin = start.as_vec3() + Vec3::splat(0.5);

    if volume.voxel(start).is_enterable() {
        RayWalk::new(volume, origin, Vec3::NEG_Y, max_depth)
            .find(|step| step.voxel.is_walkable())
            .map(|step| step.position.y + 1)
    } else {
        RayWalk::new(volume, origin, Vec3::Y, max_upward_distance)
            .find(|step| step.voxel.is_enterable())
            .map(|step| step.position.y)
    }
}
