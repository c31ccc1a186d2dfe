//! Nearest-first traversal of the chunk grid around a center cell
//!
//! Offsets are produced shell by shell, where shell `r` holds every cell at
//! Chebyshev distance exactly `r`. Inside a shell the middle layers come
//! first and the caps last.

use glam::IVec3;

/// Number of cells on the border of a `(2r+1)²` square
pub fn ring_length(radius: i32) -> i32 {
    if radius == 0 {
        1
    } else {
        8 * radius
    }
}

/// The `i`-th cell of the square ring at `radius`, walking its four edges
pub fn ring_coord(radius: i32, i: i32) -> (i32, i32) {
    if radius == 0 {
        return (0, 0);
    }
    let side = 2 * radius;
    let edge = i / side;
    let offset = i % side;
    match edge {
        0 => (-radius + offset, -radius),
        1 => (radius, -radius + offset),
        2 => (radius - offset, radius),
        _ => (-radius, radius - offset),
    }
}

/// Number of cells in shell `radius`
pub fn shell_len(radius: i32) -> usize {
    if radius == 0 {
        1
    } else {
        (24 * radius * radius + 2) as usize
    }
}

/// Offsets of one shell
pub fn shell(radius: i32) -> impl Iterator<Item = IVec3> {
    let radius = radius.max(0);
    // 0, -1, 1, -2, 2, ...
    let layers = (0..=2 * radius).map(|k| if k % 2 == 0 { k / 2 } else { -(k + 1) / 2 });

    layers.flat_map(move |dy| {
        let cap = dy.abs() == radius;
        let width = 2 * radius + 1;
        let count = if cap { width * width } else { ring_length(radius) };
        (0..count).map(move |i| {
            let (dx, dz) = if cap {
                (i % width - radius, i / width - radius)
            } else {
                ring_coord(radius, i)
            };
            IVec3::new(dx, dy, dz)
        })
    })
}

/// Offsets of every shell from 0 to `max_radius`, nearest first
pub fn spiral(max_radius: i32) -> impl Iterator<Item = IVec3> {
    (0..=max_radius).flat_map(shell)
}
