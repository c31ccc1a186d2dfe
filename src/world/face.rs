use glam::IVec3;

/// One of the six axis directions, also used to name the faces of a voxel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockFace {
    Right,  // +X
    Left,   // -X
    Top,    // +Y
    Bottom, // -Y
    Front,  // +Z
    Back,   // -Z
}

impl BlockFace {
    pub const ALL: [BlockFace; 6] = [
        BlockFace::Right,
        BlockFace::Left,
        BlockFace::Top,
        BlockFace::Bottom,
        BlockFace::Front,
        BlockFace::Back,
    ];

    pub fn offset(&self) -> IVec3 {
        match self {
            BlockFace::Right => IVec3::X,
            BlockFace::Left => IVec3::NEG_X,
            BlockFace::Top => IVec3::Y,
            BlockFace::Bottom => IVec3::NEG_Y,
            BlockFace::Front => IVec3::Z,
            BlockFace::Back => IVec3::NEG_Z,
        }
    }

    /// Axis index (0 = x, 1 = y, 2 = z)
    pub fn axis(&self) -> usize {
        match self {
            BlockFace::Right | BlockFace::Left => 0,
            BlockFace::Top | BlockFace::Bottom => 1,
            BlockFace::Front | BlockFace::Back => 2,
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, BlockFace::Right | BlockFace::Top | BlockFace::Front)
    }

    pub fn opposite(&self) -> BlockFace {
        match self {
            BlockFace::Right => BlockFace::Left,
            BlockFace::Left => BlockFace::Right,
            BlockFace::Top => BlockFace::Bottom,
            BlockFace::Bottom => BlockFace::Top,
            BlockFace::Front => BlockFace::Back,
            BlockFace::Back => BlockFace::Front,
        }
    }

    /// Direction of travel along an axis
    pub fn from_axis(axis: usize, positive: bool) -> BlockFace {
        match (axis, positive) {
            (0, true) => BlockFace::Right,
            (0, false) => BlockFace::Left,
            (1, true) => BlockFace::Top,
            (1, false) => BlockFace::Bottom,
            (_, true) => BlockFace::Front,
            (_, false) => BlockFace::Back,
        }
    }

    pub fn index(&self) -> u8 {
        match self {
            BlockFace::Right => 0,
            BlockFace::Left => 1,
            BlockFace::Top => 2,
            BlockFace::Bottom => 3,
            BlockFace::Front => 4,
            BlockFace::Back => 5,
        }
    }
}
