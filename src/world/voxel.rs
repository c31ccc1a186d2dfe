use serde::{Deserialize, Serialize};

/// Material tag of a voxel
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VoxelType {
    #[default]
    Air = 0,
    Water,
    Generic,
    Grass,
    Dirt,
    Rock,
    Sand,
    Leaves,
    Wood,
    Cloud,
}

impl VoxelType {
    /// Water is the only material rendered into the translucent mesh
    pub fn is_translucent(self) -> bool {
        matches!(self, VoxelType::Water)
    }

    /// Materials a body can occupy (and therefore cannot stand on)
    pub fn is_enterable(self) -> bool {
        matches!(self, VoxelType::Air | VoxelType::Water | VoxelType::Cloud)
    }
}

/// The smallest unit of the world: a material plus a palette color index
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Voxel {
    material: VoxelType,
    color: u8,
}

impl Voxel {
    pub const AIR: Voxel = Voxel {
        material: VoxelType::Air,
        color: 0,
    };

    pub const fn new(material: VoxelType, color: u8) -> Self {
        Self { material, color }
    }

    pub fn material(&self) -> VoxelType {
        self.material
    }

    /// Palette color index
    pub fn color(&self) -> u8 {
        self.color
    }

    pub fn is_air(&self) -> bool {
        self.material == VoxelType::Air
    }

    /// Anything that is neither air nor water
    pub fn is_solid(&self) -> bool {
        !matches!(self.material, VoxelType::Air | VoxelType::Water)
    }

    pub fn is_translucent(&self) -> bool {
        self.material.is_translucent()
    }

    pub fn is_enterable(&self) -> bool {
        self.material.is_enterable()
    }

    pub fn is_walkable(&self) -> bool {
        !self.is_enterable()
    }
}
