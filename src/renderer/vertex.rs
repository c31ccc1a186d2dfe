use bytemuck::{Pod, Zeroable};

/// Vertex emitted by the surface extractor
///
/// Positions are chunk-local; the chunk translation is applied at draw time.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct VoxelVertex {
    pub position: [f32; 3],
    pub color: u8, // Palette index
    pub ao: u8,    // Ambient occlusion, 0 (dark) ..= 3 (open)
    pub face: u8,  // BlockFace index, used for per-face shading
    pub flags: u8,
}

impl VoxelVertex {
    pub const FLAG_TRANSLUCENT: u8 = 1;

    pub fn new(position: [f32; 3], color: u8, ao: u8, face: u8) -> Self {
        Self {
            position,
            color,
            ao,
            face,
            flags: 0,
        }
    }

    #[cfg(feature = "wgpu-backend")]
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<VoxelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                // Position
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // Color, ao, face, flags
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Uint8x4,
                },
            ],
        }
    }
}
