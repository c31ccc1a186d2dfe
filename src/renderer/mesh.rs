use crate::renderer::frustum::Aabb;
use crate::renderer::vertex::VoxelVertex;
use crate::world::ChunkPos;
use glam::{IVec3, Vec3};

/// Which render pass a mesh belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshKind {
    Opaque,
    Translucent,
}

impl MeshKind {
    /// Draw order: opaque first, translucent on top
    pub const ALL: [MeshKind; 2] = [MeshKind::Opaque, MeshKind::Translucent];

    pub fn index(self) -> usize {
        match self {
            MeshKind::Opaque => 0,
            MeshKind::Translucent => 1,
        }
    }
}

/// Indexed triangle list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<VoxelVertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }

    /// Add a quad as two triangles
    ///
    /// `flip_diagonal` splits the quad along vertices 1-3 instead of 0-2, used
    /// to keep ambient occlusion gradients symmetric.
    pub fn add_quad(&mut self, vertices: [VoxelVertex; 4], flip_diagonal: bool) {
        let start_index = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&vertices);

        let order: [u32; 6] = if flip_diagonal {
            [1, 2, 3, 1, 3, 0]
        } else {
            [0, 1, 2, 0, 2, 3]
        };
        self.indices.extend(order.iter().map(|i| start_index + i));
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Local-space bounds of the vertices
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut iter = self.vertices.iter().map(|v| Vec3::from(v.position));
        let first = iter.next()?;
        Some(iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p))))
    }
}

/// Extraction output for one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMeshData {
    pub chunk_pos: ChunkPos,
    /// World-space translation of the chunk's min corner
    pub translation: IVec3,
    meshes: [Mesh; 2],
}

impl ChunkMeshData {
    pub fn new(chunk_pos: ChunkPos, translation: IVec3, opaque: Mesh, translucent: Mesh) -> Self {
        Self {
            chunk_pos,
            translation,
            meshes: [opaque, translucent],
        }
    }

    /// Result for a chunk with nothing to render
    pub fn empty(chunk_pos: ChunkPos, translation: IVec3) -> Self {
        Self::new(chunk_pos, translation, Mesh::new(), Mesh::new())
    }

    pub fn mesh(&self, kind: MeshKind) -> &Mesh {
        &self.meshes[kind.index()]
    }

    /// Non-empty meshes with their kind
    pub fn meshes(&self) -> impl Iterator<Item = (MeshKind, &Mesh)> {
        MeshKind::ALL
            .into_iter()
            .map(move |kind| (kind, self.mesh(kind)))
            .filter(|(_, mesh)| !mesh.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.iter().all(Mesh::is_empty)
    }

    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(|m| m.vertices.len()).sum()
    }

    /// World-space bounding box of all meshes
    pub fn aabb(&self) -> Option<Aabb> {
        let offset = self.translation.as_vec3();
        self.meshes
            .iter()
            .filter_map(Mesh::bounds)
            .map(|(min, max)| Aabb::new(min + offset, max + offset))
            .reduce(|a, b| a.union(&b))
    }
}
