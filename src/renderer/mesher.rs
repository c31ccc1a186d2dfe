//! Cubic surface extraction with greedy face merging
//!
//! Every voxel face between a visible material and a material that lets it
//! show becomes part of a quad. Coplanar faces with the same voxel and the
//! same ambient occlusion are merged into larger rectangles.

use crate::renderer::mesh::{ChunkMeshData, Mesh, MeshKind};
use crate::renderer::vertex::VoxelVertex;
use crate::world::{BlockFace, ExtractionSnapshot, Voxel};
use glam::IVec3;

/// Face that survived culling, compared for merging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FaceKey {
    voxel: Voxel,
    kind: MeshKind,
    ao: [u8; 4],
}

/// Which mesh (if any) the face between `back` and `front` goes into
pub fn face_kind(back: Voxel, front: Voxel) -> Option<MeshKind> {
    if back.is_solid() && !front.is_solid() {
        Some(MeshKind::Opaque)
    } else if back.is_translucent() && front.is_air() {
        Some(MeshKind::Translucent)
    } else {
        None
    }
}

/// Extract the opaque and translucent meshes of a snapshot
pub fn extract_chunk_mesh(snapshot: &ExtractionSnapshot) -> ChunkMeshData {
    let side = snapshot.side() as i32;
    let mut meshes = [Mesh::new(), Mesh::new()];
    let mut mask: Vec<Option<FaceKey>> = vec![None; (side * side) as usize];

    for face in BlockFace::ALL {
        let axis = face.axis();
        let u_axis = (axis + 1) % 3;
        let v_axis = (axis + 2) % 3;

        for depth in 0..side {
            build_mask(snapshot, face, depth, &mut mask);

            for v in 0..side {
                let mut u = 0;
                while u < side {
                    let Some(key) = mask[(u + v * side) as usize] else {
                        u += 1;
                        continue;
                    };

                    let mut width = 1;
                    while u + width < side && mask[(u + width + v * side) as usize] == Some(key) {
                        width += 1;
                    }

                    let mut height = 1;
                    'grow: while v + height < side {
                        for du in 0..width {
                            if mask[(u + du + (v + height) * side) as usize] != Some(key) {
                                break 'grow;
                            }
                        }
                        height += 1;
                    }

                    for dv in 0..height {
                        for du in 0..width {
                            mask[(u + du + (v + dv) * side) as usize] = None;
                        }
                    }

                    let mut origin = IVec3::ZERO;
                    origin[axis] = depth + if face.is_positive() { 1 } else { 0 };
                    origin[u_axis] = u;
                    origin[v_axis] = v;
                    let mut du = IVec3::ZERO;
                    du[u_axis] = width;
                    let mut dv = IVec3::ZERO;
                    dv[v_axis] = height;

                    emit_quad(&mut meshes[key.kind.index()], face, origin, du, dv, key);
                    u += width;
                }
            }
        }
    }

    let [opaque, translucent] = meshes;
    let chunk_pos = snapshot.position();
    ChunkMeshData::new(chunk_pos, chunk_pos.origin(snapshot.side()), opaque, translucent)
}

fn build_mask(snapshot: &ExtractionSnapshot, face: BlockFace, depth: i32, mask: &mut [Option<FaceKey>]) {
    let side = snapshot.side() as i32;
    let axis = face.axis();
    let u_axis = (axis + 1) % 3;
    let v_axis = (axis + 2) % 3;
    let normal = face.offset();

    for v in 0..side {
        for u in 0..side {
            let mut pos = IVec3::ZERO;
            pos[axis] = depth;
            pos[u_axis] = u;
            pos[v_axis] = v;

            let back = sample(snapshot, pos);
            let front_pos = pos + normal;
            let front = sample(snapshot, front_pos);

            mask[(u + v * side) as usize] = face_kind(back, front).map(|kind| {
                let mut u_dir = IVec3::ZERO;
                u_dir[u_axis] = 1;
                let mut v_dir = IVec3::ZERO;
                v_dir[v_axis] = 1;
                FaceKey {
                    voxel: back,
                    kind,
                    ao: [
                        vertex_ao(snapshot, front_pos, -u_dir, -v_dir),
                        vertex_ao(snapshot, front_pos, u_dir, -v_dir),
                        vertex_ao(snapshot, front_pos, u_dir, v_dir),
                        vertex_ao(snapshot, front_pos, -u_dir, v_dir),
                    ],
                }
            });
        }
    }
}

#[inline]
fn sample(snapshot: &ExtractionSnapshot, pos: IVec3) -> Voxel {
    snapshot.get(pos.x, pos.y, pos.z)
}

/// Ambient occlusion of one face corner, 0 (fully occluded) to 3 (open)
fn vertex_ao(snapshot: &ExtractionSnapshot, front: IVec3, u_dir: IVec3, v_dir: IVec3) -> u8 {
    let side1 = sample(snapshot, front + u_dir).is_solid();
    let side2 = sample(snapshot, front + v_dir).is_solid();
    if side1 && side2 {
        return 0;
    }
    let corner = sample(snapshot, front + u_dir + v_dir).is_solid();
    3 - (side1 as u8 + side2 as u8 + corner as u8)
}

fn emit_quad(mesh: &mut Mesh, face: BlockFace, origin: IVec3, du: IVec3, dv: IVec3, key: FaceKey) {
    let corners = [origin, origin + du, origin + du + dv, origin + dv];
    let mut vertices = [VoxelVertex::new([0.0; 3], 0, 0, 0); 4];
    for (i, corner) in corners.iter().enumerate() {
        let mut vertex = VoxelVertex::new(corner.as_vec3().to_array(), key.voxel.color(), key.ao[i], face.index());
        if key.kind == MeshKind::Translucent {
            vertex.flags |= VoxelVertex::FLAG_TRANSLUCENT;
        }
        vertices[i] = vertex;
    }

    let flip = (key.ao[0] as u16 + key.ao[2] as u16) < (key.ao[1] as u16 + key.ao[3] as u16);
    if face.is_positive() {
        mesh.add_quad(vertices, flip);
    } else {
        // Reverse the winding so the quad faces outwards
        let [a, b, c, d] = vertices;
        mesh.add_quad([a, d, c, b], flip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{ChunkData, ChunkPos, VoxelType};
    use std::sync::Arc;

    fn snapshot_of(chunk: &ChunkData, neighbours: [Option<Arc<ChunkData>>; 27]) -> ExtractionSnapshot {
        ExtractionSnapshot::assemble(chunk, &neighbours)
    }

    fn rock() -> Voxel {
        Voxel::new(VoxelType::Rock, 5)
    }

    #[test]
    fn test_single_voxel_has_six_faces() {
        let mut chunk = ChunkData::new(ChunkPos::new(0, 0, 0), 8);
        chunk.set(3, 3, 3, rock());
        let data = extract_chunk_mesh(&snapshot_of(&chunk, Default::default()));

        let opaque = data.mesh(MeshKind::Opaque);
        assert_eq!(opaque.vertices.len(), 24);
        assert_eq!(opaque.indices.len(), 36);
        assert!(data.mesh(MeshKind::Translucent).is_empty());
        assert!(opaque.vertices.iter().all(|v| v.color == 5 && v.ao == 3));
    }

    #[test]
    fn test_flat_floor_merges_into_few_quads() {
        let mut chunk = ChunkData::new(ChunkPos::new(2, 0, -1), 8);
        for z in 0..8 {
            for x in 0..8 {
                chunk.set(x, 0, z, rock());
            }
        }
        let data = extract_chunk_mesh(&snapshot_of(&chunk, Default::default()));

        // Top, bottom and four sides, each one merged quad
        assert_eq!(data.mesh(MeshKind::Opaque).vertices.len(), 6 * 4);
        assert_eq!(data.translation, IVec3::new(16, 0, -8));
        let aabb = data.aabb().expect("non-empty");
        assert_eq!(aabb.min, glam::Vec3::new(16.0, 0.0, -8.0));
        assert_eq!(aabb.max, glam::Vec3::new(24.0, 1.0, 0.0));
    }

    #[test]
    fn test_neighbour_border_culls_faces() {
        let side = 8;
        let mut chunk = ChunkData::new(ChunkPos::new(0, 0, 0), side);
        chunk.set(side - 1, 0, 0, rock());
        let mut east = ChunkData::new(ChunkPos::new(1, 0, 0), side);
        east.set(0, 0, 0, rock());

        let mut neighbours: [Option<Arc<ChunkData>>; 27] = Default::default();
        neighbours[2 + 3 + 9] = Some(Arc::new(east));
        let data = extract_chunk_mesh(&snapshot_of(&chunk, neighbours));

        assert_eq!(data.mesh(MeshKind::Opaque).vertices.len(), 5 * 4);
    }

    #[test]
    fn test_water_goes_into_translucent_mesh() {
        let mut chunk = ChunkData::new(ChunkPos::new(0, 0, 0), 4);
        chunk.set(1, 0, 1, rock());
        chunk.set(1, 1, 1, Voxel::new(VoxelType::Water, 9));
        let data = extract_chunk_mesh(&snapshot_of(&chunk, Default::default()));

        // Rock keeps its face under water; water skips the face against rock
        assert_eq!(data.mesh(MeshKind::Opaque).vertices.len(), 6 * 4);
        let translucent = data.mesh(MeshKind::Translucent);
        assert_eq!(translucent.vertices.len(), 5 * 4);
        assert!(translucent
            .vertices
            .iter()
            .all(|v| v.flags & VoxelVertex::FLAG_TRANSLUCENT != 0));
    }

    #[test]
    fn test_corner_neighbours_darken_vertices() {
        let mut chunk = ChunkData::new(ChunkPos::new(0, 0, 0), 8);
        chunk.set(3, 0, 3, rock());
        chunk.set(4, 1, 3, rock());
        let data = extract_chunk_mesh(&snapshot_of(&chunk, Default::default()));
        assert!(data.mesh(MeshKind::Opaque).vertices.iter().any(|v| v.ao < 3));
    }

    #[test]
    fn test_quads_split_along_brighter_diagonal() {
        let mut chunk = ChunkData::new(ChunkPos::new(0, 0, 0), 8);
        chunk.set(3, 0, 3, rock());
        chunk.set(4, 1, 4, rock());
        let data = extract_chunk_mesh(&snapshot_of(&chunk, Default::default()));
        let opaque = data.mesh(MeshKind::Opaque);

        let mut uneven = 0;
        for (quad, indices) in opaque.vertices.chunks(4).zip(opaque.indices.chunks(6)) {
            let start = indices.iter().copied().min().unwrap_or(0);
            let (d02, d13) = (quad[0].ao + quad[2].ao, quad[1].ao + quad[3].ao);
            if d02 != d13 {
                uneven += 1;
            }
            let expected_first = if d02 < d13 { start + 1 } else { start };
            assert_eq!(indices[0], expected_first);
        }
        assert!(uneven > 0);
    }

    #[test]
    fn test_empty_chunk_has_empty_meshes() {
        let chunk = ChunkData::new(ChunkPos::new(0, 0, 0), 8);
        assert!(extract_chunk_mesh(&snapshot_of(&chunk, Default::default())).is_empty());
    }

    #[test]
    fn test_face_kind_rules() {
        let air = Voxel::AIR;
        let water = Voxel::new(VoxelType::Water, 0);
        assert_eq!(face_kind(rock(), air), Some(MeshKind::Opaque));
        assert_eq!(face_kind(rock(), water), Some(MeshKind::Opaque));
        assert_eq!(face_kind(rock(), rock()), None);
        assert_eq!(face_kind(water, air), Some(MeshKind::Translucent));
        assert_eq!(face_kind(water, water), None);
        assert_eq!(face_kind(air, rock()), None);
    }
}
