//! `wgpu` implementation of [`GraphicsBackend`]
//!
//! Draw calls are recorded while the cache renders and replayed into a
//! render pass with [`WgpuBackend::encode`]. The chunk translation is passed
//! as a 12 byte vertex push constant, so the pipeline layout needs
//! [`WgpuBackend::push_constant_range`] and the device
//! [`WgpuBackend::REQUIRED_FEATURES`].

use crate::renderer::error::{gpu_operation_error, GpuError, GpuResult};
use crate::renderer::gpu::{BufferHandle, GraphicsBackend};
use crate::renderer::mesh::MeshKind;
use crate::renderer::vertex::VoxelVertex;
use glam::IVec3;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use wgpu::util::DeviceExt;

struct GpuChunkMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_indices: u32,
}

#[derive(Debug, Clone, Copy)]
struct RecordedDraw {
    handle: BufferHandle,
    kind: MeshKind,
    translation: IVec3,
    index_count: u32,
}

pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    meshes: FxHashMap<BufferHandle, GpuChunkMesh>,
    next_handle: u64,
    draws: Vec<RecordedDraw>,
}

impl WgpuBackend {
    pub const REQUIRED_FEATURES: wgpu::Features = wgpu::Features::PUSH_CONSTANTS;

    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            meshes: FxHashMap::default(),
            next_handle: 0,
            draws: Vec::new(),
        }
    }

    /// Push constant range holding the chunk translation
    pub fn push_constant_range() -> wgpu::PushConstantRange {
        wgpu::PushConstantRange {
            stages: wgpu::ShaderStages::VERTEX,
            range: 0..12,
        }
    }

    pub fn live_buffers(&self) -> usize {
        self.meshes.len()
    }

    /// Forget the draws recorded for the previous frame
    pub fn begin_frame(&mut self) {
        self.draws.clear();
    }

    /// Replay the draws of `kind` recorded since [`WgpuBackend::begin_frame`]
    ///
    /// The caller binds the pipeline for `kind` first.
    pub fn encode<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>, kind: MeshKind) -> usize {
        let mut encoded = 0;
        for draw in self.draws.iter().filter(|draw| draw.kind == kind) {
            let Some(mesh) = self.meshes.get(&draw.handle) else {
                continue;
            };
            let translation = draw.translation.as_vec3().to_array();
            pass.set_push_constants(wgpu::ShaderStages::VERTEX, 0, bytemuck::cast_slice(&translation));
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..draw.index_count.min(mesh.num_indices), 0, 0..1);
            encoded += 1;
        }
        encoded
    }

    fn create_mesh(&self, vertices: &[VoxelVertex], indices: &[u32]) -> GpuResult<GpuChunkMesh> {
        let bytes = (std::mem::size_of_val(vertices) + std::mem::size_of_val(indices)) as u64;

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Chunk Vertex Buffer"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Chunk Index Buffer"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
        });

        match pollster::block_on(self.device.pop_error_scope()) {
            None => Ok(GpuChunkMesh {
                vertex_buffer,
                index_buffer,
                num_indices: indices.len() as u32,
            }),
            Some(wgpu::Error::OutOfMemory { .. }) => {
                vertex_buffer.destroy();
                index_buffer.destroy();
                Err(GpuError::OutOfMemory { bytes })
            }
            Some(error) => {
                vertex_buffer.destroy();
                index_buffer.destroy();
                Err(gpu_operation_error("create_buffer", error))
            }
        }
    }
}

impl GraphicsBackend for WgpuBackend {
    fn create_buffer(&mut self, vertices: &[VoxelVertex], indices: &[u32]) -> GpuResult<BufferHandle> {
        let mesh = self.create_mesh(vertices, indices)?;
        self.next_handle += 1;
        let handle = BufferHandle(self.next_handle);
        self.meshes.insert(handle, mesh);
        Ok(handle)
    }

    fn update_buffer(&mut self, handle: BufferHandle, vertices: &[VoxelVertex], indices: &[u32]) -> GpuResult<()> {
        let mesh = self.meshes.get_mut(&handle).ok_or(GpuError::UnknownHandle(handle))?;

        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(indices);
        if vertex_bytes.len() as u64 <= mesh.vertex_buffer.size() && index_bytes.len() as u64 <= mesh.index_buffer.size()
        {
            self.queue.write_buffer(&mesh.vertex_buffer, 0, vertex_bytes);
            self.queue.write_buffer(&mesh.index_buffer, 0, index_bytes);
            mesh.num_indices = indices.len() as u32;
            return Ok(());
        }

        // Grown past the old allocation
        let replacement = self.create_mesh(vertices, indices)?;
        if let Some(old) = self.meshes.insert(handle, replacement) {
            old.vertex_buffer.destroy();
            old.index_buffer.destroy();
        }
        Ok(())
    }

    fn destroy_buffer(&mut self, handle: BufferHandle) {
        match self.meshes.remove(&handle) {
            Some(mesh) => {
                mesh.vertex_buffer.destroy();
                mesh.index_buffer.destroy();
            }
            None => log::warn!("[WgpuBackend::destroy_buffer] Unknown handle {:?}", handle),
        }
    }

    fn draw_indexed(&mut self, handle: BufferHandle, kind: MeshKind, translation: IVec3, index_count: u32) {
        self.draws.push(RecordedDraw {
            handle,
            kind,
            translation,
            index_count,
        });
    }
}
