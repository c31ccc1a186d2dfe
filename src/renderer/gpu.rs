//! Graphics backend abstraction and scoped GPU buffers

use crate::renderer::error::{GpuError, GpuResult};
use crate::renderer::mesh::{ChunkMeshData, MeshKind};
use crate::renderer::vertex::VoxelVertex;
use crate::world::ChunkPos;
use glam::IVec3;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

/// Opaque handle to one vertex+index buffer pair owned by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

/// The four operations the streaming cache needs from a graphics API
///
/// Only ever called from the render thread.
pub trait GraphicsBackend {
    fn create_buffer(&mut self, vertices: &[VoxelVertex], indices: &[u32]) -> GpuResult<BufferHandle>;

    fn update_buffer(&mut self, handle: BufferHandle, vertices: &[VoxelVertex], indices: &[u32]) -> GpuResult<()>;

    fn destroy_buffer(&mut self, handle: BufferHandle);

    fn draw_indexed(&mut self, handle: BufferHandle, kind: MeshKind, translation: IVec3, index_count: u32);
}

/// Handles whose owner was dropped without an explicit release
///
/// The streaming cache drains it at the start of every frame.
#[derive(Clone, Default)]
pub struct ReleaseQueue {
    handles: Arc<Mutex<Vec<BufferHandle>>>,
}

impl ReleaseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, handle: BufferHandle) {
        self.handles.lock().push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroy every queued handle
    pub fn drain_into<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) -> usize {
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in &handles {
            backend.destroy_buffer(*handle);
        }
        handles.len()
    }
}

#[derive(Debug, Clone, Copy)]
struct GpuMesh {
    handle: BufferHandle,
    index_count: u32,
}

/// GPU buffers of one chunk, one per non-empty mesh kind
///
/// [`GpuChunkBuffers::release`] is the deterministic release point. Dropping
/// the value without releasing it hands its handles to the [`ReleaseQueue`]
/// so nothing leaks.
pub struct GpuChunkBuffers {
    chunk_pos: ChunkPos,
    meshes: [Option<GpuMesh>; 2],
    release_queue: ReleaseQueue,
}

impl GpuChunkBuffers {
    pub fn new(chunk_pos: ChunkPos, release_queue: ReleaseQueue) -> Self {
        Self {
            chunk_pos,
            meshes: [None, None],
            release_queue,
        }
    }

    /// Upload (or update in place) the meshes of `data`
    ///
    /// Kinds that became empty have their buffer destroyed.
    pub fn upload<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B, data: &ChunkMeshData) -> GpuResult<()> {
        for kind in MeshKind::ALL {
            let mesh = data.mesh(kind);
            let slot = &mut self.meshes[kind.index()];

            if mesh.is_empty() {
                if let Some(old) = slot.take() {
                    backend.destroy_buffer(old.handle);
                }
                continue;
            }

            match slot {
                Some(existing) => {
                    backend.update_buffer(existing.handle, &mesh.vertices, &mesh.indices)?;
                    existing.index_count = mesh.index_count();
                }
                None => {
                    let handle = backend.create_buffer(&mesh.vertices, &mesh.indices)?;
                    *slot = Some(GpuMesh {
                        handle,
                        index_count: mesh.index_count(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Draw the buffer of one mesh kind, false when the chunk has none
    pub fn draw_kind<B: GraphicsBackend + ?Sized>(&self, backend: &mut B, kind: MeshKind, translation: IVec3) -> bool {
        match &self.meshes[kind.index()] {
            Some(mesh) => {
                backend.draw_indexed(mesh.handle, kind, translation, mesh.index_count);
                true
            }
            None => false,
        }
    }

    pub fn has_kind(&self, kind: MeshKind) -> bool {
        self.meshes[kind.index()].is_some()
    }

    pub fn handles(&self) -> impl Iterator<Item = BufferHandle> + '_ {
        self.meshes.iter().flatten().map(|mesh| mesh.handle)
    }

    pub fn index_count(&self) -> u32 {
        self.meshes.iter().flatten().map(|mesh| mesh.index_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.iter().all(Option::is_none)
    }

    /// Destroy every buffer now
    pub fn release<B: GraphicsBackend + ?Sized>(mut self, backend: &mut B) {
        for slot in &mut self.meshes {
            if let Some(mesh) = slot.take() {
                backend.destroy_buffer(mesh.handle);
            }
        }
    }
}

impl Drop for GpuChunkBuffers {
    fn drop(&mut self) {
        for slot in &mut self.meshes {
            if let Some(mesh) = slot.take() {
                log::debug!(
                    "[GpuChunkBuffers::drop] Deferring release of {:?} for chunk {:?}",
                    mesh.handle,
                    self.chunk_pos
                );
                self.release_queue.push(mesh.handle);
            }
        }
    }
}

/// One recorded draw call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    pub handle: BufferHandle,
    pub kind: MeshKind,
    pub translation: IVec3,
    pub index_count: u32,
}

/// Backend without a GPU that tracks buffers in memory
///
/// Used by the headless demo and for checking buffer lifetimes. An optional
/// memory limit makes buffer creation fail like an exhausted GPU would.
#[derive(Default)]
pub struct HeadlessBackend {
    next_handle: u64,
    live: FxHashMap<BufferHandle, u64>,
    destroyed: FxHashSet<BufferHandle>,
    memory_limit: Option<u64>,
    used_bytes: u64,
    draw_calls: Vec<DrawCall>,
    stale_handle_uses: usize,
    created: usize,
    updated: usize,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memory_limit(bytes: u64) -> Self {
        Self {
            memory_limit: Some(bytes),
            ..Self::default()
        }
    }

    pub fn set_memory_limit(&mut self, bytes: Option<u64>) {
        self.memory_limit = bytes;
    }

    /// Clear the draw calls recorded during the previous frame
    pub fn begin_frame(&mut self) {
        self.draw_calls.clear();
    }

    pub fn draw_calls(&self) -> &[DrawCall] {
        &self.draw_calls
    }

    pub fn live_buffers(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, handle: BufferHandle) -> bool {
        self.live.contains_key(&handle)
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    pub fn buffers_created(&self) -> usize {
        self.created
    }

    pub fn buffers_updated(&self) -> usize {
        self.updated
    }

    /// Number of update, destroy or draw calls that named a destroyed handle
    pub fn stale_handle_uses(&self) -> usize {
        self.stale_handle_uses
    }

    fn buffer_bytes(vertices: &[VoxelVertex], indices: &[u32]) -> u64 {
        (std::mem::size_of_val(vertices) + std::mem::size_of_val(indices)) as u64
    }

    fn reserve(&mut self, bytes: u64) -> GpuResult<()> {
        if let Some(limit) = self.memory_limit {
            if self.used_bytes + bytes > limit {
                return Err(GpuError::OutOfMemory { bytes });
            }
        }
        self.used_bytes += bytes;
        Ok(())
    }

    fn check_handle(&mut self, handle: BufferHandle) -> GpuResult<u64> {
        match self.live.get(&handle) {
            Some(bytes) => Ok(*bytes),
            None => {
                if self.destroyed.contains(&handle) {
                    self.stale_handle_uses += 1;
                }
                Err(GpuError::UnknownHandle(handle))
            }
        }
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn create_buffer(&mut self, vertices: &[VoxelVertex], indices: &[u32]) -> GpuResult<BufferHandle> {
        let bytes = Self::buffer_bytes(vertices, indices);
        self.reserve(bytes)?;
        self.next_handle += 1;
        let handle = BufferHandle(self.next_handle);
        self.live.insert(handle, bytes);
        self.created += 1;
        Ok(handle)
    }

    fn update_buffer(&mut self, handle: BufferHandle, vertices: &[VoxelVertex], indices: &[u32]) -> GpuResult<()> {
        let old_bytes = self.check_handle(handle)?;
        let bytes = Self::buffer_bytes(vertices, indices);
        self.used_bytes -= old_bytes;
        if let Err(err) = self.reserve(bytes) {
            self.used_bytes += old_bytes;
            return Err(err);
        }
        self.live.insert(handle, bytes);
        self.updated += 1;
        Ok(())
    }

    fn destroy_buffer(&mut self, handle: BufferHandle) {
        match self.live.remove(&handle) {
            Some(bytes) => {
                self.used_bytes -= bytes;
                self.destroyed.insert(handle);
            }
            None => {
                if self.destroyed.contains(&handle) {
                    self.stale_handle_uses += 1;
                }
                log::warn!("[HeadlessBackend::destroy_buffer] Unknown handle {:?}", handle);
            }
        }
    }

    fn draw_indexed(&mut self, handle: BufferHandle, kind: MeshKind, translation: IVec3, index_count: u32) {
        if self.check_handle(handle).is_err() {
            log::warn!("[HeadlessBackend::draw_indexed] Draw with dead handle {:?}", handle);
            return;
        }
        self.draw_calls.push(DrawCall {
            handle,
            kind,
            translation,
            index_count,
        });
    }
}
