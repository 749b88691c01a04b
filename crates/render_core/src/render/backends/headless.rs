//! Headless backend
//!
//! Keeps uploaded instance buffers in host memory and records draw calls
//! instead of submitting them. Used by the demo binary and as the GPU stand-in
//! in tests: every live buffer can be inspected byte for byte and leaked
//! handles show up in [`HeadlessBackend::live_buffer_count`].

use crate::ecs::{MaterialId, MeshId, TextureId};
use crate::foundation::collections::{DefaultKey, HandleMap, Key, KeyData};
use crate::render::api::{
    AttributeLayout, BackendResult, BufferHandle, GpuBufferSink, MaterialTable, MeshInfo,
    MeshTable, VertexLayoutHandle,
};
use crate::render::RenderError;
use std::collections::HashMap;

/// Instance buffer held by the headless backend
#[derive(Debug, Clone)]
pub struct UploadedBuffer {
    /// Layout the buffer was bound to
    pub layout: VertexLayoutHandle,
    /// Uploaded bytes
    pub bytes: Vec<u8>,
    /// Attribute configuration
    pub attributes: Vec<AttributeLayout>,
}

/// One recorded instanced draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    /// Vertex layout bound for the draw
    pub layout: VertexLayoutHandle,
    /// Instance buffer bound for the draw
    pub buffer: BufferHandle,
    /// Indices per instance
    pub index_count: u32,
    /// Instances drawn
    pub instance_count: u32,
}

/// Cumulative backend counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    /// Buffers uploaded
    pub uploads: usize,
    /// Buffers released
    pub releases: usize,
    /// Draw calls recorded
    pub draws: usize,
    /// Bytes uploaded
    pub bytes_uploaded: usize,
}

/// In-memory mesh/material tables and buffer sink
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    buffers: HandleMap<UploadedBuffer>,
    meshes: HashMap<MeshId, MeshInfo>,
    materials: HashMap<MaterialId, Vec<TextureId>>,
    draw_calls: Vec<DrawCall>,
    stats: HeadlessStats,
    next_mesh: u64,
    next_material: u64,
}

impl HeadlessBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mesh drawing `index_count` indices, with its own vertex layout
    pub fn register_mesh(&mut self, index_count: u32) -> MeshId {
        self.next_mesh += 1;
        let mesh = MeshId(self.next_mesh);
        self.meshes.insert(
            mesh,
            MeshInfo {
                index_count,
                vertex_layout: VertexLayoutHandle(self.next_mesh),
            },
        );
        mesh
    }

    /// Register a material using `textures`
    pub fn register_material(&mut self, textures: Vec<TextureId>) -> MaterialId {
        self.next_material += 1;
        let material = MaterialId(self.next_material);
        self.materials.insert(material, textures);
        material
    }

    /// Buffer behind a live handle
    pub fn buffer(&self, handle: BufferHandle) -> Option<&UploadedBuffer> {
        self.buffers.get(Self::key(handle))
    }

    /// Number of buffers uploaded and not yet released
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Draw calls recorded since the last [`take_draw_calls`](Self::take_draw_calls)
    pub fn draw_calls(&self) -> &[DrawCall] {
        &self.draw_calls
    }

    /// Drain the recorded draw calls
    pub fn take_draw_calls(&mut self) -> Vec<DrawCall> {
        std::mem::take(&mut self.draw_calls)
    }

    /// Cumulative counters
    pub fn stats(&self) -> &HeadlessStats {
        &self.stats
    }

    fn key(handle: BufferHandle) -> DefaultKey {
        KeyData::from_ffi(handle.0).into()
    }
}

impl MeshTable for HeadlessBackend {
    fn mesh_info(&self, mesh: MeshId) -> Option<MeshInfo> {
        self.meshes.get(&mesh).copied()
    }
}

impl MaterialTable for HeadlessBackend {
    fn material_textures(&self, material: MaterialId) -> Option<&[TextureId]> {
        self.materials.get(&material).map(Vec::as_slice)
    }
}

impl GpuBufferSink for HeadlessBackend {
    fn upload_instance_buffer(
        &mut self,
        layout: VertexLayoutHandle,
        bytes: &[u8],
        attributes: &[AttributeLayout],
    ) -> BackendResult<BufferHandle> {
        if let Some(stride) = attributes.first().map(|a| a.stride) {
            if stride == 0 || bytes.len() % stride != 0 {
                return Err(RenderError::ResourceCreationFailed(format!(
                    "{} bytes is not a whole number of {}-byte records",
                    bytes.len(),
                    stride
                )));
            }
        }

        let key = self.buffers.insert(UploadedBuffer {
            layout,
            bytes: bytes.to_vec(),
            attributes: attributes.to_vec(),
        });
        self.stats.uploads += 1;
        self.stats.bytes_uploaded += bytes.len();

        let handle = BufferHandle(key.data().as_ffi());
        log::trace!("Uploaded instance buffer {:?} ({} bytes)", handle, bytes.len());
        Ok(handle)
    }

    fn draw_instanced(
        &mut self,
        layout: VertexLayoutHandle,
        buffer: BufferHandle,
        index_count: u32,
        instance_count: u32,
    ) -> BackendResult<()> {
        if !self.buffers.contains_key(Self::key(buffer)) {
            return Err(RenderError::BackendError(format!(
                "draw with unknown instance buffer {buffer:?}"
            )));
        }

        self.draw_calls.push(DrawCall {
            layout,
            buffer,
            index_count,
            instance_count,
        });
        self.stats.draws += 1;
        Ok(())
    }

    fn release_buffer(&mut self, buffer: BufferHandle) -> BackendResult<()> {
        self.buffers
            .remove(Self::key(buffer))
            .ok_or_else(|| RenderError::BackendError(format!("release of unknown buffer {buffer:?}")))?;
        self.stats.releases += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::ScalarType;

    fn float_attribute(stride: usize) -> AttributeLayout {
        AttributeLayout {
            slot: 0,
            component_count: 4,
            scalar_type: ScalarType::Float,
            normalized: false,
            stride,
            offset: 0,
            divisor: 1,
        }
    }

    #[test]
    fn test_upload_draw_release_cycle() {
        let mut backend = HeadlessBackend::new();
        let mesh = backend.register_mesh(36);
        let info = backend.mesh_info(mesh).unwrap();

        let handle = backend
            .upload_instance_buffer(info.vertex_layout, &[0u8; 32], &[float_attribute(16)])
            .unwrap();
        assert_eq!(backend.live_buffer_count(), 1);
        assert_eq!(backend.buffer(handle).unwrap().bytes.len(), 32);

        backend.draw_instanced(info.vertex_layout, handle, info.index_count, 2).unwrap();
        assert_eq!(backend.draw_calls()[0].instance_count, 2);

        backend.release_buffer(handle).unwrap();
        assert_eq!(backend.live_buffer_count(), 0);
        assert!(backend.release_buffer(handle).is_err());
        assert!(backend.draw_instanced(info.vertex_layout, handle, 36, 1).is_err());
    }

    #[test]
    fn test_upload_rejects_partial_records() {
        let mut backend = HeadlessBackend::new();
        let result = backend.upload_instance_buffer(VertexLayoutHandle(1), &[0u8; 20], &[float_attribute(16)]);
        assert!(matches!(result, Err(RenderError::ResourceCreationFailed(_))));
    }

    #[test]
    fn test_tables() {
        let mut backend = HeadlessBackend::new();
        let material = backend.register_material(vec![TextureId(4), TextureId(9)]);

        assert_eq!(backend.material_textures(material), Some(&[TextureId(4), TextureId(9)][..]));
        assert_eq!(backend.material_textures(MaterialId(99)), None);
        assert_eq!(backend.mesh_info(MeshId(1)), None);
    }
}
