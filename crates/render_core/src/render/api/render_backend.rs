//! Backend abstraction traits for the rendering system
//!
//! The core never talks to a graphics API directly. It consumes three narrow
//! collaborators: a mesh table (index counts and vertex layouts), a material
//! table (texture lists) and a GPU buffer sink (upload, draw, release).

use crate::ecs::{MaterialId, MeshId, TextureId};
use crate::render::RenderError;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, RenderError>;

/// Handle to a GPU buffer owned by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Handle to a bindable vertex layout (vertex array object, pipeline input state, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexLayoutHandle(pub u64);

/// Scalar type of an instance attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// 32-bit signed integer, read through the integer attribute path
    Int,
    /// 32-bit float
    Float,
}

impl ScalarType {
    /// Size of one component in bytes
    pub fn size_bytes(self) -> usize {
        match self {
            Self::Int | Self::Float => 4,
        }
    }
}

/// How one instance attribute is laid out inside an instance buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeLayout {
    /// Shader attribute slot
    pub slot: u32,
    /// Components per element (1..=4)
    pub component_count: u32,
    /// Component scalar type
    pub scalar_type: ScalarType,
    /// Normalize fixed-point values into [0,1]/[-1,1]; always false for integers
    pub normalized: bool,
    /// Bytes between consecutive instances
    pub stride: usize,
    /// Byte offset inside one instance record
    pub offset: usize,
    /// Instances per attribute advance
    pub divisor: u32,
}

impl AttributeLayout {
    /// Whether the attribute must be bound without float conversion
    pub fn uses_integer_path(&self) -> bool {
        self.scalar_type == ScalarType::Int
    }
}

/// Draw data of a mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshInfo {
    /// Number of indices drawn per instance
    pub index_count: u32,
    /// Vertex layout the instance attributes attach to
    pub vertex_layout: VertexLayoutHandle,
}

/// Mesh asset table
pub trait MeshTable {
    /// Index count and vertex layout of `mesh`, `None` when unknown
    fn mesh_info(&self, mesh: MeshId) -> Option<MeshInfo>;
}

/// Material asset table
pub trait MaterialTable {
    /// Textures used by `material`, in material slot order
    fn material_textures(&self, material: MaterialId) -> Option<&[TextureId]>;
}

/// GPU buffer sink
///
/// Receives packed instance data, issues instanced draws and disposes of
/// buffers. Every handle returned by
/// [`upload_instance_buffer`](Self::upload_instance_buffer) stays alive until
/// passed to [`release_buffer`](Self::release_buffer).
pub trait GpuBufferSink {
    /// Upload `bytes` as a new instance buffer bound to `layout`, configured with `attributes`
    fn upload_instance_buffer(
        &mut self,
        layout: VertexLayoutHandle,
        bytes: &[u8],
        attributes: &[AttributeLayout],
    ) -> BackendResult<BufferHandle>;

    /// Draw `instance_count` instances of the mesh bound to `layout`
    fn draw_instanced(
        &mut self,
        layout: VertexLayoutHandle,
        buffer: BufferHandle,
        index_count: u32,
        instance_count: u32,
    ) -> BackendResult<()>;

    /// Dispose of a buffer
    fn release_buffer(&mut self, buffer: BufferHandle) -> BackendResult<()>;
}

/// Everything the mesh batcher needs from a backend
pub trait RenderBackend: MeshTable + GpuBufferSink {}

impl<T: MeshTable + GpuBufferSink + ?Sized> RenderBackend for T {}
