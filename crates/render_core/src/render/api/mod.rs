//! Public rendering API
//!
//! Traits and handle types shared by the instancing pipeline and the
//! backends implementing it.

pub mod render_backend;

// Re-export commonly used types
pub use render_backend::{
    AttributeLayout, BackendResult, BufferHandle, GpuBufferSink, MaterialTable, MeshInfo,
    MeshTable, RenderBackend, ScalarType, VertexLayoutHandle,
};
