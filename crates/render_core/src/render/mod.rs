//! # Rendering System
//!
//! Turns the tracked renderable entities of a scene into instanced draw
//! calls.
//!
//! ## Architecture
//!
//! - **API**: narrow traits the core consumes (mesh table, material table,
//!   GPU buffer sink)
//! - **Instancing**: instance record packing and mesh-grouped batching
//! - **Frame**: the per-frame flush, update and draw sequence
//! - **Backends**: the headless in-memory backend
//!
//! ## Frame flow
//!
//! ```text
//! SceneManager::flush_updates ─► MeshBatcher::update_instanced_buffer ─► MeshBatcher::run_shader
//!                                        │                                      │
//!                                  instancer::pack                     GpuBufferSink::draw_instanced
//! ```

pub mod api;
pub mod backends;
pub mod frame;
pub mod instancing;


pub use api::{
    AttributeLayout, BackendResult, BufferHandle, GpuBufferSink, MaterialTable, MeshInfo,
    MeshTable, RenderBackend, ScalarType, VertexLayoutHandle,
};
pub use frame::{run_frame, FrameReport};
pub use instancing::{AttributeGenerator, BatchStats, InstanceBuffer, MeshBatcher, RecordLayout};

use thiserror::Error;

/// Errors raised by the rendering pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// An attribute generator cannot be laid out
    ///
    /// Raised before any byte is written, so no buffer is created.
    #[error("Invalid instance attribute at slot {slot}: {reason}")]
    InvalidAttribute {
        /// Attribute slot of the offending generator
        slot: u32,
        /// What is wrong with it
        reason: String,
    },

    /// A rendering operation failed during execution
    #[error("Rendering failed: {0}")]
    RenderingFailed(String),

    /// Resource creation or management failed
    ///
    /// Occurs when a backend cannot create a buffer from the data it was given.
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// Backend-specific error occurred
    ///
    /// Wraps backend errors in a generic form, e.g. use of a handle the
    /// backend does not know.
    #[error("Backend error: {0}")]
    BackendError(String),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
