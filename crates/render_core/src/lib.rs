//! # Render Core
//!
//! Transform propagation and mesh instancing for a real-time 3D renderer.
//!
//! ## Features
//!
//! - **Entity Registry**: entities mapping component kinds to component ids
//! - **Transform Graph**: write-ahead transforms with hierarchical delta propagation
//! - **Instancer**: interleaved per-instance attribute packing
//! - **Mesh Batcher**: mesh-sorted tracking, selective re-packing, one draw per mesh
//! - **Headless Backend**: in-memory GPU stand-in for tests and tools
//!
//! ## Quick Start
//!
//! ```rust
//! use render_core::prelude::*;
//!
//! fn main() -> Result<(), RenderError> {
//!     let mut scene = SceneManager::new();
//!     let mut backend = HeadlessBackend::new();
//!     let mut batcher = MeshBatcher::new(InstancingConfig::default());
//!
//!     let cube = backend.register_mesh(36);
//!     let (parent, parent_transform) = scene.create_entity_with_transform(Entity::INVALID);
//!     let (child, _) = scene.create_entity_with_transform(parent);
//!     scene.set_mesh(parent, cube);
//!     scene.set_mesh(child, cube);
//!     batcher.add_object_with_children(&scene, parent);
//!
//!     scene.transforms_mut().set_position(parent_transform, Vec3::new(5.0, 0.0, 0.0));
//!     let report = run_frame(&mut scene, &mut batcher, &mut backend)?;
//!     assert_eq!(report.draw_calls, 1);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod ecs;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for users of the core
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, InstancingConfig, RenderCoreConfig, TransformConfig},
        ecs::{ComponentKind, Entity, MaterialId, MeshId, TextureId, TransformId, World},
        foundation::math::{Mat4, Vec3},
        render::{
            backends::HeadlessBackend, run_frame, FrameReport, GpuBufferSink, MaterialTable,
            MeshBatcher, MeshTable, RenderError, RenderResult,
        },
        scene::{SceneManager, TransformGraph},
    };
}
