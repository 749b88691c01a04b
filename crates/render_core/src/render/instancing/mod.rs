//! Instanced rendering
//!
//! The [`instancer`] packs per-instance attribute records into GPU buffers;
//! the [`mesh_batcher`] groups tracked entities by mesh and keeps one such
//! buffer per mesh run up to date.

pub mod instancer;
pub mod mesh_batcher;

pub use instancer::{pack, AttributeGenerator, InstanceBuffer, RecordLayout, WriteFn};
pub use mesh_batcher::{BatchStats, MeshBatcher, MeshRun, NO_TEXTURE};
