//! Entity-Component registry
//!
//! Owns entities and, per entity, a typed mapping from component kind to
//! component identifier. Every other system reads mesh, material and
//! transform ids through this registry.

pub mod world;
pub mod entity;
pub mod component;

pub use world::{World, ComponentMap};
pub use entity::Entity;
pub use component::{ComponentKind, ComponentId, MeshId, MaterialId, TextureId, TransformId};
