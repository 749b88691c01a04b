//! Scene Manager - context object owning the registry and the transform graph
//!
//! Everything that needs entity or placement data borrows the
//! [`SceneManager`] explicitly; there is no process-wide instance.

use crate::config::TransformConfig;
use crate::ecs::{ComponentKind, Entity, MaterialId, MeshId, TransformId, World};
use crate::foundation::math::Mat4;
use crate::scene::{Transform, TransformGraph};
use std::collections::HashSet;

/// Scene context: entity registry plus transform graph
#[derive(Debug, Default)]
pub struct SceneManager {
    world: World,
    transforms: TransformGraph,
}

impl SceneManager {
    /// Create an empty scene with default transform settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty scene
    pub fn with_config(config: TransformConfig) -> Self {
        Self {
            world: World::new(),
            transforms: TransformGraph::with_config(config),
        }
    }

    /// Entity registry
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable entity registry
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Transform graph
    pub fn transforms(&self) -> &TransformGraph {
        &self.transforms
    }

    /// Mutable transform graph
    pub fn transforms_mut(&mut self) -> &mut TransformGraph {
        &mut self.transforms
    }

    /// Create an entity without components
    pub fn create_entity(&mut self) -> Entity {
        self.world.create_entity()
    }

    /// Create an entity with an identity transform parented to `parent`
    pub fn create_entity_with_transform(&mut self, parent: Entity) -> (Entity, TransformId) {
        let entity = self.world.create_entity();
        let transform = self.transforms.register(entity, parent);
        self.world.add_component(entity, ComponentKind::Transform, transform, true);
        (entity, transform)
    }

    /// Attach (or replace) the mesh of an entity
    pub fn set_mesh(&mut self, entity: Entity, mesh: MeshId) {
        self.world.add_component(entity, ComponentKind::Mesh, mesh, true);
    }

    /// Attach (or replace) the material of an entity
    pub fn set_material(&mut self, entity: Entity, material: MaterialId) {
        self.world.add_component(entity, ComponentKind::Material, material, true);
    }

    /// Transform node of an entity
    pub fn transform_of(&self, entity: Entity) -> Option<&Transform> {
        self.transforms.get(self.world.transform_of(entity))
    }

    /// Model matrix of an entity, `None` when it has no transform
    pub fn model_matrix_of(&self, entity: Entity) -> Option<Mat4> {
        self.transform_of(entity).map(Transform::model_matrix)
    }

    /// Entities directly parented to `entity`, in registration order
    pub fn children_of(&self, entity: Entity) -> Vec<Entity> {
        self.transforms
            .children_of(entity)
            .iter()
            .filter_map(|&id| self.transforms.get(id))
            .map(Transform::owner)
            .filter(Entity::is_valid)
            .collect()
    }

    /// Deep copy of `template` and its whole subtree.
    ///
    /// Each copy gets the source's component map and a fresh clean transform
    /// holding the source's current state. The top copy keeps the template's
    /// parent; copied children are parented to their copied parent.
    pub fn copy_object(&mut self, template: Entity) -> Entity {
        let root_parent = self.transform_of(template).map_or(Entity::INVALID, Transform::parent);
        let mut stack = vec![(template, root_parent)];
        let mut root_copy = Entity::INVALID;

        while let Some((source, parent)) = stack.pop() {
            let copy = self.copy_base(source, parent);
            if !root_copy.is_valid() {
                root_copy = copy;
            }
            stack.extend(self.children_of(source).into_iter().rev().map(|child| (child, copy)));
        }

        log::debug!("Copied hierarchy of {} into {}", template, root_copy);
        root_copy
    }

    fn copy_base(&mut self, source: Entity, parent: Entity) -> Entity {
        let copy = self.world.clone_entity(source);
        let source_transform = self.world.transform_of(source);
        if source_transform.is_valid() {
            let transform = self.transforms.register_copy(copy, parent, source_transform);
            self.world.add_component(copy, ComponentKind::Transform, transform, true);
        }
        copy
    }

    /// Apply staged transform changes, returning the entities that moved
    pub fn flush_updates(&mut self) -> HashSet<Entity> {
        self.transforms.flush_updates()
    }
}
