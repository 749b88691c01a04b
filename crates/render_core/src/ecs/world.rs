//! ECS World implementation

use super::{ComponentId, ComponentKind, Entity, MaterialId, MeshId, TransformId};
use std::collections::HashMap;

/// Component identifiers attached to one entity
pub type ComponentMap = HashMap<ComponentKind, ComponentId>;

/// ECS World containing all entities and their component mappings
///
/// Entities are allocated sequentially from 1 and are never destroyed.
#[derive(Debug, Default)]
pub struct World {
    entities: Vec<ComponentMap>,
}

impl World {
    /// Create a new world
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
        }
    }

    /// Create a new entity with no components
    pub fn create_entity(&mut self) -> Entity {
        self.entities.push(ComponentMap::new());
        let entity = Entity::new(self.entities.len() as u64);
        log::trace!("Created {}", entity);
        entity
    }

    /// Create a new entity carrying a copy of `template`'s component map
    pub fn clone_entity(&mut self, template: Entity) -> Entity {
        let components = self.components(template).cloned().unwrap_or_default();
        let entity = self.create_entity();
        if let Some(slot) = self.slot_mut(entity) {
            *slot = components;
        }
        entity
    }

    /// Whether `entity` was created by this world
    pub fn contains(&self, entity: Entity) -> bool {
        self.index(entity).is_some()
    }

    /// Number of entities created so far
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Attach a component to an entity.
    ///
    /// When the entity already has a component of this kind it is replaced
    /// only if `overwrite` is set. Returns whether `id` is now stored.
    pub fn add_component(
        &mut self,
        entity: Entity,
        kind: ComponentKind,
        id: impl Into<ComponentId>,
        overwrite: bool,
    ) -> bool {
        let id = id.into();
        let Some(components) = self.slot_mut(entity) else {
            debug_assert!(false, "add_component on unknown {entity}");
            log::warn!("Ignoring {:?} component for unknown {}", kind, entity);
            return false;
        };

        if !overwrite && components.contains_key(&kind) {
            return false;
        }
        components.insert(kind, id);
        true
    }

    /// Component identifier of `kind` on `entity`, or [`ComponentId::INVALID`]
    pub fn get_component(&self, entity: Entity, kind: ComponentKind) -> ComponentId {
        self.components(entity)
            .and_then(|components| components.get(&kind).copied())
            .unwrap_or(ComponentId::INVALID)
    }

    /// Whether `entity` has a component of `kind`
    pub fn has_component(&self, entity: Entity, kind: ComponentKind) -> bool {
        self.get_component(entity, kind).is_valid()
    }

    /// Full component map of an entity
    pub fn components(&self, entity: Entity) -> Option<&ComponentMap> {
        self.index(entity).map(|index| &self.entities[index])
    }

    /// Mesh of an entity, [`MeshId::INVALID`] when it has none
    pub fn mesh_of(&self, entity: Entity) -> MeshId {
        self.get_component(entity, ComponentKind::Mesh).into()
    }

    /// Material of an entity, [`MaterialId::INVALID`] when it has none
    pub fn material_of(&self, entity: Entity) -> MaterialId {
        self.get_component(entity, ComponentKind::Material).into()
    }

    /// Transform of an entity, [`TransformId::INVALID`] when it has none
    pub fn transform_of(&self, entity: Entity) -> TransformId {
        self.get_component(entity, ComponentKind::Transform).into()
    }

    /// Get an iterator over all entities
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        (1..=self.entities.len() as u64).map(Entity::new)
    }

    fn index(&self, entity: Entity) -> Option<usize> {
        let index = usize::try_from(entity.id()).ok()?.checked_sub(1)?;
        (index < self.entities.len()).then_some(index)
    }

    fn slot_mut(&mut self, entity: Entity) -> Option<&mut ComponentMap> {
        let index = self.index(entity)?;
        self.entities.get_mut(index)
    }
}
