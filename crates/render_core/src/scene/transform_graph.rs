//! Transform graph
//!
//! A forest of [`Transform`] nodes with deferred, hierarchically propagated
//! updates.
//!
//! ## Update model
//!
//! Setters only stage values. [`TransformGraph::flush_updates`] walks every
//! dirty node that has no dirty ancestor, turns each node's staged change
//! into a delta against its pre-update state, composes it with the delta
//! inherited from the parent and pushes the composed delta down to the
//! children. Positions are absolute: moving a parent by `d` moves every
//! descendant by `d` as well.
//!
//! Nodes find their children through the entity that owns them, so every
//! node that can parent others is registered with its owning entity.

use super::transform::{Transform, TransformDelta, TransformState};
use crate::config::TransformConfig;
use crate::ecs::{Entity, TransformId};
use crate::foundation::math::{self, Mat4, Vec3};
use std::collections::{HashMap, HashSet};

/// Owner of every transform node
#[derive(Debug, Default)]
pub struct TransformGraph {
    nodes: Vec<Transform>,
    children: HashMap<Entity, Vec<TransformId>>,
    by_owner: HashMap<Entity, TransformId>,
    config: TransformConfig,
}

impl TransformGraph {
    /// Create an empty graph with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty graph
    pub fn with_config(config: TransformConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Number of registered nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no node was registered
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Register an identity node for `owner` under `parent` (invalid for a root).
    ///
    /// Children attach to a node through its owner, so a node registered
    /// with an invalid owner can never have children and is never reported
    /// by [`flush_updates`](Self::flush_updates).
    pub fn register(&mut self, owner: Entity, parent: Entity) -> TransformId {
        if !owner.is_valid() {
            log::debug!("Registering transform without owner under {}", parent);
        }
        self.insert(Transform::new(owner, parent))
    }

    /// Register a clean node for `owner` starting from `source`'s current state
    pub fn register_copy(&mut self, owner: Entity, parent: Entity, source: TransformId) -> TransformId {
        let state = match self.get(source) {
            Some(transform) => *transform.current(),
            None => {
                log::warn!("Copying unknown transform {:?}, using identity", source);
                TransformState::default()
            }
        };
        self.insert(Transform::with_state(owner, parent, state))
    }

    fn insert(&mut self, transform: Transform) -> TransformId {
        let owner = transform.owner();
        let parent = transform.parent();

        self.nodes.push(transform);
        let id = TransformId(self.nodes.len() as u64);

        if parent.is_valid() {
            self.children.entry(parent).or_default().push(id);
        }
        if owner.is_valid() {
            self.by_owner.insert(owner, id);
        }

        log::trace!("Registered transform {:?} (owner {}, parent {})", id, owner, parent);
        id
    }

    /// Node by id
    pub fn get(&self, id: TransformId) -> Option<&Transform> {
        let index = usize::try_from(id.0).ok()?.checked_sub(1)?;
        self.nodes.get(index)
    }

    /// Mutable node by id
    pub fn get_mut(&mut self, id: TransformId) -> Option<&mut Transform> {
        let index = usize::try_from(id.0).ok()?.checked_sub(1)?;
        self.nodes.get_mut(index)
    }

    /// Node registered for `owner`
    pub fn transform_of_owner(&self, owner: Entity) -> Option<TransformId> {
        self.by_owner.get(&owner).copied()
    }

    /// Nodes parented to `entity`, in registration order
    pub fn children_of(&self, entity: Entity) -> &[TransformId] {
        self.children.get(&entity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Stage a new scale for `id`
    pub fn set_scale(&mut self, id: TransformId, scale: Vec3) {
        if let Some(node) = self.node_for_write(id) {
            node.set_scale(scale);
        }
    }

    /// Stage a new position for `id`
    pub fn set_position(&mut self, id: TransformId, position: Vec3) {
        if let Some(node) = self.node_for_write(id) {
            node.set_position(position);
        }
    }

    /// Stage a new rotation for `id`
    pub fn set_rotation(&mut self, id: TransformId, rotation: Mat4) {
        if let Some(node) = self.node_for_write(id) {
            node.set_rotation(rotation);
        }
    }

    fn node_for_write(&mut self, id: TransformId) -> Option<&mut Transform> {
        let node = self.get_mut(id);
        if node.is_none() {
            debug_assert!(false, "write to unknown transform {id:?}");
            log::warn!("Ignoring write to unknown transform {:?}", id);
        }
        node
    }

    /// Model matrix `translation * rotation * scale` of `id`
    pub fn compute_model_matrix(&self, id: TransformId) -> Mat4 {
        self.read(id).map_or_else(Mat4::identity, Transform::model_matrix)
    }

    /// Model matrix `translation * rotation` of `id`
    pub fn compute_model_matrix_no_scale(&self, id: TransformId) -> Mat4 {
        self.read(id).map_or_else(Mat4::identity, Transform::model_matrix_no_scale)
    }

    fn read(&self, id: TransformId) -> Option<&Transform> {
        let node = self.get(id);
        if node.is_none() {
            debug_assert!(false, "read of unknown transform {id:?}");
            log::warn!("Reading unknown transform {:?} as identity", id);
        }
        node
    }

    /// Apply every staged change and propagate it down the hierarchy.
    ///
    /// Returns the owners of all nodes touched, including clean descendants
    /// of moved nodes. A second call without intervening writes returns an
    /// empty set and changes nothing.
    pub fn flush_updates(&mut self) -> HashSet<Entity> {
        let mut changed = HashSet::new();

        let roots: Vec<TransformId> = (1..=self.nodes.len() as u64)
            .map(TransformId)
            .filter(|&id| self.is_dirty(id) && !self.has_dirty_ancestor(id))
            .collect();

        if roots.is_empty() {
            return changed;
        }

        let mut touched = 0usize;
        let mut stack: Vec<(TransformId, TransformDelta)> = Vec::new();
        for root in roots {
            stack.push((root, TransformDelta::identity()));

            while let Some((id, inherited)) = stack.pop() {
                let Some(node) = self.get_mut(id) else {
                    continue;
                };

                let effective = inherited.then(&node.own_delta());
                node.apply(&effective);
                touched += 1;

                let owner = node.owner();
                if !owner.is_valid() {
                    continue;
                }
                changed.insert(owner);

                // Reversed so children pop in registration order
                if let Some(children) = self.children.get(&owner) {
                    stack.extend(children.iter().rev().map(|&child| (child, effective)));
                }
            }
        }

        log::trace!("Flushed transforms: {} nodes touched, {} owners changed", touched, changed.len());

        if self.config.validate_after_flush {
            self.check_orthonormal(&changed);
        }
        changed
    }

    fn is_dirty(&self, id: TransformId) -> bool {
        self.get(id).is_some_and(Transform::is_dirty)
    }

    fn has_dirty_ancestor(&self, id: TransformId) -> bool {
        let mut parent = self.get(id).map_or(Entity::INVALID, Transform::parent);

        // Bounded walk so a parent cycle cannot hang the flush
        for _ in 0..self.nodes.len() {
            let Some(parent_id) = self.transform_of_owner(parent) else {
                return false;
            };
            let Some(node) = self.get(parent_id) else {
                return false;
            };
            if node.is_dirty() {
                return true;
            }
            parent = node.parent();
        }

        debug_assert!(false, "parent cycle above transform {id:?}");
        log::warn!("Parent chain of transform {:?} does not terminate", id);
        false
    }

    fn check_orthonormal(&self, changed: &HashSet<Entity>) {
        let tolerance = self.config.orthonormal_tolerance;
        for owner in changed {
            let Some(node) = self.transform_of_owner(*owner).and_then(|id| self.get(id)) else {
                continue;
            };
            if !math::is_orthonormal(node.rotation(), tolerance) {
                log::warn!("Rotation of {} drifted beyond {}", owner, tolerance);
            }
        }
    }
}
