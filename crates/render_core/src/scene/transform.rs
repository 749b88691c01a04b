//! Write-ahead transform node
//!
//! A [`Transform`] keeps two copies of its spatial state: the `current`
//! values that model matrices are built from, and the `pending` values that
//! setters write to. The pair is reconciled by the owning
//! [`TransformGraph`](super::TransformGraph) during a flush, which needs the
//! pre-update state to express each node's change as a delta.

use crate::ecs::Entity;
use crate::foundation::math::{self, Mat4, Vec3};

/// Scale, rotation and position of a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformState {
    /// Per-axis scale
    pub scale: Vec3,
    /// Rotation held in the upper-left 3x3 block of a homogeneous matrix
    pub rotation: Mat4,
    /// Position
    pub position: Vec3,
}

impl Default for TransformState {
    fn default() -> Self {
        Self {
            scale: Vec3::new(1.0, 1.0, 1.0),
            rotation: Mat4::identity(),
            position: Vec3::zeros(),
        }
    }
}

/// Change applied to a node during a flush
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformDelta {
    /// Component-wise scale factor
    pub scale: Vec3,
    /// Rotation to pre-multiply
    pub rotation: Mat4,
    /// Translation to add
    pub position: Vec3,
}

impl TransformDelta {
    /// The delta that changes nothing
    pub fn identity() -> Self {
        Self {
            scale: Vec3::new(1.0, 1.0, 1.0),
            rotation: Mat4::identity(),
            position: Vec3::zeros(),
        }
    }

    /// Compose a parent's effective delta with a node's own delta.
    ///
    /// The parent part applies first; the resulting rotation is
    /// re-orthonormalized.
    pub fn then(&self, own: &Self) -> Self {
        let mut rotation = self.rotation * own.rotation;
        math::orthonormalize(&mut rotation);

        Self {
            scale: self.scale.component_mul(&own.scale),
            rotation,
            position: self.position + own.position,
        }
    }
}

/// One node of the transform graph
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    current: TransformState,
    pending: TransformState,
    parent: Entity,
    owner: Entity,
    dirty: bool,
}

impl Transform {
    /// Identity transform owned by `owner` and parented to `parent`
    pub fn new(owner: Entity, parent: Entity) -> Self {
        Self::with_state(owner, parent, TransformState::default())
    }

    /// Clean transform starting from `state`
    pub fn with_state(owner: Entity, parent: Entity, state: TransformState) -> Self {
        Self {
            current: state,
            pending: state,
            parent,
            owner,
            dirty: false,
        }
    }

    /// Current scale
    pub fn scale(&self) -> Vec3 {
        self.current.scale
    }

    /// Current rotation
    pub fn rotation(&self) -> &Mat4 {
        &self.current.rotation
    }

    /// Current position
    pub fn position(&self) -> Vec3 {
        self.current.position
    }

    /// Current state
    pub fn current(&self) -> &TransformState {
        &self.current
    }

    /// Values written since the last flush
    pub fn pending(&self) -> &TransformState {
        &self.pending
    }

    /// Parent entity, [`Entity::INVALID`] for roots
    pub fn parent(&self) -> Entity {
        self.parent
    }

    /// Entity this transform belongs to, [`Entity::INVALID`] when unowned
    pub fn owner(&self) -> Entity {
        self.owner
    }

    /// Whether pending values wait for a flush
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Stage a new scale.
    ///
    /// Scale deltas are ratios against the current scale, so a zero
    /// component is rejected and the write ignored.
    pub fn set_scale(&mut self, scale: Vec3) {
        if scale.iter().any(|&c| c == 0.0) {
            debug_assert!(false, "zero scale component in {scale:?} for {}", self.owner);
            log::warn!("Ignoring zero scale {:?} for {}", scale, self.owner);
            return;
        }
        self.pending.scale = scale;
        self.dirty = true;
    }

    /// Stage a new position
    pub fn set_position(&mut self, position: Vec3) {
        self.pending.position = position;
        self.dirty = true;
    }

    /// Stage a new rotation
    pub fn set_rotation(&mut self, rotation: Mat4) {
        self.pending.rotation = rotation;
        self.dirty = true;
    }

    /// Change from current to pending state, identity when clean
    pub fn own_delta(&self) -> TransformDelta {
        if !self.dirty {
            return TransformDelta::identity();
        }

        TransformDelta {
            scale: self.pending.scale.component_div(&self.current.scale),
            rotation: self.pending.rotation * math::rotation_transpose(&self.current.rotation),
            position: self.pending.position - self.current.position,
        }
    }

    /// Apply an effective delta, clear the dirty flag and resync pending values
    pub fn apply(&mut self, delta: &TransformDelta) {
        self.current.scale = delta.scale.component_mul(&self.current.scale);
        self.current.position += delta.position;

        let mut rotation = delta.rotation * self.current.rotation;
        math::orthonormalize(&mut rotation);
        self.current.rotation = rotation;

        self.pending = self.current;
        self.dirty = false;
    }

    /// `translation(position) * rotation * scale`
    pub fn model_matrix(&self) -> Mat4 {
        self.model_matrix_no_scale() * Mat4::new_nonuniform_scaling(&self.current.scale)
    }

    /// `translation(position) * rotation`
    pub fn model_matrix_no_scale(&self) -> Mat4 {
        Mat4::new_translation(&self.current.position) * self.current.rotation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{constants, rotation_from_axis_angle, Vec4};
    use approx::assert_relative_eq;

    #[test]
    fn test_setters_only_touch_pending() {
        let mut t = Transform::new(Entity::INVALID, Entity::INVALID);
        t.set_position(Vec3::new(1.0, 2.0, 3.0));
        t.set_scale(Vec3::new(2.0, 2.0, 2.0));

        assert!(t.is_dirty());
        assert_eq!(t.position(), Vec3::zeros());
        assert_eq!(t.scale(), Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(t.pending().position, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "zero scale component")]
    fn test_zero_scale_is_a_contract_violation() {
        let mut t = Transform::new(Entity::INVALID, Entity::INVALID);
        t.set_scale(Vec3::new(1.0, 0.0, 1.0));
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_zero_scale_write_is_ignored() {
        let mut t = Transform::new(Entity::INVALID, Entity::INVALID);
        t.set_scale(Vec3::zeros());
        assert!(!t.is_dirty());

        t.set_scale(Vec3::new(1.0, 1.0, 1.0));
        t.apply(&t.own_delta());
        assert!(t.scale().iter().all(|c| c.is_finite()));
        assert_relative_eq!(t.scale(), Vec3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_clean_node_has_identity_delta() {
        let t = Transform::new(Entity::INVALID, Entity::INVALID);
        assert_eq!(t.own_delta(), TransformDelta::identity());
    }

    #[test]
    fn test_apply_own_delta_reaches_pending_state() {
        let mut t = Transform::new(Entity::INVALID, Entity::INVALID);
        let rotation = rotation_from_axis_angle(&Vec3::y(), 0.4);
        t.set_scale(Vec3::new(2.0, 3.0, 4.0));
        t.set_position(Vec3::new(-1.0, 0.5, 2.0));
        t.set_rotation(rotation);

        let delta = TransformDelta::identity().then(&t.own_delta());
        t.apply(&delta);

        assert!(!t.is_dirty());
        assert_relative_eq!(t.scale(), Vec3::new(2.0, 3.0, 4.0), epsilon = 1e-6);
        assert_relative_eq!(t.position(), Vec3::new(-1.0, 0.5, 2.0), epsilon = 1e-6);
        assert_relative_eq!(*t.rotation(), rotation, epsilon = 1e-5);
        assert_eq!(t.pending(), t.current());
    }

    #[test]
    fn test_model_matrix_order_is_translate_rotate_scale() {
        let mut t = Transform::new(Entity::INVALID, Entity::INVALID);
        t.set_scale(Vec3::new(2.0, 2.0, 2.0));
        t.set_rotation(rotation_from_axis_angle(&Vec3::z(), constants::HALF_PI));
        t.set_position(Vec3::new(10.0, 0.0, 0.0));
        t.apply(&t.own_delta());

        // x axis scaled to 2, rotated onto +y, then translated
        let p = t.model_matrix() * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(p, Vec4::new(10.0, 2.0, 0.0, 1.0), epsilon = 1e-5);

        let q = t.model_matrix_no_scale() * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(q, Vec4::new(10.0, 1.0, 0.0, 1.0), epsilon = 1e-5);
    }
}
