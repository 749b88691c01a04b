//! Component kinds and identifiers
//!
//! Components are not stored in the registry itself. Each entity maps a
//! [`ComponentKind`] to an opaque [`ComponentId`] that points into the table
//! owning that kind of data (the transform graph, a mesh table, ...).

use serde::{Deserialize, Serialize};

/// Kind of component an entity can carry, at most one of each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentKind {
    /// Shared mesh asset
    Mesh,
    /// Node in the transform graph
    Transform,
    /// Surface material
    Material,
    /// Omnidirectional light
    LightPoint,
    /// Directional light
    LightDirectional,
    /// Spot light
    LightSpot,
    /// Spot light projecting a texture
    LightTexturedSpot,
}

/// Opaque identifier of a component inside its owning table. 0 is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ComponentId(pub u64);

impl ComponentId {
    /// The "no component" sentinel
    pub const INVALID: Self = Self(0);

    /// Whether this id refers to a component
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            /// The invalid sentinel (0)
            pub const INVALID: Self = Self(0);

            /// Whether this id refers to something
            pub fn is_valid(&self) -> bool {
                self.0 != 0
            }
        }

        impl From<$name> for ComponentId {
            fn from(id: $name) -> Self {
                ComponentId(id.0)
            }
        }

        impl From<ComponentId> for $name {
            fn from(id: ComponentId) -> Self {
                $name(id.0)
            }
        }
    };
}

typed_id!(
    /// Mesh asset identifier, used only as a grouping key
    MeshId
);
typed_id!(
    /// Material asset identifier
    MaterialId
);
typed_id!(
    /// Texture asset identifier
    TextureId
);
typed_id!(
    /// Transform graph node identifier, assigned from 1
    TransformId
);
