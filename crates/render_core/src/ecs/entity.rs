//! Entity implementation

use std::fmt;

/// Entity identifier
///
/// Opaque 64-bit id handed out by [`World`](super::World). Ids start at 1;
/// [`Entity::INVALID`] (0) means "no entity" and doubles as the parent of
/// root transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Entity {
    id: u64,
}

impl Entity {
    /// The "no entity" sentinel
    pub const INVALID: Self = Self { id: 0 };

    /// Create a new entity with the given ID
    pub(super) fn new(id: u64) -> Self {
        Self { id }
    }

    /// Get the entity ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether this is a real entity rather than the sentinel
    pub fn is_valid(&self) -> bool {
        self.id != 0
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.id)
    }
}
