//! Specialized collection types

pub use slotmap::{SlotMap, DefaultKey, Key, KeyData};

/// Handle-based map using slot map for stable references
pub type HandleMap<T> = SlotMap<DefaultKey, T>;

/// Fixed-capacity binding table with linear-scan slot management.
///
/// Models the GPU binding arrays (texture slots, light slots, ...) whose
/// size is fixed by the shader. A value keeps its slot index until it is
/// released or evicted, so indices handed to the GPU stay stable between
/// frames as long as the value remains valid.
///
/// Slot selection on [`acquire`](Self::acquire):
/// 1. the slot already holding the value,
/// 2. otherwise the first empty slot,
/// 3. otherwise the first slot whose occupant fails the validity predicate
///    (that occupant is evicted),
/// 4. otherwise the table is full and `None` is returned.
#[derive(Debug, Clone)]
pub struct BoundedSlotTable<T> {
    slots: Vec<Option<T>>,
}

impl<T: PartialEq> BoundedSlotTable<T> {
    /// Create a table with `capacity` empty slots
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
        }
    }

    /// Number of slots, occupied or not
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// True when no slot is occupied
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Slot index currently holding `value`
    pub fn position(&self, value: &T) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref() == Some(value))
    }

    /// Value stored in slot `index`
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref()
    }

    /// Bind `value` to a slot, evicting an invalid occupant if the table is full.
    ///
    /// Returns the slot index, or `None` when every slot holds a valid value.
    pub fn acquire(&mut self, value: T, is_valid: impl Fn(&T) -> bool) -> Option<usize> {
        if let Some(index) = self.position(&value) {
            return Some(index);
        }

        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .or_else(|| {
                self.slots
                    .iter()
                    .position(|slot| slot.as_ref().is_some_and(|occupant| !is_valid(occupant)))
            })?;

        if self.slots[index].is_some() {
            log::trace!("Evicting invalid occupant of binding slot {}", index);
        }
        self.slots[index] = Some(value);
        Some(index)
    }

    /// Free the slot holding `value`, returning its former index
    pub fn release(&mut self, value: &T) -> Option<usize> {
        let index = self.position(value)?;
        self.slots[index] = None;
        Some(index)
    }

    /// Empty every slot whose occupant fails `is_valid`.
    ///
    /// Remaining occupants keep their indices; the table may be left
    /// fragmented.
    pub fn retain(&mut self, is_valid: impl Fn(&T) -> bool) {
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|occupant| !is_valid(occupant)) {
                *slot = None;
            }
        }
    }

    /// Empty every slot
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    /// Iterate over occupied slots as `(index, value)`
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|value| (index, value)))
    }
}
