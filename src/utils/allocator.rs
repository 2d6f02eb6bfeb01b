use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Unique identifier with generation tracking to prevent stale references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct GenerationalId {
    pub index: usize,
    pub generation: u32,
}

impl GenerationalId {
    pub fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }

    pub const NULL: Self = Self {
        index: usize::MAX,
        generation: 0,
    };
}

impl Default for GenerationalId {
    fn default() -> Self {
        Self::NULL
    }
}

/// Declares a strongly typed wrapper around [`GenerationalId`] so light,
/// primitive and interaction handles cannot be mixed up.
macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord,
            Default,
        )]
        pub struct $name(pub GenerationalId);

        impl $name {
            pub fn new(index: usize, generation: u32) -> Self {
                Self(GenerationalId::new(index, generation))
            }

            pub fn index(&self) -> usize {
                self.0.index
            }

            pub fn generation(&self) -> u32 {
                self.0.generation
            }

            pub fn is_null(&self) -> bool {
                self.0.index == usize::MAX
            }
        }

        impl From<GenerationalId> for $name {
            fn from(id: GenerationalId) -> Self {
                Self(id)
            }
        }

        impl From<$name> for GenerationalId {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

typed_id!(
    /// Stable identifier of a light registered in a scene. The index doubles
    /// as a slot into per-frame light arrays.
    LightId
);
typed_id!(
    /// Identifier of a primitive registered in a scene.
    PrimitiveId
);
typed_id!(
    /// Identifier of a light/primitive interaction.
    InteractionId
);

/// Generational arena that hands out stable IDs while preventing use-after-free.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: Vec<Option<T>>,
    generations: Vec<u32>,
    free_list: VecDeque<usize>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            generations: Vec::new(),
            free_list: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, item: T) -> GenerationalId {
        if let Some(index) = self.free_list.pop_front() {
            let generation = self.generations[index];
            self.items[index] = Some(item);
            return GenerationalId::new(index, generation);
        }

        let index = self.items.len();
        self.items.push(Some(item));
        self.generations.push(0);
        GenerationalId::new(index, 0)
    }

    pub fn get(&self, id: impl Into<GenerationalId>) -> Option<&T> {
        let id = id.into();
        if self.is_valid(id) {
            self.items.get(id.index).and_then(|slot| slot.as_ref())
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, id: impl Into<GenerationalId>) -> Option<&mut T> {
        let id = id.into();
        if self.is_valid(id) {
            self.items.get_mut(id.index).and_then(|slot| slot.as_mut())
        } else {
            None
        }
    }

    pub fn contains(&self, id: impl Into<GenerationalId>) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&mut self, id: impl Into<GenerationalId>) -> Option<T> {
        let id = id.into();
        if !self.is_valid(id) {
            return None;
        }
        let slot = self.items.get_mut(id.index)?;
        if slot.is_some() {
            self.generations[id.index] = self.generations[id.index].wrapping_add(1);
            self.free_list.push_back(id.index);
        }
        slot.take()
    }

    pub fn iter(&self) -> ArenaIter<'_, T> {
        ArenaIter {
            inner: self.items.iter(),
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = GenerationalId> + '_ {
        self.items.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref()
                .map(|_| GenerationalId::new(index, self.generations[index]))
        })
    }

    pub fn len(&self) -> usize {
        self.items.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_valid(&self, id: GenerationalId) -> bool {
        self.generations
            .get(id.index)
            .copied()
            .map(|gen| gen == id.generation)
            .unwrap_or(false)
    }
}

pub struct ArenaIter<'a, T> {
    inner: std::slice::Iter<'a, Option<T>>,
}

impl<'a, T> Iterator for ArenaIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        for slot in self.inner.by_ref() {
            if let Some(item) = slot.as_ref() {
                return Some(item);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_ids_go_stale_when_slot_is_reused() {
        let mut arena = Arena::new();
        let first = arena.insert("a");
        assert_eq!(arena.remove(first), Some("a"));

        let second = arena.insert("b");
        assert_eq!(second.index, first.index);
        assert_ne!(second.generation, first.generation);
        assert!(arena.get(first).is_none());
        assert_eq!(arena.get(second), Some(&"b"));
    }

    #[test]
    fn stale_remove_does_not_evict_new_occupant() {
        let mut arena = Arena::new();
        let first = arena.insert(1);
        arena.remove(first);
        let second = arena.insert(2);

        assert_eq!(arena.remove(first), None);
        assert_eq!(arena.get(second), Some(&2));
    }

    #[test]
    fn typed_ids_round_trip_through_generational_id() {
        let raw = GenerationalId::new(3, 7);
        let light = LightId::from(raw);
        assert_eq!(light.index(), 3);
        assert_eq!(light.generation(), 7);
        assert_eq!(GenerationalId::from(light), raw);
        assert!(LightId::default().is_null());
    }
}
