//! Append-only, id-indexed storage for registry tables.
//!
//! Ids handed out by an [`Arena`] are never invalidated because entries are
//! never removed or reordered.

use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// Trait for id types used as arena keys.
///
/// Implementors must provide a bijection between `u32` indices and the id type.
pub trait ArenaId: Copy {
    /// Creates an id from a raw `u32` index.
    fn from_raw(index: u32) -> Self;

    /// Returns the raw `u32` index.
    fn as_raw(self) -> u32;
}

/// A dense container whose slots are addressed by an [`ArenaId`].
#[derive(Debug, Clone)]
pub struct Arena<I: ArenaId, T> {
    items: Vec<T>,
    _marker: PhantomData<I>,
}

impl<I: ArenaId, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ArenaId, T> Arena<I, T> {
    /// Creates a new, empty arena.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Appends an item and returns the id of its slot.
    pub fn alloc(&mut self, item: T) -> I {
        let id = I::from_raw(self.items.len() as u32);
        self.items.push(item);
        id
    }

    /// Returns the id the next [`alloc`](Self::alloc) will hand out.
    pub fn next_id(&self) -> I {
        I::from_raw(self.items.len() as u32)
    }

    /// Returns the item for `id`, or `None` if `id` was never allocated here.
    pub fn get(&self, id: I) -> Option<&T> {
        self.items.get(id.as_raw() as usize)
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.items.get_mut(id.as_raw() as usize)
    }

    /// Returns the number of allocated slots.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing has been allocated.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates over `(id, &item)` pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (I::from_raw(i as u32), item))
    }
}

impl<I: ArenaId, T> Index<I> for Arena<I, T> {
    type Output = T;

    fn index(&self, id: I) -> &T {
        &self.items[id.as_raw() as usize]
    }
}

impl<I: ArenaId, T> IndexMut<I> for Arena<I, T> {
    fn index_mut(&mut self, id: I) -> &mut T {
        &mut self.items[id.as_raw() as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::LibId;

    #[test]
    fn alloc_is_dense() {
        let mut arena: Arena<LibId, &str> = Arena::new();
        assert_eq!(arena.next_id(), LibId::from_raw(0));
        let a = arena.alloc("work");
        let b = arena.alloc("spice");
        assert_eq!(a.as_raw(), 0);
        assert_eq!(b.as_raw(), 1);
        assert_eq!(arena[b], "spice");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn get_out_of_range_is_none() {
        let mut arena: Arena<LibId, u8> = Arena::new();
        arena.alloc(7);
        assert_eq!(arena.get(LibId::from_raw(0)), Some(&7));
        assert!(arena.get(LibId::from_raw(1)).is_none());
    }

    #[test]
    fn iter_in_allocation_order() {
        let mut arena: Arena<LibId, u32> = Arena::new();
        for v in [10, 20, 30] {
            arena.alloc(v);
        }
        let seen: Vec<_> = arena.iter().map(|(id, v)| (id.as_raw(), *v)).collect();
        assert_eq!(seen, vec![(0, 10), (1, 20), (2, 30)]);
    }
}
