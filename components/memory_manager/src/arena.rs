//! Generic handle-indexed arena backing every heap-managed entity kind.
//!
//! Spec §9's "GC graph with cycles" design note calls for re-architecting
//! ownership as an arena of entries accessed by handle, with no entity ever
//! owning another entity directly. This is that arena: each kind of
//! GC-managed object (`GcString`, `GcArray`, ...) lives in its own
//! `Arena<T>`, and cross-entity references are just the `u32` handles
//! defined in `core_types::value`.

/// One arena slot: either a live entity with its GC header fields, or a
/// freed slot available for reuse.
enum Slot<T> {
    Occupied {
        /// Mark bit, compared against the heap's current `live_mark` during
        /// a cycle; flipping `live_mark` each cycle means sweep never has
        /// to reset every header back to "unmarked" first.
        mark: bool,
        /// Size in bytes charged against the heap's allocation threshold.
        size: usize,
        data: T,
    },
    Free {
        /// Free-list link (index of the next free slot, if any).
        next_free: Option<u32>,
    },
}

/// A handle-indexed collection of one kind of GC entity.
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Arena {
            slots: Vec::new(),
            free_head: None,
        }
    }

    /// Insert a new entity, reusing a freed slot if one is available.
    /// Returns the handle index and does not itself charge the heap's byte
    /// counter (callers do that, since only they know the true entity size).
    pub fn insert(&mut self, size: usize, data: T) -> u32 {
        if let Some(idx) = self.free_head {
            let next_free = match &self.slots[idx as usize] {
                Slot::Free { next_free } => *next_free,
                Slot::Occupied { .. } => unreachable!("free list points at occupied slot"),
            };
            self.free_head = next_free;
            self.slots[idx as usize] = Slot::Occupied {
                mark: false,
                size,
                data,
            };
            idx
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Slot::Occupied {
                mark: false,
                size,
                data,
            });
            idx
        }
    }

    pub fn get(&self, idx: u32) -> Option<&T> {
        match self.slots.get(idx as usize)? {
            Slot::Occupied { data, .. } => Some(data),
            Slot::Free { .. } => None,
        }
    }

    pub fn get_mut(&mut self, idx: u32) -> Option<&mut T> {
        match self.slots.get_mut(idx as usize)? {
            Slot::Occupied { data, .. } => Some(data),
            Slot::Free { .. } => None,
        }
    }

    pub fn set_mark(&mut self, idx: u32, mark: bool) {
        if let Some(Slot::Occupied { mark: m, .. }) = self.slots.get_mut(idx as usize) {
            *m = mark;
        }
    }

    pub fn mark(&self, idx: u32) -> Option<bool> {
        match self.slots.get(idx as usize)? {
            Slot::Occupied { mark, .. } => Some(*mark),
            Slot::Free { .. } => None,
        }
    }

    /// Sweep: free every occupied slot whose mark doesn't match
    /// `live_mark`, returning the total bytes reclaimed.
    pub fn sweep(&mut self, live_mark: bool) -> usize {
        let mut freed_bytes = 0usize;
        for idx in 0..self.slots.len() as u32 {
            let should_free = matches!(
                &self.slots[idx as usize],
                Slot::Occupied { mark, .. } if *mark != live_mark
            );
            if should_free {
                if let Slot::Occupied { size, .. } = &self.slots[idx as usize] {
                    freed_bytes += *size;
                }
                self.slots[idx as usize] = Slot::Free {
                    next_free: self.free_head,
                };
                self.free_head = Some(idx);
            }
        }
        freed_bytes
    }

    /// Iterate over `(handle, &T)` for every live entry — used by the
    /// marker to visit every currently reachable-candidate entity.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| match s {
            Slot::Occupied { data, .. } => Some((i as u32, data)),
            Slot::Free { .. } => None,
        })
    }

    pub fn len_occupied(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Occupied { .. }))
            .count()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_and_free_reuse() {
        let mut arena: Arena<i32> = Arena::new();
        let a = arena.insert(4, 10);
        let b = arena.insert(4, 20);
        assert_eq!(arena.get(a), Some(&10));
        assert_eq!(arena.get(b), Some(&20));

        arena.set_mark(a, true);
        let freed = arena.sweep(true);
        assert_eq!(freed, 4); // b (mark false) was freed
        assert_eq!(arena.get(b), None);
        assert_eq!(arena.get(a), Some(&10));

        let c = arena.insert(4, 30);
        assert_eq!(c, b, "freed slot should be reused");
    }
}
