//! Registry of live handles bound to one table accessor.
//!
//! Handles are kept in a slab addressed by [`Ticket`]. A ticket carries the
//! generation of its slot, so a stale ticket never aliases a newer handle
//! that reused the slot. Detaching the table invalidates every entry at once.

use keel_types::Key;

/// What kind of handle a registry entry tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HandleKind {
    Row(Key),
    LinkList { key: Key, ndx: usize },
    View,
}

/// Stable address of a registry entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ticket {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Entry {
    kind: HandleKind,
    valid: bool,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Debug, Default)]
pub(crate) struct AccessorRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl AccessorRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, kind: HandleKind) -> Ticket {
        let entry = Some(Entry { kind, valid: true });
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = entry;
            return Ticket {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry,
        });
        Ticket {
            index,
            generation: 0,
        }
    }

    /// Release the slot behind `ticket`. Stale tickets are ignored.
    pub(crate) fn unregister(&mut self, ticket: Ticket) {
        let Some(slot) = self.slots.get_mut(ticket.index as usize) else {
            return;
        };
        if slot.generation != ticket.generation || slot.entry.is_none() {
            return;
        }
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(ticket.index);
        self.live -= 1;
    }

    pub(crate) fn is_valid(&self, ticket: Ticket) -> bool {
        self.slots
            .get(ticket.index as usize)
            .filter(|slot| slot.generation == ticket.generation)
            .and_then(|slot| slot.entry.as_ref())
            .is_some_and(|entry| entry.valid)
    }

    /// Invalidate row and list handles bound to the object `key`.
    pub(crate) fn invalidate_object(&mut self, key: Key) -> usize {
        let mut count = 0;
        for entry in self.slots.iter_mut().filter_map(|s| s.entry.as_mut()) {
            let hit = match entry.kind {
                HandleKind::Row(k) | HandleKind::LinkList { key: k, .. } => k == key,
                HandleKind::View => false,
            };
            if hit && entry.valid {
                entry.valid = false;
                count += 1;
            }
        }
        count
    }

    /// Invalidate list handles on columns at or after `ndx`. Column
    /// insertion and removal shift those indices.
    pub(crate) fn invalidate_columns_from(&mut self, ndx: usize) {
        for entry in self.slots.iter_mut().filter_map(|s| s.entry.as_mut()) {
            if matches!(entry.kind, HandleKind::LinkList { ndx: n, .. } if n >= ndx) {
                entry.valid = false;
            }
        }
    }

    /// Invalidate every entry. Returns how many were still valid.
    pub(crate) fn invalidate_all(&mut self) -> usize {
        let mut count = 0;
        for entry in self.slots.iter_mut().filter_map(|s| s.entry.as_mut()) {
            if entry.valid {
                entry.valid = false;
                count += 1;
            }
        }
        count
    }

    pub(crate) fn live(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(v: i64) -> Key {
        Key::new(v).unwrap()
    }

    #[test]
    fn register_and_unregister() {
        let mut reg = AccessorRegistry::new();
        let a = reg.register(HandleKind::Row(k(1)));
        let b = reg.register(HandleKind::View);
        assert!(reg.is_valid(a) && reg.is_valid(b));
        assert_eq!(reg.live(), 2);

        reg.unregister(a);
        assert!(!reg.is_valid(a));
        assert_eq!(reg.live(), 1);
        reg.unregister(a);
        assert_eq!(reg.live(), 1);
    }

    #[test]
    fn reused_slot_does_not_revive_stale_ticket() {
        let mut reg = AccessorRegistry::new();
        let old = reg.register(HandleKind::Row(k(1)));
        reg.unregister(old);
        let new = reg.register(HandleKind::Row(k(2)));
        assert_eq!(old.index, new.index);
        assert!(!reg.is_valid(old));
        assert!(reg.is_valid(new));
    }

    #[test]
    fn invalidate_object_hits_rows_and_lists() {
        let mut reg = AccessorRegistry::new();
        let row = reg.register(HandleKind::Row(k(5)));
        let list = reg.register(HandleKind::LinkList { key: k(5), ndx: 0 });
        let other = reg.register(HandleKind::Row(k(6)));
        let view = reg.register(HandleKind::View);

        assert_eq!(reg.invalidate_object(k(5)), 2);
        assert!(!reg.is_valid(row));
        assert!(!reg.is_valid(list));
        assert!(reg.is_valid(other));
        assert!(reg.is_valid(view));
    }

    #[test]
    fn column_shift_hits_later_lists_only() {
        let mut reg = AccessorRegistry::new();
        let row = reg.register(HandleKind::Row(k(1)));
        let early = reg.register(HandleKind::LinkList { key: k(1), ndx: 0 });
        let list = reg.register(HandleKind::LinkList { key: k(1), ndx: 2 });
        reg.invalidate_columns_from(1);
        assert!(reg.is_valid(row));
        assert!(reg.is_valid(early));
        assert!(!reg.is_valid(list));
    }

    #[test]
    fn invalidate_all() {
        let mut reg = AccessorRegistry::new();
        let tickets: Vec<_> = (0..4).map(|i| reg.register(HandleKind::Row(k(i)))).collect();
        assert_eq!(reg.invalidate_all(), 4);
        assert!(tickets.iter().all(|t| !reg.is_valid(*t)));
        assert_eq!(reg.invalidate_all(), 0);
        assert_eq!(reg.live(), 4);
    }
}
