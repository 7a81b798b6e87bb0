//! Value-range registry: deduplicated, interned `Vec<u32>` sequences,
//! identified by a dense `range_id`. `range_id = 0` always names the empty
//! sequence, so every registry starts out the same way.
//!
//! [`RangeRegistry`] is the build-time, heap-backed deduping builder; once a
//! filter table's shape is final, [`RangeRegistry::into_arena`] copies it
//! into arena storage as a [`RangeTable`], reached by `RelPtr` the same way
//! [`yanet_lpm::FrozenLpmTrie`] is.

use core::ptr::NonNull;
use std::collections::HashMap;

use yanet_arena::{AllocError, Arena, RelPtr};

pub const EMPTY_RANGE_ID: u32 = 0;

#[derive(Default)]
pub struct RangeRegistry {
    ranges: Vec<Vec<u32>>,
    dedup: HashMap<Vec<u32>, u32>,
}

impl RangeRegistry {
    pub fn new() -> Self {
        let mut dedup = HashMap::new();
        dedup.insert(Vec::new(), EMPTY_RANGE_ID);
        Self {
            ranges: vec![Vec::new()],
            dedup,
        }
    }

    /// Intern `values`, returning the existing id if an identical sequence
    /// was interned before, or a freshly allocated one otherwise.
    pub fn intern(&mut self, values: Vec<u32>) -> u32 {
        if let Some(&id) = self.dedup.get(&values) {
            return id;
        }
        let id = self.ranges.len() as u32;
        self.dedup.insert(values.clone(), id);
        self.ranges.push(values);
        id
    }

    pub fn get(&self, range_id: u32) -> &[u32] {
        &self.ranges[range_id as usize]
    }

    /// Number of distinct ranges interned so far, including the empty one.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Copy every interned range into `arena`, producing the table workers
    /// reach by `RelPtr`. Each range's own backing buffer is allocated and
    /// written in place before its owning slot's `RelPtr` is set, so no
    /// `RelPtr` is ever computed relative to an address that later moves.
    pub fn into_arena(self, arena: &Arena) -> Result<NonNull<RangeTable>, AllocError> {
        let slot_count = self.ranges.len();
        let entries_raw = arena.alloc_bytes(slot_count * core::mem::size_of::<RangeSlot>())?;
        let entries_typed = entries_raw.cast::<RangeSlot>();
        for (i, values) in self.ranges.iter().enumerate() {
            let slot_ptr = unsafe { entries_typed.as_ptr().add(i) };
            if values.is_empty() {
                unsafe { slot_ptr.write(RangeSlot { values: RelPtr::NULL, count: 0 }) };
                continue;
            }
            let raw = arena.alloc_bytes(values.len() * core::mem::size_of::<u32>())?;
            let typed = raw.cast::<u32>();
            unsafe {
                typed.as_ptr().copy_from_nonoverlapping(values.as_ptr(), values.len());
                slot_ptr.write(RangeSlot { values: RelPtr::NULL, count: values.len() as u32 });
                (*slot_ptr).values.set(typed.as_ptr() as *const u32);
            }
        }
        let shell = RangeTable { entries: RelPtr::NULL, len: slot_count };
        let table_slot = arena.alloc(shell)?;
        unsafe {
            (*table_slot.as_ptr()).entries.set(entries_typed.as_ptr() as *const RangeSlot);
        }
        Ok(table_slot)
    }
}

/// One range's arena-resident backing: a length-prefixed `u32` array.
#[repr(C)]
struct RangeSlot {
    values: RelPtr<u32>,
    count: u32,
}

/// A [`RangeRegistry`] after it has been copied into arena storage. Reached
/// by `RelPtr` from a compiled filter's tree nodes and attribute indexes.
#[repr(C)]
pub struct RangeTable {
    entries: RelPtr<RangeSlot>,
    len: usize,
}

impl RangeTable {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// # Safety
    /// The arena region this table points into must still be mapped.
    pub unsafe fn get(&self, range_id: u32) -> &[u32] {
        let entries = unsafe { self.entries.as_slice(self.len) }.expect("non-empty range table has non-null entries");
        let slot = &entries[range_id as usize];
        if slot.count == 0 {
            return &[];
        }
        unsafe { slot.values.as_slice(slot.count as usize) }.expect("non-empty range slot has non-null values")
    }
}

/// Concatenate `a` then `b`, keeping only the first occurrence of each
/// value. `a`'s and `b`'s own internal order is rule priority order, so
/// this is exactly the "priority-stable merge" `spec.md` describes for the
/// 2-D value table's cell construction.
pub fn merge_priority_stable(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut seen = std::collections::HashSet::with_capacity(a.len() + b.len());
    let mut out = Vec::with_capacity(a.len() + b.len());
    for &v in a.iter().chain(b.iter()) {
        if seen.insert(v) {
            out.push(v);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_range_is_id_zero() {
        let registry = RangeRegistry::new();
        assert_eq!(registry.get(EMPTY_RANGE_ID), &[] as &[u32]);
    }

    #[test]
    fn identical_sequences_share_an_id() {
        let mut registry = RangeRegistry::new();
        let a = registry.intern(vec![3, 1, 2]);
        let b = registry.intern(vec![3, 1, 2]);
        assert_eq!(a, b);
        assert_ne!(a, EMPTY_RANGE_ID);
    }

    #[test]
    fn priority_stable_merge_keeps_first_occurrence() {
        let merged = merge_priority_stable(&[1, 2, 3], &[2, 4, 1]);
        assert_eq!(merged, vec![1, 2, 3, 4]);
    }

    #[test]
    fn into_arena_preserves_every_range() {
        let arena = Arena::new(1 << 16);
        let mut registry = RangeRegistry::new();
        let a = registry.intern(vec![3, 1, 2]);
        let b = registry.intern(vec![9]);
        let table = registry.into_arena(&arena).unwrap();
        let t = unsafe { table.as_ref() };
        assert_eq!(unsafe { t.get(EMPTY_RANGE_ID) }, &[] as &[u32]);
        assert_eq!(unsafe { t.get(a) }, &[3, 1, 2]);
        assert_eq!(unsafe { t.get(b) }, &[9]);
    }
}
