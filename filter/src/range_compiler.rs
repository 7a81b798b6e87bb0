//! Port/range compiler (C5): turns a per-rule union of `[from, to]` ranges
//! over a `u16` domain into a point function `value -> class_id`, plus, for
//! every class, the ordered list of rule ids that contributed to it.
//!
//! Used for `PORT_SRC`/`PORT_DST` and `VLAN`, which are all plain `u16`
//! range unions -- and, via the 64k-entry flat table in
//! [`crate::proto_table`], for the combined `proto*256+tcp_flags` domain
//! the spec allows building the same way.
//!
//! Method: collect every range's start and one-past-its-end as transition
//! points, sort and dedup them, and assign one class per resulting
//! segment. `class_count <= 2*range_count + 1` falls out directly: each
//! range contributes at most two transition points, and `n` points cut the
//! domain into at most `n+1` segments, collapsed further by deduplicating
//! segments whose matching rule set is identical.

use core::ptr::NonNull;
use std::collections::HashMap;

use yanet_arena::{AllocError, Arena, RelPtr};

pub struct RangeClassifier {
    /// Sorted, deduplicated transition points. Segment `i` covers
    /// `[points[i], points[i + 1])`.
    points: Vec<u32>,
    /// One class id per segment (`classes.len() == points.len() - 1`).
    classes: Vec<u32>,
}

impl RangeClassifier {
    /// `ranges[i]` is the `[from, to]` (inclusive) range rule `i` matches.
    /// Returns the classifier plus, per class id, the sorted list of rule
    /// indices that produced it.
    pub fn build(ranges: &[(u16, u16)]) -> (Self, Vec<Vec<u32>>) {
        let mut boundary_set: Vec<u32> = Vec::with_capacity(ranges.len() * 2 + 2);
        boundary_set.push(0);
        boundary_set.push(0x1_0000);
        for &(from, to) in ranges {
            boundary_set.push(from as u32);
            boundary_set.push(to as u32 + 1);
        }
        boundary_set.sort_unstable();
        boundary_set.dedup();

        let mut classes = Vec::with_capacity(boundary_set.len().saturating_sub(1));
        let mut labels: Vec<Vec<u32>> = Vec::new();
        let mut label_index: HashMap<Vec<u32>, u32> = HashMap::new();

        for window in boundary_set.windows(2) {
            let representative = window[0];
            let mut matching = Vec::new();
            for (rule_idx, &(from, to)) in ranges.iter().enumerate() {
                if representative >= from as u32 && representative <= to as u32 {
                    matching.push(rule_idx as u32);
                }
            }
            let class_id = *label_index.entry(matching.clone()).or_insert_with(|| {
                labels.push(matching);
                (labels.len() - 1) as u32
            });
            classes.push(class_id);
        }

        (
            Self {
                points: boundary_set,
                classes,
            },
            labels,
        )
    }

    pub fn width(&self) -> usize {
        self.classes.iter().copied().max().map_or(0, |m| m as usize + 1)
    }

    pub fn class_of(&self, value: u16) -> u32 {
        let value = value as u32;
        let segment = match self.points.binary_search(&value) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        self.classes[segment]
    }

    /// Copy the transition-point and class arrays into `arena`.
    pub fn into_arena(self, arena: &Arena) -> Result<NonNull<FrozenRangeClassifier>, AllocError> {
        let shell = FrozenRangeClassifier {
            points: RelPtr::NULL,
            classes: RelPtr::NULL,
            points_len: self.points.len(),
            classes_len: self.classes.len(),
        };
        let slot = arena.alloc(shell)?;
        let points_raw = arena.alloc_bytes(self.points.len() * core::mem::size_of::<u32>())?;
        let points_typed = points_raw.cast::<u32>();
        let classes_raw = arena.alloc_bytes(self.classes.len() * core::mem::size_of::<u32>())?;
        let classes_typed = classes_raw.cast::<u32>();
        unsafe {
            points_typed.as_ptr().copy_from_nonoverlapping(self.points.as_ptr(), self.points.len());
            classes_typed.as_ptr().copy_from_nonoverlapping(self.classes.as_ptr(), self.classes.len());
            (*slot.as_ptr()).points.set(points_typed.as_ptr() as *const u32);
            (*slot.as_ptr()).classes.set(classes_typed.as_ptr() as *const u32);
        }
        Ok(slot)
    }
}

/// A [`RangeClassifier`] after it has been copied into arena storage.
#[repr(C)]
pub struct FrozenRangeClassifier {
    points: RelPtr<u32>,
    classes: RelPtr<u32>,
    points_len: usize,
    classes_len: usize,
}

impl FrozenRangeClassifier {
    /// # Safety
    /// The arena region this classifier points into must still be mapped.
    pub unsafe fn class_of(&self, value: u16) -> u32 {
        let points = unsafe { self.points.as_slice(self.points_len) }.expect("non-empty classifier has points");
        let classes = unsafe { self.classes.as_slice(self.classes_len) }.expect("non-empty classifier has classes");
        let value = value as u32;
        let segment = match points.binary_search(&value) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        classes[segment]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjoint_ranges_get_distinct_classes() {
        let (classifier, labels) = RangeClassifier::build(&[(10, 20), (100, 200)]);
        let c1 = classifier.class_of(15);
        let c2 = classifier.class_of(150);
        let c3 = classifier.class_of(5000);
        assert_ne!(c1, c2);
        assert_eq!(labels[c1 as usize], vec![0]);
        assert_eq!(labels[c2 as usize], vec![1]);
        assert!(labels[c3 as usize].is_empty());
    }

    #[test]
    fn overlapping_ranges_merge_into_one_class() {
        let (classifier, labels) = RangeClassifier::build(&[(0, 100), (50, 150)]);
        let overlap_class = classifier.class_of(75);
        assert_eq!(labels[overlap_class as usize], vec![0, 1]);
    }

    #[test]
    fn class_count_is_bounded_by_two_times_ranges_plus_one() {
        let ranges: Vec<(u16, u16)> = (0..10).map(|i| (i * 100, i * 100 + 50)).collect();
        let (classifier, labels) = RangeClassifier::build(&ranges);
        assert!(labels.len() <= 2 * ranges.len() + 1);
        let _ = classifier.width();
    }

    #[test]
    fn into_arena_preserves_class_lookups() {
        let arena = Arena::new(1 << 16);
        let (classifier, _) = RangeClassifier::build(&[(10, 20), (100, 200)]);
        let c1 = classifier.class_of(15);
        let c2 = classifier.class_of(150);
        let frozen = classifier.into_arena(&arena).unwrap();
        let f = unsafe { frozen.as_ref() };
        assert_eq!(unsafe { f.class_of(15) }, c1);
        assert_eq!(unsafe { f.class_of(150) }, c2);
    }
}
