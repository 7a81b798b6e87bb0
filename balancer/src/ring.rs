//! Real-selection ring (C8): a flat array that lets `get(rng_value)`
//! resolve to a real's `registry_idx` in O(1), with each real occupying
//! exactly as many slots as its effective weight.
//!
//! Arena-resident (unlike the filter crate's plain `Vec`-backed structures)
//! because the ring is part of the published module-config a worker reads
//! through a `RelPtr` every packet -- the one structure in this crate
//! `spec.md` §3 names explicitly as `RelPtr`-shaped.

use core::ptr::NonNull;

use yanet_arena::{AllocError, Arena, RelPtr};
use yanet_lib::Xorshift64;

/// Sentinel for "no real available" -- an empty ring, or one built from an
/// all-zero-weight real set.
pub const RING_INVALID: u32 = u32::MAX;

/// Fixed seed for the ring shuffle. `spec.md` §4.8 requires the shuffle be
/// reproducible across a rebuild of the same real set (and, per §8 S3, does
/// not tie exactness to any particular permutation), so any constant works;
/// this one just avoids the PRNG's own zero-seed fixup in
/// `yanet_lib::Xorshift64::new`.
const RING_SHUFFLE_SEED: u64 = 0x52494e47_u64; // "RING"

#[repr(C)]
pub struct RealRing {
    ids: RelPtr<u32>,
    len: usize,
    /// Effective weight each real contributed, in the same order as the
    /// `reals` slice passed to `build`. Lets the WLC controller (C11) diff
    /// "does the new weight vector differ from what this ring was built
    /// from" without recounting `ids`.
    weights: RelPtr<u16>,
    weights_len: usize,
}

impl RealRing {
    /// Build a ring from `reals`, each `(registry_idx, effective_weight)`.
    /// A real with `effective_weight == 0` contributes zero slots (counts
    /// as disabled for selection purposes without needing a separate flag
    /// here).
    pub fn build(arena: &Arena, reals: &[(u32, u16)]) -> Result<NonNull<Self>, AllocError> {
        let total: usize = reals.iter().map(|&(_, w)| w as usize).sum();

        let mut ids: Vec<u32> = Vec::with_capacity(total);
        for &(registry_idx, weight) in reals {
            ids.extend(std::iter::repeat(registry_idx).take(weight as usize));
        }
        let mut rng = Xorshift64::new(RING_SHUFFLE_SEED);
        rng.shuffle(&mut ids);

        let weights: Vec<u16> = reals.iter().map(|&(_, w)| w).collect();

        let ring = RealRing {
            ids: RelPtr::NULL,
            len: ids.len(),
            weights: RelPtr::NULL,
            weights_len: weights.len(),
        };
        let ring_slot = arena.alloc(ring)?;

        if !ids.is_empty() {
            let raw = arena.alloc_bytes(ids.len() * core::mem::size_of::<u32>())?;
            let typed = raw.cast::<u32>();
            unsafe {
                typed.as_ptr().copy_from_nonoverlapping(ids.as_ptr(), ids.len());
                (*ring_slot.as_ptr()).ids.set(typed.as_ptr() as *const u32);
            }
        }
        if !weights.is_empty() {
            let raw = arena.alloc_bytes(weights.len() * core::mem::size_of::<u16>())?;
            let typed = raw.cast::<u16>();
            unsafe {
                typed.as_ptr().copy_from_nonoverlapping(weights.as_ptr(), weights.len());
                (*ring_slot.as_ptr()).weights.set(typed.as_ptr() as *const u16);
            }
        }

        Ok(ring_slot)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Resolve a selection source (packet hash, or the per-VS round-robin
    /// counter for PRR VSes) to a real's `registry_idx`.
    ///
    /// # Safety
    /// The arena region this ring's `ids` points into must still be
    /// mapped.
    pub unsafe fn get(&self, rng_value: u64) -> u32 {
        if self.len == 0 {
            return RING_INVALID;
        }
        let slice = unsafe { self.ids.as_slice(self.len) }.expect("non-empty ring has non-null ids");
        slice[(rng_value as usize) % self.len]
    }

    /// # Safety
    /// Same as [`RealRing::get`].
    pub unsafe fn effective_weights(&self) -> &[u16] {
        if self.weights_len == 0 {
            return &[];
        }
        unsafe { self.weights.as_slice(self.weights_len) }.expect("non-empty weight vector has non-null weights")
    }
}

/// Release a ring's arena allocations. The `RealRing` struct itself was
/// allocated with `arena.alloc`; its `ids`/`weights` buffers were allocated
/// separately and must be freed with their recorded lengths.
///
/// # Safety
/// `ring` must have come from [`RealRing::build`] on `arena`, and no live
/// reference (worker-held `RelPtr` read) may still observe it.
pub unsafe fn free_ring(arena: &Arena, ring: NonNull<RealRing>) {
    unsafe {
        let r = ring.as_ref();
        if let Some(ids) = r.ids.as_slice(r.len) {
            if !ids.is_empty() {
                arena.free_bytes(NonNull::new_unchecked(ids.as_ptr() as *mut u8), r.len * core::mem::size_of::<u32>());
            }
        }
        if let Some(weights) = r.weights.as_slice(r.weights_len) {
            if !weights.is_empty() {
                arena.free_bytes(
                    NonNull::new_unchecked(weights.as_ptr() as *mut u8),
                    r.weights_len * core::mem::size_of::<u16>(),
                );
            }
        }
        arena.free(ring);
    }
}
