//! A relative-pointer arena: a fixed-size, single-writer memory region
//! whose internal structure survives being mapped at a different base
//! address, because every internal reference is a [`RelPtr`] (an offset
//! relative to its own storage address) rather than a raw pointer.
//!
//! This crate owns the allocator (power-of-two bucketed free lists over a
//! bump-allocated backing buffer), the root table that anchors symbolic
//! names to arena contents, and the on-wire header that describes both.
//! Everything built on top of the arena -- the LPM tries, the filter
//! compiler's tables, the balancer's session table and rings, the
//! control-plane's published module config -- stores its cross-references
//! as `RelPtr`s into this arena.

mod alloc;
mod header;
mod relptr;
mod roots;

pub use alloc::{AllocError, Arena, ArenaStats};
pub use header::{ArenaHeader, ARENA_MAGIC, ARENA_VERSION, HEADER_LEN};
pub use relptr::{AtomicRelPtr, RelPtr};
pub use roots::{InvalidRootName, RootTableFull, MAX_ROOT_NAME, MAX_ROOTS};
