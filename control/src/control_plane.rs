//! Control-plane publisher (C12): the single writer that builds a new
//! [`ModuleConfig`] and atomically promotes it to current.
//!
//! Grounded on `slopos-mm::shared_memory`'s create/map/destroy bookkeeping
//! (single registry lock, allocate-then-publish-a-token, roll back and
//! leave prior state untouched on any failure partway through) -- the
//! allocate-or-leave-untouched discipline here is the same one, applied
//! to an `AtomicRelPtr` swap into the control plane's own [`Arena`]
//! instead of one token table.
//!
//! Freeing is one generation behind the swap, not immediate: when
//! generation N+1 is published, generation N-1 (not N) is retired. A
//! worker that started reading generation N just before the swap is
//! still inside that read by the time N+1 lands, but it cannot still be
//! reading N-1 -- an entire extra publish cycle has passed. This is the
//! simplification `spec.md` §4.12's quiescence note allows in place of
//! per-worker generation acks, the same tradeoff the session table's
//! two-generation resize makes explicit for its own buckets.

use std::ptr::NonNull;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use yanet_arena::{Arena, AtomicRelPtr, RelPtr};
use yanet_balancer::SessionTable;
use yanet_lib::SpinLock;

use crate::diagnostics::Diagnostics;
use crate::error::{ConfigError, ConfigResult};
use crate::module_config::{free_module_config, ModuleConfig};

pub struct ControlPlane {
    /// Behind its own `Arc`, not owned directly: [`Arena`]'s own docs
    /// forbid moving it once anything has been allocated in it, and
    /// building the session table and the initial config below both
    /// allocate before `self` itself is wrapped in an `Arc`. Sharing the
    /// arena through its own handle, the way the doc comment prescribes,
    /// sidesteps that rather than relying on `self`'s own move never
    /// happening to get elided.
    arena: Arc<Arena>,
    current: AtomicRelPtr<ModuleConfig>,
    /// The immediately-preceding generation, kept alive one extra publish
    /// cycle before being freed.
    previous: SpinLock<RelPtr<ModuleConfig>>,
    /// Shared by relative reference across every config generation
    /// (`spec.md` §4.12: "sharing the existing session table").
    session_table: NonNull<SessionTable>,
    diagnostics: Diagnostics,
}

// SAFETY: `session_table` points into `self.arena`, which outlives every
// borrow of `self`; every dereference goes through `&self` methods, and
// the control plane is the only writer.
unsafe impl Send for ControlPlane {}
unsafe impl Sync for ControlPlane {}

impl ControlPlane {
    /// Builds the control plane's arena, its session table, and an initial
    /// config inside it in one step, returning it already behind an `Arc`.
    ///
    /// `current` is only stored once `self` is at its final heap address:
    /// [`AtomicRelPtr::store`] recomputes its offset from `&self` on every
    /// call, so storing into a field of a by-value `Self` that a caller
    /// then moves into an `Arc` would record an offset relative to a
    /// temporary, the same footgun `RelPtr::set`'s own docs call out.
    /// Returning `Arc<Self>` instead of `Self` lets this constructor do
    /// that store itself, after the move, rather than leaving it to the
    /// caller to get right.
    ///
    /// `build_initial` receives the arena and the freshly built session
    /// table's handle so it can wire [`ModuleConfig::build_in_arena`]'s
    /// `session_table` parameter.
    pub fn new(
        arena_capacity: usize,
        bucket_count: usize,
        worker_count: usize,
        build_initial: impl FnOnce(&Arena, NonNull<SessionTable>) -> ConfigResult<NonNull<ModuleConfig>>,
    ) -> ConfigResult<Arc<Self>> {
        let arena = Arc::new(Arena::new(arena_capacity));
        let session_table = SessionTable::build_in_arena(&arena, bucket_count, worker_count)
            .map_err(ConfigError::from)?;
        let initial = build_initial(&arena, session_table)?;
        let control_plane = Arc::new(Self {
            arena,
            current: AtomicRelPtr::null(),
            previous: SpinLock::new(RelPtr::NULL),
            session_table,
            diagnostics: Diagnostics::new(),
        });
        control_plane.current.store(initial.as_ptr(), Ordering::Release);
        Ok(control_plane)
    }

    /// A worker's per-packet-batch read of the current config.
    ///
    /// # Safety
    /// The returned reference must not outlive the control plane, and must
    /// not be held across a call that might retire this generation.
    pub unsafe fn current(&self) -> &ModuleConfig {
        unsafe { self.current.load(Ordering::Acquire) }.expect("control plane always has a current config")
    }

    /// # Safety
    /// The returned reference must not outlive the control plane.
    pub unsafe fn session_table(&self) -> &SessionTable {
        unsafe { self.session_table.as_ref() }
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Publishes `build()`'s result as the new current config.
    ///
    /// Per §4.12's failure semantics: if `build` fails, the previous
    /// config stays active and the error is recorded on the diagnostic
    /// slot rather than propagated as a partially-applied state.
    pub fn update_config(
        &self,
        build: impl FnOnce(&Arena, NonNull<SessionTable>) -> ConfigResult<NonNull<ModuleConfig>>,
    ) -> ConfigResult<()> {
        match build(&self.arena, self.session_table) {
            Ok(new_config) => {
                let retiring = unsafe { self.current.load(Ordering::Acquire) }.map(NonNull::from);
                self.current.store(new_config.as_ptr(), Ordering::Release);
                let mut previous = self.previous.lock();
                let long_retired = unsafe { previous.get() }.map(NonNull::from);
                match retiring {
                    Some(r) => previous.set(r.as_ptr()),
                    None => previous.set_null(),
                }
                drop(previous);
                if let Some(long_retired) = long_retired {
                    unsafe { free_module_config(&self.arena, long_retired) };
                }
                Ok(())
            }
            Err(err) => {
                self.diagnostics.report(err.to_string());
                Err(err)
            }
        }
    }

    /// A config update that also grows or shrinks the session table
    /// first, per §4.12: "a config-update that changes capacity performs
    /// the resize first; on failure the config is not published."
    pub fn update_config_with_resize(
        &self,
        new_bucket_count: usize,
        now: u64,
        max_timeout: u64,
        build: impl FnOnce(&Arena, NonNull<SessionTable>) -> ConfigResult<NonNull<ModuleConfig>>,
    ) -> ConfigResult<()> {
        self.resize_session_table(new_bucket_count, now, max_timeout)?;
        self.update_config(build)
    }

    /// `resize_session_table` as a first-class operation (named in
    /// §4.12's prose, not given its own signature there).
    pub fn resize_session_table(&self, new_bucket_count: usize, now: u64, max_timeout: u64) -> ConfigResult<()> {
        unsafe { self.session_table.as_ref() }
            .resize(&self.arena, new_bucket_count, now, max_timeout)
            .map_err(ConfigError::from)
    }

    /// Housekeeping tick: frees the outgoing session-table generation
    /// once every worker has moved off it.
    pub fn collect_quiescent_generation(&self) {
        unsafe { self.session_table.as_ref().maybe_free_previous_generation(&self.arena) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use yanet_abi::AttrKind;
    use yanet_filter::Rule;

    fn build(arena: &Arena, session_table: NonNull<SessionTable>) -> ConfigResult<NonNull<ModuleConfig>> {
        let rules = vec![Rule { id: 1, action: 0, attributes: yanet_filter::RuleAttributes::new() }];
        ModuleConfig::build_in_arena(
            arena,
            &rules,
            &[AttrKind::Device],
            &[AttrKind::Device],
            HashMap::new(),
            HashMap::new(),
            None,
            None,
            session_table,
        )
        .map_err(Into::into)
    }

    #[test]
    fn failed_update_leaves_previous_config_active() {
        let cp = ControlPlane::new(1 << 20, 16, 1, build).unwrap();
        let before = unsafe { cp.current() } as *const ModuleConfig;
        let result = cp.update_config(|_, _| Err(ConfigError::RealNotFound(7)));
        assert!(result.is_err());
        assert_eq!(unsafe { cp.current() } as *const ModuleConfig, before);
        assert!(cp.diagnostics().take().unwrap().contains('7'));
    }

    #[test]
    fn successful_update_replaces_the_config() {
        let cp = ControlPlane::new(1 << 20, 16, 1, build).unwrap();
        let before = unsafe { cp.current() } as *const ModuleConfig;
        cp.update_config(build).unwrap();
        assert_ne!(unsafe { cp.current() } as *const ModuleConfig, before);
        assert!(cp.diagnostics().take().is_none());
    }
}
