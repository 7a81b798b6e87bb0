//! The published config (`spec.md` §4.12): one compiled filter, its rule
//! id -> action projection, and the virtual services the filter's
//! actions resolve to.
//!
//! Arena-resident, built in place via [`ModuleConfig::build_in_arena`] and
//! reached by [`crate::control_plane::ControlPlane`] through an
//! `AtomicRelPtr`, the same discipline [`yanet_balancer::ring::RealRing`]
//! uses for its own publish. The session table is shared across every
//! generation (`spec.md` §3: "`session_table` (`RelPtr`, shared across
//! generations)") -- it's built once by the control plane and every
//! `ModuleConfig` after that just carries a `RelPtr` to the same instance,
//! never a copy.
//!
//! `actions`, `virtual_services` and each filter's leaf-level `Box`/`Vec`
//! skeleton stay on the heap inside the arena-placed struct, the same
//! scope boundary `yanet_filter::compiler::TreeNode` draws for its own
//! recursive shell: bounded, rebuilt fresh on every republish, and not
//! something a worker walks through a remapped arena. Only the fields a
//! worker actually dereferences through a `RelPtr` -- the decap LPM tries
//! and the session table -- need arena placement of their own.

use std::collections::HashMap;
use std::ptr::NonNull;

use yanet_abi::action::CategoryMask;
use yanet_abi::Action;
use yanet_arena::{AllocError, Arena, RelPtr};
use yanet_balancer::SessionTable;
use yanet_filter::{compile, query, FilterInstance, PacketAttrs, Rule};
use yanet_abi::AttrKind;
use yanet_balancer::VirtualService;
use yanet_lpm::{FrozenLpmTrieV4, FrozenLpmTrieV6};

/// `spec.md` §3's module-config root, minus the fields the core leaves to
/// its out-of-scope collaborators (no `counter_ids` table here — per-worker
/// counters are a plain struct threaded by the caller, see
/// `yanet_balancer::counters`).
pub struct ModuleConfig {
    /// §4.10 step 1: "If network proto is IPv4, query `vs_v4_filter`".
    pub vs_v4_filter: FilterInstance,
    /// §4.10 step 1: "if IPv6, `vs_v6_filter`".
    pub vs_v6_filter: FilterInstance,
    pub actions: HashMap<u32, Action>,
    pub virtual_services: HashMap<u32, VirtualService>,
    /// Decap address lists (§6: "decap address lists").
    decap_lpm_v4: RelPtr<FrozenLpmTrieV4>,
    decap_lpm_v6: RelPtr<FrozenLpmTrieV6>,
    /// §3/§4.12: the session table this generation shares with every
    /// other generation, reached by relative reference rather than owned.
    session_table: RelPtr<SessionTable>,
}

impl ModuleConfig {
    /// Compiles both family filters from `rules` and places the resulting
    /// config in `arena`. `decap_lpm_v4`/`decap_lpm_v6` and
    /// `session_table` must already be at their final arena addresses --
    /// the same precondition `RealRing::build` imposes on buffers it
    /// receives rather than allocates itself.
    #[allow(clippy::too_many_arguments)]
    pub fn build_in_arena(
        arena: &Arena,
        rules: &[Rule],
        v4_signature: &[AttrKind],
        v6_signature: &[AttrKind],
        actions: HashMap<u32, Action>,
        virtual_services: HashMap<u32, VirtualService>,
        decap_lpm_v4: Option<NonNull<FrozenLpmTrieV4>>,
        decap_lpm_v6: Option<NonNull<FrozenLpmTrieV6>>,
        session_table: NonNull<SessionTable>,
    ) -> Result<NonNull<Self>, crate::error::ConfigError> {
        let vs_v4_filter = compile(arena, rules, v4_signature)?;
        let vs_v6_filter = compile(arena, rules, v6_signature)?;

        let shell = ModuleConfig {
            vs_v4_filter,
            vs_v6_filter,
            actions,
            virtual_services,
            decap_lpm_v4: RelPtr::NULL,
            decap_lpm_v6: RelPtr::NULL,
            session_table: RelPtr::NULL,
        };
        let slot = arena.alloc(shell).map_err(crate::error::ConfigError::from)?;
        unsafe {
            if let Some(v4) = decap_lpm_v4 {
                (*slot.as_ptr()).decap_lpm_v4.set(v4.as_ptr() as *const FrozenLpmTrieV4);
            }
            if let Some(v6) = decap_lpm_v6 {
                (*slot.as_ptr()).decap_lpm_v6.set(v6.as_ptr() as *const FrozenLpmTrieV6);
            }
            (*slot.as_ptr()).session_table.set(session_table.as_ptr() as *const SessionTable);
        }
        Ok(slot)
    }

    /// # Safety
    /// The arena region this config's session table lives in must still
    /// be mapped.
    pub unsafe fn session_table(&self) -> &SessionTable {
        unsafe { self.session_table.get() }.expect("every config carries a live session table")
    }

    /// # Safety
    /// The arena region the v4 decap LPM trie lives in must still be
    /// mapped.
    pub unsafe fn decap_lpm_v4(&self) -> Option<&FrozenLpmTrieV4> {
        unsafe { self.decap_lpm_v4.get() }
    }

    /// # Safety
    /// The arena region the v6 decap LPM trie lives in must still be
    /// mapped.
    pub unsafe fn decap_lpm_v6(&self) -> Option<&FrozenLpmTrieV6> {
        unsafe { self.decap_lpm_v6.get() }
    }

    pub fn virtual_service(&self, vs_id: u32) -> Option<&VirtualService> {
        self.virtual_services.get(&vs_id)
    }

    /// §4.10 step 1: classify `pkt` against the family-appropriate VS
    /// filter and return the first action's user id as a candidate VS
    /// index, or `None` ("no action" -> drop).
    ///
    /// # Safety
    /// Every arena region this config's filters point into must still be
    /// mapped.
    pub unsafe fn lookup_vs(&self, is_ipv6: bool, pkt: &PacketAttrs) -> Option<u32> {
        let filter = if is_ipv6 { &self.vs_v6_filter } else { &self.vs_v4_filter };
        let result = unsafe { query(filter, &self.actions, pkt, CategoryMask::ALL) };
        result.matches.first().map(|m| m.user_id())
    }
}

/// Retires a config built by [`ModuleConfig::build_in_arena`]. `actions`,
/// `virtual_services`, and each filter's `Box`/`Vec` skeleton are plain
/// heap allocations the arena's own `free` does not know how to drop (its
/// contract only unlinks the bytes); `drop_in_place` runs their
/// destructors first so the generation's heap-owned data doesn't leak on
/// every republish.
///
/// # Safety
/// `ptr` must have come from [`ModuleConfig::build_in_arena`] on `arena`,
/// and no live reference may still observe it.
pub unsafe fn free_module_config(arena: &Arena, ptr: NonNull<ModuleConfig>) {
    unsafe {
        std::ptr::drop_in_place(ptr.as_ptr());
        arena.free(ptr);
    }
}
