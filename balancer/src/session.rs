//! Session table (C9): assigns a client flow to a real and keeps that
//! assignment sticky until the flow goes idle past its TTL.
//!
//! Grounded on `slopos-core`'s per-CPU ready-queue locking
//! (`scheduler::per_cpu::PerCpuScheduler`, one `spin::Mutex` guarding a
//! small fixed-size queue so no CPU blocks another for longer than a
//! local operation) generalized from one lock per CPU to one
//! `yanet_lib::SpinLock` per bucket: many independent short critical
//! sections rather than one global one.
//!
//! The table itself is arena-resident, built once via
//! [`SessionTable::build_in_arena`] and reached from the published
//! module-config root by a single `RelPtr` that survives every config
//! republish (`spec.md` §3: "`session_table` (`RelPtr`, shared across
//! generations)"). Its two live generations follow the same
//! build-struct-then-set-pointers discipline [`crate::ring::RealRing`]
//! uses: a [`Generation`] is fully populated in the arena before anything
//! stores a `RelPtr` to it, and the "current" swap itself is a single
//! `AtomicRelPtr` store, not a lock.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use yanet_abi::SessionId;
use yanet_arena::{AllocError, Arena, AtomicRelPtr, RelPtr};
use yanet_lib::SpinLock;

/// Slots per bucket. Fixed and small so a probe is bounded regardless of
/// load factor (`spec.md` §4.9: "bounded by the stripe width").
pub const BUCKET_WIDTH: usize = 8;

#[derive(Clone, Copy, Debug, Default)]
pub struct SessionState {
    pub real_id: u32,
    pub create_ts: u64,
    pub last_packet_ts: u64,
    pub timeout: u64,
}

#[derive(Clone, Copy, Default)]
struct Slot {
    session_id: Option<SessionId>,
    state: SessionState,
}

impl Slot {
    fn is_live(&self, now: u64) -> bool {
        self.session_id.is_some() && now <= self.state.last_packet_ts + self.state.timeout
    }
}

struct Bucket {
    slots: [Slot; BUCKET_WIDTH],
}

impl Bucket {
    fn empty() -> Self {
        Self { slots: [Slot::default(); BUCKET_WIDTH] }
    }
}

/// One generation's bucket array, arena-resident. Neither `SpinLock` nor
/// `Bucket` holds a `RelPtr` of its own, so the whole array is a single
/// flat allocation -- the same shape as [`crate::ring::RealRing`]'s id and
/// weight buffers.
struct Generation {
    buckets: RelPtr<SpinLock<Bucket>>,
    bucket_count: usize,
}

impl Generation {
    fn build_in_arena(arena: &Arena, bucket_count: usize) -> Result<core::ptr::NonNull<Self>, AllocError> {
        let bucket_count = bucket_count.max(1);
        let raw = arena.alloc_bytes(bucket_count * core::mem::size_of::<SpinLock<Bucket>>())?;
        let typed = raw.cast::<SpinLock<Bucket>>();
        for i in 0..bucket_count {
            unsafe { typed.as_ptr().add(i).write(SpinLock::new(Bucket::empty())) };
        }
        let shell = Generation { buckets: RelPtr::NULL, bucket_count };
        let slot = arena.alloc(shell)?;
        unsafe {
            (*slot.as_ptr()).buckets.set(typed.as_ptr() as *const SpinLock<Bucket>);
        }
        Ok(slot)
    }

    /// # Safety
    /// The arena region this generation's buckets point into must still
    /// be mapped.
    unsafe fn bucket_slice(&self) -> &[SpinLock<Bucket>] {
        unsafe { self.buckets.as_slice(self.bucket_count) }.expect("generation has a non-empty bucket array")
    }

    fn bucket_index(&self, hash: u64) -> usize {
        (hash as usize) % self.bucket_count
    }

    /// Read-only probe, used to carry a sticky real forward across a resize
    /// (`spec.md` §4.9: "additionally looks up in the previous generation
    /// and returns its state on hit").
    ///
    /// # Safety
    /// The arena region this generation's buckets point into must still
    /// be mapped.
    unsafe fn lookup(&self, id: &SessionId, now: u64) -> Option<SessionState> {
        let bucket = unsafe { self.bucket_slice() }[self.bucket_index(id.hash64())].lock();
        bucket
            .slots
            .iter()
            .find(|s| s.session_id.as_ref() == Some(id) && s.is_live(now))
            .map(|s| s.state)
    }
}

/// # Safety
/// `gen` must have come from [`Generation::build_in_arena`] on `arena`,
/// and no live reference may still observe it.
unsafe fn free_generation(arena: &Arena, gen: core::ptr::NonNull<Generation>) {
    unsafe {
        let g = gen.as_ref();
        if let Some(buckets) = g.buckets.as_slice(g.bucket_count) {
            arena.free_bytes(
                core::ptr::NonNull::new_unchecked(buckets.as_ptr() as *mut u8),
                g.bucket_count * core::mem::size_of::<SpinLock<Bucket>>(),
            );
        }
        arena.free(gen);
    }
}

#[repr(C)]
#[derive(Default)]
struct WorkerSlot {
    use_prev_gen: AtomicBool,
    max_deadline_prev_gen: AtomicU64,
    /// Max probe distance observed by this worker, for the control plane's
    /// grow-capacity decision (`spec.md` §4.9, "density-factor tracking").
    density_factor: AtomicU32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetOrCreateStatus {
    Found,
    Created,
    Overflow,
}

/// A short-lived handle on a live slot. Dropping it is `release(lock)`.
pub struct SessionHandle<'a> {
    guard: yanet_lib::spinlock::SpinLockGuard<'a, Bucket>,
    slot_idx: usize,
    pub status: GetOrCreateStatus,
}

impl<'a> SessionHandle<'a> {
    pub fn state(&self) -> &SessionState {
        &self.guard.slots[self.slot_idx].state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.guard.slots[self.slot_idx].state
    }
}

#[repr(C)]
pub struct SessionTable {
    current: AtomicRelPtr<Generation>,
    previous: SpinLock<RelPtr<Generation>>,
    workers: RelPtr<WorkerSlot>,
    worker_count: usize,
}

impl SessionTable {
    /// Builds the table, its first generation, and its worker-slot array
    /// entirely in `arena`. Mirrors [`crate::ring::RealRing::build`]'s
    /// ordering: every nested allocation reaches its final arena address
    /// before the struct holding it is itself placed, and `current`'s
    /// `AtomicRelPtr` is only stored into once `self` is at its own final
    /// address.
    pub fn build_in_arena(
        arena: &Arena,
        bucket_count: usize,
        worker_count: usize,
    ) -> Result<core::ptr::NonNull<Self>, AllocError> {
        let first_gen = Generation::build_in_arena(arena, bucket_count)?;

        let worker_count = worker_count.max(1);
        let workers_raw = arena.alloc_bytes(worker_count * core::mem::size_of::<WorkerSlot>())?;
        let workers_typed = workers_raw.cast::<WorkerSlot>();
        for i in 0..worker_count {
            unsafe { workers_typed.as_ptr().add(i).write(WorkerSlot::default()) };
        }

        let shell = SessionTable {
            current: AtomicRelPtr::null(),
            previous: SpinLock::new(RelPtr::NULL),
            workers: RelPtr::NULL,
            worker_count,
        };
        let slot = arena.alloc(shell)?;
        unsafe {
            (*slot.as_ptr()).workers.set(workers_typed.as_ptr() as *const WorkerSlot);
            (*slot.as_ptr()).current.store(first_gen.as_ptr(), Ordering::Release);
        }
        Ok(slot)
    }

    /// # Safety
    /// The arena region `self.workers` points into must still be mapped.
    unsafe fn worker_slice(&self) -> &[WorkerSlot] {
        unsafe { self.workers.as_slice(self.worker_count) }.expect("session table has a non-empty worker array")
    }

    fn clear_stale_prev_gen_flag(&self, worker_idx: usize, now: u64) {
        let worker = &unsafe { self.worker_slice() }[worker_idx];
        if worker.use_prev_gen.load(Ordering::Relaxed)
            && worker.max_deadline_prev_gen.load(Ordering::Relaxed) < now
        {
            worker.use_prev_gen.store(false, Ordering::Relaxed);
        }
    }

    pub fn get_or_create(
        &self,
        worker_idx: usize,
        now: u64,
        timeout: u64,
        session_id: SessionId,
    ) -> Result<SessionHandle<'_>, GetOrCreateStatus> {
        self.clear_stale_prev_gen_flag(worker_idx, now);

        let current = unsafe { self.current.load(Ordering::Acquire) }.expect("session table always has a current generation");
        let bucket_idx = current.bucket_index(session_id.hash64());
        let mut guard = unsafe { current.bucket_slice() }[bucket_idx].lock();

        let mut probe_distance = 0u32;
        let mut found_idx = None;
        let mut free_idx = None;
        for (i, slot) in guard.slots.iter().enumerate() {
            probe_distance = probe_distance.max(i as u32 + 1);
            if slot.session_id.as_ref() == Some(&session_id) && slot.is_live(now) {
                found_idx = Some(i);
                break;
            }
            if free_idx.is_none() && (slot.session_id.is_none() || !slot.is_live(now)) {
                free_idx = Some(i);
            }
        }
        unsafe { self.worker_slice() }[worker_idx].density_factor.fetch_max(probe_distance, Ordering::Relaxed);

        // Bucket data must outlive this match, so index into `guard`
        // inside each branch rather than holding a borrow across them.
        if let Some(idx) = found_idx {
            guard.slots[idx].state.last_packet_ts = now;
            guard.slots[idx].state.timeout = timeout;
            return Ok(SessionHandle { guard, slot_idx: idx, status: GetOrCreateStatus::Found });
        }

        let Some(idx) = free_idx else {
            return Err(GetOrCreateStatus::Overflow);
        };

        guard.slots[idx] = Slot {
            session_id: Some(session_id),
            state: SessionState { real_id: 0, create_ts: now, last_packet_ts: now, timeout },
        };

        let use_prev = unsafe { self.worker_slice() }[worker_idx].use_prev_gen.load(Ordering::Relaxed);
        if use_prev {
            let prev = self.previous.lock();
            if let Some(prev_gen) = unsafe { prev.get() } {
                if let Some(prev_state) = unsafe { prev_gen.lookup(&session_id, now) } {
                    guard.slots[idx].state = prev_state;
                    guard.slots[idx].state.last_packet_ts = now;
                    return Ok(SessionHandle { guard, slot_idx: idx, status: GetOrCreateStatus::Found });
                }
            }
        }

        Ok(SessionHandle { guard, slot_idx: idx, status: GetOrCreateStatus::Created })
    }

    /// Remove a just-created slot, used by the packet path when a
    /// reschedule is disallowed (`spec.md` §4.10 step 4:
    /// "remove the created slot, release, drop").
    pub fn remove(handle: &mut SessionHandle<'_>) {
        handle.guard.slots[handle.slot_idx] = Slot::default();
    }

    /// Promote a fresh, empty generation to current, marking every worker
    /// as needing to consult the outgoing generation until its sessions
    /// have all timed out (`spec.md` §4.9 "two-generation resize"). The
    /// outgoing generation is not freed here -- see
    /// [`SessionTable::maybe_free_previous_generation`].
    pub fn resize(&self, arena: &Arena, new_bucket_count: usize, now: u64, max_timeout: u64) -> Result<(), AllocError> {
        let new_gen = Generation::build_in_arena(arena, new_bucket_count)?;
        let old = unsafe { self.current.load(Ordering::Acquire) }.map(|g| g as *const Generation);
        self.current.store(new_gen.as_ptr(), Ordering::Release);
        let mut previous = self.previous.lock();
        match old {
            Some(old) => previous.set(old),
            None => previous.set_null(),
        }
        drop(previous);
        for worker in unsafe { self.worker_slice() } {
            worker.use_prev_gen.store(true, Ordering::Relaxed);
            worker.max_deadline_prev_gen.store(now + max_timeout, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Called periodically by the control plane. Frees the outgoing
    /// generation's arena storage once every worker has cleared
    /// `use_prev_gen`.
    ///
    /// # Safety
    /// `arena` must be the same arena `self` and its generations were
    /// built in.
    pub unsafe fn maybe_free_previous_generation(&self, arena: &Arena) {
        let all_cleared = unsafe { self.worker_slice() }.iter().all(|w| !w.use_prev_gen.load(Ordering::Relaxed));
        if !all_cleared {
            return;
        }
        let mut previous = self.previous.lock();
        if previous.is_null() {
            return;
        }
        let old_ptr = unsafe { previous.get() }.map(|g| core::ptr::NonNull::from(g));
        previous.set_null();
        drop(previous);
        if let Some(old_ptr) = old_ptr {
            unsafe { free_generation(arena, old_ptr) };
        }
    }

    pub fn density_factor(&self, worker_idx: usize) -> u32 {
        unsafe { self.worker_slice() }[worker_idx].density_factor.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yanet_abi::session::TransportProto;
    use yanet_abi::NetAddr6;

    fn sid(src_port: u16) -> SessionId {
        SessionId::new(TransportProto::Tcp, false, NetAddr6::NULL, NetAddr6::NULL, src_port, 80, false)
    }

    #[test]
    fn created_then_found_is_sticky() {
        let arena = Arena::new(1 << 20);
        let table = unsafe { SessionTable::build_in_arena(&arena, 16, 1).unwrap().as_ref() };
        let id = sid(1000);
        {
            let mut h = table.get_or_create(0, 0, 30, id).unwrap();
            assert_eq!(h.status, GetOrCreateStatus::Created);
            h.state_mut().real_id = 7;
        }
        let h = table.get_or_create(0, 5, 30, id).unwrap();
        assert_eq!(h.status, GetOrCreateStatus::Found);
        assert_eq!(h.state().real_id, 7);
    }

    #[test]
    fn expired_session_is_not_found() {
        let arena = Arena::new(1 << 20);
        let table = unsafe { SessionTable::build_in_arena(&arena, 16, 1).unwrap().as_ref() };
        let id = sid(2000);
        {
            let mut h = table.get_or_create(0, 0, 10, id).unwrap();
            h.state_mut().real_id = 3;
        }
        let h = table.get_or_create(0, 100, 10, id).unwrap();
        assert_eq!(h.status, GetOrCreateStatus::Created);
    }

    #[test]
    fn overflow_when_bucket_is_full_of_live_sessions() {
        let arena = Arena::new(1 << 20);
        let table = unsafe { SessionTable::build_in_arena(&arena, 1, 1).unwrap().as_ref() };
        for port in 0..BUCKET_WIDTH as u16 {
            table.get_or_create(0, 0, 1000, sid(port)).unwrap();
        }
        let err = table.get_or_create(0, 0, 1000, sid(9999));
        assert_eq!(err.err(), Some(GetOrCreateStatus::Overflow));
    }

    #[test]
    fn resize_preserves_sticky_session_for_the_grace_window() {
        let arena = Arena::new(1 << 20);
        let table = unsafe { SessionTable::build_in_arena(&arena, 4, 2).unwrap().as_ref() };
        let id = sid(42);
        {
            let mut h = table.get_or_create(0, 0, 1000, id).unwrap();
            h.state_mut().real_id = 9;
        }
        table.resize(&arena, 8, 10, 1000).unwrap();
        let h = table.get_or_create(1, 11, 1000, id).unwrap();
        assert_eq!(h.status, GetOrCreateStatus::Found);
        assert_eq!(h.state().real_id, 9);
    }

    #[test]
    fn maybe_free_previous_generation_clears_it_once_workers_catch_up() {
        let arena = Arena::new(1 << 20);
        let table = unsafe { SessionTable::build_in_arena(&arena, 4, 1).unwrap().as_ref() };
        table.resize(&arena, 8, 0, 1000).unwrap();
        unsafe { table.maybe_free_previous_generation(&arena) };
        // Worker still flagged `use_prev_gen`: previous generation survives.
        assert!(!table.previous.lock().is_null());
        unsafe { table.worker_slice() }[0].use_prev_gen.store(false, Ordering::Relaxed);
        unsafe { table.maybe_free_previous_generation(&arena) };
        assert!(table.previous.lock().is_null());
    }
}
