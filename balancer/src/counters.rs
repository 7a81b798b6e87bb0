//! Per-worker and per-entity atomic counters (`spec.md` §4.10 step 6,
//! §7 "Diagnostics"). Plain `AtomicU64`s rather than `slopos-core`'s
//! `PerCpuStat` ring (no cross-CPU migration here: one worker owns one
//! `WorkerCounters` for its lifetime), summed on read for reporting.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters scoped to one worker thread. Named after `spec.md` §4.10/§7's
/// own counter names, not grouped by mechanism, so a reader can match each
/// field straight back to the spec prose that names it.
#[derive(Default)]
pub struct WorkerCounters {
    /// `allowed_src` rejected the packet's source address (§4.10 step 2).
    pub packet_src_not_allowed: AtomicU64,
    /// A session's sticky real is disabled or gone; the flow needed
    /// reselection (§4.10 step 4, "real_disabled").
    pub real_disabled: AtomicU64,
    /// The ring had no enabled real to offer, with or without a session
    /// (§4.10 step 4, "no_reals").
    pub no_reals: AtomicU64,
    /// A freshly created slot failed the reschedule rule and was removed
    /// (§4.10 step 4, "packet_not_rescheduled").
    pub packet_not_rescheduled: AtomicU64,
    /// `get_or_create` returned `Overflow`; the packet still went out via
    /// one-shot ring selection (§4.10 step 4, "session_table_overflow").
    pub session_table_overflow: AtomicU64,
    /// Dropped before reaching real selection: bad transport, unparsable
    /// L3/L4 (§4.10 step 3, "invalid_packet").
    pub invalid_packet: AtomicU64,
}

impl WorkerCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerCountersSnapshot {
        WorkerCountersSnapshot {
            packet_src_not_allowed: self.packet_src_not_allowed.load(Ordering::Relaxed),
            real_disabled: self.real_disabled.load(Ordering::Relaxed),
            no_reals: self.no_reals.load(Ordering::Relaxed),
            packet_not_rescheduled: self.packet_not_rescheduled.load(Ordering::Relaxed),
            session_table_overflow: self.session_table_overflow.load(Ordering::Relaxed),
            invalid_packet: self.invalid_packet.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerCountersSnapshot {
    pub packet_src_not_allowed: u64,
    pub real_disabled: u64,
    pub no_reals: u64,
    pub packet_not_rescheduled: u64,
    pub session_table_overflow: u64,
    pub invalid_packet: u64,
}

/// Packet/byte pair tracked per virtual service and per real
/// (`spec.md` §7: "vs.outgoing_*", "real.*").
#[derive(Default)]
pub struct TrafficCounters {
    pub packets: AtomicU64,
    pub bytes: AtomicU64,
}

impl TrafficCounters {
    pub fn record(&self, bytes: u64) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> (u64, u64) {
        (self.packets.load(Ordering::Relaxed), self.bytes.load(Ordering::Relaxed))
    }
}

/// One `TrafficCounters` per registered id (VS or real), grown lazily so
/// the control plane can add entries without a global stop-the-world
/// resize of every worker's counters.
#[derive(Default)]
pub struct TrafficCounterTable {
    entries: std::sync::RwLock<Vec<std::sync::Arc<TrafficCounters>>>,
}

impl TrafficCounterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert(&self, id: usize) -> std::sync::Arc<TrafficCounters> {
        {
            let entries = self.entries.read().unwrap();
            if let Some(existing) = entries.get(id) {
                return existing.clone();
            }
        }
        let mut entries = self.entries.write().unwrap();
        if entries.len() <= id {
            entries.resize_with(id + 1, || std::sync::Arc::new(TrafficCounters::default()));
        }
        entries[id].clone()
    }
}
