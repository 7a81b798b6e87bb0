//! Packet path (C10): virtual-service lookup through real selection.
//!
//! Grounded on `slopos-core`'s `net::dispatch::handle_frame` staged pipeline
//! (parse -> filter -> route -> deliver, each stage able to terminate
//! early with a drop reason) generalized to the five-stage VS pipeline
//! `spec.md` §4.10 describes. Encap/decap byte rewriting itself (GRE wrap,
//! MSS clamp, checksum fixups) is left to the caller -- `spec.md`'s
//! Non-goals exclude specifying the wire-rewrite bytes, only the
//! invariants that must hold around it, so this module returns an
//! [`EncapPlan`] describing what the caller must do rather than doing it.

use core::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use yanet_abi::session::{tcp_flags, TransportProto};
use yanet_abi::{NetAddr6, RealFlags, SessionId, VsFlags};
use yanet_lpm::FrozenLpmTrieV4;

use crate::counters::WorkerCounters;
use crate::error::PacketDrop;
use crate::ring::{RealRing, RING_INVALID};
use crate::session::{GetOrCreateStatus, SessionTable};

/// Per-class idle timeouts (`spec.md` §4.10 step 3: "picks a timeout
/// class"). Each field is seconds of idle time before a sticky session
/// expires.
#[derive(Clone, Copy, Debug)]
pub struct Timeouts {
    /// A bare SYN, no session yet established.
    pub tcp_syn: u64,
    /// The SYN-ACK leg of the handshake.
    pub tcp_syn_ack: u64,
    /// FIN or RST seen: short grace window for the final ACKs to land.
    pub tcp_fin: u64,
    /// An established TCP flow, no FIN/RST/SYN bits set.
    pub tcp: u64,
    pub udp: u64,
    /// Any other transport proto, when the VS is not `PURE_L3`.
    pub default: u64,
}

/// One real behind a virtual service. `reals[i]` is the entry the ring's
/// `registry_idx == i` refers to.
#[derive(Clone, Debug)]
pub struct RealRecord {
    pub real_id: u32,
    pub flags: RealFlags,
    pub endpoint: NetAddr6,
}

impl RealRecord {
    #[inline]
    pub fn enabled(&self) -> bool {
        !self.flags.contains(RealFlags::DISABLED)
    }
}

/// A virtual service: its match criteria live in the filter crate upstream
/// of this module (the caller already resolved `vs_id` via a filter
/// query); what this module needs is everything downstream of that.
pub struct VirtualService {
    pub id: u32,
    pub flags: VsFlags,
    pub reals: Vec<RealRecord>,
    pub ring: NonNull<RealRing>,
    pub timeouts: Timeouts,
    /// `None` means "no source restriction"; `Some` points at an arena
    /// trie where a non-[`yanet_lpm::LPM_INVALID`] lookup result means
    /// allowed.
    pub allowed_src: Option<NonNull<FrozenLpmTrieV4>>,
    prr_counter: AtomicU64,
}

// SAFETY: `ring` and `allowed_src` point into arena storage shared across
// workers and the control plane by design (same contract as `RelPtr`);
// every access goes through `&self` methods that only read it, and the
// control plane never frees either while a worker might still hold this
// `VirtualService` (the two-generation session-table quiescence protocol
// bounds that).
unsafe impl Send for VirtualService {}
unsafe impl Sync for VirtualService {}

impl VirtualService {
    pub fn new(
        id: u32,
        flags: VsFlags,
        reals: Vec<RealRecord>,
        ring: NonNull<RealRing>,
        timeouts: Timeouts,
        allowed_src: Option<NonNull<FrozenLpmTrieV4>>,
    ) -> Self {
        Self { id, flags, reals, ring, timeouts, allowed_src, prr_counter: AtomicU64::new(0) }
    }

    fn next_prr_value(&self) -> u64 {
        self.prr_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// # Safety
    /// `self.ring` must still point into live arena storage.
    unsafe fn select_from_ring(&self, selector: u64) -> Option<u32> {
        let registry_idx = unsafe { self.ring.as_ref().get(selector) };
        if registry_idx == RING_INVALID {
            return None;
        }
        self.reals.get(registry_idx as usize).filter(|r| r.enabled()).map(|r| r.real_id)
    }
}

/// A parsed packet's fields relevant to balancing. Header/payload bytes
/// themselves stay with the caller.
pub struct PacketMeta {
    pub transport_proto: u8,
    pub tcp_flags: u8,
    pub is_ipv6: bool,
    pub src_addr: NetAddr6,
    pub dst_addr: NetAddr6,
    pub src_port: u16,
    pub dst_port: u16,
    pub byte_len: u64,
    /// Source selector for a one-shot (OPS, overflow fallback) ring pick,
    /// independent of the session table.
    pub flow_hash: u64,
}

/// What the caller must still do to the packet on the wire. Named after
/// the VS flags that drive each decision, not after byte offsets -- this
/// module classifies the work, it does not perform it.
#[derive(Debug, Clone, Copy)]
pub struct EncapPlan {
    pub real_id: u32,
    pub wrap_gre: bool,
    pub clamp_mss: bool,
}

/// Picks a session timeout class the way `spec.md` §4.10 step 3 does: a
/// six-way dispatch on transport and TCP flag state, each with its own
/// configured timeout rather than one blanket value.
fn timeout_for(meta: &PacketMeta, vs: &VirtualService) -> u64 {
    match TransportProto::from_proto_number(meta.transport_proto) {
        TransportProto::Tcp => {
            let flags = meta.tcp_flags;
            if flags & (tcp_flags::FIN | tcp_flags::RST) != 0 {
                vs.timeouts.tcp_fin
            } else if flags & tcp_flags::SYN != 0 {
                if flags & tcp_flags::ACK != 0 {
                    vs.timeouts.tcp_syn_ack
                } else {
                    vs.timeouts.tcp_syn
                }
            } else {
                vs.timeouts.tcp
            }
        }
        TransportProto::Udp => vs.timeouts.udp,
        TransportProto::Other(_) => vs.timeouts.default,
    }
}

/// The reschedule rule (`spec.md` §8 invariant 5): a freshly created slot
/// may only be committed to a real for UDP, or for TCP with SYN set and RST
/// clear. Anything else (a non-SYN TCP packet with no prior session) must
/// not create one.
fn reschedule_allowed(transport: TransportProto, meta: &PacketMeta) -> bool {
    match transport {
        TransportProto::Udp => true,
        TransportProto::Tcp => {
            meta.tcp_flags & tcp_flags::SYN != 0 && meta.tcp_flags & tcp_flags::RST == 0
        }
        _ => false,
    }
}

/// Runs the packet path against an already-resolved `vs`. The VS lookup
/// itself (destination address/port -> `vs_id`) happens upstream via
/// `yanet_filter::query`; this function starts from step 2.
///
/// # Safety
/// `vs.ring` and, if present, `vs.allowed_src` must still point into live
/// arena storage.
pub unsafe fn handle_packet(
    vs: &VirtualService,
    table: &SessionTable,
    counters: &WorkerCounters,
    worker_idx: usize,
    now: u64,
    meta: &PacketMeta,
) -> Result<EncapPlan, PacketDrop> {
    // Step: source-allowed check.
    if let Some(trie) = vs.allowed_src {
        let key = meta.src_addr.to_octets();
        let v4_key = [key[12], key[13], key[14], key[15]];
        if unsafe { trie.as_ref().lookup(&v4_key) } == yanet_lpm::LPM_INVALID {
            WorkerCounters::bump(&counters.packet_src_not_allowed);
            return Err(PacketDrop::SourceNotAllowed);
        }
    }

    // Step: transport check, unless the VS only ever balances on L3.
    let transport = TransportProto::from_proto_number(meta.transport_proto);
    if !vs.flags.contains(VsFlags::PURE_L3) && !transport.is_tcp_or_udp() {
        WorkerCounters::bump(&counters.invalid_packet);
        return Err(PacketDrop::UnsupportedTransport);
    }

    // Step: real selection.
    let real_id = if vs.flags.contains(VsFlags::OPS) {
        let selector = if vs.flags.contains(VsFlags::PRR) { vs.next_prr_value() } else { meta.flow_hash };
        unsafe { vs.select_from_ring(selector) }.ok_or_else(|| {
            WorkerCounters::bump(&counters.no_reals);
            PacketDrop::NoRealAvailable
        })?
    } else {
        let session_id = SessionId::new(
            transport,
            meta.is_ipv6,
            meta.src_addr,
            meta.dst_addr,
            meta.src_port,
            meta.dst_port,
            vs.flags.contains(VsFlags::PURE_L3),
        );
        let timeout = timeout_for(meta, vs);
        match table.get_or_create(worker_idx, now, timeout, session_id) {
            Ok(mut handle) => {
                match handle.status {
                    GetOrCreateStatus::Found => {
                        let sticky = handle.state().real_id;
                        match vs.reals.iter().find(|r| r.real_id == sticky) {
                            Some(r) if r.enabled() => sticky,
                            _ => {
                                // Real is gone or disabled: fall through to the
                                // same reselection gate a fresh create uses
                                // (`spec.md` §4.10 step 4: "fall through to
                                // reselection") -- a non-SYN TCP packet still
                                // may not claim a new real just because its old
                                // one vanished.
                                WorkerCounters::bump(&counters.real_disabled);
                                if !reschedule_allowed(transport, meta) {
                                    drop(handle);
                                    WorkerCounters::bump(&counters.packet_not_rescheduled);
                                    return Err(PacketDrop::NotRescheduled);
                                }
                                let selector =
                                    if vs.flags.contains(VsFlags::PRR) { vs.next_prr_value() } else { meta.flow_hash };
                                match unsafe { vs.select_from_ring(selector) } {
                                    Some(new_real) => {
                                        handle.state_mut().real_id = new_real;
                                        new_real
                                    }
                                    None => {
                                        drop(handle);
                                        WorkerCounters::bump(&counters.no_reals);
                                        return Err(PacketDrop::NoRealAvailable);
                                    }
                                }
                            }
                        }
                    }
                    GetOrCreateStatus::Created => {
                        if !reschedule_allowed(transport, meta) {
                            SessionTable::remove(&mut handle);
                            drop(handle);
                            WorkerCounters::bump(&counters.packet_not_rescheduled);
                            return Err(PacketDrop::NotRescheduled);
                        }
                        let selector = if vs.flags.contains(VsFlags::PRR) { vs.next_prr_value() } else { meta.flow_hash };
                        match unsafe { vs.select_from_ring(selector) } {
                            Some(new_real) => {
                                handle.state_mut().real_id = new_real;
                                new_real
                            }
                            None => {
                                SessionTable::remove(&mut handle);
                                drop(handle);
                                WorkerCounters::bump(&counters.no_reals);
                                return Err(PacketDrop::NoRealAvailable);
                            }
                        }
                    }
                    GetOrCreateStatus::Overflow => unreachable!("handled via Err branch below"),
                }
            }
            Err(GetOrCreateStatus::Overflow) => {
                WorkerCounters::bump(&counters.session_table_overflow);
                return Err(PacketDrop::SessionTableOverflow);
            }
            Err(_) => unreachable!("get_or_create only fails with Overflow"),
        }
    };

    Ok(EncapPlan {
        real_id,
        wrap_gre: vs.flags.contains(VsFlags::GRE),
        clamp_mss: vs.flags.contains(VsFlags::FIX_MSS) && meta.is_ipv6,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use yanet_arena::Arena;

    fn test_timeouts() -> Timeouts {
        Timeouts { tcp_syn: 30, tcp_syn_ack: 30, tcp_fin: 2, tcp: 30, udp: 30, default: 30 }
    }

    fn make_vs(arena: &Arena, flags: VsFlags, reals: Vec<(u32, u16)>) -> VirtualService {
        let records: Vec<RealRecord> = reals
            .iter()
            .map(|&(id, _)| RealRecord { real_id: id, flags: RealFlags::empty(), endpoint: NetAddr6::NULL })
            .collect();
        let ring = RealRing::build(arena, &reals.iter().enumerate().map(|(i, &(_, w))| (i as u32, w)).collect::<Vec<_>>())
            .unwrap();
        VirtualService::new(1, flags, records, ring, test_timeouts(), None)
    }

    fn meta() -> PacketMeta {
        PacketMeta {
            transport_proto: yanet_abi::attr::proto_ids::TCP,
            tcp_flags: 0,
            is_ipv6: false,
            src_addr: NetAddr6::NULL,
            dst_addr: NetAddr6::NULL,
            src_port: 1234,
            dst_port: 80,
            byte_len: 60,
            flow_hash: 7,
        }
    }

    #[test]
    fn ops_vs_never_touches_the_session_table() {
        let arena = Arena::new(1 << 20);
        let vs = make_vs(&arena, VsFlags::OPS, vec![(10, 1)]);
        let table = unsafe { SessionTable::build_in_arena(&arena, 16, 1).unwrap().as_ref() };
        let counters = WorkerCounters::new();
        let plan = unsafe { handle_packet(&vs, &table, &counters, 0, 0, &meta()) }.unwrap();
        assert_eq!(plan.real_id, 10);
    }

    #[test]
    fn sticky_vs_reuses_the_same_real_on_second_packet() {
        let arena = Arena::new(1 << 20);
        let vs = make_vs(&arena, VsFlags::empty(), vec![(10, 1), (11, 1)]);
        let table = unsafe { SessionTable::build_in_arena(&arena, 16, 1).unwrap().as_ref() };
        let counters = WorkerCounters::new();
        let p1 = unsafe { handle_packet(&vs, &table, &counters, 0, 0, &meta()) }.unwrap();
        let p2 = unsafe { handle_packet(&vs, &table, &counters, 0, 1, &meta()) }.unwrap();
        assert_eq!(p1.real_id, p2.real_id);
    }

    #[test]
    fn no_reals_drops_the_packet() {
        let arena = Arena::new(1 << 20);
        let vs = make_vs(&arena, VsFlags::OPS, vec![]);
        let table = unsafe { SessionTable::build_in_arena(&arena, 16, 1).unwrap().as_ref() };
        let counters = WorkerCounters::new();
        let err = unsafe { handle_packet(&vs, &table, &counters, 0, 0, &meta()) };
        assert!(matches!(err, Err(PacketDrop::NoRealAvailable)));
    }
}
