//! A minimal worker harness (`SPEC_FULL.md`, "ambient stack: a minimal
//! worker harness"): drives synthetic packets through the balancer core in
//! a loop reading from an in-process queue. Real DPDK-style packet I/O is
//! out of scope (`spec.md` §1); this module exists only to give
//! [`yanet_balancer::packet_path::handle_packet`] a caller with the right
//! shape — pop a parsed packet, run the pipeline, record the outcome —
//! the same way `SlopLabs-slopos`'s `kernel` binary wires `slopos-core`
//! scheduling into a runnable image without containing the hardware
//! drivers itself (those live in the separate, thin `slopos-drivers`).

use std::collections::VecDeque;
use std::sync::Mutex;

use yanet_abi::session::TransportProto;
use yanet_abi::{NetAddr6, SessionId};
use yanet_balancer::{handle_packet, PacketMeta, WorkerCounters};
use yanet_control::ControlPlane;
use yanet_filter::PacketAttrs;

/// One synthetic packet: owns its fields so it can be queued and popped
/// across threads, unlike [`PacketAttrs`]/[`PacketMeta`] which borrow or
/// are built fresh per lookup.
#[derive(Clone, Debug)]
pub struct RawPacket {
    pub is_ipv6: bool,
    pub net4_src: Option<[u8; 4]>,
    pub net4_dst: Option<[u8; 4]>,
    pub net6_src: Option<[u8; 16]>,
    pub net6_dst: Option<[u8; 16]>,
    pub port_src: Option<u16>,
    pub port_dst: Option<u16>,
    pub proto_id: Option<u8>,
    pub tcp_flags: Option<u8>,
    pub vlan: Option<u16>,
    pub device: Option<String>,
    pub byte_len: u64,
}

impl RawPacket {
    fn widen_v4(octets: [u8; 4]) -> NetAddr6 {
        let mut buf = [0u8; 16];
        buf[12..16].copy_from_slice(&octets);
        NetAddr6::from_octets(buf)
    }

    /// Fields a filter query needs (`yanet_filter::query`'s `PacketAttrs`).
    pub fn attrs(&self) -> PacketAttrs<'_> {
        PacketAttrs {
            net4_src: self.net4_src,
            net4_dst: self.net4_dst,
            net6_src: self.net6_src,
            net6_dst: self.net6_dst,
            port_src: self.port_src,
            port_dst: self.port_dst,
            proto_id: self.proto_id,
            tcp_flags: self.tcp_flags,
            vlan: self.vlan,
            device: self.device.as_deref(),
        }
    }

    fn addrs(&self) -> (NetAddr6, NetAddr6) {
        if self.is_ipv6 {
            (
                self.net6_src.map(NetAddr6::from_octets).unwrap_or(NetAddr6::NULL),
                self.net6_dst.map(NetAddr6::from_octets).unwrap_or(NetAddr6::NULL),
            )
        } else {
            (
                self.net4_src.map(Self::widen_v4).unwrap_or(NetAddr6::NULL),
                self.net4_dst.map(Self::widen_v4).unwrap_or(NetAddr6::NULL),
            )
        }
    }

    /// The selector used for ring indexing and session-table bucket probing
    /// (`spec.md` §4.8: "packet hash (5-tuple)").
    pub fn flow_hash(&self) -> u64 {
        let (src, dst) = self.addrs();
        let transport = TransportProto::from_proto_number(self.proto_id.unwrap_or(0));
        SessionId::new(transport, self.is_ipv6, src, dst, self.port_src.unwrap_or(0), self.port_dst.unwrap_or(0), false).hash64()
    }

    /// Fields the balancer packet path needs (`yanet_balancer::PacketMeta`).
    pub fn meta(&self) -> PacketMeta {
        let (src_addr, dst_addr) = self.addrs();
        PacketMeta {
            transport_proto: self.proto_id.unwrap_or(0),
            tcp_flags: self.tcp_flags.unwrap_or(0),
            is_ipv6: self.is_ipv6,
            src_addr,
            dst_addr,
            src_port: self.port_src.unwrap_or(0),
            dst_port: self.port_dst.unwrap_or(0),
            byte_len: self.byte_len,
            flow_hash: self.flow_hash(),
        }
    }
}

/// A `Mutex<VecDeque<_>>`-backed replay queue, shared by every worker.
/// Stands in for the DPDK RX ring the real dataplane reads from.
pub struct PacketQueue {
    inner: Mutex<VecDeque<RawPacket>>,
}

impl PacketQueue {
    pub fn new(packets: impl IntoIterator<Item = RawPacket>) -> Self {
        Self { inner: Mutex::new(packets.into_iter().collect()) }
    }

    pub fn pop(&self) -> Option<RawPacket> {
        self.inner.lock().unwrap().pop_front()
    }

    pub fn push(&self, packet: RawPacket) {
        self.inner.lock().unwrap().push_back(packet);
    }
}

/// Per-worker-run tallies, reported once the queue drains.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerOutcome {
    pub delivered: u64,
    pub dropped: u64,
}

/// Drains `queue` until empty, running every packet through the full VS
/// lookup + balancer pipeline (`spec.md` §4.10 steps 1-4; the encap rewrite
/// of step 5 is the caller's concern beyond this harness, per
/// `yanet_balancer::packet_path`'s module doc).
///
/// # Safety
/// Every `VirtualService` reachable from `control_plane.current()` must
/// have a `ring` pointing into still-mapped arena storage.
pub unsafe fn worker_loop(
    worker_idx: usize,
    control_plane: &ControlPlane,
    counters: &WorkerCounters,
    queue: &PacketQueue,
    now: impl Fn() -> u64,
) -> WorkerOutcome {
    let mut outcome = WorkerOutcome::default();
    while let Some(packet) = queue.pop() {
        let config = control_plane.current();
        let attrs = packet.attrs();
        let Some(vs_id) = config.lookup_vs(packet.is_ipv6, &attrs) else {
            outcome.dropped += 1;
            WorkerCounters::bump(&counters.invalid_packet);
            continue;
        };
        let Some(vs) = config.virtual_service(vs_id) else {
            outcome.dropped += 1;
            WorkerCounters::bump(&counters.invalid_packet);
            continue;
        };
        let meta = packet.meta();
        let now = now();
        match unsafe { handle_packet(vs, control_plane.session_table(), counters, worker_idx, now, &meta) } {
            Ok(_plan) => outcome.delivered += 1,
            Err(_drop) => outcome.dropped += 1,
        }
    }
    outcome
}
