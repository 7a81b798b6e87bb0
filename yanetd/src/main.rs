//! The dataplane process entry point.
//!
//! Wires the arena, one virtual service's filter + ring, a session table,
//! a control plane, a handful of worker threads draining a synthetic
//! packet queue, and a housekeeping tick — the same shape as
//! `SlopLabs-slopos`'s `kernel` binary assembling `slopos-core`'s
//! scheduler, its per-CPU run queues and a timer-driven tick into one
//! runnable image.
//! Real NIC I/O, the gRPC config plane and the CLI are out of scope
//! (`spec.md` §1); this binary exists to prove the core crates compose.

mod config;
mod timer;
mod worker;

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use yanet_abi::action::{Action, CategoryMask, Match};
use yanet_abi::attr::proto_ids;
use yanet_abi::{AttrKind, NetAddr6, RealFlags, VsFlags};
use yanet_arena::Arena;
use yanet_balancer::{RealRecord, RealRing, SessionTable, VirtualService, WorkerCounters};
use yanet_control::{ConfigResult, ControlPlane, ModuleConfig};
use yanet_filter::{AttrValue, ProtoMatch, Rule, RuleAttributes};
use yanet_lib::{klog_info, klog_set_level, KlogLevel};

use config::{DataplaneConfig, StateConfig};
use timer::collect_tick;
use worker::{worker_loop, PacketQueue, RawPacket};

const DEMO_VS_ID: u32 = 1;
const DEMO_RULE_ID: u32 = 1;

/// Builds a one-VS demo config: any TCP packet to port 80 is load-balanced
/// across two reals, each `VsFlags::PRR` round-robin, no session stickiness.
fn build_demo_config(
    state: StateConfig,
) -> impl FnOnce(&Arena, NonNull<SessionTable>) -> ConfigResult<NonNull<ModuleConfig>> {
    move |arena, session_table| {
        let rules = vec![Rule {
            id: DEMO_RULE_ID,
            action: 0,
            attributes: RuleAttributes::new()
                .with(AttrKind::PortDst, vec![AttrValue::PortRange(80, 80)])
                .with(
                    AttrKind::Proto,
                    vec![AttrValue::Proto(ProtoMatch { proto_id: proto_ids::TCP, enable_bits: 0, disable_bits: 0, range: None })],
                ),
        }];
        let signature = [AttrKind::PortDst, AttrKind::Proto];

        let mut actions = HashMap::new();
        actions.insert(DEMO_RULE_ID, Action::encode(Match::Terminal(DEMO_VS_ID, CategoryMask::ALL)));

        let reals = vec![
            RealRecord { real_id: 10, flags: RealFlags::empty(), endpoint: NetAddr6::from_octets([0; 16]) },
            RealRecord { real_id: 11, flags: RealFlags::empty(), endpoint: NetAddr6::from_octets([0; 16]) },
        ];
        let ring_input: Vec<(u32, u16)> =
            reals.iter().enumerate().map(|(idx, r)| (idx as u32, if r.enabled() { 1 } else { 0 })).collect();
        let ring = RealRing::build(arena, &ring_input).expect("arena has room for the demo ring");

        let vs = VirtualService::new(DEMO_VS_ID, VsFlags::PRR, reals, ring, state.timeouts.into(), None);
        let mut virtual_services = HashMap::new();
        virtual_services.insert(DEMO_VS_ID, vs);

        ModuleConfig::build_in_arena(
            arena,
            &rules,
            &signature,
            &signature,
            actions,
            virtual_services,
            None,
            None,
            session_table,
        )
    }
}

fn demo_packets() -> Vec<RawPacket> {
    (0u32..32)
        .map(|i| RawPacket {
            is_ipv6: false,
            net4_src: Some([10, 0, 0, (i % 250) as u8 + 1]),
            net4_dst: Some([10, 0, 0, 254]),
            net6_src: None,
            net6_dst: None,
            port_src: Some(20000 + (i as u16 % 4000)),
            port_dst: Some(80),
            proto_id: Some(proto_ids::TCP),
            tcp_flags: Some(0x02), // SYN
            vlan: None,
            device: None,
            byte_len: 64,
        })
        .collect()
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

fn main() {
    klog_set_level(KlogLevel::Info);
    let cfg = DataplaneConfig::from_env();
    klog_info!("starting with {} workers, {} byte arena", cfg.worker_count, cfg.arena_bytes);

    // The control plane owns the arena for the process lifetime -- every
    // `VirtualService`'s ring and the session table live in it, the same
    // as `kernel`'s boot-time page tables are never individually freed
    // before shutdown.
    let control_plane = ControlPlane::new(
        cfg.arena_bytes,
        cfg.state.session_table_capacity,
        cfg.worker_count,
        build_demo_config(cfg.state),
    )
    .expect("demo config builds in a freshly allocated arena");
    let counters = Arc::new(WorkerCounters::new());
    let queue = Arc::new(PacketQueue::new(demo_packets()));

    let mut handles = Vec::with_capacity(cfg.worker_count);
    for worker_idx in 0..cfg.worker_count {
        let control_plane = Arc::clone(&control_plane);
        let counters = Arc::clone(&counters);
        let queue = Arc::clone(&queue);
        handles.push(thread::spawn(move || {
            // SAFETY: `control_plane`'s arena outlives every worker thread
            // joined below, so every VS's ring stays mapped for as long as
            // any worker can observe it.
            unsafe { worker_loop(worker_idx, &control_plane, &counters, &queue, now_secs) }
        }));
    }

    let mut delivered = 0u64;
    let mut dropped = 0u64;
    for handle in handles {
        let outcome = handle.join().expect("worker thread does not panic");
        delivered += outcome.delivered;
        dropped += outcome.dropped;
    }

    collect_tick(&control_plane);
    thread::sleep(Duration::from_millis(1));

    let snapshot = counters.snapshot();
    klog_info!(
        "drained queue: delivered={delivered} dropped={dropped} invalid_packet={}",
        snapshot.invalid_packet
    );
}
