//! Cross-crate scenario coverage for the balancer core (`spec.md` §8
//! S4-S6): OPS one-packet-scheduling, source-hash stickiness across a
//! real going disabled, and the WLC worked example. Lives under `tests/`
//! the same way `yanet-filter/tests/scenarios.rs` does, separate from
//! each module's own `#[cfg(test)]` unit coverage.

use yanet_abi::{NetAddr6, RealFlags, VsFlags};
use yanet_arena::Arena;
use yanet_balancer::{
    handle_packet, recompute_weights, PacketDrop, PacketMeta, RealRecord, RealRing, RealSample, SessionTable,
    VirtualService, WorkerCounters,
};
use yanet_tests::{run_suite, TestCase, TestOutcome};

fn test_timeouts() -> yanet_balancer::Timeouts {
    yanet_balancer::Timeouts { tcp_syn: 30, tcp_syn_ack: 30, tcp_fin: 2, tcp: 30, udp: 30, default: 30 }
}

fn meta_with(src_port: u16, tcp_flags: u8, flow_hash: u64) -> PacketMeta {
    PacketMeta {
        transport_proto: yanet_abi::attr::proto_ids::TCP,
        tcp_flags,
        is_ipv6: false,
        src_addr: NetAddr6::NULL,
        dst_addr: NetAddr6::NULL,
        src_port,
        dst_port: 80,
        byte_len: 60,
        flow_hash,
    }
}

fn ops_vs_picks_reals_by_prr_counter_with_no_session_state() -> TestOutcome {
    let arena = Arena::new(1 << 20);
    // Weights 1,2: ring has three slots total, one for real 10 and two for
    // real 11.
    let reals = vec![
        RealRecord { real_id: 10, flags: RealFlags::empty(), endpoint: NetAddr6::NULL },
        RealRecord { real_id: 11, flags: RealFlags::empty(), endpoint: NetAddr6::NULL },
    ];
    let ring = RealRing::build(&arena, &[(0, 1), (1, 2)]).unwrap();
    let vs = VirtualService::new(1, VsFlags::OPS | VsFlags::PRR, reals, ring, test_timeouts(), None);
    let table = unsafe { SessionTable::build_in_arena(&arena, 16, 1).unwrap().as_ref() };
    let counters = WorkerCounters::new();

    // Three consecutive packets on the same 5-tuple still each consult the
    // PRR counter (0, 1, 2) rather than the session table -- OPS means no
    // sticky state is ever created.
    let mut seen = Vec::new();
    for _ in 0..3 {
        let plan = match unsafe { handle_packet(&vs, &table, &counters, 0, 0, &meta_with(1000, 0, 42)) } {
            Ok(plan) => plan,
            Err(e) => return TestOutcome::Fail(format!("unexpected drop: {e}")),
        };
        seen.push(plan.real_id);
    }
    if seen.len() != 3 {
        return TestOutcome::Fail(format!("expected 3 selections, got {}", seen.len()));
    }
    // No session ever got created: a fresh lookup against the (otherwise
    // untouched) table must still report `Created`, not `Found`.
    let probe_id = yanet_abi::SessionId::new(
        yanet_abi::session::TransportProto::Tcp,
        false,
        NetAddr6::NULL,
        NetAddr6::NULL,
        1000,
        80,
        false,
    );
    let status = table.get_or_create(0, 0, 30, probe_id).map(|h| h.status);
    if status != Ok(yanet_balancer::GetOrCreateStatus::Created) {
        return TestOutcome::Fail(format!("OPS path left a session behind: {status:?}"));
    }
    TestOutcome::Pass
}

fn source_hash_vs_stays_sticky_then_reschedules_once_the_real_is_disabled() -> TestOutcome {
    let arena = Arena::new(1 << 20);
    let mut reals = vec![
        RealRecord { real_id: 10, flags: RealFlags::empty(), endpoint: NetAddr6::NULL },
        RealRecord { real_id: 11, flags: RealFlags::empty(), endpoint: NetAddr6::NULL },
    ];
    let ring = RealRing::build(&arena, &[(0, 1), (1, 1)]).unwrap();
    let vs = VirtualService::new(1, VsFlags::empty(), reals.clone(), ring, test_timeouts(), None);
    let table = unsafe { SessionTable::build_in_arena(&arena, 16, 1).unwrap().as_ref() };
    let counters = WorkerCounters::new();

    // Packet 1: SYN opens a session and picks a real.
    let syn = meta_with(2000, yanet_abi::session::tcp_flags::SYN, 7);
    let p1 = match unsafe { handle_packet(&vs, &table, &counters, 0, 0, &syn) } {
        Ok(plan) => plan,
        Err(e) => return TestOutcome::Fail(format!("SYN packet dropped: {e}")),
    };

    // Packet 2: same 5-tuple, ACK only -- must land on the same real.
    let ack = meta_with(2000, yanet_abi::session::tcp_flags::ACK, 7);
    let p2 = match unsafe { handle_packet(&vs, &table, &counters, 0, 1, &ack) } {
        Ok(plan) => plan,
        Err(e) => return TestOutcome::Fail(format!("ACK packet dropped: {e}")),
    };
    if p1.real_id != p2.real_id {
        return TestOutcome::Fail(format!("session not sticky: {} != {}", p1.real_id, p2.real_id));
    }

    // Disable the chosen real, rebuild the ring over the remainder, and
    // send a new flow's SYN: it must land on the surviving real.
    let chosen_idx = reals.iter().position(|r| r.real_id == p1.real_id).unwrap();
    reals[chosen_idx].flags = RealFlags::DISABLED;
    let surviving_idx = 1 - chosen_idx;
    let new_ring = RealRing::build(&arena, &[(surviving_idx as u32, 1)]).unwrap();
    let vs_after = VirtualService::new(1, VsFlags::empty(), reals.clone(), new_ring, test_timeouts(), None);

    let syn2 = meta_with(3000, yanet_abi::session::tcp_flags::SYN, 99);
    let p3 = match unsafe { handle_packet(&vs_after, &table, &counters, 0, 2, &syn2) } {
        Ok(plan) => plan,
        Err(e) => return TestOutcome::Fail(format!("post-disable SYN dropped: {e}")),
    };
    if p3.real_id != reals[surviving_idx].real_id {
        return TestOutcome::Fail(format!(
            "expected new flow to land on surviving real {}, got {}",
            reals[surviving_idx].real_id, p3.real_id
        ));
    }

    // The old flow's next packet (a bare ACK, no SYN) finds its session,
    // sees the real is now disabled, and since ACK-only is not a
    // reschedule-allowed packet, must be dropped.
    let ack2 = meta_with(2000, yanet_abi::session::tcp_flags::ACK, 7);
    let result = unsafe { handle_packet(&vs_after, &table, &counters, 0, 3, &ack2) };
    if !matches!(result, Err(PacketDrop::NotRescheduled)) {
        return TestOutcome::Fail(format!("expected the stale ACK to be dropped, got {result:?}"));
    }

    TestOutcome::Pass
}

fn wlc_worked_example_matches_spec_s6() -> TestOutcome {
    let samples = [
        RealSample { real_id: 1, weight: 100, active_sessions: 900 },
        RealSample { real_id: 2, weight: 100, active_sessions: 100 },
    ];
    let weights = recompute_weights(&samples, 10.0, 1024);
    if weights != [100, 800] {
        return TestOutcome::Fail(format!("expected [100, 800], got {weights:?}"));
    }
    TestOutcome::Pass
}

fn wlc_skips_rescaling_when_vs_is_under_subscribed() -> TestOutcome {
    // W=200, C=2 < W: every enabled real's weight must come back unchanged
    // even though one real has far more headroom than the other.
    let samples = [
        RealSample { real_id: 1, weight: 190, active_sessions: 0 },
        RealSample { real_id: 2, weight: 10, active_sessions: 2 },
    ];
    let weights = recompute_weights(&samples, 10.0, 1024);
    if weights != [190, 10] {
        return TestOutcome::Fail(format!("expected weights unchanged at [190, 10], got {weights:?}"));
    }
    TestOutcome::Pass
}

#[test]
fn balancer_scenarios() {
    let cases = [
        TestCase { name: "ops_vs_picks_reals_by_prr_counter_with_no_session_state", run: ops_vs_picks_reals_by_prr_counter_with_no_session_state },
        TestCase {
            name: "source_hash_vs_stays_sticky_then_reschedules_once_the_real_is_disabled",
            run: source_hash_vs_stays_sticky_then_reschedules_once_the_real_is_disabled,
        },
        TestCase { name: "wlc_worked_example_matches_spec_s6", run: wlc_worked_example_matches_spec_s6 },
        TestCase { name: "wlc_skips_rescaling_when_vs_is_under_subscribed", run: wlc_skips_rescaling_when_vs_is_under_subscribed },
    ];
    let summary = run_suite("balancer_scenarios", &cases);
    assert!(summary.all_passed(), "{}/{} scenarios passed", summary.passed, summary.total);
}
