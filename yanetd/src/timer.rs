//! Housekeeping tick, separate from the packet-path workers the same way
//! `slopos-core::sched` keeps its scheduler tick out of the interrupt
//! handlers it wakes.
//!
//! Two things need to happen on a cadence rather than per packet: freeing
//! a session-table generation once every worker has moved off it
//! (`spec.md` §4.9's quiescence protocol), and recomputing WLC weights
//! from each virtual service's observed load (§4.11). Gathering that load
//! — how many active sessions each real currently owns — is a telemetry
//! concern `spec.md` §1 puts out of scope, so this tick only drives the
//! part this workspace owns: given samples a caller already gathered, log
//! what the next weight vector would be. Actually rebuilding each VS's
//! ring and republishing a new `ModuleConfig` is `ControlPlane`'s job
//! (`control_plane::update_config`), already covered by its own tests;
//! wiring a full periodic republish loop is a manager-level concern this
//! harness doesn't attempt to reproduce.

use yanet_balancer::{recompute_weights, RealSample};
use yanet_control::ControlPlane;

/// One housekeeping pass: collects the quiescent session-table generation.
pub fn collect_tick(control_plane: &ControlPlane) {
    control_plane.collect_quiescent_generation();
}

/// Computes (without publishing) the next weight vector for one virtual
/// service's reals, given load samples a telemetry collector produced.
/// Returns `(real_id, old_weight, new_weight)` triples in `samples` order.
pub fn wlc_preview(samples: &[RealSample], power: f64, max_weight: u16) -> Vec<(u32, u16, u16)> {
    let new_weights = recompute_weights(samples, power, max_weight);
    samples
        .iter()
        .zip(new_weights)
        .map(|(sample, new_weight)| (sample.real_id, sample.weight, new_weight))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_keeps_weights_when_under_subscribed() {
        let samples = vec![
            RealSample { real_id: 1, weight: 100, active_sessions: 1 },
            RealSample { real_id: 2, weight: 100, active_sessions: 1 },
        ];
        let preview = wlc_preview(&samples, 4.0, 1024);
        assert_eq!(preview, vec![(1, 100, 100), (2, 100, 100)]);
    }
}
