//! Weighted Least-Connections feedback controller (C11, `spec.md` §4.11):
//! periodically recomputes each WLC-flagged real's effective weight from
//! its observed share of active sessions, then hands the new weights to
//! [`crate::ring::RealRing::build`] for the control plane to publish.
//!
//! Grounded on `slopos-core`'s `scheduler::cfs::reweight` pass (recompute a
//! derived share from an observed load sample once per tick, clamp, move
//! on) -- same shape, different load signal and formula.

/// One real's weight and currently observed load, as input to a
/// recompute pass.
#[derive(Clone, Copy, Debug)]
pub struct RealSample {
    pub real_id: u32,
    pub weight: u16,
    pub active_sessions: u64,
}

/// Recomputes effective weights for a set of reals sharing one VS.
///
/// `power` tunes how aggressively an underloaded real's weight is raised
/// towards its fair share; `max_weight` bounds the result. A real with
/// `weight == 0` (administratively excluded) stays at zero.
///
/// Formula (`spec.md` §4.11):
/// `ratio_i = active_sessions_i * W / (weight_i * C)`,
/// `scale_i = max(1.0, power * (1 - ratio_i))`,
/// `new_weight_i = min(round(weight_i * scale_i), max_weight)`
/// where `W` is the sum of weights and `C` the sum of active sessions.
pub fn recompute_weights(samples: &[RealSample], power: f64, max_weight: u16) -> Vec<u16> {
    let total_weight: u64 = samples.iter().map(|s| s.weight as u64).sum();
    let total_sessions: u64 = samples.iter().map(|s| s.active_sessions).sum();

    // §4.11 step 3: "if weight_i == 0 or W == 0 or C < W, new weight equals
    // weight_i". W and C are totals, so an under-subscribed VS (fewer active
    // sessions than configured weight) skips rescaling entirely rather than
    // letting a momentarily idle real get boosted off a tiny sample.
    if total_weight == 0 || total_sessions < total_weight {
        return samples.iter().map(|s| s.weight).collect();
    }

    samples
        .iter()
        .map(|s| {
            if s.weight == 0 {
                return 0;
            }
            let ratio = (s.active_sessions as f64 * total_weight as f64) / (s.weight as f64 * total_sessions as f64);
            let scale = (power * (1.0 - ratio)).max(1.0);
            let new_weight = (s.weight as f64 * scale).round();
            new_weight.clamp(0.0, max_weight as f64) as u16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underloaded_real_gets_boosted_towards_its_fair_share() {
        let samples = [
            RealSample { real_id: 1, weight: 10, active_sessions: 1 },
            RealSample { real_id: 2, weight: 10, active_sessions: 19 },
        ];
        let weights = recompute_weights(&samples, 1.5, 100);
        assert!(weights[0] > 10, "underloaded real should be boosted, got {}", weights[0]);
    }

    #[test]
    fn matches_the_worked_example() {
        let samples = [
            RealSample { real_id: 1, weight: 100, active_sessions: 900 },
            RealSample { real_id: 2, weight: 100, active_sessions: 100 },
        ];
        let weights = recompute_weights(&samples, 10.0, 1024);
        assert_eq!(weights, vec![100, 800]);
    }

    #[test]
    fn zero_weight_real_stays_excluded() {
        let samples = [RealSample { real_id: 1, weight: 0, active_sessions: 0 }];
        let weights = recompute_weights(&samples, 1.5, 100);
        assert_eq!(weights[0], 0);
    }

    #[test]
    fn result_never_exceeds_max_weight() {
        let samples = [
            RealSample { real_id: 1, weight: 90, active_sessions: 0 },
            RealSample { real_id: 2, weight: 10, active_sessions: 100 },
        ];
        let weights = recompute_weights(&samples, 5.0, 100);
        assert!(weights.iter().all(|&w| w <= 100));
    }

    #[test]
    fn no_load_anywhere_leaves_weights_unchanged() {
        let samples = [RealSample { real_id: 1, weight: 7, active_sessions: 0 }];
        assert_eq!(recompute_weights(&samples, 2.0, 100), vec![7]);
    }
}
