//! Minimal ambient config surface for the dataplane process.
//!
//! `spec.md` §1 puts the YAML/gRPC config plane out of scope, and §6 only
//! lists the wire shape of the state config a manager would send
//! (`session_table_capacity`, `session_table_max_load_factor`,
//! `refresh_period`, `wlc:{power, max_weight}`). A process still has to
//! start up with *something*, though, so this is the minimal equivalent of
//! `kernel/src/main.rs`'s compiled-in boot constants: a handful of `YANET_*`
//! environment variables read once at startup, each with a sane default,
//! grounded the same way `logannye-tinyzkp`'s API binary reads its own
//! `TINYZKP_*`/`SSZKP_*` vars with a parse-or-default fallback rather than
//! a config-file parser.

use std::time::Duration;

/// §4.10 step 3's per-class idle timeouts, read in from the same env-var
/// surface as the rest of [`StateConfig`] rather than hardcoded the way
/// the demo config used to carry a single `session_timeout`.
#[derive(Clone, Copy, Debug)]
pub struct TimeoutConfig {
    pub tcp_syn: u64,
    pub tcp_syn_ack: u64,
    pub tcp_fin: u64,
    pub tcp: u64,
    pub udp: u64,
    pub default: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { tcp_syn: 30, tcp_syn_ack: 30, tcp_fin: 2, tcp: 120, udp: 30, default: 30 }
    }
}

impl From<TimeoutConfig> for yanet_balancer::Timeouts {
    fn from(t: TimeoutConfig) -> Self {
        yanet_balancer::Timeouts {
            tcp_syn: t.tcp_syn,
            tcp_syn_ack: t.tcp_syn_ack,
            tcp_fin: t.tcp_fin,
            tcp: t.tcp,
            udp: t.udp,
            default: t.default,
        }
    }
}

/// §6 "a state config" verbatim, plus the worker/arena sizing a manager
/// never sends because it governs the process itself, not a module.
#[derive(Clone, Copy, Debug)]
pub struct StateConfig {
    pub session_table_capacity: usize,
    pub session_table_max_load_factor: f64,
    pub refresh_period: Duration,
    pub wlc_power: f64,
    pub wlc_max_weight: u16,
    pub timeouts: TimeoutConfig,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            session_table_capacity: 1 << 16,
            session_table_max_load_factor: 0.75,
            refresh_period: Duration::from_secs(1),
            wlc_power: 4.0,
            wlc_max_weight: 1024,
            timeouts: TimeoutConfig::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DataplaneConfig {
    pub worker_count: usize,
    pub arena_bytes: usize,
    pub state: StateConfig,
}

impl Default for DataplaneConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            arena_bytes: 64 << 20,
            state: StateConfig::default(),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl DataplaneConfig {
    /// Reads `YANET_WORKERS`, `YANET_ARENA_BYTES`, `YANET_SESSION_CAPACITY`,
    /// `YANET_SESSION_LOAD_FACTOR`, `YANET_REFRESH_PERIOD_SECS`,
    /// `YANET_WLC_POWER`, `YANET_WLC_MAX_WEIGHT`, `YANET_TIMEOUT_TCP_SYN`,
    /// `YANET_TIMEOUT_TCP_SYN_ACK`, `YANET_TIMEOUT_TCP_FIN`,
    /// `YANET_TIMEOUT_TCP`, `YANET_TIMEOUT_UDP`, `YANET_TIMEOUT_DEFAULT`,
    /// falling back to [`Default::default`] for anything unset or
    /// unparsable.
    pub fn from_env() -> Self {
        let default = Self::default();
        let refresh_secs = env_parsed("YANET_REFRESH_PERIOD_SECS", default.state.refresh_period.as_secs());
        Self {
            worker_count: env_parsed("YANET_WORKERS", default.worker_count).max(1),
            arena_bytes: env_parsed("YANET_ARENA_BYTES", default.arena_bytes),
            state: StateConfig {
                session_table_capacity: env_parsed(
                    "YANET_SESSION_CAPACITY",
                    default.state.session_table_capacity,
                ),
                session_table_max_load_factor: env_parsed(
                    "YANET_SESSION_LOAD_FACTOR",
                    default.state.session_table_max_load_factor,
                ),
                refresh_period: Duration::from_secs(refresh_secs),
                wlc_power: env_parsed("YANET_WLC_POWER", default.state.wlc_power),
                wlc_max_weight: env_parsed("YANET_WLC_MAX_WEIGHT", default.state.wlc_max_weight),
                timeouts: TimeoutConfig {
                    tcp_syn: env_parsed("YANET_TIMEOUT_TCP_SYN", default.state.timeouts.tcp_syn),
                    tcp_syn_ack: env_parsed("YANET_TIMEOUT_TCP_SYN_ACK", default.state.timeouts.tcp_syn_ack),
                    tcp_fin: env_parsed("YANET_TIMEOUT_TCP_FIN", default.state.timeouts.tcp_fin),
                    tcp: env_parsed("YANET_TIMEOUT_TCP", default.state.timeouts.tcp),
                    udp: env_parsed("YANET_TIMEOUT_UDP", default.state.timeouts.udp),
                    default: env_parsed("YANET_TIMEOUT_DEFAULT", default.state.timeouts.default),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let cfg = DataplaneConfig::default();
        assert!(cfg.worker_count >= 1);
        assert!(cfg.state.session_table_max_load_factor > 0.0);
    }

    #[test]
    fn unset_env_vars_fall_back_to_defaults() {
        // Use a name that's vanishingly unlikely to be set in a test runner.
        let value: usize = env_parsed("YANET_DOES_NOT_EXIST_IN_ANY_ENV", 42);
        assert_eq!(value, 42);
    }
}
