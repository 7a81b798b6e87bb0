//! Shared test harness and assertion helpers used by cross-crate
//! scenario tests (`yanet-filter/tests/`, `yanet-balancer/tests/`).

pub mod assertions;
pub mod harness;

pub use assertions::{assert_close, assert_eq_hex, assert_true};
pub use harness::{run_suite, SuiteSummary, TestCase, TestOutcome};
