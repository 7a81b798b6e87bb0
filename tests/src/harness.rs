//! A small test-suite runner, ported from `slopos-lib::testing::harness`
//! (`TestSuiteResult`/`TestSuiteDesc`/`TestRunSummary`, auto-registered via
//! a linker section) to plain std: no linker-section registry (there is
//! no freestanding linker script here), a `Vec<TestCase>` built by the
//! caller instead, and `std::panic::catch_unwind` standing in for
//! `slopos-lib::testing`'s hardware exception handler turning a fault into
//! a failed case rather than a crashed test run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestCase {
    pub name: &'static str,
    pub run: fn() -> TestOutcome,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SuiteSummary {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub elapsed_ms: u64,
}

impl SuiteSummary {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Runs every case, catching panics so one case's failure does not abort
/// the run, and reports a summary the way `slopos-lib::testing`'s
/// `TestRunSummary` aggregates per-suite results.
pub fn run_suite(name: &str, cases: &[TestCase]) -> SuiteSummary {
    let start = Instant::now();
    let mut summary = SuiteSummary { total: cases.len() as u32, ..Default::default() };

    for case in cases {
        let outcome = match catch_unwind(AssertUnwindSafe(case.run)) {
            Ok(outcome) => outcome,
            Err(payload) => TestOutcome::Fail(panic_message(&payload)),
        };
        match outcome {
            TestOutcome::Pass => summary.passed += 1,
            TestOutcome::Fail(msg) => {
                summary.failed += 1;
                eprintln!("[{name}] FAIL {}: {msg}", case.name);
            }
        }
    }

    summary.elapsed_ms = start.elapsed().as_millis() as u64;
    summary
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
