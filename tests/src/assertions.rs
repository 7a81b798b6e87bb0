//! Assertion helpers returning [`TestOutcome`], ported from
//! `slopos-lib::testing::assertions`'s early-return macros to plain
//! functions -- std already has `panic`-based `assert!`/`assert_eq!` for
//! in-crate unit tests, so these exist only for the closure-based
//! [`crate::harness::TestCase`] style used by cross-crate scenario tests,
//! where returning a `TestOutcome::Fail` reads better than a panic.

use crate::harness::TestOutcome;

pub fn assert_eq_hex<T: Eq + std::fmt::LowerHex>(left: T, right: T, msg: &str) -> TestOutcome {
    if left == right {
        TestOutcome::Pass
    } else {
        TestOutcome::Fail(format!("{msg}: expected {right:#x}, got {left:#x}"))
    }
}

pub fn assert_close(left: f64, right: f64, epsilon: f64, msg: &str) -> TestOutcome {
    if (left - right).abs() <= epsilon {
        TestOutcome::Pass
    } else {
        TestOutcome::Fail(format!("{msg}: expected {right} within {epsilon}, got {left}"))
    }
}

pub fn assert_true(cond: bool, msg: &str) -> TestOutcome {
    if cond {
        TestOutcome::Pass
    } else {
        TestOutcome::Fail(msg.to_string())
    }
}
