//! Structured logging, ported from `slopos-lib::klog`.
//!
//! `slopos-lib::klog` funnels every kernel log line through a single
//! **backend** function pointer: before the serial driver is up it writes
//! raw bytes to COM1; once the driver registers itself, output goes
//! through its `IrqMutex`-guarded path instead. This module keeps that
//! shape exactly — a swappable backend plus a level filter — but the
//! default (and normal) backend is `stderr`, since there is no boot
//! sequence to race against in a userspace process. A test harness or a
//! file-sink daemon mode can still register a different backend the same
//! way the serial driver does.
//!
//! # Backend contract
//!
//! The backend receives the already-formatted line (level prefix included)
//! and must write it atomically with a trailing newline; see
//! [`klog_register_backend`].

use core::fmt;
use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum KlogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl KlogLevel {
    fn as_str(self) -> &'static str {
        match self {
            KlogLevel::Error => "ERROR",
            KlogLevel::Warn => "WARN",
            KlogLevel::Info => "INFO",
            KlogLevel::Debug => "DEBUG",
            KlogLevel::Trace => "TRACE",
        }
    }
}

static CURRENT_LEVEL: AtomicU8 = AtomicU8::new(KlogLevel::Info as u8);

/// Raise or lower the minimum level that actually gets written. Lines below
/// this level are dropped before formatting cost is paid.
pub fn klog_set_level(level: KlogLevel) {
    CURRENT_LEVEL.store(level as u8, Ordering::Relaxed);
}

fn stderr_backend(level: KlogLevel, args: fmt::Arguments<'_>) {
    use std::io::Write;
    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "[{}] {}", level.as_str(), args);
}

type BackendFn = fn(KlogLevel, fmt::Arguments<'_>);

// Stored as a `usize` so it can live in an `AtomicUsize`; transmuting a
// function pointer through a pointer-sized integer is the same trick
// `slopos-lib::klog` uses with `AtomicPtr` for its backend slot, just
// without needing an `AtomicPtr<()>` cast dance for a non-pointer fn type.
static BACKEND: AtomicUsize = AtomicUsize::new(stderr_backend as usize);

/// Swap the log backend (e.g. to write to a file instead of stderr).
/// Concurrent calls race harmlessly to last-write-wins, matching
/// `slopos-lib::klog`'s single-writer-in-practice assumption for driver
/// registration.
pub fn klog_register_backend(backend: BackendFn) {
    BACKEND.store(backend as usize, Ordering::Release);
}

/// Restore the default stderr backend (used by tests to undo a prior swap).
pub fn klog_reset_backend() {
    BACKEND.store(stderr_backend as usize, Ordering::Release);
}

#[doc(hidden)]
pub fn klog_line(level: KlogLevel, args: fmt::Arguments<'_>) {
    if (level as u8) > CURRENT_LEVEL.load(Ordering::Relaxed) {
        return;
    }
    let backend_addr = BACKEND.load(Ordering::Acquire);
    // SAFETY: `backend_addr` only ever holds a value stored by
    // `klog_register_backend`/the initializer above, both of which store a
    // valid `BackendFn`.
    let backend: BackendFn = unsafe { core::mem::transmute(backend_addr) };
    backend(level, args);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static CAPTURE: Mutex<Vec<String>> = Mutex::new(Vec::new());

    fn capturing_backend(level: KlogLevel, args: fmt::Arguments<'_>) {
        CAPTURE
            .lock()
            .unwrap()
            .push(format!("[{}] {}", level.as_str(), args));
    }

    #[test]
    fn level_filter_drops_below_threshold() {
        CAPTURE.lock().unwrap().clear();
        klog_register_backend(capturing_backend);
        klog_set_level(KlogLevel::Warn);
        crate::klog_info!("should be dropped");
        crate::klog_error!("should appear");
        let lines = CAPTURE.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("should appear"));
        klog_set_level(KlogLevel::Info);
        klog_reset_backend();
    }
}
