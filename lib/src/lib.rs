//! Ambient substrate shared by every YANET crate: logging, locking,
//! one-time initialization, deterministic randomness, and alignment
//! helpers. Nothing here is dataplane-specific; it is the userspace
//! equivalent of `slopos-lib`.

pub mod alignment;
pub mod klog;
pub mod once_lock;
pub mod rng;
pub mod spinlock;

pub use klog::{klog_set_level, KlogLevel};
pub use once_lock::OnceLock;
pub use rng::Xorshift64;
pub use spinlock::SpinLock;

#[macro_export]
macro_rules! klog_error {
    ($($arg:tt)*) => { $crate::klog::klog_line($crate::klog::KlogLevel::Error, format_args!($($arg)*)) };
}
#[macro_export]
macro_rules! klog_warn {
    ($($arg:tt)*) => { $crate::klog::klog_line($crate::klog::KlogLevel::Warn, format_args!($($arg)*)) };
}
#[macro_export]
macro_rules! klog_info {
    ($($arg:tt)*) => { $crate::klog::klog_line($crate::klog::KlogLevel::Info, format_args!($($arg)*)) };
}
#[macro_export]
macro_rules! klog_debug {
    ($($arg:tt)*) => { $crate::klog::klog_line($crate::klog::KlogLevel::Debug, format_args!($($arg)*)) };
}
#[macro_export]
macro_rules! klog_trace {
    ($($arg:tt)*) => { $crate::klog::klog_line($crate::klog::KlogLevel::Trace, format_args!($($arg)*)) };
}
