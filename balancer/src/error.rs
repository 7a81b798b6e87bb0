//! Error and drop-reason types for the balancer crate.

use core::fmt;

/// Why a packet never made it past the packet path (`spec.md` §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDrop {
    /// No VS matched this packet's destination.
    NoVirtualService,
    /// Source address/device did not satisfy the VS's `allowed_src` filter.
    SourceNotAllowed,
    /// Transport proto was neither TCP nor UDP and the VS is not `PURE_L3`.
    UnsupportedTransport,
    /// Session table was full and no real could be selected without one.
    SessionTableOverflow,
    /// Every real behind the VS is disabled or the ring is empty.
    NoRealAvailable,
    /// A non-SYN TCP packet (or a SYN+RST one) had no existing session and
    /// is not allowed to create one (`spec.md` §8 invariant 5).
    NotRescheduled,
}

impl fmt::Display for PacketDrop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDrop::NoVirtualService => write!(f, "no matching virtual service"),
            PacketDrop::SourceNotAllowed => write!(f, "source address not allowed"),
            PacketDrop::UnsupportedTransport => write!(f, "unsupported transport protocol"),
            PacketDrop::SessionTableOverflow => write!(f, "session table overflow"),
            PacketDrop::NoRealAvailable => write!(f, "no real available"),
            PacketDrop::NotRescheduled => write!(f, "packet not eligible to create a session"),
        }
    }
}

impl std::error::Error for PacketDrop {}

/// Session-table specific failure, re-exported at the crate surface so
/// callers outside `session` don't need to reach into the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    Overflow,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Overflow => write!(f, "session table bucket full"),
        }
    }
}

impl std::error::Error for SessionError {}
