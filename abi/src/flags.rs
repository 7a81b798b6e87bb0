//! Per-virtual-service and per-real flag sets (`spec.md` §3), via `bitflags`
//! the same way `slopos-abi` encodes page/VMA permission bits.

use bitflags::bitflags;

bitflags! {
    /// Virtual-service behavior flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct VsFlags: u16 {
        /// Address family of this VS is IPv6 (else IPv4).
        const IPV6 = 1 << 0;
        /// Wrap tunneled traffic in an additional GRE header.
        const GRE = 1 << 1;
        /// One-Packet-Scheduling: every packet independently re-selects a real.
        const OPS = 1 << 2;
        /// Session ids for this VS zero out L4 ports (match on L3 only).
        const PURE_L3 = 1 << 3;
        /// Clamp inner IPv6 TCP SYN MSS options larger than 1220.
        const FIX_MSS = 1 << 4;
        /// Pseudo-Round-Robin: real selection uses a per-VS counter, not the packet hash.
        const PRR = 1 << 5;
        /// Real effective weights are recomputed by the WLC feedback controller.
        const WLC = 1 << 6;
    }
}

bitflags! {
    /// Per-real state flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct RealFlags: u8 {
        /// The real's tunnel endpoint address is IPv6 (else IPv4).
        const IPV6 = 1 << 0;
        /// Administratively disabled: excluded from ring rebuilds and from
        /// being treated as "still present" on session-table hits.
        const DISABLED = 1 << 1;
    }
}
