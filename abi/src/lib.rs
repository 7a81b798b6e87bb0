//! Wire-shaped data types shared by every YANET dataplane crate.
//!
//! This crate has no logic of its own: it is the vocabulary the other
//! crates are built from (address newtypes, the filter rule/action wire
//! encoding, attribute kinds, session identifiers, per-VS/per-real flag
//! sets). Keeping it dependency-free (besides `bitflags`) means every
//! other crate — including ones that never touch each other — can agree
//! on the same `AttrKind`, `Action`, or `SessionId` without a cycle.

pub mod action;
pub mod addr;
pub mod attr;
pub mod flags;
pub mod session;

pub use action::{Action, Category, CategoryMask};
pub use addr::{Ipv4Net, Ipv6Net, NetAddr, NetAddr6};
pub use attr::{AttrKind, Proto};
pub use flags::{RealFlags, VsFlags};
pub use session::{SessionId, TransportProto};
