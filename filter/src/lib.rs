//! Packet classification engine (`spec.md` §§1-9, C1-C7 excluding the
//! arena/LPM primitives, which live in `yanet-arena`/`yanet-lpm`).
//!
//! A filter is compiled once from a priority-ordered rule set and a
//! signature (the attribute kinds it cares about), then queried many times
//! per packet. See [`compiler::compile`] and [`query::query`].

pub mod attr_index;
pub mod compiler;
pub mod error;
pub mod mask_decompose;
pub mod query;
pub mod range_compiler;
pub mod range_registry;
pub mod rule;
pub mod value_table;

pub use attr_index::PacketAttrs;
pub use compiler::{compile, FilterInstance};
pub use error::FilterBuildError;
pub use query::{query, QueryResult};
pub use range_registry::RangeTable;
pub use rule::{dedup_signature, AttrValue, ProtoMatch, Rule, RuleAttributes};
