//! Filter rule types: `spec.md`'s `{ id, action, attributes }` tuple, where
//! each present attribute is a non-empty union of kind-specific primitive
//! values, and an absent attribute means "any".

use std::collections::HashSet;

pub use yanet_abi::attr::ProtoMatch;
pub use yanet_abi::AttrKind;

/// One primitive value within an `AttrValueSet`. A rule's value set for a
/// kind is a `Vec<AttrValue>`; which variant(s) appear is determined by
/// the kind (enforced by the rule builder, not this type).
#[derive(Clone, Debug)]
pub enum AttrValue {
    Net4 { addr: [u8; 4], mask: [u8; 4] },
    Net6 { addr: [u8; 16], prefix_hi: u8, prefix_lo: u8 },
    PortRange(u16, u16),
    Proto(ProtoMatch),
    VlanRange(u16, u16),
    Device(String),
}

#[derive(Clone, Debug, Default)]
pub struct RuleAttributes {
    values: Vec<(AttrKind, Vec<AttrValue>)>,
}

impl RuleAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a non-empty value union for `kind`. Panics on an empty union
    /// -- `spec.md`'s data model requires `AttrValueSet` be non-empty;
    /// "match nothing for this kind" isn't expressible, only "don't
    /// constrain this kind" (by omitting it).
    pub fn with(mut self, kind: AttrKind, values: Vec<AttrValue>) -> Self {
        assert!(!values.is_empty(), "AttrValueSet for {kind} must be non-empty");
        self.values.retain(|(k, _)| *k != kind);
        self.values.push((kind, values));
        self
    }

    pub fn get(&self, kind: AttrKind) -> Option<&[AttrValue]> {
        self.values
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, v)| v.as_slice())
    }
}

/// A compiled-filter input rule. `action` is the raw, encoded
/// `yanet_abi::action::Action` word (category mask + non-terminate bit +
/// user id), and `id` is this rule's priority: lower ids are higher
/// priority and are tried first.
pub struct Rule {
    pub id: u32,
    pub action: u32,
    pub attributes: RuleAttributes,
}

/// A filter's signature: the ordered, deduplicated list of attribute kinds
/// it evaluates. Order determines the leaf order of the compiled binary
/// tree.
pub fn dedup_signature(kinds: &[AttrKind]) -> Vec<AttrKind> {
    let mut seen = HashSet::new();
    kinds
        .iter()
        .copied()
        .filter(|k| seen.insert(*k))
        .collect()
}
