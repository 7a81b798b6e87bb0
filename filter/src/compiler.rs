//! Filter compiler (C6): builds one [`AttrIndex`] per kind in a filter's
//! signature, then composes them into a balanced binary tree of
//! [`ValueTable`] joins. The root's registry holds, for every class
//! reachable at the root, the final ordered rule id sequence -- what
//! [`crate::query`] walks at lookup time.
//!
//! Every table a compiled filter owns -- each leaf's per-kind index and
//! every internal node's join table and registry -- lives in the arena
//! passed to [`compile`]; if any allocation along the way fails, the
//! partially built structure is simply dropped (its arena blocks leak
//! until the next resize-and-republish, the same tradeoff `ModuleConfig`
//! publish makes) and `compile` reports the failure to its caller.

use core::ptr::NonNull;
use std::collections::HashMap;

use yanet_abi::AttrKind;
use yanet_arena::Arena;

use crate::attr_index::{
    build_device_index, build_net4_index, build_net6_index, build_proto_index, AttrIndex, PacketAttrs,
};
use crate::error::FilterBuildError;
use crate::range_registry::{merge_priority_stable, RangeRegistry, RangeTable};
use crate::rule::{AttrValue, Rule};
use crate::value_table::ValueTable;

enum TreeNode {
    Leaf(AttrIndex),
    Internal {
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        table: NonNull<ValueTable>,
        registry: NonNull<RangeTable>,
    },
}

impl TreeNode {
    /// # Safety
    /// Every arena region reachable from this node must still be mapped.
    unsafe fn width(&self) -> usize {
        unsafe { self.registry().len() }
    }

    /// # Safety
    /// Every arena region reachable from this node must still be mapped.
    unsafe fn registry(&self) -> &RangeTable {
        unsafe {
            match self {
                TreeNode::Leaf(index) => index.registry(),
                TreeNode::Internal { registry, .. } => registry.as_ref(),
            }
        }
    }

    /// # Safety
    /// Every arena region reachable from this node must still be mapped.
    unsafe fn classify(&self, pkt: &PacketAttrs) -> u32 {
        unsafe {
            match self {
                TreeNode::Leaf(index) => index.classify(pkt),
                TreeNode::Internal { left, right, table, .. } => {
                    let l = left.classify(pkt);
                    let r = right.classify(pkt);
                    table.as_ref().get(l, r)
                }
            }
        }
    }
}

/// Splits `leaves` in half recursively so the tree stays balanced
/// regardless of signature length, joining siblings with a freshly built
/// [`ValueTable`] at every internal node. The tree's own `Leaf`/`Internal`
/// skeleton stays on the heap -- it's bounded by signature length (at most
/// a handful of nodes) and rebuilt fresh on every compile, so there is no
/// remapping concern for it the way there is for the big per-node tables.
fn build_tree(arena: &Arena, mut leaves: Vec<AttrIndex>) -> Result<TreeNode, FilterBuildError> {
    if leaves.len() == 1 {
        return Ok(TreeNode::Leaf(leaves.pop().unwrap()));
    }
    let right_half = leaves.split_off(leaves.len() / 2);
    let left = build_tree(arena, leaves)?;
    let right = build_tree(arena, right_half)?;
    let (left_width, right_width) = unsafe { (left.width(), right.width()) };
    let mut registry = RangeRegistry::new();
    let cells = unsafe { ValueTable::build(left.registry(), left_width, right.registry(), right_width, &mut registry) };
    let table = ValueTable::into_arena(arena, right_width, cells)?;
    let registry = registry.into_arena(arena)?;
    Ok(TreeNode::Internal {
        left: Box::new(left),
        right: Box::new(right),
        table,
        registry,
    })
}

/// A compiled filter: one signature, one balanced tree, ready to classify
/// packets via [`crate::query`].
pub struct FilterInstance {
    signature: Vec<AttrKind>,
    root: TreeNode,
}

impl FilterInstance {
    pub fn signature(&self) -> &[AttrKind] {
        &self.signature
    }

    /// # Safety
    /// Every arena region this filter's tables point into must still be
    /// mapped.
    pub unsafe fn classify(&self, pkt: &PacketAttrs) -> u32 {
        unsafe { self.root.classify(pkt) }
    }

    /// # Safety
    /// Every arena region this filter's tables point into must still be
    /// mapped.
    pub unsafe fn root_registry(&self) -> &RangeTable {
        unsafe { self.root.registry() }
    }
}

/// Compiles a rule set into a [`FilterInstance`] whose tables live in
/// `arena`. Rules are expected in priority order (`rule.id` ascending,
/// lowest id highest priority); this is what every merge step
/// (`merge_priority_stable`) assumes.
pub fn compile(arena: &Arena, rules: &[Rule], signature: &[AttrKind]) -> Result<FilterInstance, FilterBuildError> {
    if signature.is_empty() {
        return Err(FilterBuildError::EmptySignature);
    }
    let signature = crate::rule::dedup_signature(signature);

    let mut leaves = Vec::with_capacity(signature.len());
    for &kind in &signature {
        leaves.push(build_index_for_kind(arena, kind, rules)?);
    }
    let root = build_tree(arena, leaves)?;
    Ok(FilterInstance { signature, root })
}

fn rule_ids_without(rules: &[Rule], kind: AttrKind) -> Vec<u32> {
    rules
        .iter()
        .filter(|r| r.attributes.get(kind).is_none())
        .map(|r| r.id)
        .collect()
}

fn build_index_for_kind(arena: &Arena, kind: AttrKind, rules: &[Rule]) -> Result<AttrIndex, FilterBuildError> {
    use AttrKind::*;
    let wildcard = rule_ids_without(rules, kind);
    match kind {
        Net4Src | Net4Dst => {
            let field = if kind == Net4Src {
                (|p: &PacketAttrs| p.net4_src) as fn(&PacketAttrs) -> Option<[u8; 4]>
            } else {
                (|p: &PacketAttrs| p.net4_dst) as fn(&PacketAttrs) -> Option<[u8; 4]>
            };
            let mut entries: HashMap<(u32, u8), Vec<u32>> = HashMap::new();
            for rule in rules {
                let Some(values) = rule.attributes.get(kind) else { continue };
                for value in values {
                    let AttrValue::Net4 { addr, mask } = value else {
                        return Err(FilterBuildError::KindMismatch(kind));
                    };
                    for (prefix, len) in crate::mask_decompose::decompose_mask_v4(*addr, *mask) {
                        entries.entry((prefix, len)).or_default().push(rule.id);
                    }
                }
            }
            entries.entry((0, 0)).or_default().extend(wildcard.iter().copied());
            let entries: Vec<(u32, u8, Vec<u32>)> =
                entries.into_iter().map(|((prefix, len), ids)| (prefix, len, ids)).collect();
            Ok(build_net4_index(arena, entries, field)?)
        }
        Net6Src | Net6Dst => {
            let field = if kind == Net6Src {
                (|p: &PacketAttrs| p.net6_src) as fn(&PacketAttrs) -> Option<[u8; 16]>
            } else {
                (|p: &PacketAttrs| p.net6_dst) as fn(&PacketAttrs) -> Option<[u8; 16]>
            };
            let mut entries: HashMap<(u128, u8), Vec<u32>> = HashMap::new();
            for rule in rules {
                let Some(values) = rule.attributes.get(kind) else { continue };
                for value in values {
                    let AttrValue::Net6 { addr, prefix_hi, prefix_lo } = value else {
                        return Err(FilterBuildError::KindMismatch(kind));
                    };
                    // prefix_hi/prefix_lo let a rule describe two disjoint
                    // prefix lengths sharing one address (mirrors the v4
                    // non-contiguous-mask case without needing a general
                    // v6 mask decomposer); treat each as its own entry.
                    let base = u128::from_be_bytes(*addr);
                    for len in [*prefix_hi, *prefix_lo] {
                        let masked = if len == 0 { 0 } else { base & (u128::MAX << (128 - len as u32)) };
                        entries.entry((masked, len)).or_default().push(rule.id);
                    }
                }
            }
            entries.entry((0, 0)).or_default().extend(wildcard.iter().copied());
            let entries: Vec<(u128, u8, Vec<u32>)> =
                entries.into_iter().map(|((addr, len), ids)| (addr, len, ids)).collect();
            Ok(build_net6_index(arena, entries, field)?)
        }
        PortSrc | PortDst | Vlan => {
            let field: fn(&PacketAttrs) -> Option<u16> = match kind {
                PortSrc => |p: &PacketAttrs| p.port_src,
                PortDst => |p: &PacketAttrs| p.port_dst,
                Vlan => |p: &PacketAttrs| p.vlan,
                _ => unreachable!(),
            };
            let mut ranges: Vec<(u16, u16)> = Vec::new();
            let mut owners: Vec<u32> = Vec::new();
            for rule in rules {
                let Some(values) = rule.attributes.get(kind) else { continue };
                for value in values {
                    let (from, to) = match (kind, value) {
                        (PortSrc | PortDst, AttrValue::PortRange(from, to)) => (*from, *to),
                        (Vlan, AttrValue::VlanRange(from, to)) => (*from, *to),
                        _ => return Err(FilterBuildError::KindMismatch(kind)),
                    };
                    ranges.push((from, to));
                    owners.push(rule.id);
                }
            }
            if !wildcard.is_empty() {
                ranges.push((0, 0xFFFF));
                owners.push(u32::MAX); // marker, projected back below
            }
            build_range16_with_owners(arena, ranges, owners, &wildcard, field)
        }
        Proto => {
            let mut protos = Vec::new();
            for rule in rules {
                let Some(values) = rule.attributes.get(kind) else { continue };
                for value in values {
                    let AttrValue::Proto(m) = value else {
                        return Err(FilterBuildError::KindMismatch(kind));
                    };
                    protos.push((rule.id, *m));
                }
            }
            Ok(build_proto_index(arena, protos, wildcard)?)
        }
        Device => {
            let mut devices: Vec<(u32, Vec<String>)> = Vec::new();
            for rule in rules {
                let Some(values) = rule.attributes.get(kind) else { continue };
                let mut names = Vec::new();
                for value in values {
                    let AttrValue::Device(name) = value else {
                        return Err(FilterBuildError::KindMismatch(kind));
                    };
                    names.push(name.clone());
                }
                devices.push((rule.id, names));
            }
            Ok(build_device_index(arena, devices, wildcard)?)
        }
    }
}

/// `RangeClassifier::build` returns each transition segment's raw
/// rule-index list (indices into `ranges`, not rule ids); this translates
/// those indices back into actual rule ids, folding the `u32::MAX`
/// wildcard marker into the plain wildcard-rules list every segment
/// already implicitly belongs to.
fn build_range16_with_owners(
    arena: &Arena,
    ranges: Vec<(u16, u16)>,
    owners: Vec<u32>,
    wildcard: &[u32],
    field: fn(&PacketAttrs) -> Option<u16>,
) -> Result<AttrIndex, FilterBuildError> {
    use crate::range_compiler::RangeClassifier;
    let (classifier, labels) = RangeClassifier::build(&ranges);
    let mut registry = RangeRegistry::new();
    for label in labels {
        let mut rule_ids: Vec<u32> = label
            .iter()
            .filter(|&&idx| owners[idx as usize] != u32::MAX)
            .map(|&idx| owners[idx as usize])
            .collect();
        rule_ids = merge_priority_stable(&rule_ids, wildcard);
        registry.intern(rule_ids);
    }
    let classifier = classifier.into_arena(arena)?;
    let registry = registry.into_arena(arena)?;
    Ok(AttrIndex::Range16 { classifier, registry, field })
}
