//! Per-attribute indexes: one per signature attribute, each producing a
//! dense `class_id` for any packet value of that kind, plus a registry
//! mapping each class to the ordered list of rule ids that contributed to
//! it.
//!
//! - Net4/Net6 use the LPM trie (C2): classes come from an ancestor
//!   accumulation pass over every distinct inserted prefix, so a class's
//!   rule list already contains every rule whose prefix covers it, not
//!   just the most specific one -- `LpmTrie::lookup`'s ordinary
//!   longest-prefix-wins behavior then does the right thing, because the
//!   most specific node's stored class already *is* the accumulated union.
//! - PortSrc/PortDst/Vlan reuse the range compiler (C5) directly.
//! - Proto is small enough (65536 `(proto, tcp_flags)` combinations) to
//!   build as a flat table, which `spec.md` §4.5 allows as an alternative
//!   to the transition-point scan.
//! - Device is the "direct hash" case §4.6 names explicitly.
//!
//! Every index's tables are arena-resident (`spec.md` §4.6: a failed
//! `alloc` while building must discard the partial structure and report
//! failure), reached through the `NonNull` handles `into_arena` calls
//! return.

use core::ptr::NonNull;
use std::collections::HashMap;

use yanet_arena::{AllocError, Arena, RelPtr};
use yanet_lpm::{FrozenLpmTrieV4, FrozenLpmTrieV6, LpmTrieV4, LpmTrieV6, LPM_INVALID};

use crate::range_compiler::{FrozenRangeClassifier, RangeClassifier};
use crate::range_registry::{RangeRegistry, RangeTable};
use crate::rule::ProtoMatch;

/// Raw per-kind packet values a query needs to classify against one
/// attribute index.
#[derive(Default, Clone, Copy)]
pub struct PacketAttrs<'a> {
    pub net4_src: Option<[u8; 4]>,
    pub net4_dst: Option<[u8; 4]>,
    pub net6_src: Option<[u8; 16]>,
    pub net6_dst: Option<[u8; 16]>,
    pub port_src: Option<u16>,
    pub port_dst: Option<u16>,
    pub proto_id: Option<u8>,
    pub tcp_flags: Option<u8>,
    pub vlan: Option<u16>,
    pub device: Option<&'a str>,
}

/// A flat `256 * 256`-entry proto*flags table, arena-resident.
#[repr(C)]
pub struct ProtoTable {
    cells: RelPtr<u32>,
}

const PROTO_TABLE_LEN: usize = 65536;

/// One device name's arena-resident entry, sorted by `hash` so lookup is a
/// binary search followed by a linear scan over the (rare) equal-hash run.
#[repr(C)]
struct DeviceEntry {
    hash: u64,
    name: RelPtr<u8>,
    name_len: u32,
    class: u32,
}

#[repr(C)]
pub struct DeviceTable {
    entries: RelPtr<DeviceEntry>,
    len: usize,
    wildcard_class: u32,
}

fn hash_name(name: &str) -> u64 {
    // FNV-1a: fast, deterministic, no dependency on input distribution.
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in name.as_bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

impl DeviceTable {
    /// # Safety
    /// The arena region this table points into must still be mapped.
    pub unsafe fn class_of(&self, name: Option<&str>) -> u32 {
        let Some(name) = name else { return self.wildcard_class };
        let entries = unsafe { self.entries.as_slice(self.len) };
        let Some(entries) = entries else { return self.wildcard_class };
        let hash = hash_name(name);
        let start = entries.partition_point(|e| e.hash < hash);
        for entry in &entries[start..] {
            if entry.hash != hash {
                break;
            }
            let entry_name = unsafe { entry.name.as_slice(entry.name_len as usize) }.unwrap_or(&[]);
            if entry_name == name.as_bytes() {
                return entry.class;
            }
        }
        self.wildcard_class
    }
}

pub enum AttrIndex {
    Net4 { trie: NonNull<FrozenLpmTrieV4>, registry: NonNull<RangeTable>, field: fn(&PacketAttrs) -> Option<[u8; 4]> },
    Net6 { trie: NonNull<FrozenLpmTrieV6>, registry: NonNull<RangeTable>, field: fn(&PacketAttrs) -> Option<[u8; 16]> },
    Range16 {
        classifier: NonNull<FrozenRangeClassifier>,
        registry: NonNull<RangeTable>,
        field: fn(&PacketAttrs) -> Option<u16>,
    },
    Proto { table: NonNull<ProtoTable>, registry: NonNull<RangeTable> },
    Device { table: NonNull<DeviceTable>, registry: NonNull<RangeTable> },
}

impl AttrIndex {
    /// # Safety
    /// Every arena region this index's tables point into must still be
    /// mapped.
    pub unsafe fn width(&self) -> usize {
        unsafe { self.registry().len() }
    }

    /// # Safety
    /// The arena region this index's registry points into must still be
    /// mapped.
    pub unsafe fn registry(&self) -> &RangeTable {
        unsafe {
            match self {
                AttrIndex::Net4 { registry, .. } => registry.as_ref(),
                AttrIndex::Net6 { registry, .. } => registry.as_ref(),
                AttrIndex::Range16 { registry, .. } => registry.as_ref(),
                AttrIndex::Proto { registry, .. } => registry.as_ref(),
                AttrIndex::Device { registry, .. } => registry.as_ref(),
            }
        }
    }

    /// # Safety
    /// Every arena region this index's tables point into must still be
    /// mapped.
    pub unsafe fn classify(&self, pkt: &PacketAttrs) -> u32 {
        match self {
            AttrIndex::Net4 { trie, field, .. } => {
                let addr = (field)(pkt).unwrap_or([0, 0, 0, 0]);
                let class = unsafe { trie.as_ref().lookup(&addr) };
                if class == LPM_INVALID {
                    0 // no prefix ever inserted here: empty range
                } else {
                    class
                }
            }
            AttrIndex::Net6 { trie, field, .. } => {
                let addr = (field)(pkt).unwrap_or([0u8; 16]);
                let class = unsafe { trie.as_ref().lookup(&addr) };
                if class == LPM_INVALID {
                    0
                } else {
                    class
                }
            }
            AttrIndex::Range16 { classifier, field, .. } => {
                let value = (field)(pkt).unwrap_or(0);
                unsafe { classifier.as_ref().class_of(value) }
            }
            AttrIndex::Proto { table, .. } => {
                let proto = pkt.proto_id.unwrap_or(0);
                let flags = pkt.tcp_flags.unwrap_or(0);
                let cells = unsafe { table.as_ref().cells.as_slice(PROTO_TABLE_LEN) }.expect("proto table has cells");
                cells[(proto as usize) << 8 | flags as usize]
            }
            AttrIndex::Device { table, .. } => unsafe { table.as_ref().class_of(pkt.device) },
        }
    }
}

/// Build the NET4/NET6 index: accumulate, for every distinct inserted
/// prefix, the union of its own rules and every shorter (ancestor) prefix's
/// rules, then intern that accumulated, priority-ordered list as the
/// node's class. A synthetic `(0, 0)` root entry carries the wildcard
/// rules (rules that didn't specify this attribute at all), so packets
/// that match nothing more specific still resolve to the right class.
pub fn build_net4_index(
    arena: &Arena,
    entries: Vec<(u32, u8, Vec<u32>)>,
    field: fn(&PacketAttrs) -> Option<[u8; 4]>,
) -> Result<AttrIndex, AllocError> {
    let (trie, registry) = build_lpm_with_ancestor_union_v4(entries);
    let registry = registry.into_arena(arena)?;
    let trie = trie.into_arena(arena)?;
    Ok(AttrIndex::Net4 { trie, registry, field })
}

pub fn build_net6_index(
    arena: &Arena,
    entries: Vec<(u128, u8, Vec<u32>)>,
    field: fn(&PacketAttrs) -> Option<[u8; 16]>,
) -> Result<AttrIndex, AllocError> {
    let mut sorted = entries;
    sorted.sort_by_key(|e| e.1);
    let mut registry = RangeRegistry::new();
    let mut trie = LpmTrieV6::new();
    for i in 0..sorted.len() {
        let (addr, len, ref own_rules) = sorted[i];
        let mut accumulated = Vec::new();
        for (addr2, len2, rules2) in sorted.iter().take(i) {
            if *len2 < len && is_ancestor_v6(*addr2, *len2, addr) {
                accumulated.extend(rules2.iter().copied());
            }
        }
        accumulated.extend(own_rules.iter().copied());
        accumulated.sort_unstable();
        accumulated.dedup();
        let class_id = registry.intern(accumulated);
        trie.insert(&addr.to_be_bytes(), len as u32, class_id);
    }
    trie.freeze();
    let registry = registry.into_arena(arena)?;
    let trie = trie.into_arena(arena)?;
    Ok(AttrIndex::Net6 { trie, registry, field })
}

fn is_ancestor_v4(ancestor_addr: u32, ancestor_len: u8, descendant_addr: u32) -> bool {
    let mask = if ancestor_len == 0 {
        0
    } else {
        u32::MAX << (32 - ancestor_len)
    };
    (descendant_addr & mask) == (ancestor_addr & mask)
}

fn is_ancestor_v6(ancestor_addr: u128, ancestor_len: u8, descendant_addr: u128) -> bool {
    let mask = if ancestor_len == 0 {
        0
    } else {
        u128::MAX << (128 - ancestor_len)
    };
    (descendant_addr & mask) == (ancestor_addr & mask)
}

fn build_lpm_with_ancestor_union_v4(entries: Vec<(u32, u8, Vec<u32>)>) -> (LpmTrieV4, RangeRegistry) {
    let mut sorted = entries;
    sorted.sort_by_key(|e| e.1);
    let mut registry = RangeRegistry::new();
    let mut trie = LpmTrieV4::new();
    for i in 0..sorted.len() {
        let (addr, len, ref own_rules) = sorted[i];
        let mut accumulated = Vec::new();
        for (addr2, len2, rules2) in sorted.iter().take(i) {
            if *len2 < len && is_ancestor_v4(*addr2, *len2, addr) {
                accumulated.extend(rules2.iter().copied());
            }
        }
        accumulated.extend(own_rules.iter().copied());
        accumulated.sort_unstable();
        accumulated.dedup();
        let class_id = registry.intern(accumulated);
        trie.insert(&addr.to_be_bytes(), len as u32, class_id);
    }
    trie.freeze();
    (trie, registry)
}

/// `protos[i]` is one rule's proto predicate; `wildcard_rules` are rule
/// ids that didn't constrain this attribute at all.
pub fn build_proto_index(arena: &Arena, protos: Vec<(u32, ProtoMatch)>, wildcard_rules: Vec<u32>) -> Result<AttrIndex, AllocError> {
    let mut registry = RangeRegistry::new();
    let mut table = vec![0u32; PROTO_TABLE_LEN];
    let mut cache: HashMap<(u8, u8), u32> = HashMap::new();
    for proto in 0u32..256 {
        for flags in 0u32..256 {
            let key = (proto as u8, flags as u8);
            let class_id = *cache.entry(key).or_insert_with(|| {
                let mut matching: Vec<u32> = protos
                    .iter()
                    .filter(|(_, m)| m.matches(key.0, key.1))
                    .map(|(rule_id, _)| *rule_id)
                    .collect();
                matching.extend(wildcard_rules.iter().copied());
                matching.sort_unstable();
                matching.dedup();
                registry.intern(matching)
            });
            table[(proto as usize) << 8 | flags as usize] = class_id;
        }
    }

    let registry = registry.into_arena(arena)?;
    let shell = ProtoTable { cells: RelPtr::NULL };
    let table_slot = arena.alloc(shell)?;
    let raw = arena.alloc_bytes(PROTO_TABLE_LEN * core::mem::size_of::<u32>())?;
    let typed = raw.cast::<u32>();
    unsafe {
        typed.as_ptr().copy_from_nonoverlapping(table.as_ptr(), table.len());
        (*table_slot.as_ptr()).cells.set(typed.as_ptr() as *const u32);
    }
    Ok(AttrIndex::Proto { table: table_slot, registry })
}

/// `devices[i]` is one rule's set of matching device names;
/// `wildcard_rules` are rule ids that didn't constrain this attribute.
pub fn build_device_index(
    arena: &Arena,
    devices: Vec<(u32, Vec<String>)>,
    wildcard_rules: Vec<u32>,
) -> Result<AttrIndex, AllocError> {
    let mut registry = RangeRegistry::new();
    let mut wildcard_only = wildcard_rules.clone();
    wildcard_only.sort_unstable();
    wildcard_only.dedup();
    let wildcard_class = registry.intern(wildcard_only);

    let mut names: Vec<&str> = devices
        .iter()
        .flat_map(|(_, names)| names.iter().map(String::as_str))
        .collect();
    names.sort_unstable();
    names.dedup();

    let mut entries: Vec<(String, u32)> = Vec::with_capacity(names.len());
    for name in names {
        let mut matching: Vec<u32> = devices
            .iter()
            .filter(|(_, ns)| ns.iter().any(|n| n == name))
            .map(|(rule_id, _)| *rule_id)
            .collect();
        matching.extend(wildcard_rules.iter().copied());
        matching.sort_unstable();
        matching.dedup();
        entries.push((name.to_string(), registry.intern(matching)));
    }
    entries.sort_by_key(|(name, _)| hash_name(name));

    let registry = registry.into_arena(arena)?;

    let entries_raw = arena.alloc_bytes(entries.len() * core::mem::size_of::<DeviceEntry>())?;
    let entries_typed = entries_raw.cast::<DeviceEntry>();
    for (i, (name, class)) in entries.iter().enumerate() {
        let slot_ptr = unsafe { entries_typed.as_ptr().add(i) };
        let hash = hash_name(name);
        let name_bytes = name.as_bytes();
        if name_bytes.is_empty() {
            unsafe { slot_ptr.write(DeviceEntry { hash, name: RelPtr::NULL, name_len: 0, class: *class }) };
            continue;
        }
        let raw = arena.alloc_bytes(name_bytes.len())?;
        let typed = raw.cast::<u8>();
        unsafe {
            typed.as_ptr().copy_from_nonoverlapping(name_bytes.as_ptr(), name_bytes.len());
            slot_ptr.write(DeviceEntry { hash, name: RelPtr::NULL, name_len: name_bytes.len() as u32, class: *class });
            (*slot_ptr).name.set(typed.as_ptr() as *const u8);
        }
    }
    let shell = DeviceTable { entries: RelPtr::NULL, len: entries.len(), wildcard_class };
    let table_slot = arena.alloc(shell)?;
    unsafe {
        (*table_slot.as_ptr()).entries.set(entries_typed.as_ptr() as *const DeviceEntry);
    }

    Ok(AttrIndex::Device { table: table_slot, registry })
}
