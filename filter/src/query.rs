//! Filter query (C7): classify a packet against a [`FilterInstance`],
//! project its root class's rule-id sequence into actions, and walk that
//! sequence keeping only actions whose category mask intersects the
//! caller's query mask, stopping at the first terminal (non-`NonTerminate`)
//! match kept.

use std::collections::HashMap;

use yanet_abi::action::{Action, CategoryMask, Match};

use crate::attr_index::PacketAttrs;
use crate::compiler::FilterInstance;

/// The result of one query: every action kept by the category mask, in
/// rule-priority order, up to and including the first terminal one.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueryResult {
    pub matches: Vec<Match>,
}

impl QueryResult {
    /// The terminal match, if traversal reached one.
    pub fn terminal(&self) -> Option<Match> {
        self.matches.last().copied().filter(|m| m.is_terminal())
    }
}

/// Classifies `pkt` against `filter`, looks up the rule-id sequence for its
/// root class, and projects it through `actions` (a `rule_id -> Action`
/// map built alongside the rule set `filter` was compiled from).
///
/// # Safety
/// Every arena region `filter`'s tables point into must still be mapped.
pub unsafe fn query(
    filter: &FilterInstance,
    actions: &HashMap<u32, Action>,
    pkt: &PacketAttrs,
    query_mask: CategoryMask,
) -> QueryResult {
    let rule_ids = unsafe {
        let class_id = filter.classify(pkt);
        filter.root_registry().get(class_id)
    };

    let mut matches = Vec::new();
    for &rule_id in rule_ids {
        let Some(&action) = actions.get(&rule_id) else { continue };
        let decoded = action.decode();
        if !decoded.category_mask().rule_matches_query(query_mask) {
            continue;
        }
        let terminal = decoded.is_terminal();
        matches.push(decoded);
        if terminal {
            break;
        }
    }
    QueryResult { matches }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::rule::{AttrValue, Rule, RuleAttributes};
    use yanet_abi::action::Category;
    use yanet_abi::AttrKind;
    use yanet_arena::Arena;

    fn action_word(id: u32, mask: CategoryMask, non_terminate: bool) -> u32 {
        if non_terminate {
            Action::encode(Match::NonTerminate(id, mask)).raw()
        } else {
            Action::encode(Match::Terminal(id, mask)).raw()
        }
    }

    #[test]
    fn stops_at_the_first_terminal_match() {
        let arena = Arena::new(1 << 20);
        let rules = vec![
            Rule {
                id: 0,
                action: action_word(1, CategoryMask::ALL, true),
                attributes: RuleAttributes::new().with(
                    AttrKind::PortDst,
                    vec![AttrValue::PortRange(80, 80)],
                ),
            },
            Rule {
                id: 1,
                action: action_word(2, CategoryMask::ALL, false),
                attributes: RuleAttributes::new().with(
                    AttrKind::PortDst,
                    vec![AttrValue::PortRange(0, 65535)],
                ),
            },
            Rule {
                id: 2,
                action: action_word(3, CategoryMask::ALL, false),
                attributes: RuleAttributes::new().with(
                    AttrKind::PortDst,
                    vec![AttrValue::PortRange(0, 65535)],
                ),
            },
        ];
        let filter = compile(&arena, &rules, &[AttrKind::PortDst]).unwrap();
        let actions: HashMap<u32, Action> = rules.iter().map(|r| (r.id, Action::from_raw(r.action))).collect();

        let pkt = PacketAttrs { port_dst: Some(80), ..Default::default() };
        let result = unsafe { query(&filter, &actions, &pkt, CategoryMask::ALL) };
        assert_eq!(result.matches.len(), 2);
        assert_eq!(result.terminal(), Some(Match::Terminal(1, CategoryMask::ALL)));
    }

    #[test]
    fn category_mismatch_is_skipped_entirely() {
        let arena = Arena::new(1 << 20);
        let rules = vec![Rule {
            id: 0,
            action: action_word(9, CategoryMask::of(Category::C0), false),
            attributes: RuleAttributes::new().with(AttrKind::Device, vec![AttrValue::Device("eth0".into())]),
        }];
        let filter = compile(&arena, &rules, &[AttrKind::Device]).unwrap();
        let actions: HashMap<u32, Action> = rules.iter().map(|r| (r.id, Action::from_raw(r.action))).collect();

        let pkt = PacketAttrs { device: Some("eth0"), ..Default::default() };
        let result = unsafe { query(&filter, &actions, &pkt, CategoryMask::of(Category::C1)) };
        assert!(result.matches.is_empty());
        assert!(result.terminal().is_none());
    }
}
