//! The filter rule action word (`spec.md` §6) and its decoded `Match` form.
//!
//! The wire encoding is a single `u32` (bit 31 = non-terminate, bit 30 =
//! reserved, bits 24..=29 = a 6-bit category mask, bits 0..=23 = the
//! user-opaque action id). Internally every other crate works with the
//! decoded [`Match`] sum type and a [`CategoryMask`]; `Action` exists only
//! to cross the wire boundary, per the design note in `spec.md` §9.

use core::fmt;

const USER_ID_MASK: u32 = 0x00FF_FFFF;
const CATEGORY_SHIFT: u32 = 24;
const CATEGORY_MASK_BITS: u32 = 0x3F << CATEGORY_SHIFT;
const NON_TERMINATE_BIT: u32 = 1 << 31;

/// The raw 32-bit wire encoding of a rule action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Action(pub u32);

impl Action {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn user_id(self) -> u32 {
        self.0 & USER_ID_MASK
    }

    #[inline]
    pub fn category_mask(self) -> CategoryMask {
        CategoryMask(((self.0 & CATEGORY_MASK_BITS) >> CATEGORY_SHIFT) as u8)
    }

    #[inline]
    pub fn is_non_terminate(self) -> bool {
        self.0 & NON_TERMINATE_BIT != 0
    }

    /// Decode into the sum-type the rest of the engine operates on.
    ///
    /// `action == 0` without the non-terminate bit preserves the bit
    /// pattern rather than being remapped to anything special — see
    /// Open Question (a) in `spec.md` §9.
    #[inline]
    pub fn decode(self) -> Match {
        let mask = self.category_mask();
        if self.is_non_terminate() {
            Match::NonTerminate(self.user_id(), mask)
        } else {
            Match::Terminal(self.user_id(), mask)
        }
    }

    #[inline]
    pub fn encode(m: Match) -> Self {
        match m {
            Match::Terminal(id, mask) => {
                Self((id & USER_ID_MASK) | ((mask.0 as u32) << CATEGORY_SHIFT))
            }
            Match::NonTerminate(id, mask) => {
                Self((id & USER_ID_MASK) | ((mask.0 as u32) << CATEGORY_SHIFT) | NON_TERMINATE_BIT)
            }
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action(0x{:08x})", self.0)
    }
}

/// Decoded rule action: a user id tagged with whether it stops matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Match {
    /// Stops rule traversal once kept by the category filter.
    Terminal(u32, CategoryMask),
    /// Contributes to the result but does not stop traversal.
    NonTerminate(u32, CategoryMask),
}

impl Match {
    #[inline]
    pub fn user_id(self) -> u32 {
        match self {
            Match::Terminal(id, _) | Match::NonTerminate(id, _) => id,
        }
    }

    #[inline]
    pub fn category_mask(self) -> CategoryMask {
        match self {
            Match::Terminal(_, m) | Match::NonTerminate(_, m) => m,
        }
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Match::Terminal(..))
    }
}

/// One of six disjoint rule categories, letting callers run several logical
/// rule sets through a single compiled filter (`spec.md` Glossary).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Category {
    C0 = 0,
    C1 = 1,
    C2 = 2,
    C3 = 3,
    C4 = 4,
    C5 = 5,
}

/// A 6-bit category bitmask. `0` on a *rule* means "all categories"; `0` as
/// a caller-supplied *query* mask matches nothing (an empty intersection).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct CategoryMask(pub u8);

impl CategoryMask {
    pub const ALL: Self = Self(0);
    pub const NONE: Self = Self(0x3F_u8 & 0); // explicit: zero bits set

    #[inline]
    pub const fn of(category: Category) -> Self {
        Self(1 << (category as u8))
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0 & 0x3F
    }

    /// Whether this rule's category mask intersects a caller's query mask.
    /// A rule mask of `0` ("all categories") always intersects.
    #[inline]
    pub fn rule_matches_query(self, query: CategoryMask) -> bool {
        self.0 == 0 || (self.0 & query.0) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_wire_encoding() {
        let m = Match::NonTerminate(42, CategoryMask::of(Category::C2));
        let wire = Action::encode(m);
        assert_eq!(wire.decode(), m);
    }

    #[test]
    fn zero_action_without_nonterminate_is_preserved() {
        let a = Action::from_raw(0);
        assert_eq!(a.decode(), Match::Terminal(0, CategoryMask::ALL));
    }

    #[test]
    fn all_categories_rule_matches_any_query() {
        let rule_mask = CategoryMask::ALL;
        assert!(rule_mask.rule_matches_query(CategoryMask::of(Category::C5)));
    }

    #[test]
    fn disjoint_category_masks_do_not_match() {
        let rule_mask = CategoryMask::of(Category::C0);
        let query = CategoryMask::of(Category::C1);
        assert!(!rule_mask.rule_matches_query(query));
    }
}
