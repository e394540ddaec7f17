//! Per-actor admission rules.
//!
//! A [`RuleSet`] decides whether a message of a given exact type coming from
//! a given source address reaches the actor. The most specific rule, i.e.
//! the one with the longest matching address, wins; without a match the
//! default mode applies.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{address::Address, base::ImplId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    AllowAll,
    RejectAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Allow,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    mode: AccessMode,
    rules: BTreeMap<(Address, bool), Rule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Rule {
    verdict: Verdict,
    // Empty means every type
    types: BTreeSet<ImplId>,
}

// Implementations

impl RuleSet {
    pub fn new(mode: AccessMode) -> Self {
        Self {
            mode,
            rules: BTreeMap::new(),
        }
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Drop every rule and admit everything.
    pub fn allow_all(&mut self) {
        self.mode = AccessMode::AllowAll;
        self.rules.clear();
    }

    /// Drop every rule and reject everything.
    pub fn reject_all(&mut self) {
        self.mode = AccessMode::RejectAll;
        self.rules.clear();
    }

    /// Admit messages from `address` (and its descendants when
    /// `include_children`) whose type is in `types`, or of any type when
    /// `types` is empty. Replaces any rule for the same pair.
    pub fn allow(
        &mut self,
        address: Address,
        include_children: bool,
        types: impl IntoIterator<Item = ImplId>,
    ) {
        self.set(address, include_children, Verdict::Allow, types);
    }

    /// Counterpart of [`RuleSet::allow`].
    pub fn block(
        &mut self,
        address: Address,
        include_children: bool,
        types: impl IntoIterator<Item = ImplId>,
    ) {
        self.set(address, include_children, Verdict::Reject, types);
    }

    pub fn evaluate(&self, source: &Address, type_id: ImplId) -> Verdict {
        let candidates = (0..=source.len()).rev().map(|depth| {
            let address = source.head(depth);
            let exact = depth == source.len();

            (
                self.rules.get(&(address.clone(), false)).filter(|_| exact),
                self.rules.get(&(address, true)),
            )
        });

        for (exact_rule, subtree_rule) in candidates {
            if exact_rule.is_none() && subtree_rule.is_none() {
                continue;
            }

            let rules = || exact_rule.into_iter().chain(subtree_rule);

            let winner = rules()
                .find(|r| r.types.contains(&type_id))
                .or_else(|| rules().find(|r| r.types.is_empty()));

            return match winner {
                Some(rule) => rule.verdict,
                None => self.default_verdict(),
            };
        }

        self.default_verdict()
    }

    fn default_verdict(&self) -> Verdict {
        match self.mode {
            AccessMode::AllowAll => Verdict::Allow,
            AccessMode::RejectAll => Verdict::Reject,
        }
    }

    fn set(
        &mut self,
        address: Address,
        include_children: bool,
        verdict: Verdict,
        types: impl IntoIterator<Item = ImplId>,
    ) {
        self.rules.insert(
            (address, include_children),
            Rule {
                verdict,
                types: types.into_iter().collect(),
            },
        );
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new(AccessMode::AllowAll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::TypeTag;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    const STRING: ImplId = <String as TypeTag>::IMPL_ID;
    const INT: ImplId = <i64 as TypeTag>::IMPL_ID;

    #[test]
    fn test_default_modes() {
        let rules = RuleSet::new(AccessMode::AllowAll);
        assert_eq!(rules.evaluate(&addr("a:b"), STRING), Verdict::Allow);

        let rules = RuleSet::new(AccessMode::RejectAll);
        assert_eq!(rules.evaluate(&addr("a:b"), STRING), Verdict::Reject);
        assert_eq!(rules.evaluate(&Address::empty(), STRING), Verdict::Reject);
    }

    #[test]
    fn test_children_flag() {
        let a = addr("a");
        let b = addr("a:b");
        let b_child = addr("a:b:c");

        let mut rules = RuleSet::new(AccessMode::RejectAll);
        rules.allow(a.clone(), false, []);
        assert_eq!(rules.evaluate(&a, STRING), Verdict::Allow);
        assert_eq!(rules.evaluate(&b, STRING), Verdict::Reject);

        rules.allow(a.clone(), true, []);
        assert_eq!(rules.evaluate(&b, STRING), Verdict::Allow);
        assert_eq!(rules.evaluate(&b_child, STRING), Verdict::Allow);
    }

    #[test]
    fn test_narrower_rule_overrides_only_target() {
        let mut rules = RuleSet::new(AccessMode::RejectAll);
        rules.allow(addr("a"), true, []);
        rules.block(addr("a:b:c"), false, []);

        assert_eq!(rules.evaluate(&addr("a:b:c"), STRING), Verdict::Reject);
        assert_eq!(rules.evaluate(&addr("a:b:d"), STRING), Verdict::Allow);
        assert_eq!(rules.evaluate(&addr("a:b"), STRING), Verdict::Allow);
        // Exact-address rule does not cover descendants
        assert_eq!(rules.evaluate(&addr("a:b:c:e"), STRING), Verdict::Allow);
    }

    #[test]
    fn test_exact_type_matching() {
        let source = addr("a:b");

        let mut rules = RuleSet::new(AccessMode::RejectAll);
        rules.allow(source.clone(), false, [STRING]);
        assert_eq!(rules.evaluate(&source, STRING), Verdict::Allow);
        assert_eq!(rules.evaluate(&source, INT), Verdict::Reject);

        let mut rules = RuleSet::new(AccessMode::RejectAll);
        rules.allow(source.clone(), false, [INT]);
        assert_eq!(rules.evaluate(&source, INT), Verdict::Allow);
        assert_eq!(rules.evaluate(&source, STRING), Verdict::Reject);

        let mut rules = RuleSet::new(AccessMode::AllowAll);
        rules.block(source.clone(), false, [STRING]);
        assert_eq!(rules.evaluate(&source, STRING), Verdict::Reject);
        assert_eq!(rules.evaluate(&source, INT), Verdict::Allow);

        let mut rules = RuleSet::new(AccessMode::AllowAll);
        rules.block(source.clone(), false, [INT]);
        assert_eq!(rules.evaluate(&source, INT), Verdict::Reject);
        assert_eq!(rules.evaluate(&source, STRING), Verdict::Allow);
    }

    #[test]
    fn test_typed_rule_beats_untyped_at_same_address() {
        let source = addr("a:b");

        let mut rules = RuleSet::new(AccessMode::AllowAll);
        rules.block(source.clone(), true, []);
        rules.allow(source.clone(), false, [STRING]);

        assert_eq!(rules.evaluate(&source, STRING), Verdict::Allow);
        assert_eq!(rules.evaluate(&source, INT), Verdict::Reject);
        assert_eq!(rules.evaluate(&addr("a:b:c"), STRING), Verdict::Reject);
    }

    #[test]
    fn test_last_write_wins() {
        let source = addr("a");

        let mut rules = RuleSet::new(AccessMode::RejectAll);
        rules.allow(source.clone(), true, [STRING]);
        rules.block(source.clone(), true, [INT]);

        // String restriction was overwritten, not merged
        assert_eq!(rules.evaluate(&source, STRING), Verdict::Reject);
        assert_eq!(rules.evaluate(&source, INT), Verdict::Reject);

        rules.allow(source.clone(), true, []);
        assert_eq!(rules.evaluate(&source, INT), Verdict::Allow);

        rules.reject_all();
        assert_eq!(rules.evaluate(&source, INT), Verdict::Reject);
    }
}
