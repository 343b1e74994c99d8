use super::rule::{Literal, Rule};
use super::rule_set::RuleSet;

/// Two-watched-literals index for unit propagation.
///
/// Every non-assertion clause watches two of its literals; when a watched
/// literal becomes false the watch moves to another non-false literal, and
/// only when none exists does the clause propagate or conflict. Singleton
/// (at-most-one) rules are the exception: they watch every literal, since
/// any selection in the group must immediately reject the others.
#[derive(Debug, Default)]
pub struct WatchGraph {
    watches: Vec<Vec<WatchNode>>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct WatchNode {
    rule_id: u32,
    other_watch: Literal,
}

impl WatchGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn literal_to_index(literal: Literal) -> usize {
        let abs = literal.unsigned_abs() as usize;
        if literal > 0 {
            abs * 2
        } else {
            abs * 2 + 1
        }
    }

    fn watches_mut(&mut self, literal: Literal) -> &mut Vec<WatchNode> {
        let idx = Self::literal_to_index(literal);
        if idx >= self.watches.len() {
            self.watches.resize(idx + 1, Vec::new());
        }
        &mut self.watches[idx]
    }

    pub fn from_rules(rules: &RuleSet) -> Self {
        let mut graph = Self::new();
        for rule in rules.iter() {
            if rule.is_disabled() || rule.is_assertion() {
                continue;
            }
            graph.add_rule(rule);
        }
        graph
    }

    pub fn add_rule(&mut self, rule: &Rule) {
        let literals = rule.literals();
        if literals.len() < 2 {
            return;
        }

        let rule_id = rule.id();

        if rule.kind().is_singleton() {
            let first = literals[0];
            for &literal in literals {
                self.watches_mut(literal).push(WatchNode {
                    rule_id,
                    other_watch: first,
                });
            }
            return;
        }

        let watch1 = literals[0];
        let watch2 = literals[1];
        self.watches_mut(watch1).push(WatchNode {
            rule_id,
            other_watch: watch2,
        });
        self.watches_mut(watch2).push(WatchNode {
            rule_id,
            other_watch: watch1,
        });
    }

    pub(crate) fn watches_on(&self, literal: Literal) -> &[WatchNode] {
        let idx = Self::literal_to_index(literal);
        if idx < self.watches.len() {
            &self.watches[idx]
        } else {
            &[]
        }
    }

    fn remove_watch(&mut self, literal: Literal, rule_id: u32) {
        let idx = Self::literal_to_index(literal);
        if idx < self.watches.len() {
            self.watches[idx].retain(|w| w.rule_id != rule_id);
        }
    }

    fn move_watch(&mut self, rule_id: u32, from: Literal, to: Literal, other: Literal) {
        self.remove_watch(from, rule_id);
        self.watches_mut(to).push(WatchNode {
            rule_id,
            other_watch: other,
        });
    }
}

/// Outcome of propagating one decided literal through one clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagateResult {
    Ok,
    /// A literal forced true by a now-unit clause.
    Unit(Literal, u32),
    Conflict(u32),
}

/// Drives unit propagation through the watch graph.
pub struct Propagator<'a> {
    graph: &'a mut WatchGraph,
    rules: &'a RuleSet,
}

impl<'a> Propagator<'a> {
    pub fn new(graph: &'a mut WatchGraph, rules: &'a RuleSet) -> Self {
        Self { graph, rules }
    }

    /// Propagate a freshly decided literal. `truth(lit)` reports the
    /// current assignment of a literal: `None` while undecided.
    pub fn propagate<F>(&mut self, literal: Literal, mut truth: F) -> Vec<PropagateResult>
    where
        F: FnMut(Literal) -> Option<bool>,
    {
        let mut results = Vec::new();

        // Deciding `literal` makes `-literal` false; clauses watching it
        // must react.
        let false_literal = -literal;
        let watches: Vec<_> = self.graph.watches_on(false_literal).to_vec();

        for watch in watches {
            let Some(rule) = self.rules.get(watch.rule_id) else {
                continue;
            };
            if rule.is_disabled() {
                continue;
            }

            if rule.kind().is_singleton() {
                let result =
                    self.propagate_singleton(rule, false_literal, &mut truth, &mut results);
                if result != PropagateResult::Ok {
                    results.push(result);
                }
                continue;
            }

            let other = watch.other_watch;
            match truth(other) {
                Some(true) => continue,
                Some(false) => {
                    let result = self.relocate_watch(rule, false_literal, other, &mut truth);
                    if result != PropagateResult::Ok {
                        results.push(result);
                    }
                }
                None => {
                    let result = self.check_unit(rule, false_literal, other, &mut truth);
                    if result != PropagateResult::Ok {
                        results.push(result);
                    }
                }
            }
        }

        results
    }

    /// An at-most-one group where one member was just selected: every
    /// other member must be rejected, and a second selection is a
    /// conflict.
    fn propagate_singleton<F>(
        &mut self,
        rule: &Rule,
        false_literal: Literal,
        truth: &mut F,
        results: &mut Vec<PropagateResult>,
    ) -> PropagateResult
    where
        F: FnMut(Literal) -> Option<bool>,
    {
        for &literal in rule.literals() {
            if literal == false_literal {
                continue;
            }
            match truth(literal) {
                Some(true) => continue,
                Some(false) => return PropagateResult::Conflict(rule.id()),
                None => results.push(PropagateResult::Unit(literal, rule.id())),
            }
        }
        PropagateResult::Ok
    }

    /// Both watched literals are false: find a replacement watch or
    /// report a conflict.
    fn relocate_watch<F>(
        &mut self,
        rule: &Rule,
        false_literal: Literal,
        other_false: Literal,
        truth: &mut F,
    ) -> PropagateResult
    where
        F: FnMut(Literal) -> Option<bool>,
    {
        for &literal in rule.literals() {
            if literal == false_literal || literal == other_false {
                continue;
            }
            match truth(literal) {
                Some(false) => continue,
                _ => {
                    self.graph
                        .move_watch(rule.id(), false_literal, literal, other_false);
                    return PropagateResult::Ok;
                }
            }
        }
        PropagateResult::Conflict(rule.id())
    }

    /// One watched literal false, the other undecided: unless another
    /// non-false literal exists the clause is unit.
    fn check_unit<F>(
        &mut self,
        rule: &Rule,
        false_literal: Literal,
        undecided: Literal,
        truth: &mut F,
    ) -> PropagateResult
    where
        F: FnMut(Literal) -> Option<bool>,
    {
        for &literal in rule.literals() {
            if literal == false_literal || literal == undecided {
                continue;
            }
            match truth(literal) {
                Some(false) => continue,
                _ => {
                    self.graph
                        .move_watch(rule.id(), false_literal, literal, undecided);
                    return PropagateResult::Ok;
                }
            }
        }
        PropagateResult::Unit(undecided, rule.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::rule::RuleKind;

    #[test]
    fn test_watches_first_two_literals() {
        let mut rules = RuleSet::new();
        rules.add(Rule::new(vec![1, 2, 3], RuleKind::UnitRequires));

        let graph = WatchGraph::from_rules(&rules);
        assert_eq!(graph.watches_on(1).len(), 1);
        assert_eq!(graph.watches_on(2).len(), 1);
        assert_eq!(graph.watches_on(3).len(), 0);
    }

    #[test]
    fn test_assertions_not_watched() {
        let mut rules = RuleSet::new();
        rules.add(Rule::assertion(6, RuleKind::Root));
        rules.add(Rule::new(vec![1, 2], RuleKind::UnitRequires));

        let graph = WatchGraph::from_rules(&rules);
        assert_eq!(graph.watches_on(6).len(), 0);
        assert_eq!(graph.watches_on(1).len(), 1);
    }

    #[test]
    fn test_singleton_watches_all_literals() {
        let mut rules = RuleSet::new();
        rules.add(Rule::singleton(vec![1, 2, 3]));

        let graph = WatchGraph::from_rules(&rules);
        assert_eq!(graph.watches_on(-1).len(), 1);
        assert_eq!(graph.watches_on(-2).len(), 1);
        assert_eq!(graph.watches_on(-3).len(), 1);
    }

    #[test]
    fn test_unit_propagation() {
        let mut rules = RuleSet::new();
        // (-1 | 2 | 3): if 1 is selected, 2 or 3 must be.
        rules.add(Rule::new(vec![-1, 2, 3], RuleKind::UnitRequires));
        let mut graph = WatchGraph::from_rules(&rules);

        let mut propagator = Propagator::new(&mut graph, &rules);
        let results = propagator.propagate(1, |lit| match lit {
            -1 => Some(false),
            3 => Some(false),
            _ => None,
        });

        assert!(results
            .iter()
            .any(|r| matches!(r, PropagateResult::Unit(2, _))));
    }

    #[test]
    fn test_conflict_detection() {
        let mut rules = RuleSet::new();
        rules.add(Rule::new(vec![-1, 2], RuleKind::UnitRequires));
        let mut graph = WatchGraph::from_rules(&rules);

        let mut propagator = Propagator::new(&mut graph, &rules);
        let results = propagator.propagate(1, |lit| match lit {
            -1 => Some(false),
            2 => Some(false),
            _ => None,
        });

        assert!(results
            .iter()
            .any(|r| matches!(r, PropagateResult::Conflict(_))));
    }

    #[test]
    fn test_satisfied_clause_is_quiet() {
        let mut rules = RuleSet::new();
        rules.add(Rule::new(vec![-1, 2, 3], RuleKind::UnitRequires));
        let mut graph = WatchGraph::from_rules(&rules);

        let mut propagator = Propagator::new(&mut graph, &rules);
        let results = propagator.propagate(1, |lit| match lit {
            -1 => Some(false),
            2 => Some(true),
            _ => None,
        });

        assert!(results.iter().all(|r| *r == PropagateResult::Ok) || results.is_empty());
    }

    #[test]
    fn test_singleton_rejects_other_members() {
        let mut rules = RuleSet::new();
        rules.add(Rule::singleton(vec![1, 2, 3]));
        let mut graph = WatchGraph::from_rules(&rules);

        // Selecting unit 1 must force -2 and -3.
        let mut propagator = Propagator::new(&mut graph, &rules);
        let results = propagator.propagate(1, |lit| match lit {
            -1 => Some(false),
            _ => None,
        });

        assert!(results
            .iter()
            .any(|r| matches!(r, PropagateResult::Unit(-2, _))));
        assert!(results
            .iter()
            .any(|r| matches!(r, PropagateResult::Unit(-3, _))));
    }

    #[test]
    fn test_singleton_double_selection_conflicts() {
        let mut rules = RuleSet::new();
        rules.add(Rule::singleton(vec![1, 2]));
        let mut graph = WatchGraph::from_rules(&rules);

        let mut propagator = Propagator::new(&mut graph, &rules);
        let results = propagator.propagate(1, |lit| match lit {
            -1 => Some(false),
            -2 => Some(false), // Unit 2 already selected.
            _ => None,
        });

        assert!(results
            .iter()
            .any(|r| matches!(r, PropagateResult::Conflict(_))));
    }
}
