use std::collections::HashSet;

use crate::metadata::Requirement;
use crate::monitor::Monitor;

use super::decisions::Decisions;
use super::policy::Policy;
use super::pool::{Pool, UnitId};
use super::rule::{Literal, Rule, RuleKind};
use super::rule_set::RuleSet;
use super::watch_graph::{PropagateResult, Propagator, WatchGraph};

const MAX_ITERATIONS: u32 = 100_000;

/// Why a soft (best-effort) selection exists.
#[derive(Debug, Clone)]
pub enum SoftOrigin {
    /// An installed unit whose inclusion rule is optional.
    InstalledRoot(UnitId),
    /// A requested addition with the optional inclusion rule.
    RequestedAdd(UnitId),
    /// An optional, greedy extra requirement from the change request.
    ExtraRequirement(Requirement),
}

/// A best-effort selection attempted after the hard constraints resolve:
/// the solver tries the candidates in policy order and silently gives up
/// if none fits.
#[derive(Debug, Clone)]
pub struct SoftJob {
    pub origin: SoftOrigin,
    pub candidates: Vec<UnitId>,
}

/// One way to satisfy a greedy optional requirement.
#[derive(Debug, Clone)]
pub struct GreedyChoice {
    pub requirement: Requirement,
    pub candidates: Vec<UnitId>,
}

/// A patch-rewritten alternative for a greedy slot, active while the
/// patch is selected.
#[derive(Debug, Clone)]
pub struct PatchedChoice {
    pub patch: UnitId,
    pub choice: GreedyChoice,
}

/// A greedy optional requirement of `source`: once `source` is selected
/// the solver tries to pull in a satisfier, using the patched alternative
/// when the patch is active.
#[derive(Debug, Clone)]
pub struct GreedySlot {
    pub source: UnitId,
    pub original: GreedyChoice,
    pub patched: Vec<PatchedChoice>,
}

/// A soft attempt that could not be satisfied. Absorbed, not fatal.
#[derive(Debug)]
pub struct SoftFailure {
    pub origin: SoftOrigin,
    /// The rule the attempt ran into, when known.
    pub conflict: Option<Rule>,
}

#[derive(Debug)]
pub struct Solution {
    pub selected: Vec<UnitId>,
    pub soft_failures: Vec<SoftFailure>,
}

/// The rules implicated in an unsatisfiable solve, plus the units among
/// their literals that were positively decided when the conflict surfaced.
#[derive(Debug)]
pub struct ConflictInfo {
    pub rules: Vec<Rule>,
    pub selected: Vec<UnitId>,
}

#[derive(Debug)]
pub enum SolveOutcome {
    Sat(Solution),
    Unsat(ConflictInfo),
    Cancelled,
}

enum HardStop {
    Conflict(ConflictInfo),
    Cancelled,
}

enum AttemptResult {
    Ok,
    Conflict(Option<Rule>),
}

/// CDCL SAT solver over unit-selection literals.
///
/// The hard phase resolves assertions, mandatory requirement clauses and
/// singleton constraints with unit propagation, first-UIP conflict
/// learning and backtracking, followed by a minimization pass that
/// revisits branch alternatives. A soft phase then attempts optional
/// roots and greedy optional requirements one candidate at a time,
/// reverting (never failing) when an attempt conflicts.
pub struct SatSolver<'a> {
    pool: &'a Pool,
    policy: &'a Policy,
}

impl<'a> SatSolver<'a> {
    pub fn new(pool: &'a Pool, policy: &'a Policy) -> Self {
        Self { pool, policy }
    }

    pub fn solve(
        &self,
        rules: RuleSet,
        soft: &[SoftJob],
        greedy: &[GreedySlot],
        monitor: &dyn Monitor,
    ) -> SolveOutcome {
        log::debug!(
            "solving {} rules over {} units ({} soft jobs, {} greedy slots)",
            rules.len(),
            self.pool.len(),
            soft.len(),
            greedy.len()
        );

        let mut state = SolverState::new(rules);

        match self.run_hard(&mut state, monitor) {
            Ok(()) => {}
            Err(HardStop::Cancelled) => return SolveOutcome::Cancelled,
            Err(HardStop::Conflict(conflict)) => return SolveOutcome::Unsat(conflict),
        }

        let mut soft_failures = Vec::new();
        if self
            .augment(&mut state, soft, greedy, &mut soft_failures, monitor)
            .is_err()
        {
            return SolveOutcome::Cancelled;
        }

        let selected: Vec<UnitId> = state.decisions.selected_units().collect();
        log::debug!("solution selects {} units", selected.len());

        SolveOutcome::Sat(Solution {
            selected,
            soft_failures,
        })
    }

    /// The hard phase: propagate, decide, learn, backtrack, minimize.
    fn run_hard(&self, state: &mut SolverState, monitor: &dyn Monitor) -> Result<(), HardStop> {
        self.process_assertions(state).map_err(HardStop::Conflict)?;

        let mut iterations = 0u32;
        loop {
            iterations += 1;
            if iterations > MAX_ITERATIONS {
                log::error!("solver exceeded {MAX_ITERATIONS} iterations; giving up");
                return Err(HardStop::Conflict(ConflictInfo {
                    rules: Vec::new(),
                    selected: Vec::new(),
                }));
            }
            if monitor.is_cancelled() {
                return Err(HardStop::Cancelled);
            }

            if let Err(conflict_rule) = self.propagate(state) {
                if state.decisions.level() == 1 {
                    return Err(HardStop::Conflict(self.analyze_unsolvable(state, conflict_rule)));
                }
                if self.analyze_and_backtrack(state, conflict_rule) == 0 {
                    return Err(HardStop::Conflict(self.analyze_unsolvable(state, conflict_rule)));
                }
                continue;
            }

            match self.select_next(state) {
                Some(candidates) => self.select_and_decide(state, &candidates)?,
                None => {
                    if !self.minimize(state)? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Decide all single-literal rules at level 1. Empty rules mean an
    /// unsatisfiable requirement and fail immediately.
    fn process_assertions(&self, state: &mut SolverState) -> Result<(), ConflictInfo> {
        state.decisions.increment_level();

        for rule in state.rules.iter() {
            if rule.is_disabled() {
                continue;
            }
            if rule.is_empty() {
                return Err(ConflictInfo {
                    rules: vec![rule.clone()],
                    selected: Vec::new(),
                });
            }
        }

        let assertions: Vec<(Literal, u32)> = state
            .rules
            .assertions()
            .filter(|r| !r.is_disabled())
            .map(|r| (r.literals()[0], r.id()))
            .collect();

        for (literal, rule_id) in assertions {
            if state.decisions.conflicts(literal) {
                let mut rules = Vec::new();
                if let Some(rule) = state.rules.get(rule_id) {
                    rules.push(rule.clone());
                }
                if let Some(reason_id) = state.decisions.reason(literal) {
                    if reason_id != rule_id {
                        if let Some(reason) = state.rules.get(reason_id) {
                            rules.push(reason.clone());
                        }
                    }
                }
                let selected = self.selected_among(&rules, &state.decisions);
                return Err(ConflictInfo { rules, selected });
            }
            if !state.decisions.satisfied(literal) {
                state.decisions.decide(literal, Some(rule_id));
            }
        }

        Ok(())
    }

    /// Unit propagation over decisions made since the last call. Returns
    /// the id of a violated rule on conflict.
    fn propagate(&self, state: &mut SolverState) -> Result<(), u32> {
        while state.propagate_index < state.decisions.len() {
            let literal = state.decisions.queue()[state.propagate_index];
            state.propagate_index += 1;

            let results = {
                let decisions = &state.decisions;
                let truth = |lit: Literal| -> Option<bool> {
                    let unit = lit.unsigned_abs() as UnitId;
                    if decisions.decided(unit) {
                        Some(decisions.satisfied(lit))
                    } else {
                        None
                    }
                };
                let mut propagator = Propagator::new(&mut state.watch_graph, &state.rules);
                propagator.propagate(literal, truth)
            };

            for result in results {
                match result {
                    PropagateResult::Ok => {}
                    PropagateResult::Unit(unit_literal, rule_id) => {
                        if state.decisions.conflicts(unit_literal) {
                            return Err(rule_id);
                        }
                        if !state.decisions.satisfied(unit_literal) {
                            state.decisions.decide(unit_literal, Some(rule_id));
                        }
                    }
                    PropagateResult::Conflict(rule_id) => return Err(rule_id),
                }
            }
        }
        Ok(())
    }

    /// Find the next unsatisfied clause worth branching on and collect its
    /// undecided positive candidates.
    fn select_next(&self, state: &SolverState) -> Option<Vec<UnitId>> {
        for rule in state.rules.as_slice() {
            if rule.is_disabled() {
                continue;
            }

            match rule.kind() {
                RuleKind::Root | RuleKind::Pinned => {
                    let mut queue = Vec::new();
                    let mut satisfied = false;
                    for &literal in rule.literals() {
                        if state.decisions.satisfied(literal) {
                            satisfied = true;
                            break;
                        }
                        if literal > 0 && state.decisions.undecided(literal as UnitId) {
                            queue.push(literal as UnitId);
                        }
                    }
                    if !satisfied && !queue.is_empty() {
                        return Some(queue);
                    }
                }
                RuleKind::UnitRequires | RuleKind::PatchRequires => {
                    let literals = rule.literals();
                    if literals.is_empty() {
                        continue;
                    }
                    // Shape is (-source, target...); the clause only binds
                    // while the source is selected.
                    let source_literal = literals[0];
                    if source_literal >= 0 {
                        continue;
                    }
                    if !state.decisions.selected((-source_literal) as UnitId) {
                        continue;
                    }

                    let mut queue = Vec::new();
                    let mut satisfied = false;
                    for &literal in &literals[1..] {
                        if state.decisions.satisfied(literal) {
                            satisfied = true;
                            break;
                        }
                        if literal > 0 && state.decisions.undecided(literal as UnitId) {
                            queue.push(literal as UnitId);
                        }
                    }
                    if !satisfied && !queue.is_empty() {
                        return Some(queue);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Decide the policy-preferred candidate, remembering the alternatives
    /// for the minimization pass, then propagate to a fixpoint.
    fn select_and_decide(
        &self,
        state: &mut SolverState,
        candidates: &[UnitId],
    ) -> Result<(), HardStop> {
        let sorted = self.policy.order_candidates(self.pool, candidates);
        let Some(&selected) = sorted.first() else {
            return Ok(());
        };

        if sorted.len() > 1 {
            state.branches.push(Branch {
                level: state.decisions.level(),
                alternatives: sorted[1..].to_vec(),
            });
        }

        state.decisions.increment_level();
        state.decisions.decide(selected as Literal, None);

        loop {
            match self.propagate(state) {
                Ok(()) => return Ok(()),
                Err(conflict_rule) => {
                    if state.decisions.level() == 1 {
                        return Err(HardStop::Conflict(
                            self.analyze_unsolvable(state, conflict_rule),
                        ));
                    }
                    if self.analyze_and_backtrack(state, conflict_rule) == 0 {
                        return Err(HardStop::Conflict(
                            self.analyze_unsolvable(state, conflict_rule),
                        ));
                    }
                }
            }
        }
    }

    /// Learn from the conflict and backtrack. Returns the new level, or 0
    /// when the conflict cannot be resolved.
    fn analyze_and_backtrack(&self, state: &mut SolverState, conflict_rule: u32) -> u32 {
        let (learned_literal, backtrack_level, learned_rule) =
            self.analyze_conflict(state, conflict_rule);

        if backtrack_level == 0 || backtrack_level >= state.decisions.level() {
            return 0;
        }

        state.decisions.revert_to_level(backtrack_level);
        state.reset_propagate_index();
        state.branches.retain(|b| b.level <= backtrack_level);

        if !learned_rule.is_empty() {
            let before = state.rules.len();
            let learned_id = state.rules.add(learned_rule);
            if state.rules.len() > before {
                state
                    .watch_graph
                    .add_rule(state.rules.get(learned_id).expect("just added"));
            }
            state.decisions.decide(learned_literal, Some(learned_id));
        }

        backtrack_level
    }

    /// First-UIP conflict analysis: walk the implication trail backwards
    /// from the violated rule until a unique implication point at the
    /// current level remains, producing the learned clause and the level
    /// to backtrack to.
    fn analyze_conflict(&self, state: &SolverState, conflict_rule: u32) -> (Literal, u32, Rule) {
        let current_level = state.decisions.level();

        let mut seen: HashSet<UnitId> = HashSet::new();
        let mut num_at_current = 0usize;
        let mut num_at_level1 = 0usize;
        let mut other_literals: Vec<Literal> = Vec::new();
        let mut backtrack_level = 0u32;
        let mut learned_literal: Option<Literal> = None;

        let queue: Vec<Literal> = state.decisions.queue().to_vec();
        let mut idx = queue.len();
        let mut current_rule = state.rules.get(conflict_rule).cloned();

        loop {
            if let Some(rule) = &current_rule {
                for &literal in rule.literals() {
                    let unit = literal.unsigned_abs() as UnitId;
                    if seen.contains(&unit) || state.decisions.satisfied(literal) {
                        continue;
                    }
                    seen.insert(unit);

                    if let Some(level) = state.decisions.decision_level(literal) {
                        if level == 0 {
                            continue;
                        }
                        if level == 1 {
                            num_at_level1 += 1;
                        } else if level == current_level {
                            num_at_current += 1;
                        } else {
                            other_literals.push(literal);
                            backtrack_level = backtrack_level.max(level);
                        }
                    }
                }
            }

            if num_at_current == 0 {
                break;
            }

            // Walk backwards to the most recent decision we have seen.
            loop {
                if idx == 0 {
                    break;
                }
                idx -= 1;

                let literal = queue[idx];
                let unit = literal.unsigned_abs() as UnitId;
                if !seen.contains(&unit) {
                    continue;
                }
                seen.remove(&unit);
                num_at_current -= 1;

                if num_at_current == 0 {
                    // The unique implication point; learn its negation.
                    learned_literal = Some(-literal);
                    if num_at_level1 == 0 {
                        break;
                    }
                    for other in &other_literals {
                        seen.remove(&(other.unsigned_abs() as UnitId));
                    }
                    num_at_level1 += 1;
                } else {
                    current_rule = state
                        .decisions
                        .reason(literal)
                        .and_then(|id| state.rules.get(id))
                        .cloned();
                }
                break;
            }

            if learned_literal.is_some() || idx == 0 {
                break;
            }
        }

        let learned_literal = learned_literal.unwrap_or_else(|| {
            // Fallback: negate the last decision at the current level.
            queue
                .iter()
                .rev()
                .find(|&&l| state.decisions.decision_level(l) == Some(current_level))
                .map(|&l| -l)
                .unwrap_or(1)
        });

        let mut learned = vec![learned_literal];
        for &literal in &other_literals {
            learned.push(-literal);
        }

        let mut backtrack_level = backtrack_level;
        if backtrack_level >= current_level {
            backtrack_level = current_level.saturating_sub(1);
        }
        if backtrack_level == 0 && current_level > 1 {
            backtrack_level = 1;
        }

        (learned_literal, backtrack_level, Rule::learned(learned))
    }

    /// Collect the rules behind a level-1 conflict: the violated rule and
    /// the rules that forced its literals.
    fn analyze_unsolvable(&self, state: &SolverState, conflict_rule: u32) -> ConflictInfo {
        let mut rules: Vec<Rule> = Vec::new();

        if let Some(rule) = state.rules.get(conflict_rule) {
            rules.push(rule.clone());
            for &literal in rule.literals() {
                if let Some(reason_id) = state.decisions.reason(literal) {
                    if reason_id == rule.id() {
                        continue;
                    }
                    if let Some(cause) = state.rules.get(reason_id) {
                        if !rules.iter().any(|r| r.id() == cause.id()) {
                            rules.push(cause.clone());
                        }
                    }
                }
            }
        }

        let selected = self.selected_among(&rules, &state.decisions);
        ConflictInfo { rules, selected }
    }

    fn selected_among(&self, rules: &[Rule], decisions: &Decisions) -> Vec<UnitId> {
        let mut selected = Vec::new();
        for rule in rules {
            for &literal in rule.literals() {
                let unit = literal.unsigned_abs() as UnitId;
                if decisions.selected(unit) && !selected.contains(&unit) {
                    selected.push(unit);
                }
            }
        }
        selected
    }

    /// Revisit stored branch alternatives that propagation decided at a
    /// deeper level than where the branch was opened; trying them directly
    /// can produce a better (smaller or higher-versioned) solution.
    /// Returns true when a change was made and solving should continue.
    fn minimize(&self, state: &mut SolverState) -> Result<bool, HardStop> {
        if state.branches.is_empty() {
            return Ok(false);
        }

        let mut best: Option<(usize, usize, UnitId, u32)> = None;
        for (i, branch) in state.branches.iter().enumerate().rev() {
            for (offset, &candidate) in branch.alternatives.iter().enumerate() {
                if let Some(level) = state.decisions.decision_level(candidate as Literal) {
                    if level > branch.level + 1 {
                        best = Some((i, offset, candidate, branch.level));
                    }
                }
            }
        }

        let Some((branch_idx, offset, candidate, level)) = best else {
            return Ok(false);
        };

        state.branches[branch_idx].alternatives.remove(offset);
        if state.branches[branch_idx].alternatives.is_empty() {
            state.branches.remove(branch_idx);
        }

        state.decisions.revert_to_level(level);
        state.reset_propagate_index();
        state.branches.retain(|b| b.level < level);

        state.decisions.increment_level();
        state.decisions.decide(candidate as Literal, None);

        loop {
            match self.propagate(state) {
                Ok(()) => return Ok(true),
                Err(conflict_rule) => {
                    if state.decisions.level() == 1 {
                        return Err(HardStop::Conflict(
                            self.analyze_unsolvable(state, conflict_rule),
                        ));
                    }
                    if self.analyze_and_backtrack(state, conflict_rule) == 0 {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// The soft phase. Installed optional roots and optional requests are
    /// attempted first in the given order, then greedy optional
    /// requirements of selected units to a fixpoint. Failed attempts are
    /// reverted and recorded, never fatal.
    fn augment(
        &self,
        state: &mut SolverState,
        soft: &[SoftJob],
        greedy: &[GreedySlot],
        failures: &mut Vec<SoftFailure>,
        monitor: &dyn Monitor,
    ) -> Result<(), ()> {
        for job in soft {
            if monitor.is_cancelled() {
                return Err(());
            }
            if job.candidates.iter().any(|&c| state.decisions.selected(c)) {
                continue;
            }

            let ordered = self.policy.order_candidates(self.pool, &job.candidates);
            let mut satisfied = false;
            let mut last_conflict: Option<Rule> = None;

            for &candidate in &ordered {
                if state.decisions.conflicts(candidate as Literal) {
                    if let Some(reason) = state
                        .decisions
                        .reason(candidate as Literal)
                        .and_then(|id| state.rules.get(id))
                    {
                        last_conflict = Some(reason.clone());
                    }
                    continue;
                }
                match self.attempt(state, candidate as Literal) {
                    AttemptResult::Ok => {
                        satisfied = true;
                        break;
                    }
                    AttemptResult::Conflict(rule) => last_conflict = rule,
                }
            }

            if !satisfied {
                failures.push(SoftFailure {
                    origin: job.origin.clone(),
                    conflict: last_conflict,
                });
            }
        }

        // Greedy requirements open up as their owners get selected; keep
        // sweeping until a pass adds nothing.
        loop {
            if monitor.is_cancelled() {
                return Err(());
            }

            let mut progressed = false;
            for slot in greedy {
                if !state.decisions.selected(slot.source) {
                    continue;
                }

                let choice = slot
                    .patched
                    .iter()
                    .find(|p| state.decisions.selected(p.patch))
                    .map(|p| &p.choice)
                    .unwrap_or(&slot.original);

                if choice.candidates.is_empty()
                    || choice.candidates.iter().any(|&c| state.decisions.selected(c))
                {
                    continue;
                }

                let ordered = self.policy.order_candidates(self.pool, &choice.candidates);
                for &candidate in &ordered {
                    if state.decisions.conflicts(candidate as Literal) {
                        continue;
                    }
                    if let AttemptResult::Ok = self.attempt(state, candidate as Literal) {
                        progressed = true;
                        break;
                    }
                }
            }

            if !progressed {
                return Ok(());
            }
        }
    }

    /// Try one best-effort decision; on conflict revert to the state
    /// before the attempt.
    fn attempt(&self, state: &mut SolverState, literal: Literal) -> AttemptResult {
        let level = state.decisions.level();
        state.decisions.increment_level();

        if !state.decisions.decide(literal, None) {
            state.decisions.revert_to_level(level);
            return AttemptResult::Conflict(None);
        }

        match self.propagate(state) {
            Ok(()) => AttemptResult::Ok,
            Err(conflict_rule) => {
                let rule = state.rules.get(conflict_rule).cloned();
                state.decisions.revert_to_level(level);
                state.reset_propagate_index();
                AttemptResult::Conflict(rule)
            }
        }
    }
}

struct SolverState {
    rules: RuleSet,
    decisions: Decisions,
    watch_graph: WatchGraph,
    branches: Vec<Branch>,
    /// Next decision-queue entry to propagate.
    propagate_index: usize,
}

impl SolverState {
    fn new(rules: RuleSet) -> Self {
        let watch_graph = WatchGraph::from_rules(&rules);
        Self {
            rules,
            decisions: Decisions::new(),
            watch_graph,
            branches: Vec::new(),
            propagate_index: 0,
        }
    }

    fn reset_propagate_index(&mut self) {
        self.propagate_index = self.decisions.len();
    }
}

/// A decision point with untried alternatives.
struct Branch {
    level: u32,
    alternatives: Vec<UnitId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::InstallableUnit;
    use crate::monitor::{CancelFlag, NullMonitor};
    use provisio_version::{Version, VersionRange};
    use std::sync::Arc;

    fn v(major: u64, minor: u64, micro: u64) -> Version {
        Version::new(major, minor, micro)
    }

    fn pool_of(units: &[InstallableUnit]) -> Pool {
        let mut pool = Pool::new();
        for unit in units {
            pool.add_unit(Arc::new(unit.clone()));
        }
        pool
    }

    fn solve(pool: &Pool, rules: RuleSet) -> SolveOutcome {
        let policy = Policy::new();
        SatSolver::new(pool, &policy).solve(rules, &[], &[], &NullMonitor)
    }

    #[test]
    fn test_assertion_chain() {
        let mut a = InstallableUnit::new("a", v(1, 0, 0));
        a.requirements
            .push(Requirement::on_unit("b", VersionRange::any()));
        let b = InstallableUnit::new("b", v(1, 0, 0));
        let pool = pool_of(&[a, b]);

        let mut rules = RuleSet::new();
        rules.add(Rule::assertion(1, RuleKind::Root));
        rules.add(Rule::requires(1, vec![2]));

        match solve(&pool, rules) {
            SolveOutcome::Sat(solution) => assert_eq!(solution.selected, vec![1, 2]),
            other => panic!("expected solution, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_rule_is_unsat() {
        let pool = pool_of(&[InstallableUnit::new("a", v(1, 0, 0))]);
        let mut rules = RuleSet::new();
        rules.add(Rule::new(vec![], RuleKind::Root));

        assert!(matches!(solve(&pool, rules), SolveOutcome::Unsat(_)));
    }

    #[test]
    fn test_conflicting_assertions_are_unsat() {
        let pool = pool_of(&[InstallableUnit::new("a", v(1, 0, 0))]);
        let mut rules = RuleSet::new();
        rules.add(Rule::assertion(1, RuleKind::Root));
        rules.add(Rule::assertion(-1, RuleKind::Pinned));

        match solve(&pool, rules) {
            SolveOutcome::Unsat(conflict) => assert_eq!(conflict.rules.len(), 2),
            other => panic!("expected unsat, got {other:?}"),
        }
    }

    #[test]
    fn test_singleton_forces_unsat() {
        let a1 = InstallableUnit::new("a", v(1, 0, 0));
        let a2 = InstallableUnit::new("a", v(2, 0, 0));
        let pool = pool_of(&[a1, a2]);

        let mut rules = RuleSet::new();
        rules.add(Rule::assertion(1, RuleKind::Root));
        rules.add(Rule::assertion(2, RuleKind::Root));
        rules.add(Rule::singleton(vec![1, 2]));

        match solve(&pool, rules) {
            SolveOutcome::Unsat(conflict) => {
                assert!(conflict
                    .rules
                    .iter()
                    .any(|r| r.kind() == RuleKind::Singleton));
            }
            other => panic!("expected unsat, got {other:?}"),
        }
    }

    #[test]
    fn test_highest_version_chosen_among_providers() {
        let mut a = InstallableUnit::new("a", v(1, 0, 0));
        a.requirements
            .push(Requirement::on_unit("b", VersionRange::any()));
        let b1 = InstallableUnit::new("b", v(1, 0, 0));
        let b2 = InstallableUnit::new("b", v(1, 1, 0));
        let pool = pool_of(&[a, b1, b2]);

        let mut rules = RuleSet::new();
        rules.add(Rule::assertion(1, RuleKind::Root));
        rules.add(Rule::requires(1, vec![2, 3]));
        rules.add(Rule::singleton(vec![2, 3]));

        match solve(&pool, rules) {
            SolveOutcome::Sat(solution) => assert_eq!(solution.selected, vec![1, 3]),
            other => panic!("expected solution, got {other:?}"),
        }
    }

    #[test]
    fn test_backtracking_over_bad_choice() {
        // Root needs x; x has two providers. The preferred (higher) one
        // conflicts with a pinned unit, so the solver must fall back.
        let x1 = InstallableUnit::new("x", v(1, 0, 0));
        let x2 = InstallableUnit::new("x", v(2, 0, 0));
        let pinned = InstallableUnit::new("pinned", v(1, 0, 0));
        let pool = pool_of(&[x1, x2, pinned]);

        let mut rules = RuleSet::new();
        rules.add(Rule::new(vec![1, 2], RuleKind::Root)); // x1 or x2
        rules.add(Rule::assertion(3, RuleKind::Pinned));
        rules.add(Rule::prohibits(3, 2)); // pinned conflicts with x2

        match solve(&pool, rules) {
            SolveOutcome::Sat(solution) => {
                assert!(solution.selected.contains(&1));
                assert!(!solution.selected.contains(&2));
            }
            other => panic!("expected solution, got {other:?}"),
        }
    }

    #[test]
    fn test_soft_job_absorbs_conflict() {
        let a = InstallableUnit::new("a", v(1, 0, 0));
        let b = InstallableUnit::new("b", v(1, 0, 0));
        let pool = pool_of(&[a, b]);

        let mut rules = RuleSet::new();
        rules.add(Rule::assertion(1, RuleKind::Root));
        rules.add(Rule::prohibits(1, 2));

        let soft = vec![SoftJob {
            origin: SoftOrigin::RequestedAdd(2),
            candidates: vec![2],
        }];

        let policy = Policy::new();
        let solver = SatSolver::new(&pool, &policy);
        match solver.solve(rules, &soft, &[], &NullMonitor) {
            SolveOutcome::Sat(solution) => {
                assert_eq!(solution.selected, vec![1]);
                assert_eq!(solution.soft_failures.len(), 1);
            }
            other => panic!("expected solution, got {other:?}"),
        }
    }

    #[test]
    fn test_greedy_slot_pulls_satisfier() {
        let a = InstallableUnit::new("a", v(1, 0, 0));
        let b = InstallableUnit::new("b", v(1, 0, 0));
        let pool = pool_of(&[a, b]);

        let mut rules = RuleSet::new();
        rules.add(Rule::assertion(1, RuleKind::Root));

        let greedy = vec![GreedySlot {
            source: 1,
            original: GreedyChoice {
                requirement: Requirement::on_unit("b", VersionRange::any()).optional(),
                candidates: vec![2],
            },
            patched: Vec::new(),
        }];

        let policy = Policy::new();
        let solver = SatSolver::new(&pool, &policy);
        match solver.solve(rules, &[], &greedy, &NullMonitor) {
            SolveOutcome::Sat(solution) => assert_eq!(solution.selected, vec![1, 2]),
            other => panic!("expected solution, got {other:?}"),
        }
    }

    #[test]
    fn test_cancellation() {
        let pool = pool_of(&[InstallableUnit::new("a", v(1, 0, 0))]);
        let mut rules = RuleSet::new();
        rules.add(Rule::assertion(1, RuleKind::Root));

        let flag = CancelFlag::new();
        flag.cancel();

        let policy = Policy::new();
        let solver = SatSolver::new(&pool, &policy);
        assert!(matches!(
            solver.solve(rules, &[], &[], &flag),
            SolveOutcome::Cancelled
        ));
    }
}
