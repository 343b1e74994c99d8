use super::pool::UnitId;
use super::rule::Literal;

/// Assignment state during the solve.
///
/// A flat vector indexed by unit id gives O(1) lookups: 0 means
/// undecided, a positive value means selected at that level, negative
/// means rejected. Levels are stored as `level + 1` so level 0 decisions
/// do not collide with the undecided marker. The rule that forced each
/// decision is kept in a parallel vector for conflict analysis.
#[derive(Debug, Default)]
pub struct Decisions {
    map: Vec<i32>,
    reasons: Vec<Option<u32>>,
    queue: Vec<Literal>,
    level: u32,
}

impl Decisions {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn ensure_capacity(&mut self, unit: UnitId) {
        let idx = unit as usize;
        if idx >= self.map.len() {
            self.map.resize(idx + 1, 0);
            self.reasons.resize(idx + 1, None);
        }
    }

    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    #[inline]
    pub fn increment_level(&mut self) {
        self.level += 1;
    }

    /// Record a decision at the current level. Returns false when it
    /// contradicts an existing decision.
    pub fn decide(&mut self, literal: Literal, reason: Option<u32>) -> bool {
        let unit = literal.unsigned_abs() as UnitId;
        self.ensure_capacity(unit);

        let idx = unit as usize;
        let existing = self.map[idx];
        if existing != 0 {
            return (existing > 0) == (literal > 0);
        }

        let level_value = (self.level + 1) as i32;
        self.map[idx] = if literal > 0 { level_value } else { -level_value };
        self.reasons[idx] = reason;
        self.queue.push(literal);
        true
    }

    #[inline]
    pub fn satisfied(&self, literal: Literal) -> bool {
        let idx = literal.unsigned_abs() as usize;
        match self.map.get(idx) {
            Some(&d) if d != 0 => (d > 0) == (literal > 0),
            _ => false,
        }
    }

    #[inline]
    pub fn conflicts(&self, literal: Literal) -> bool {
        let idx = literal.unsigned_abs() as usize;
        match self.map.get(idx) {
            Some(&d) if d != 0 => (d > 0) != (literal > 0),
            _ => false,
        }
    }

    #[inline]
    pub fn decided(&self, unit: UnitId) -> bool {
        let idx = unit as usize;
        idx < self.map.len() && self.map[idx] != 0
    }

    #[inline]
    pub fn undecided(&self, unit: UnitId) -> bool {
        !self.decided(unit)
    }

    #[inline]
    pub fn selected(&self, unit: UnitId) -> bool {
        let idx = unit as usize;
        idx < self.map.len() && self.map[idx] > 0
    }

    #[inline]
    pub fn decision_level(&self, literal: Literal) -> Option<u32> {
        let idx = literal.unsigned_abs() as usize;
        match self.map.get(idx) {
            Some(&d) if d != 0 => Some(d.unsigned_abs() - 1),
            _ => None,
        }
    }

    /// The rule that forced this literal's unit, if any.
    pub fn reason(&self, literal: Literal) -> Option<u32> {
        let idx = literal.unsigned_abs() as usize;
        self.reasons.get(idx).copied().flatten()
    }

    /// Drop every decision made above the target level.
    pub fn revert_to_level(&mut self, target: u32) {
        let cutoff = (target + 1) as i32;
        for (idx, decision) in self.map.iter_mut().enumerate() {
            if *decision != 0 && (decision.unsigned_abs() as i32) > cutoff {
                *decision = 0;
                self.reasons[idx] = None;
            }
        }

        let map = &self.map;
        self.queue.retain(|literal| {
            let idx = literal.unsigned_abs() as usize;
            idx < map.len() && map[idx] != 0
        });

        self.level = target;
    }

    /// Unit ids decided positively, in id order.
    pub fn selected_units(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.map
            .iter()
            .enumerate()
            .filter(|(_, &d)| d > 0)
            .map(|(idx, _)| idx as UnitId)
    }

    pub fn queue(&self) -> &[Literal] {
        &self.queue
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decide_and_query() {
        let mut decisions = Decisions::new();

        assert!(decisions.decide(1, Some(0)));
        assert!(decisions.satisfied(1));
        assert!(!decisions.satisfied(-1));
        assert!(decisions.selected(1));

        assert!(decisions.decide(-2, Some(1)));
        assert!(decisions.satisfied(-2));
        assert!(!decisions.selected(2));
    }

    #[test]
    fn test_conflicting_decision_rejected() {
        let mut decisions = Decisions::new();
        decisions.decide(1, None);

        assert!(!decisions.decide(-1, None));
        assert!(decisions.conflicts(-1));
        assert!(!decisions.conflicts(1));
    }

    #[test]
    fn test_levels() {
        let mut decisions = Decisions::new();
        decisions.increment_level();
        decisions.decide(1, None);
        decisions.increment_level();
        decisions.decide(2, None);

        assert_eq!(decisions.decision_level(1), Some(1));
        assert_eq!(decisions.decision_level(2), Some(2));
        assert_eq!(decisions.decision_level(3), None);
    }

    #[test]
    fn test_revert() {
        let mut decisions = Decisions::new();
        decisions.increment_level();
        decisions.decide(1, None);
        decisions.increment_level();
        decisions.decide(2, None);
        decisions.increment_level();
        decisions.decide(3, None);

        decisions.revert_to_level(1);

        assert!(decisions.decided(1));
        assert!(decisions.undecided(2));
        assert!(decisions.undecided(3));
        assert_eq!(decisions.level(), 1);
        assert_eq!(decisions.len(), 1);
    }

    #[test]
    fn test_reason_lookup() {
        let mut decisions = Decisions::new();
        decisions.decide(1, Some(42));
        decisions.decide(2, None);

        assert_eq!(decisions.reason(1), Some(42));
        assert_eq!(decisions.reason(-1), Some(42));
        assert_eq!(decisions.reason(2), None);
    }

    #[test]
    fn test_selected_units() {
        let mut decisions = Decisions::new();
        decisions.decide(1, None);
        decisions.decide(-2, None);
        decisions.decide(3, None);

        let selected: Vec<_> = decisions.selected_units().collect();
        assert_eq!(selected, vec![1, 3]);
    }
}
