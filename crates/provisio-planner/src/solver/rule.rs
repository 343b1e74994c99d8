use std::fmt;
use std::hash::{Hash, Hasher};

use crate::metadata::Requirement;

use super::pool::UnitId;

/// A literal in SAT terms: positive means "select the unit", negative
/// means "do not select it".
pub type Literal = i32;

/// Where a rule comes from. The kind drives decision priority and, on
/// failure, which explanation variant the rule maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// A requested addition (assertion) or a flexed at-least-one root.
    Root,
    /// An installed unit pinned in place, or a requested removal.
    Pinned,
    /// Mandatory requirement: if the unit is selected, a provider must be.
    UnitRequires,
    /// Prohibition: the unit and a matching provider cannot coexist.
    Prohibition,
    /// At most one version of a singleton id may be selected.
    Singleton,
    /// Patch-guarded requirement alternative.
    PatchRequires,
    /// Learned clause from conflict analysis.
    Learned,
}

impl RuleKind {
    /// Singleton rules watch every literal instead of two.
    pub fn is_singleton(&self) -> bool {
        matches!(self, RuleKind::Singleton)
    }
}

/// A SAT clause: a disjunction of literals, satisfied when at least one
/// literal is true.
///
/// - `[A]`: unit A must be selected
/// - `[-A]`: unit A must not be selected
/// - `[-A, B, C]`: if A is selected, B or C must be
/// - `[-A, -B]`: A and B cannot both be selected
#[derive(Clone)]
pub struct Rule {
    literals: Vec<Literal>,
    kind: RuleKind,
    id: u32,
    /// The unit whose metadata produced this rule, for diagnostics.
    source: Option<UnitId>,
    /// The requirement behind the rule, for explanations.
    requirement: Option<Requirement>,
    /// Set when the requirement had in-range providers that were excluded
    /// by their applicability filter, so it is reported as "filtered", not
    /// "missing".
    filtered: bool,
    disabled: bool,
}

impl Rule {
    pub fn new(literals: Vec<Literal>, kind: RuleKind) -> Self {
        Self {
            literals,
            kind,
            id: 0,
            source: None,
            requirement: None,
            filtered: false,
            disabled: false,
        }
    }

    /// A single-literal rule.
    pub fn assertion(literal: Literal, kind: RuleKind) -> Self {
        Self::new(vec![literal], kind)
    }

    /// If `source` is selected, one of `providers` must be.
    pub fn requires(source: UnitId, providers: Vec<UnitId>) -> Self {
        let mut literals = vec![-source];
        literals.extend(providers);
        Self::new(literals, RuleKind::UnitRequires)
    }

    /// `source` and `provider` cannot both be selected.
    pub fn prohibits(source: UnitId, provider: UnitId) -> Self {
        Self::new(vec![-source, -provider], RuleKind::Prohibition)
    }

    /// At most one of `units` may be selected.
    pub fn singleton(units: Vec<UnitId>) -> Self {
        let literals: Vec<_> = units.into_iter().map(|u| -u).collect();
        Self::new(literals, RuleKind::Singleton)
    }

    pub fn learned(literals: Vec<Literal>) -> Self {
        Self::new(literals, RuleKind::Learned)
    }

    pub fn with_source(mut self, unit: UnitId) -> Self {
        self.source = Some(unit);
        self
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirement = Some(requirement);
        self
    }

    pub fn mark_filtered(mut self) -> Self {
        self.filtered = true;
        self
    }

    pub fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn literals(&self) -> &[Literal] {
        &self.literals
    }

    pub fn source(&self) -> Option<UnitId> {
        self.source
    }

    pub fn requirement(&self) -> Option<&Requirement> {
        self.requirement.as_ref()
    }

    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    pub fn is_assertion(&self) -> bool {
        self.literals.len() == 1
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn disable(&mut self) {
        self.disabled = true;
    }

    pub fn enable(&mut self) {
        self.disabled = false;
    }

    /// Order-independent hash of the literals, for deduplication.
    pub fn literal_hash(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        let mut sorted = self.literals.clone();
        sorted.sort_unstable();
        sorted.hash(&mut hasher);
        hasher.finish()
    }

    /// Whether two rules have the same literals regardless of order.
    pub fn equals_literals(&self, other: &Rule) -> bool {
        if self.literals.len() != other.literals.len() {
            return false;
        }
        let mut a = self.literals.clone();
        let mut b = other.literals.clone();
        a.sort_unstable();
        b.sort_unstable();
        a == b
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rule({:?}, {:?})", self.kind, self.literals)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            RuleKind::Root => "root",
            RuleKind::Pinned => "pinned",
            RuleKind::UnitRequires => "requires",
            RuleKind::Prohibition => "prohibits",
            RuleKind::Singleton => "singleton",
            RuleKind::PatchRequires => "patch-requires",
            RuleKind::Learned => "learned",
        };
        let literals: Vec<String> = self
            .literals
            .iter()
            .map(|&l| {
                if l > 0 {
                    format!("+{l}")
                } else {
                    l.to_string()
                }
            })
            .collect();
        write!(f, "({kind}) [{}]", literals.join(" | "))
    }
}
