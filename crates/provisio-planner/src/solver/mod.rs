//! SAT machinery behind the projector.
//!
//! The projector encodes a slice and a change request into clauses over
//! one boolean per candidate unit; this module solves them:
//!
//! - [`Pool`]: candidate units indexed so ids double as SAT literals
//! - [`Rule`]/[`RuleSet`]: clauses with identity, kind and diagnostics
//! - [`Decisions`]: the assignment trail with levels and reasons
//! - [`WatchGraph`]: two-watched-literal propagation index
//! - [`Policy`]: candidate ordering (installed version, then highest)
//! - [`SatSolver`]: CDCL with first-UIP learning, branch minimization and
//!   a best-effort pass for optional roots and greedy requirements
//!
//! The solver is deliberately self-contained: it sees units only through
//! the pool and knows nothing about profiles, patches or filters. Those
//! concerns are compiled away by the projector before solving starts.

mod decisions;
mod policy;
mod pool;
mod rule;
mod rule_set;
mod sat;
mod watch_graph;

pub use decisions::Decisions;
pub use policy::Policy;
pub use pool::{Pool, UnitId};
pub use rule::{Literal, Rule, RuleKind};
pub use rule_set::RuleSet;
pub use sat::{
    ConflictInfo, GreedyChoice, GreedySlot, PatchedChoice, SatSolver, SoftFailure, SoftJob,
    SoftOrigin, SolveOutcome, Solution,
};
pub use watch_graph::{PropagateResult, Propagator, WatchGraph};
