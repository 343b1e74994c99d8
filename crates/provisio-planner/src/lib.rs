//! Dependency-resolution planner for installable units.
//!
//! Given a profile (the current install state), a change request (units
//! to add and remove) and a set of metadata sources, the planner computes
//! a consistent target state as an ordered operand plan, or a failing
//! plan with a structured explanation of the conflict. The pipeline is
//! slicer (bound the candidate universe) → projector (encode into SAT
//! clauses and solve) → plan builder (diff old and new state).

pub mod context;
pub mod error;
pub mod explanation;
pub mod filter;
pub mod flexer;
pub mod metadata;
pub mod monitor;
pub mod plan;
pub mod planner;
pub mod profile;
pub mod projector;
pub mod repository;
pub mod request;
pub mod slicer;
pub mod solver;
pub mod status;

pub use context::ProvisioningContext;
pub use error::{PlannerError, Result};
pub use explanation::Explanation;
pub use filter::{Environment, Filter, FilterError};
pub use flexer::{FlexerPolicy, RequestFlexer};
pub use metadata::{
    Capability, InstallableUnit, PatchInfo, Requirement, RequirementChange, UnitKey,
    UpdateDescriptor, UNIT_NAMESPACE,
};
pub use monitor::{CancelFlag, Monitor, NullMonitor};
pub use plan::{Operand, PlanSummary, ProvisioningPlan};
pub use planner::Planner;
pub use profile::{
    Profile, INCLUSION_OPTIONAL, INCLUSION_STRICT, PROP_INCLUSION_RULE, PROP_SHARED_BASE,
};
pub use projector::Projector;
pub use repository::{InMemoryRepository, MetadataSource};
pub use request::{InclusionRule, ProfileChangeRequest};
pub use slicer::{Slice, Slicer};
pub use status::{PlanStatus, RequestKind, RequestStatus, Severity};

pub use provisio_version::{Version, VersionError, VersionRange};
