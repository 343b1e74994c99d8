//! Version values and version ranges for installable units.
//!
//! Unit versions form a single totally ordered sequence of
//! `major.minor.micro[.qualifier]` values. Ranges are intervals over that
//! order with inclusive or exclusive bounds on either side.

mod range;
mod version;

pub use range::VersionRange;
pub use version::{Version, VersionError};
