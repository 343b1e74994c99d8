//! Metadata sources.
//!
//! The planner consumes unit metadata through the narrow [`MetadataSource`]
//! interface; where the units actually come from (remote repositories,
//! local caches, generated metadata) is outside the core.

use std::sync::Arc;

use crate::error::PlannerError;
use crate::filter::Filter;
use crate::metadata::InstallableUnit;

pub trait MetadataSource {
    /// All units matching the predicate.
    fn query(&self, matcher: &dyn Fn(&InstallableUnit) -> bool) -> Vec<Arc<InstallableUnit>>;
}

/// A metadata source over a fixed in-memory unit set.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    units: Vec<Arc<InstallableUnit>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_units(units: impl IntoIterator<Item = InstallableUnit>) -> Self {
        Self {
            units: units.into_iter().map(Arc::new).collect(),
        }
    }

    /// Load a repository from a JSON array of unit descriptors. Filter
    /// expressions are validated up front so malformed metadata is
    /// rejected at load time rather than silently pruned while planning.
    pub fn from_json(json: &str) -> Result<Self, PlannerError> {
        let units: Vec<InstallableUnit> = serde_json::from_str(json)?;
        for unit in &units {
            if let Some(expr) = &unit.filter {
                Filter::parse(expr)?;
            }
            for requirement in &unit.requirements {
                if let Some(expr) = &requirement.filter {
                    Filter::parse(expr)?;
                }
            }
        }
        Ok(Self::with_units(units))
    }

    pub fn add(&mut self, unit: InstallableUnit) -> Arc<InstallableUnit> {
        let unit = Arc::new(unit);
        self.units.push(unit.clone());
        unit
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl MetadataSource for InMemoryRepository {
    fn query(&self, matcher: &dyn Fn(&InstallableUnit) -> bool) -> Vec<Arc<InstallableUnit>> {
        self.units
            .iter()
            .filter(|u| matcher(u))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisio_version::Version;

    #[test]
    fn test_query_with_predicate() {
        let mut repo = InMemoryRepository::new();
        repo.add(InstallableUnit::new("a", Version::new(1, 0, 0)));
        repo.add(InstallableUnit::new("a", Version::new(2, 0, 0)));
        repo.add(InstallableUnit::new("b", Version::new(1, 0, 0)));

        let all = repo.query(&|_| true);
        assert_eq!(all.len(), 3);

        let only_a = repo.query(&|u| u.id == "a");
        assert_eq!(only_a.len(), 2);
    }

    #[test]
    fn test_from_json() {
        let repo = InMemoryRepository::from_json(
            r#"[
                {"id": "com.example.a", "version": "1.0.0",
                 "requirements": [{"namespace": "unit", "name": "com.example.b",
                                   "range": "[1.0.0,2.0.0)"}]},
                {"id": "com.example.b", "version": "1.1.0", "singleton": true}
            ]"#,
        )
        .unwrap();

        assert_eq!(repo.len(), 2);
        let b = repo.query(&|u| u.id == "com.example.b");
        assert!(b[0].singleton);
    }

    #[test]
    fn test_from_json_rejects_malformed_filter() {
        let result = InMemoryRepository::from_json(
            r#"[{"id": "a", "version": "1.0.0", "filter": "(os=linux"}]"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_from_json_rejects_bad_version() {
        let result = InMemoryRepository::from_json(r#"[{"id": "a", "version": "not-a-version"}]"#);
        assert!(result.is_err());
    }
}
