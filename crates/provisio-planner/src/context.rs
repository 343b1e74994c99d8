//! The provisioning context.
//!
//! Everything a planning call needs beyond the profile and the request is
//! carried explicitly in a context object: which metadata sources make up
//! the candidate universe, extra units injected for this call only,
//! environment property overrides for filter evaluation, and whether to
//! spend time generating structured explanations on failure.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::filter::Environment;
use crate::metadata::{InstallableUnit, UnitKey};
use crate::profile::Profile;
use crate::repository::MetadataSource;

pub struct ProvisioningContext {
    sources: Vec<Arc<dyn MetadataSource>>,
    extra_units: Vec<Arc<InstallableUnit>>,
    env: IndexMap<String, String>,
    explain: bool,
}

impl ProvisioningContext {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            extra_units: Vec::new(),
            env: IndexMap::new(),
            explain: true,
        }
    }

    pub fn add_source(&mut self, source: Arc<dyn MetadataSource>) -> &mut Self {
        self.sources.push(source);
        self
    }

    pub fn add_extra_unit(&mut self, unit: Arc<InstallableUnit>) -> &mut Self {
        self.extra_units.push(unit);
        self
    }

    pub fn set_env_property(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Toggle structured explanation generation on failing plans. Enabled
    /// by default; disabling trades explanation quality for solve time.
    pub fn set_explain(&mut self, explain: bool) -> &mut Self {
        self.explain = explain;
        self
    }

    pub fn explanation_enabled(&self) -> bool {
        self.explain
    }

    /// The candidate universe: every unit from every source plus the
    /// context's extra units, deduplicated by identity, in source order.
    pub fn universe(&self) -> Vec<Arc<InstallableUnit>> {
        let mut seen: HashSet<UnitKey> = HashSet::new();
        let mut universe = Vec::new();

        for source in &self.sources {
            for unit in source.query(&|_| true) {
                if seen.insert(unit.key()) {
                    universe.push(unit);
                }
            }
        }
        for unit in &self.extra_units {
            if seen.insert(unit.key()) {
                universe.push(unit.clone());
            }
        }

        universe
    }

    /// The filter environment for a profile: profile properties overlaid
    /// with the context's overrides (context wins).
    pub fn environment(&self, profile: &Profile) -> Environment {
        let mut properties = profile.properties.clone();
        for (key, value) in &self.env {
            properties.insert(key.clone(), value.clone());
        }
        Environment::new(properties)
    }
}

impl Default for ProvisioningContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use provisio_version::Version;

    #[test]
    fn test_universe_deduplicates_across_sources() {
        let mut first = InMemoryRepository::new();
        first.add(InstallableUnit::new("a", Version::new(1, 0, 0)));
        let mut second = InMemoryRepository::new();
        second.add(InstallableUnit::new("a", Version::new(1, 0, 0)));
        second.add(InstallableUnit::new("b", Version::new(1, 0, 0)));

        let mut context = ProvisioningContext::new();
        context.add_source(Arc::new(first)).add_source(Arc::new(second));
        context.add_extra_unit(Arc::new(InstallableUnit::new("c", Version::new(1, 0, 0))));

        let universe = context.universe();
        let ids: Vec<&str> = universe.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_environment_overlay() {
        let mut profile = Profile::new("default");
        profile.set_property("os", "linux");
        profile.set_property("arch", "x86_64");

        let mut context = ProvisioningContext::new();
        context.set_env_property("arch", "aarch64");

        let env = context.environment(&profile);
        assert_eq!(env.property("os"), Some("linux"));
        assert_eq!(env.property("arch"), Some("aarch64"));
    }
}
