//! The type universe: every declared type, indexed by qualified name.
//!
//! Packages are loaded through [`PackageLoader`]s. Per-package loading has no
//! cross-package mutation, so [`UniverseBuilder::load_all`] runs loaders on a
//! bounded rayon pool and merges the results in loader order once every
//! package is in (the join point before graph construction).

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::QualifiedName;
use crate::types::{Capability, MethodDescriptor, TypeEntry};

/// Source of one package's type entries.
pub trait PackageLoader: Send + Sync {
    /// Package qualifier, used for diagnostics.
    fn package(&self) -> &str;

    /// Loads every entry declared by the package.
    fn load(&self) -> Result<Vec<TypeEntry>, CoreError>;
}

/// A package whose entries are already in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticPackage {
    pub package: String,
    pub types: Vec<TypeEntry>,
}

impl StaticPackage {
    pub fn new(package: impl Into<String>, types: Vec<TypeEntry>) -> Self {
        StaticPackage {
            package: package.into(),
            types,
        }
    }
}

impl PackageLoader for StaticPackage {
    fn package(&self) -> &str {
        &self.package
    }

    fn load(&self) -> Result<Vec<TypeEntry>, CoreError> {
        Ok(self.types.clone())
    }
}

/// Every declared type, in load order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Universe {
    entries: IndexMap<QualifiedName, TypeEntry>,
}

impl Universe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a universe from entries, rejecting duplicate names.
    pub fn from_entries(entries: impl IntoIterator<Item = TypeEntry>) -> Result<Self, CoreError> {
        let mut universe = Universe::new();
        for entry in entries {
            universe.insert(entry)?;
        }
        Ok(universe)
    }

    pub fn insert(&mut self, entry: TypeEntry) -> Result<(), CoreError> {
        if self.entries.contains_key(&entry.name) {
            return Err(CoreError::DuplicateType {
                name: entry.name.clone(),
            });
        }
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    pub fn get(&self, name: &QualifiedName) -> Option<&TypeEntry> {
        self.entries.get(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = &TypeEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the method `name` declares for `capability`, if any.
    pub fn capability(
        &self,
        name: &QualifiedName,
        capability: Capability,
    ) -> Option<&MethodDescriptor> {
        self.get(name).and_then(|e| e.method(capability))
    }
}

/// Loads packages concurrently into a [`Universe`].
#[derive(Debug, Clone, Copy)]
pub struct UniverseBuilder {
    max_workers: usize,
}

impl UniverseBuilder {
    pub fn new(max_workers: usize) -> Self {
        UniverseBuilder {
            max_workers: max_workers.max(1),
        }
    }

    /// Runs every loader on a pool of at most `max_workers` threads, then
    /// merges entries in loader order so the result does not depend on
    /// scheduling.
    pub fn load_all(&self, loaders: &[Box<dyn PackageLoader>]) -> Result<Universe, CoreError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_workers)
            .build()
            .map_err(|e| CoreError::WorkerPool {
                reason: e.to_string(),
            })?;

        let loaded: Vec<Result<Vec<TypeEntry>, CoreError>> =
            pool.install(|| loaders.par_iter().map(|loader| loader.load()).collect());

        let mut universe = Universe::new();
        for (loader, result) in loaders.iter().zip(loaded) {
            let entries = result?;
            tracing::debug!(
                package = loader.package(),
                types = entries.len(),
                "loaded package"
            );
            for entry in entries {
                universe.insert(entry)?;
            }
        }
        Ok(universe)
    }
}

impl Default for UniverseBuilder {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        UniverseBuilder::new(workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldDef, TypeRef};

    fn record(pkg: &str, name: &str) -> TypeEntry {
        TypeEntry::record(
            QualifiedName::new(pkg, name),
            vec![FieldDef::new("x", TypeRef::int())],
        )
    }

    struct FailingPackage;

    impl PackageLoader for FailingPackage {
        fn package(&self) -> &str {
            "broken"
        }

        fn load(&self) -> Result<Vec<TypeEntry>, CoreError> {
            Err(CoreError::PackageLoad {
                package: "broken".into(),
                reason: "parse error".into(),
            })
        }
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = Universe::from_entries(vec![record("m", "A"), record("m", "A")]).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateType { .. }));
    }

    #[test]
    fn capability_lookup() {
        let entry = record("m", "A").with_method(Capability::Validate, "Validate");
        let universe = Universe::from_entries(vec![entry]).unwrap();
        let name = QualifiedName::new("m", "A");
        assert_eq!(
            universe.capability(&name, Capability::Validate).unwrap().name,
            "Validate"
        );
        assert!(universe.capability(&name, Capability::Clone).is_none());
    }

    #[test]
    fn concurrent_load_merges_in_loader_order() {
        let loaders: Vec<Box<dyn PackageLoader>> = (0..8)
            .map(|i| {
                let pkg = format!("p{}", i);
                Box::new(StaticPackage::new(
                    pkg.clone(),
                    vec![record(&pkg, "A"), record(&pkg, "B")],
                )) as Box<dyn PackageLoader>
            })
            .collect();

        let universe = UniverseBuilder::new(3).load_all(&loaders).unwrap();
        assert_eq!(universe.len(), 16);
        let packages: Vec<&str> = universe.entries().map(|e| e.name.package.as_str()).collect();
        let mut sorted = packages.clone();
        sorted.sort_by_key(|p| p[1..].parse::<u32>().unwrap());
        assert_eq!(packages, sorted);
    }

    #[test]
    fn load_error_is_reported() {
        let loaders: Vec<Box<dyn PackageLoader>> = vec![
            Box::new(StaticPackage::new("ok", vec![record("ok", "A")])),
            Box::new(FailingPackage),
        ];
        let err = UniverseBuilder::new(2).load_all(&loaders).unwrap_err();
        assert!(matches!(err, CoreError::PackageLoad { .. }));
    }

    #[test]
    fn duplicate_across_packages_is_rejected() {
        let loaders: Vec<Box<dyn PackageLoader>> = vec![
            Box::new(StaticPackage::new("m", vec![record("m", "A")])),
            Box::new(StaticPackage::new("m2", vec![record("m", "A")])),
        ];
        assert!(matches!(
            UniverseBuilder::new(2).load_all(&loaders),
            Err(CoreError::DuplicateType { .. })
        ));
    }
}
