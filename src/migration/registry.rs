use crate::core::{Document, Result, SaveLoadError, Version};
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// A document transform registered for one component type and version range.
pub type MigrationFn = Arc<dyn Fn(Document) -> anyhow::Result<Document> + Send + Sync>;

/// One registered migration: `transform` upgrades documents authored at
/// `from_version` to the shape expected at `to_version`.
#[derive(Clone)]
pub struct MigrationStep {
    pub from_version: Version,
    pub to_version: Version,
    pub(crate) transform: MigrationFn,
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("from_version", &self.from_version)
            .field("to_version", &self.to_version)
            .finish()
    }
}

impl MigrationStep {
    /// Parses and validates a range. `from` must be strictly lower than `to`.
    pub fn new(from_version: &str, to_version: &str, transform: MigrationFn) -> Result<Self> {
        let from = Version::parse(from_version)?;
        let to = Version::parse(to_version)?;
        if from >= to {
            return Err(SaveLoadError::InvalidRange {
                from: from_version.to_string(),
                to: to_version.to_string(),
            });
        }
        Ok(Self {
            from_version: from,
            to_version: to,
            transform,
        })
    }

    fn same_range(&self, other: &MigrationStep) -> bool {
        self.from_version == other.from_version && self.to_version == other.to_version
    }
}

/// Process-wide table of migrations keyed by component type name.
///
/// Each type's list is kept sorted ascending by `from_version`. Registration
/// and application hold the same lock, so a transform must not call back into
/// the registry it is running under.
#[derive(Default)]
pub struct MigrationRegistry {
    migrations: Mutex<HashMap<String, Vec<MigrationStep>>>,
}

impl fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("MigrationRegistry");
        if let Ok(migrations) = self.migrations.lock() {
            debug.field("component_types", &migrations.len());
        }
        debug.finish()
    }
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a single migration for `component_type`.
    pub fn register<F>(
        &self,
        component_type: &str,
        from_version: &str,
        to_version: &str,
        transform: F,
    ) -> Result<()>
    where
        F: Fn(Document) -> anyhow::Result<Document> + Send + Sync + 'static,
    {
        let step = MigrationStep::new(from_version, to_version, Arc::new(transform))?;
        self.register_steps(component_type, vec![step])
    }

    /// Registers several steps for one type. Either all of them are inserted or none is.
    pub fn register_steps(&self, component_type: &str, steps: Vec<MigrationStep>) -> Result<()> {
        let mut migrations = self.migrations.lock()?;
        let existing = migrations.get(component_type).map(Vec::as_slice).unwrap_or(&[]);

        for (index, step) in steps.iter().enumerate() {
            let clashes_with_registered = existing.iter().any(|other| other.same_range(step));
            let clashes_with_batch = steps[..index].iter().any(|other| other.same_range(step));
            if clashes_with_registered || clashes_with_batch {
                return Err(SaveLoadError::DuplicateMigration {
                    component_type: component_type.to_string(),
                    from: step.from_version.to_string(),
                    to: step.to_version.to_string(),
                });
            }
        }

        let list = migrations.entry(component_type.to_string()).or_default();
        list.extend(steps);
        list.sort_by(|a, b| a.from_version.cmp(&b.from_version));
        Ok(())
    }

    pub fn has_migrations(&self, component_type: &str) -> Result<bool> {
        let migrations = self.migrations.lock()?;
        Ok(migrations
            .get(component_type)
            .is_some_and(|list| !list.is_empty()))
    }

    /// Registered ranges for a type, in application order.
    pub fn ranges(&self, component_type: &str) -> Result<Vec<(Version, Version)>> {
        let migrations = self.migrations.lock()?;
        Ok(migrations
            .get(component_type)
            .map(|list| {
                list.iter()
                    .map(|step| (step.from_version, step.to_version))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Upgrades `document` from `original_version` to `current_version`.
    ///
    /// Only migrations whose whole range lies inside
    /// `[original_version, current_version]` are applied, in ascending
    /// `from_version` order, each receiving the previous step's output.
    /// An absent document, a type with no migrations, or an empty selection
    /// returns the input unchanged.
    pub fn apply(
        &self,
        component_type: &str,
        original_version: &str,
        current_version: &str,
        document: Option<Document>,
    ) -> Result<Option<Document>> {
        let Some(document) = document else {
            return Ok(None);
        };

        // Registration and application are serialized on the same lock.
        let migrations = self.migrations.lock()?;
        let Some(all) = migrations.get(component_type).filter(|list| !list.is_empty()) else {
            return Ok(Some(document));
        };

        let from = Version::parse(original_version)?;
        let to = Version::parse(current_version)?;
        let mut chain = all
            .iter()
            .filter(|step| step.from_version >= from && step.to_version <= to)
            .peekable();

        if chain.peek().is_none() {
            debug!(
                "No applicable migrations for {} (v{} -> v{})",
                component_type, original_version, current_version
            );
            return Ok(Some(document));
        }

        let mut result = document;
        for step in chain {
            debug!(
                "Applying migration {} v{} -> v{}",
                component_type, step.from_version, step.to_version
            );
            result = (step.transform)(result).map_err(|err| SaveLoadError::MigrationFailed {
                component_type: component_type.to_string(),
                cause: format!("v{} -> v{}: {:#}", step.from_version, step.to_version, err),
            })?;
        }

        Ok(Some(result))
    }

    /// Like [`MigrationRegistry::apply`] for a document that is always present.
    pub fn apply_document(
        &self,
        component_type: &str,
        original_version: &str,
        current_version: &str,
        document: Document,
    ) -> Result<Document> {
        let migrated = self.apply(
            component_type,
            original_version,
            current_version,
            Some(document),
        )?;
        migrated.ok_or_else(|| SaveLoadError::MigrationFailed {
            component_type: component_type.to_string(),
            cause: "migration chain produced no document".to_string(),
        })
    }
}
