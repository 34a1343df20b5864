use super::component::{ComponentCodec, ComponentRegistry, SaveableComponent};
use super::guard::{LoadEvent, OperationGuard, OperationStatus};
use super::model::{SCOPE_COLLECTION, SCOPE_ID_FIELD};
use crate::config::SaveLoadParameters;
use crate::core::{Result, SaveLoadError};
use crate::migration::MigrationRegistry;
use crate::storage::{DocumentStore, Query};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

type LoadListener = Box<dyn Fn(LoadEvent) + Send + Sync>;

/// Saves live entities into versioned snapshot files and rebuilds them on load.
///
/// Each save writes the persistent (unscoped) entities plus the entities of
/// the current scope; each load reads the same two sets back, migrating every
/// component record from the version it was authored under to
/// [`SaveLoadParameters::app_version`].
///
/// Only one save or load runs at a time per service. Any overlapping request
/// fails with [`SaveLoadError::OperationInProgress`].
pub struct SaveLoadService {
    pub(crate) parameters: SaveLoadParameters,
    pub(crate) migrations: Arc<MigrationRegistry>,
    pub(crate) components: ComponentRegistry,
    pub(crate) type_mappings: HashMap<String, &'static str>,
    pub(crate) current_scope: Option<String>,
    pub(crate) guard: OperationGuard,
    listener: Option<LoadListener>,
}

impl SaveLoadService {
    pub fn new(parameters: SaveLoadParameters, migrations: Arc<MigrationRegistry>) -> Result<Self> {
        parameters.validate()?;
        Ok(Self {
            parameters,
            migrations,
            components: ComponentRegistry::new(),
            type_mappings: HashMap::new(),
            current_scope: None,
            guard: OperationGuard::new(),
            listener: None,
        })
    }

    pub fn parameters(&self) -> &SaveLoadParameters {
        &self.parameters
    }

    pub fn migrations(&self) -> &Arc<MigrationRegistry> {
        &self.migrations
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Makes `T` part of every snapshot.
    pub fn register_component<T: SaveableComponent>(&mut self) -> Result<()> {
        self.components.register::<T>()
    }

    /// Fluent variant of [`SaveLoadService::register_component`].
    pub fn with_component<T: SaveableComponent>(mut self) -> Result<Self> {
        self.register_component::<T>()?;
        Ok(self)
    }

    /// Loads records saved under `old_type_name` as `T`.
    pub fn register_type_mapping<T: SaveableComponent>(&mut self, old_type_name: impl Into<String>) {
        self.type_mappings.insert(old_type_name.into(), T::TYPE_NAME);
    }

    /// Changes the version used to stamp saves and to target migrations.
    pub fn set_app_version(&mut self, version: impl Into<String>) -> Result<()> {
        let version = version.into();
        crate::core::Version::parse(&version)?;
        self.parameters.app_version = version;
        Ok(())
    }

    pub fn set_current_scope(&mut self, scope: Option<String>) {
        self.current_scope = scope;
    }

    /// The scope saves and loads operate on. Falls back to the configured default.
    pub fn current_scope(&self) -> &str {
        self.current_scope
            .as_deref()
            .unwrap_or(&self.parameters.default_scope)
    }

    pub fn set_load_listener<F>(&mut self, listener: F)
    where
        F: Fn(LoadEvent) + Send + Sync + 'static,
    {
        self.listener = Some(Box::new(listener));
    }

    pub fn status(&self) -> OperationStatus {
        self.guard.status()
    }

    pub fn is_busy(&self) -> bool {
        self.guard.is_busy()
    }

    pub fn save_path(&self, save_name: &str) -> PathBuf {
        self.parameters.save_path(save_name)
    }

    /// Whether `save_name` holds a record for `scope_id`.
    pub fn has_scope_data(&self, save_name: &str, scope_id: &str) -> Result<bool> {
        let store = DocumentStore::open(self.save_path(save_name))?;
        let exists = store
            .collection(SCOPE_COLLECTION)
            .is_some_and(|scopes| scopes.exists(&Query::eq(SCOPE_ID_FIELD, scope_id)));
        store.close()?;
        Ok(exists)
    }

    /// Resolves a persisted type name: registered types first, then the fallback mappings.
    pub(crate) fn resolve_codec(&self, type_name: &str) -> Result<Arc<dyn ComponentCodec>> {
        if let Some(codec) = self.components.get(type_name) {
            return Ok(codec);
        }
        self.type_mappings
            .get(type_name)
            .and_then(|mapped| self.components.get(mapped))
            .ok_or_else(|| SaveLoadError::TypeResolutionFailed(type_name.to_string()))
    }

    pub(crate) fn notify(&self, event: LoadEvent) {
        if let Some(listener) = &self.listener {
            listener(event);
        }
    }
}

impl fmt::Debug for SaveLoadService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveLoadService")
            .field("parameters", &self.parameters)
            .field("components", &self.components)
            .field("type_mappings", &self.type_mappings)
            .field("current_scope", &self.current_scope)
            .field("status", &self.guard.status())
            .finish()
    }
}
