//! Saveable component contract and the per-type capability registry.

use crate::core::{Document, Result, SaveLoadError, decode_component, encode_component};
use crate::world::{Entity, World};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A component that takes part in snapshots.
///
/// `TYPE_NAME` is persisted with every record and must stay stable across
/// releases; renamed types keep loading through
/// [`SaveLoadService::register_type_mapping`](crate::SaveLoadService::register_type_mapping).
pub trait SaveableComponent: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE_NAME: &'static str;

    /// Runs right before the component is serialized. Return `true` when the
    /// hook queued structural changes that must be committed before reading.
    fn pre_save(&mut self, _entity: Entity, _world: &mut World) -> bool {
        false
    }

    /// `Some(priority)` opts into [`SaveableComponent::post_load`]. Lower runs first.
    fn post_load_priority(&self) -> Option<i32> {
        None
    }

    /// Runs once every component of the entity has been attached.
    fn post_load(&mut self, _entity: Entity, _world: &mut World) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Type-erased save/load capabilities of one component type.
pub(crate) trait ComponentCodec: Send + Sync {
    fn type_name(&self) -> &'static str;

    /// Runs the pre-save hook and encodes the component. `None` if it is not attached.
    fn save(&self, world: &mut World, entity: Entity) -> Option<Result<Document>>;

    /// Decodes and attaches the component, returning its post-load priority if it has a hook.
    fn load(&self, world: &mut World, entity: Entity, document: Document) -> Result<Option<i32>>;

    fn post_load(&self, world: &mut World, entity: Entity) -> Result<()>;
}

struct TypedCodec<T>(PhantomData<fn() -> T>);

impl<T: SaveableComponent> ComponentCodec for TypedCodec<T> {
    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn save(&self, world: &mut World, entity: Entity) -> Option<Result<Document>> {
        let mut value = world.take::<T>(entity)?;
        let resync = value.pre_save(entity, world);
        world.insert(entity, value);
        if resync {
            world.commit();
        }
        let value = world.get::<T>(entity)?;
        Some(encode_component(T::TYPE_NAME, value))
    }

    fn load(&self, world: &mut World, entity: Entity, document: Document) -> Result<Option<i32>> {
        let value: T = decode_component(T::TYPE_NAME, document)?;
        let priority = value.post_load_priority();
        world.insert(entity, value);
        Ok(priority)
    }

    fn post_load(&self, world: &mut World, entity: Entity) -> Result<()> {
        let Some(mut value) = world.take::<T>(entity) else {
            return Err(SaveLoadError::PostLoadFailed {
                type_name: T::TYPE_NAME.to_string(),
                cause: format!("component is no longer attached to {}", entity),
            });
        };
        let outcome = value.post_load(entity, world);
        world.insert(entity, value);
        outcome.map_err(|err| SaveLoadError::PostLoadFailed {
            type_name: T::TYPE_NAME.to_string(),
            cause: format!("{:#}", err),
        })
    }
}

/// Maps persisted type names to the codec of a concrete component type.
/// Codecs are built once at registration; save iterates them in registration order.
#[derive(Default)]
pub struct ComponentRegistry {
    by_name: HashMap<&'static str, Arc<dyn ComponentCodec>>,
    ordered: Vec<Arc<dyn ComponentCodec>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: SaveableComponent>(&mut self) -> Result<()> {
        if self.by_name.contains_key(T::TYPE_NAME) {
            return Err(SaveLoadError::DuplicateComponentType(
                T::TYPE_NAME.to_string(),
            ));
        }
        let codec: Arc<dyn ComponentCodec> = Arc::new(TypedCodec::<T>(PhantomData));
        self.by_name.insert(T::TYPE_NAME, codec.clone());
        self.ordered.push(codec);
        Ok(())
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.by_name.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.ordered.iter().map(|codec| codec.type_name())
    }

    pub(crate) fn get(&self, type_name: &str) -> Option<Arc<dyn ComponentCodec>> {
        self.by_name.get(type_name).cloned()
    }

    pub(crate) fn codecs(&self) -> &[Arc<dyn ComponentCodec>] {
        &self.ordered
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.type_names()).finish()
    }
}
