//! Minimal entity store the orchestrator saves from and restores into.
//!
//! Entities are opaque handles; each entity owns at most one value per
//! component type. Filters return a collected list of handles so callers can
//! iterate and later remove matched entities without holding a borrow.

use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Opaque entity handle. Ids are never reused within one `World`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(u64);

impl Entity {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity#{}", self.0)
    }
}

/// Marks an entity as part of the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Saveable;

/// Tags an entity that was rebuilt from a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WasLoadedFromSave;

/// Binds an entity to a named scope (for example a level). Unbound entities are persistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeBound {
    pub scope_id: String,
}

impl ScopeBound {
    pub fn new(scope_id: impl Into<String>) -> Self {
        Self {
            scope_id: scope_id.into(),
        }
    }
}

type ComponentBox = Box<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct World {
    next_id: u64,
    entities: BTreeMap<Entity, HashMap<TypeId, ComponentBox>>,
    pending_removals: Vec<Entity>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_entity(&mut self) -> Entity {
        self.next_id += 1;
        let entity = Entity(self.next_id);
        self.entities.insert(entity, HashMap::new());
        entity
    }

    /// Removes an entity and all of its components. Returns `false` if it was not alive.
    pub fn remove_entity(&mut self, entity: Entity) -> bool {
        self.entities.remove(&entity).is_some()
    }

    /// Queues a removal that takes effect on the next [`World::commit`].
    pub fn remove_entity_deferred(&mut self, entity: Entity) {
        self.pending_removals.push(entity);
    }

    /// Applies deferred structural changes. Returns how many entities were removed.
    pub fn commit(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending_removals);
        pending
            .into_iter()
            .filter(|entity| self.remove_entity(*entity))
            .count()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Drops every entity. Used to tear the store down after a failed load.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.pending_removals.clear();
    }

    /// Attaches `value`, replacing any previous value of the same type.
    /// Returns `false` if the entity is not alive.
    pub fn insert<T: Any + Send + Sync>(&mut self, entity: Entity, value: T) -> bool {
        match self.entities.get_mut(&entity) {
            Some(components) => {
                components.insert(TypeId::of::<T>(), Box::new(value));
                true
            }
            None => false,
        }
    }

    pub fn get<T: Any + Send + Sync>(&self, entity: Entity) -> Option<&T> {
        self.entities
            .get(&entity)?
            .get(&TypeId::of::<T>())?
            .downcast_ref::<T>()
    }

    pub fn get_mut<T: Any + Send + Sync>(&mut self, entity: Entity) -> Option<&mut T> {
        self.entities
            .get_mut(&entity)?
            .get_mut(&TypeId::of::<T>())?
            .downcast_mut::<T>()
    }

    /// Detaches and returns a component.
    pub fn take<T: Any + Send + Sync>(&mut self, entity: Entity) -> Option<T> {
        let boxed = self.entities.get_mut(&entity)?.remove(&TypeId::of::<T>())?;
        boxed.downcast::<T>().ok().map(|value| *value)
    }

    pub fn has<T: Any + Send + Sync>(&self, entity: Entity) -> bool {
        self.entities
            .get(&entity)
            .is_some_and(|components| components.contains_key(&TypeId::of::<T>()))
    }

    /// Handles of every entity carrying `T`, in creation order.
    pub fn entities_with<T: Any + Send + Sync>(&self) -> Vec<Entity> {
        let type_id = TypeId::of::<T>();
        self.entities
            .iter()
            .filter(|(_, components)| components.contains_key(&type_id))
            .map(|(entity, _)| *entity)
            .collect()
    }

    pub fn component_count(&self, entity: Entity) -> usize {
        self.entities.get(&entity).map_or(0, HashMap::len)
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entities.len())
            .field("pending_removals", &self.pending_removals.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Health(i32);

    #[test]
    fn attach_read_and_take_components() {
        let mut world = World::new();
        let entity = world.create_entity();
        assert!(world.insert(entity, Health(10)));
        assert_eq!(world.get::<Health>(entity), Some(&Health(10)));

        world.get_mut::<Health>(entity).unwrap().0 = 7;
        assert_eq!(world.take::<Health>(entity), Some(Health(7)));
        assert!(!world.has::<Health>(entity));
        assert!(world.contains(entity));
    }

    #[test]
    fn filter_collects_matching_entities_in_creation_order() {
        let mut world = World::new();
        let a = world.create_entity();
        let b = world.create_entity();
        let c = world.create_entity();
        world.insert(a, Saveable);
        world.insert(c, Saveable);
        world.insert(b, Health(1));

        let matched = world.entities_with::<Saveable>();
        assert_eq!(matched, vec![a, c]);
        for entity in matched {
            world.remove_entity(entity);
        }
        assert_eq!(world.len(), 1);
    }

    #[test]
    fn deferred_removal_applies_on_commit() {
        let mut world = World::new();
        let entity = world.create_entity();
        world.remove_entity_deferred(entity);
        assert!(world.contains(entity));
        assert_eq!(world.commit(), 1);
        assert!(!world.contains(entity));
        assert_eq!(world.commit(), 0);
    }

    #[test]
    fn insert_on_dead_entity_is_rejected() {
        let mut world = World::new();
        let entity = world.create_entity();
        world.remove_entity(entity);
        assert!(!world.insert(entity, Health(1)));
        let fresh = world.create_entity();
        assert_ne!(fresh, entity);
    }
}
