//! Persisted snapshot records.

use crate::core::Document;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version assumed for component records saved without one.
pub const DEFAULT_AUTHORED_VERSION: &str = "0.0.1";

/// Collection holding the singleton world record of a save.
pub const WORLD_COLLECTION: &str = "world";
/// Collection holding one record per saved scope.
pub const SCOPE_COLLECTION: &str = "scopes";
/// Field scope records are queried by.
pub const SCOPE_ID_FIELD: &str = "scope_id";

/// One serialized component instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authored_version: Option<String>,
    pub payload: Document,
}

impl ComponentRecord {
    pub fn authored_version(&self) -> &str {
        self.authored_version
            .as_deref()
            .unwrap_or(DEFAULT_AUTHORED_VERSION)
    }
}

/// Components of one entity, in the order they were saved. Never persisted empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub components: Vec<ComponentRecord>,
}

impl EntityRecord {
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Entities not bound to any scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    #[serde(rename = "_id")]
    pub save_id: String,
    pub saved_at: DateTime<Utc>,
    pub persistent_entities: Vec<EntityRecord>,
}

impl WorldSnapshot {
    pub fn new(save_id: impl Into<String>) -> Self {
        Self {
            save_id: save_id.into(),
            saved_at: Utc::now(),
            persistent_entities: Vec::new(),
        }
    }
}

/// Entities bound to one named scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeSnapshot {
    #[serde(rename = "_id")]
    pub record_id: Uuid,
    pub scope_id: String,
    pub entities: Vec<EntityRecord>,
}

impl ScopeSnapshot {
    pub fn new(scope_id: impl Into<String>) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            scope_id: scope_id.into(),
            entities: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_authored_version_defaults() {
        let record: ComponentRecord =
            serde_json::from_value(json!({"type_name": "game::Hp", "payload": {"hp": 1}}))
                .unwrap();
        assert_eq!(record.authored_version(), DEFAULT_AUTHORED_VERSION);
    }

    #[test]
    fn snapshot_ids_map_to_record_identity() {
        let world = serde_json::to_value(WorldSnapshot::new("slot")).unwrap();
        assert_eq!(world.get("_id"), Some(&json!("slot")));

        let scope = serde_json::to_value(ScopeSnapshot::new("level-1")).unwrap();
        assert!(scope.get("_id").is_some());
        assert_eq!(scope.get(SCOPE_ID_FIELD), Some(&json!("level-1")));
    }
}
