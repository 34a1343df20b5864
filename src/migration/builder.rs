use super::registry::{MigrationFn, MigrationRegistry, MigrationStep};
use crate::core::document::resolve_parent_mut;
use crate::core::{Document, Result, SaveLoadError};
use crate::snapshot::SaveableComponent;
use anyhow::Context;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;

/// Marker field written by [`MigrationBuilder::change_data_type`].
pub const ORIGINAL_TYPE_FIELD: &str = "__original_type";

struct PendingRange {
    from_version: String,
    to_version: String,
    edits: Vec<MigrationFn>,
}

/// Fluent construction of migrations for one component type.
///
/// Edits accumulate under the range set by `from_version`/`to_version` and
/// nothing touches the registry until [`MigrationBuilder::register`]. Edits
/// sharing a range are composed, in call order, into a single migration for
/// that range.
///
/// ```
/// use ecs_saveload::{MigrationBuilder, MigrationRegistry};
/// use serde_json::json;
///
/// # fn main() -> ecs_saveload::Result<()> {
/// let registry = MigrationRegistry::new();
/// MigrationBuilder::new("game::Health")
///     .from_version("1.0.0")
///     .to_version("1.1.0")
///     .rename_field("hp", "current")
///     .add_field_if_absent("max", |_| json!(100))
///     .register(&registry)?;
/// # Ok(())
/// # }
/// ```
pub struct MigrationBuilder {
    component_type: String,
    from_version: Option<String>,
    to_version: Option<String>,
    pending: Vec<PendingRange>,
    error: Option<SaveLoadError>,
}

impl MigrationBuilder {
    pub fn new(component_type: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            from_version: None,
            to_version: None,
            pending: Vec::new(),
            error: None,
        }
    }

    /// Builder keyed by the component's stable type name.
    pub fn for_component<T: SaveableComponent>() -> Self {
        Self::new(T::TYPE_NAME)
    }

    pub fn component_type(&self) -> &str {
        &self.component_type
    }

    pub fn from_version(mut self, version: impl Into<String>) -> Self {
        self.from_version = Some(version.into());
        self
    }

    pub fn to_version(mut self, version: impl Into<String>) -> Self {
        self.to_version = Some(version.into());
        self
    }

    /// Adds an arbitrary transform under the current range.
    pub fn with_migration<F>(mut self, transform: F) -> Self
    where
        F: Fn(Document) -> anyhow::Result<Document> + Send + Sync + 'static,
    {
        let range = match (self.from_version.as_deref(), self.to_version.as_deref()) {
            (Some(from), Some(to)) if !from.is_empty() && !to.is_empty() => {
                Some((from.to_string(), to.to_string()))
            }
            _ => None,
        };
        let Some((from, to)) = range else {
            if self.error.is_none() {
                self.error = Some(SaveLoadError::IncompleteRange(self.component_type.clone()));
            }
            return self;
        };

        let edit: MigrationFn = Arc::new(transform);
        match self
            .pending
            .iter_mut()
            .find(|range| range.from_version == from && range.to_version == to)
        {
            Some(range) => range.edits.push(edit),
            None => self.pending.push(PendingRange {
                from_version: from,
                to_version: to,
                edits: vec![edit],
            }),
        }
        self
    }

    /// Moves `old_name` to `new_name`. Documents without `old_name` are left as is.
    pub fn rename_field(self, old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        let old_name = old_name.into();
        let new_name = new_name.into();
        self.with_migration(move |mut doc| {
            if let Some(value) = doc.remove(&old_name) {
                doc.insert(new_name.clone(), value);
            }
            Ok(doc)
        })
    }

    /// Rewrites the raw value of `field` when present.
    pub fn convert_field<F>(self, field: impl Into<String>, converter: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        let field = field.into();
        self.with_migration(move |mut doc| {
            if let Some(value) = doc.remove(&field) {
                doc.insert(field.clone(), converter(value));
            }
            Ok(doc)
        })
    }

    /// Inserts `field` with a value computed from the document, unless it already exists.
    pub fn add_field_if_absent<F>(self, field: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Document) -> Value + Send + Sync + 'static,
    {
        let field = field.into();
        self.with_migration(move |mut doc| {
            if !doc.contains_key(&field) {
                let value = factory(&doc);
                doc.insert(field.clone(), value);
            }
            Ok(doc)
        })
    }

    pub fn remove_field(self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.with_migration(move |mut doc| {
            doc.remove(&field);
            Ok(doc)
        })
    }

    /// Runs a check against the document without changing it. An error aborts the chain.
    pub fn validate<F>(self, check: F) -> Self
    where
        F: Fn(&Document) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.with_migration(move |doc| {
            check(&doc)?;
            Ok(doc)
        })
    }

    /// Records the previous type name in `__original_type`, then hands the
    /// document to `converter` to reshape it for the new type.
    pub fn change_data_type<F>(self, old_type_name: impl Into<String>, converter: F) -> Self
    where
        F: Fn(Document) -> anyhow::Result<Document> + Send + Sync + 'static,
    {
        let old_type_name = old_type_name.into();
        self.with_migration(move |mut doc| {
            doc.insert(
                ORIGINAL_TYPE_FIELD.to_string(),
                Value::String(old_type_name.clone()),
            );
            converter(doc)
        })
    }

    /// Replaces `field` with `new_value` when its decoded value equals `old_value`.
    pub fn replace_value<V>(self, field: impl Into<String>, old_value: V, new_value: V) -> Self
    where
        V: Serialize + DeserializeOwned + PartialEq + Send + Sync + 'static,
    {
        let field = field.into();
        self.with_migration(move |mut doc| {
            replace_if_equal(&mut doc, &field, &old_value, &new_value)?;
            Ok(doc)
        })
    }

    /// Replaces `field` with `factory(current)` when `predicate(current)` holds.
    pub fn replace_value_if<V, P, F>(self, field: impl Into<String>, predicate: P, factory: F) -> Self
    where
        V: Serialize + DeserializeOwned + 'static,
        P: Fn(&V) -> bool + Send + Sync + 'static,
        F: Fn(V) -> V + Send + Sync + 'static,
    {
        let field = field.into();
        self.with_migration(move |mut doc| {
            if let Some(slot) = doc.get_mut(&field) {
                let current: V = decode_value(&field, slot)?;
                if predicate(&current) {
                    *slot = encode_value(&field, &factory(current))?;
                }
            }
            Ok(doc)
        })
    }

    /// Decodes `field` as `A` and stores `converter(a)` in its place.
    pub fn convert_value<A, B, F>(self, field: impl Into<String>, converter: F) -> Self
    where
        A: DeserializeOwned + 'static,
        B: Serialize + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        let field = field.into();
        self.with_migration(move |mut doc| {
            if let Some(slot) = doc.get_mut(&field) {
                let current: A = decode_value(&field, slot)?;
                *slot = encode_value(&field, &converter(current))?;
            }
            Ok(doc)
        })
    }

    /// Like [`MigrationBuilder::replace_value`] for a dot-separated path of nested
    /// mappings. Missing segments and non-mapping intermediates leave the document untouched.
    pub fn replace_nested_value<V>(self, path: impl Into<String>, old_value: V, new_value: V) -> Self
    where
        V: Serialize + DeserializeOwned + PartialEq + Send + Sync + 'static,
    {
        let path = path.into();
        self.with_migration(move |mut doc| {
            if let Some((parent, leaf)) = resolve_parent_mut(&mut doc, &path) {
                replace_if_equal(parent, leaf, &old_value, &new_value)?;
            }
            Ok(doc)
        })
    }

    /// Number of distinct ranges that will be registered.
    pub fn pending_ranges(&self) -> usize {
        self.pending.len()
    }

    /// Turns the accumulated edits into validated migration steps.
    pub fn build(self) -> Result<(String, Vec<MigrationStep>)> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let steps = self
            .pending
            .into_iter()
            .map(|range| {
                let edits = range.edits;
                let composed: MigrationFn = Arc::new(move |doc: Document| {
                    edits.iter().try_fold(doc, |current, edit| edit(current))
                });
                MigrationStep::new(&range.from_version, &range.to_version, composed)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((self.component_type, steps))
    }

    /// Registers every pending range. Nothing is registered if any range is
    /// invalid or already present.
    pub fn register(self, registry: &MigrationRegistry) -> Result<()> {
        let (component_type, steps) = self.build()?;
        registry.register_steps(&component_type, steps)
    }
}

fn decode_value<V: DeserializeOwned>(field: &str, value: &Value) -> anyhow::Result<V> {
    serde_json::from_value(value.clone())
        .with_context(|| format!("field '{}' does not decode as the expected type", field))
}

fn encode_value<V: Serialize>(field: &str, value: &V) -> anyhow::Result<Value> {
    serde_json::to_value(value).with_context(|| format!("failed to encode field '{}'", field))
}

fn replace_if_equal<V>(doc: &mut Document, field: &str, old_value: &V, new_value: &V) -> anyhow::Result<()>
where
    V: Serialize + DeserializeOwned + PartialEq,
{
    if let Some(slot) = doc.get_mut(field) {
        let current: V = decode_value(field, slot)?;
        if current == *old_value {
            *slot = encode_value(field, new_value)?;
        }
    }
    Ok(())
}
