//! Snapshot documents: the untyped mapping every component is transported as.

use super::error::{Result, SaveLoadError};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

/// Field name -> value mapping for one component instance.
pub type Document = Map<String, Value>;

/// Encodes a value into a document. Values that do not encode to a mapping are rejected.
pub fn to_document<T: Serialize>(type_name: &str, value: &T) -> Result<Document> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(SaveLoadError::EncodeFailed {
            type_name: type_name.to_string(),
            cause: format!("expected a mapping, got {}", value_kind(&other)),
        }),
        Err(err) => Err(SaveLoadError::EncodeFailed {
            type_name: type_name.to_string(),
            cause: err.to_string(),
        }),
    }
}

pub fn from_document<T: DeserializeOwned>(type_name: &str, document: Document) -> Result<T> {
    serde_json::from_value(Value::Object(document)).map_err(|err| SaveLoadError::DecodeFailed {
        type_name: type_name.to_string(),
        cause: err.to_string(),
    })
}

/// Field holding the value of a component whose serde form is not a mapping.
pub const VALUE_FIELD: &str = "value";

/// Encodes a component. Unit structs, newtypes and other non-mapping forms
/// are stored as `{"value": <encoded>}`.
pub fn encode_component<T: Serialize>(type_name: &str, value: &T) -> Result<Document> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => {
            let mut wrapped = Document::new();
            wrapped.insert(VALUE_FIELD.to_string(), other);
            Ok(wrapped)
        }
        Err(err) => Err(SaveLoadError::EncodeFailed {
            type_name: type_name.to_string(),
            cause: err.to_string(),
        }),
    }
}

/// Inverse of [`encode_component`]. A single `value` field is unwrapped only
/// when the document does not decode as a mapping.
pub fn decode_component<T: DeserializeOwned>(type_name: &str, document: Document) -> Result<T> {
    let inner = match document.get(VALUE_FIELD) {
        Some(inner) if document.len() == 1 => Some(inner.clone()),
        _ => None,
    };
    match from_document(type_name, document) {
        Ok(value) => Ok(value),
        Err(err) => match inner {
            Some(inner) => serde_json::from_value(inner).map_err(|_| err),
            None => Err(err),
        },
    }
}

/// Walks a dot-separated path of nested mappings and returns the mapping that
/// owns the last segment, together with that segment's name.
///
/// Returns `None` when an intermediate segment is missing or is not a mapping.
pub fn resolve_parent_mut<'a>(
    document: &'a mut Document,
    path: &'a str,
) -> Option<(&'a mut Document, &'a str)> {
    let mut segments = path.split('.');
    let mut leaf = segments.next()?;
    let mut current = document;
    for next in segments {
        current = current.get_mut(leaf)?.as_object_mut()?;
        leaf = next;
    }
    Some((current, leaf))
}

pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn resolves_nested_parent() {
        let mut document = doc(json!({"x": {"y": {"z": 1}}}));
        let (parent, leaf) = resolve_parent_mut(&mut document, "x.y.z").unwrap();
        assert_eq!(leaf, "z");
        assert_eq!(parent.get("z"), Some(&json!(1)));
    }

    #[test]
    fn top_level_path_resolves_to_document_itself() {
        let mut document = doc(json!({"a": 1}));
        let (parent, leaf) = resolve_parent_mut(&mut document, "a").unwrap();
        assert_eq!(leaf, "a");
        assert!(parent.contains_key("a"));
    }

    #[test]
    fn missing_or_scalar_intermediate_yields_none() {
        let mut document = doc(json!({"x": 5}));
        assert!(resolve_parent_mut(&mut document, "x.y").is_none());
        assert!(resolve_parent_mut(&mut document, "missing.y").is_none());
    }

    #[test]
    fn non_mapping_components_are_wrapped() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Marker;

        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Gold(u64);

        let marker = encode_component("Marker", &Marker).unwrap();
        assert_eq!(Value::Object(marker.clone()), json!({"value": null}));
        assert_eq!(decode_component::<Marker>("Marker", marker).unwrap(), Marker);

        let gold = encode_component("Gold", &Gold(5)).unwrap();
        assert_eq!(Value::Object(gold.clone()), json!({"value": 5}));
        assert_eq!(decode_component::<Gold>("Gold", gold).unwrap(), Gold(5));
    }

    #[test]
    fn mapping_with_value_field_decodes_directly() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Score {
            value: u32,
        }

        let encoded = encode_component("Score", &Score { value: 3 }).unwrap();
        assert_eq!(Value::Object(encoded.clone()), json!({"value": 3}));
        assert_eq!(
            decode_component::<Score>("Score", encoded).unwrap(),
            Score { value: 3 }
        );

        let bad = doc(json!({"value": "three"}));
        assert!(matches!(
            decode_component::<Score>("Score", bad),
            Err(SaveLoadError::DecodeFailed { .. })
        ));
    }

    #[test]
    fn scalar_values_do_not_encode_as_documents() {
        let err = to_document("Counter", &5).unwrap_err();
        assert!(matches!(err, SaveLoadError::EncodeFailed { .. }));
    }
}
