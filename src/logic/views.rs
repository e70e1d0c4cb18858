//! API representations of stored documents.
//!
//! Schema definitions and instance data are stored as JSON text; reads return
//! them parsed. Text that fails to parse is passed through unchanged.

use serde::Serialize;
use serde_json::{json, Value};

use crate::model::{Instance, InstanceRelation, Relation, Schema};

/// Parse the JSON text found at each dotted path (e.g. `source.data`)
pub fn parse_json_properties(mut doc: Value, paths: &[&str]) -> Value {
    for path in paths {
        let pointer = format!("/{}", path.replace('.', "/"));
        if let Some(slot) = doc.pointer_mut(&pointer) {
            if let Some(parsed) = slot.as_str().and_then(|raw| serde_json::from_str(raw).ok()) {
                *slot = parsed;
            }
        }
    }
    doc
}

fn to_value<T: Serialize>(item: &T) -> Value {
    serde_json::to_value(item).unwrap_or(Value::Null)
}

/// Populated reference to a schema: `{id, name}`
pub fn schema_ref(schema: Option<&Schema>) -> Value {
    schema.map_or(Value::Null, |s| json!({"id": s.id, "name": s.name}))
}

/// `{id, type, source, target}` as embedded in instance relation lists
pub fn relation_brief(relation: Option<&Relation>) -> Value {
    relation.map_or(Value::Null, |r| {
        json!({"id": r.id, "type": r.relation_type, "source": r.source, "target": r.target})
    })
}

/// `{id, schema, name}` as embedded in instance relation lists
pub fn instance_brief(instance: Option<&Instance>) -> Value {
    instance.map_or(Value::Null, |i| {
        json!({"id": i.id, "schema": i.schema, "name": i.name})
    })
}

pub fn schema_view(schema: &Schema) -> Value {
    parse_json_properties(to_value(schema), &["schema_definition"])
}

/// Instance with its `schema` field replaced by `schema` (a ref or full view)
pub fn instance_view(instance: &Instance, schema: Value) -> Value {
    let mut doc = to_value(instance);
    doc["schema"] = schema;
    parse_json_properties(doc, &["data"])
}

pub fn relation_view(relation: &Relation, source: Value, target: Value) -> Value {
    let mut doc = to_value(relation);
    doc["source"] = source;
    doc["target"] = target;
    doc
}

pub fn instance_relation_view(
    edge: &InstanceRelation,
    relation: Value,
    source: Value,
    target: Value,
) -> Value {
    let mut doc = to_value(edge);
    doc["relation"] = relation;
    doc["source"] = source;
    doc["target"] = target;
    parse_json_properties(doc, &["source.data", "target.data"])
}

/// Plain stored form, ids left as ids
pub fn raw_view<T: Serialize>(item: &T) -> Value {
    to_value(item)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_nested_paths() {
        let doc = json!({
            "source": {"data": "{\"a\": 1}"},
            "target": {"data": "not json"},
            "relation": "r1"
        });
        let parsed = parse_json_properties(doc, &["source.data", "target.data", "missing.data"]);
        assert_eq!(parsed["source"]["data"], json!({"a": 1}));
        assert_eq!(parsed["target"]["data"], "not json");
        assert_eq!(parsed["relation"], "r1");
    }

    #[test]
    fn test_null_parent_is_left_alone() {
        let doc = json!({"source": null});
        let parsed = parse_json_properties(doc.clone(), &["source.data"]);
        assert_eq!(parsed, doc);
    }
}
