//! In-memory object graph built from a JSON document
//!
//! This is the adapter the CLI and the test fixtures use: an inventory
//! snapshot serialized as JSON becomes a graph of [`MemoryObject`] nodes.
//!
//! Mapping rules, per attribute value:
//! - a JSON object carrying a `"_type"` key becomes a child managed object
//!   (with a parent back-link to the enclosing object);
//! - a JSON object without `"_type"` becomes an ordered string-keyed mapping
//!   (keys may contain dots, addressed with quoted path segments);
//! - arrays become ordered sequences; scalars stay scalars; `null` is Absent.

use std::sync::{Arc, Weak};

use serde_json::Value;

use crate::error::{QuarryError, Result};
use crate::graph::{resolve_type_alias, GraphValue, ManagedObject, ObjectRef};

const TYPE_KEY: &str = "_type";
const DEFAULT_TYPE: &str = "ManagedObject";

/// A managed object backed by a parsed JSON snapshot.
#[derive(Debug)]
pub struct MemoryObject {
    type_name: String,
    attrs: Vec<(String, GraphValue)>,
    parent: Weak<MemoryObject>,
}

impl MemoryObject {
    /// Build a graph from an inventory snapshot. The root must be a JSON
    /// object; `"_type"` keys anywhere below it introduce child objects.
    pub fn from_json(value: &Value) -> Result<ObjectRef> {
        match value {
            Value::Object(map) => Ok(build_object(map, Weak::new())),
            other => Err(QuarryError::config(format!(
                "inventory root must be a JSON object, got {}",
                json_kind(other)
            ))),
        }
    }
}

impl ManagedObject for MemoryObject {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn is_type(&self, name: &str) -> bool {
        self.type_name == name || self.type_name == resolve_type_alias(name)
    }

    // A JSON-backed instance cannot enumerate its type's full capability
    // set, and inventory data is sparse: unknown attribute names resolve to
    // Absent here rather than failing. Stricter adapters may reject them.
    fn has_attribute(&self, _name: &str) -> bool {
        true
    }

    fn attribute_names(&self) -> Vec<String> {
        self.attrs.iter().map(|(name, _)| name.clone()).collect()
    }

    fn try_get_attribute(&self, name: &str) -> Option<GraphValue> {
        self.attrs.iter().find_map(|(attr, value)| {
            if attr == name && !value.is_absent() {
                Some(value.clone())
            } else {
                None
            }
        })
    }

    fn parent(&self) -> Option<ObjectRef> {
        self.parent.upgrade().map(|obj| obj as ObjectRef)
    }
}

fn build_object(map: &serde_json::Map<String, Value>, parent: Weak<MemoryObject>) -> ObjectRef {
    let type_name = map
        .get(TYPE_KEY)
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_TYPE)
        .to_string();

    Arc::new_cyclic(|weak: &Weak<MemoryObject>| {
        let attrs = map
            .iter()
            .filter(|(key, _)| key.as_str() != TYPE_KEY)
            .map(|(key, value)| (key.clone(), build_value(value, weak)))
            .collect();

        MemoryObject {
            type_name,
            attrs,
            parent,
        }
    })
}

fn build_value(value: &Value, parent: &Weak<MemoryObject>) -> GraphValue {
    match value {
        Value::Null => GraphValue::Absent,
        Value::Object(map) => {
            if map.contains_key(TYPE_KEY) {
                GraphValue::Object(build_object(map, parent.clone()))
            } else {
                GraphValue::Map(
                    map.iter()
                        .map(|(key, item)| (key.clone(), build_value(item, parent)))
                        .collect(),
                )
            }
        }
        Value::Array(items) => {
            GraphValue::List(items.iter().map(|item| build_value(item, parent)).collect())
        }
        scalar => GraphValue::Scalar(scalar.clone()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::collect_objects;
    use serde_json::json;

    fn fixture() -> ObjectRef {
        MemoryObject::from_json(&json!({
            "_type": "ClusterComputeResource",
            "name": "cluster1",
            "vms": [
                {
                    "_type": "VirtualMachine",
                    "name": "vm1",
                    "config": {
                        "hardware": {"memoryMB": 4096, "numCPU": 2},
                        "extraConfig": {"guestinfo.build.id": "42"}
                    },
                    "guest": {"ipAddress": null}
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn builds_typed_children_with_parent_links() {
        let cluster = fixture();
        let vms = match cluster.try_get_attribute("vms").unwrap() {
            GraphValue::List(items) => items,
            other => panic!("expected list, got {:?}", other),
        };
        let vm = match &vms[0] {
            GraphValue::Object(obj) => obj.clone(),
            other => panic!("expected object, got {:?}", other),
        };

        assert_eq!(vm.type_name(), "VirtualMachine");
        let parent = vm.parent().unwrap();
        assert_eq!(parent.type_name(), "ClusterComputeResource");
    }

    #[test]
    fn untyped_objects_become_mappings() {
        let cluster = fixture();
        let vms = collect_objects(&cluster);
        let vm = vms
            .iter()
            .find(|obj| obj.type_name() == "VirtualMachine")
            .unwrap();

        match vm.try_get_attribute("config").unwrap() {
            GraphValue::Map(entries) => assert_eq!(entries[0].0, "hardware"),
            other => panic!("expected mapping, got {:?}", other),
        }
    }

    #[test]
    fn null_attribute_reads_as_no_value() {
        let cluster = fixture();
        let vms = collect_objects(&cluster);
        let vm = vms
            .iter()
            .find(|obj| obj.type_name() == "VirtualMachine")
            .unwrap();

        // guest is present but guest.ipAddress is null
        match vm.try_get_attribute("guest").unwrap() {
            GraphValue::Map(entries) => {
                assert!(entries[0].1.is_absent());
            }
            other => panic!("expected mapping, got {:?}", other),
        }
    }

    #[test]
    fn rejects_non_object_root() {
        let err = MemoryObject::from_json(&json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, QuarryError::Config { .. }));
    }

    #[test]
    fn collect_objects_walks_nested_containers() {
        let cluster = fixture();
        let all = collect_objects(&cluster);
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].type_name(), "VirtualMachine");
    }
}
