//! Object-graph provider interface
//!
//! The extraction engine never assumes a concrete inventory client. Any
//! source of managed objects plugs in by implementing [`ManagedObject`]:
//! a capability-query interface exposing named attributes, a single upward
//! "parent/container" relation, and a type name usable for ancestor matching.
//!
//! [`memory`] provides the built-in adapter: an in-memory graph built from a
//! JSON document, used by the CLI and the test fixtures.

pub mod ancestors;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

pub use ancestors::{search_ancestor, MAX_ANCESTOR_DEPTH};
pub use memory::MemoryObject;

/// Shared handle to a node in the inventory graph.
///
/// `Arc` keeps a read-only graph shareable across threads, so independent
/// root objects can be evaluated concurrently against one immutable schema.
pub type ObjectRef = Arc<dyn ManagedObject>;

/// A node in the managed object graph.
///
/// Attribute access is a capability query rather than reflection:
/// `has_attribute` reports the declared capability set (so an unknown name
/// can be rejected as a schema/data mismatch), while `try_get_attribute`
/// reports whether this particular instance carries a value (inventory data
/// is sparse, so a declared attribute with no value is normal).
pub trait ManagedObject: fmt::Debug + Send + Sync {
    /// Type name of this object, e.g. `"VirtualMachine"`.
    fn type_name(&self) -> &str;

    /// Whether this object matches the given type name. Adapters may widen
    /// this to type-hierarchy or alias matching; the default is exact.
    fn is_type(&self, name: &str) -> bool {
        self.type_name() == name
    }

    /// Whether `name` is a recognized attribute of this object's type.
    fn has_attribute(&self, name: &str) -> bool;

    /// The declared attribute names of this object, in declaration order.
    fn attribute_names(&self) -> Vec<String>;

    /// Read a named attribute. `None` means the attribute carries no value
    /// on this instance (distinct from `has_attribute` returning false).
    fn try_get_attribute(&self, name: &str) -> Option<GraphValue>;

    /// The single upward containment relation, if any.
    fn parent(&self) -> Option<ObjectRef>;
}

/// A value flowing through path resolution.
///
/// Attribute reads yield scalars, references to further managed objects,
/// ordered sequences, or string-keyed mappings (whose keys may themselves
/// contain dots, hence quoted path segments).
#[derive(Clone)]
pub enum GraphValue {
    /// Explicit "no value". Not an error: sparse data is expected.
    Absent,
    /// A plain scalar (string, number, bool).
    Scalar(Value),
    /// A reference to another managed object.
    Object(ObjectRef),
    /// An ordered sequence of values.
    List(Vec<GraphValue>),
    /// An ordered string-keyed mapping.
    Map(Vec<(String, GraphValue)>),
}

impl GraphValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, GraphValue::Absent)
    }

    /// Short human-readable description of the value's kind, for error
    /// messages.
    pub fn kind(&self) -> String {
        match self {
            GraphValue::Absent => "absent".to_string(),
            GraphValue::Scalar(v) => match v {
                Value::String(_) => "string".to_string(),
                Value::Number(_) => "number".to_string(),
                Value::Bool(_) => "bool".to_string(),
                _ => "scalar".to_string(),
            },
            GraphValue::Object(obj) => format!("object {}", obj.type_name()),
            GraphValue::List(_) => "sequence".to_string(),
            GraphValue::Map(_) => "mapping".to_string(),
        }
    }
}

impl fmt::Debug for GraphValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphValue::Absent => write!(f, "Absent"),
            GraphValue::Scalar(v) => write!(f, "Scalar({})", v),
            GraphValue::Object(obj) => write!(f, "Object({})", obj.type_name()),
            GraphValue::List(items) => f.debug_list().entries(items.iter()).finish(),
            GraphValue::Map(entries) => f
                .debug_map()
                .entries(entries.iter().map(|(k, v)| (k, v)))
                .finish(),
        }
    }
}

/// Resolve a short object-type alias to its full inventory type name.
///
/// The aliases mirror the ones the underlying inventory clients commonly
/// accept, so schemas can say `type: vm` instead of `type: VirtualMachine`.
pub fn resolve_type_alias(name: &str) -> &str {
    match name.to_ascii_lowercase().as_str() {
        "vm" => "VirtualMachine",
        "host" => "HostSystem",
        "net" => "Network",
        "dvs" => "DistributedVirtualSwitch",
        "dvp" => "DistributedVirtualPortgroup",
        "ds" => "Datastore",
        "dc" => "Datacenter",
        "cluster" => "ClusterComputeResource",
        "pool" => "ResourcePool",
        "folder" => "Folder",
        _ => name,
    }
}

/// Collect `root` and every managed object reachable through its attributes,
/// in depth-first attribute-declaration order.
pub fn collect_objects(root: &ObjectRef) -> Vec<ObjectRef> {
    let mut found = Vec::new();
    collect_into(root, &mut found);
    found
}

/// Collect every object under `root` (inclusive) matching the given type
/// name or alias - the usual way a schema's `type` picks its root objects.
pub fn select_roots(root: &ObjectRef, type_name: &str) -> Vec<ObjectRef> {
    collect_objects(root)
        .into_iter()
        .filter(|obj| obj.is_type(type_name) || obj.is_type(resolve_type_alias(type_name)))
        .collect()
}

fn collect_into(obj: &ObjectRef, found: &mut Vec<ObjectRef>) {
    found.push(obj.clone());
    for name in obj.attribute_names() {
        if let Some(value) = obj.try_get_attribute(&name) {
            collect_value(&value, found);
        }
    }
}

fn collect_value(value: &GraphValue, found: &mut Vec<ObjectRef>) {
    match value {
        GraphValue::Object(obj) => collect_into(obj, found),
        GraphValue::List(items) => {
            for item in items {
                collect_value(item, found);
            }
        }
        GraphValue::Map(entries) => {
            for (_, item) in entries {
                collect_value(item, found);
            }
        }
        GraphValue::Absent | GraphValue::Scalar(_) => {}
    }
}
