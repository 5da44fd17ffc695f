//! # Quarry - schema-driven inventory report extraction
//!
//! A library for extracting tabular and nested reports from a managed
//! object graph (a virtualization inventory) using a declarative,
//! user-editable YAML schema instead of hand-written traversal code.
//!
//! ## Modules
//!
//! - **graph**: the object-graph provider interface, ancestor search, and
//!   the in-memory JSON-backed adapter
//! - **path**: dotted attribute path expressions and their resolver
//! - **format**: value-formatting directives (unit scaling, date decoding)
//! - **schema**: the declarative schema model, loader and validator
//! - **extract**: the projection engine producing (row, document) pairs
//!
//! ## Quick Start
//!
//! ```rust
//! use quarry::{Extractor, MemoryObject, Schema};
//! use quarry::graph::select_roots;
//! use serde_json::json;
//!
//! # fn main() -> quarry::Result<()> {
//! let schema = Schema::load(r#"
//! type: vm
//! tabulate: [name, memory]
//! fields:
//!   name: name
//!   memory: config.hardware.memoryMB fmt=gib multiply=1048576
//! "#)?;
//!
//! let inventory = MemoryObject::from_json(&json!({
//!     "_type": "Datacenter",
//!     "vms": [{
//!         "_type": "VirtualMachine",
//!         "name": "vm1",
//!         "config": {"hardware": {"memoryMB": 4096}}
//!     }]
//! }))?;
//!
//! let extractor = Extractor::new(&schema);
//! for root in select_roots(&inventory, "vm") {
//!     let extraction = extractor.extract(&root)?;
//!     assert_eq!(extraction.row["memory"], json!(4.0));
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod extract;
pub mod format;
pub mod graph;
pub mod path;
pub mod schema;

// Re-export commonly used types for convenience
pub use error::{QuarryError, Result};
pub use extract::{render_table, Extraction, Extractor, TableValue};
pub use format::FormatDirective;
pub use graph::{GraphValue, ManagedObject, MemoryObject, ObjectRef};
pub use path::{PathExpr, VarEnv};
pub use schema::{FieldSpec, Schema, TableMode};

/// Main entry point: evaluate a schema against every matching object in an
/// inventory snapshot.
///
/// Roots are selected by the schema's `type` (all objects when it declares
/// none). Per-object failures are surfaced in place so callers can decide to
/// skip, abort, or log-and-continue; they never block sibling objects.
pub fn extract_inventory(
    schema: &Schema,
    inventory: &serde_json::Value,
) -> Result<Vec<Result<Extraction>>> {
    let graph = MemoryObject::from_json(inventory)?;
    let roots = match schema.object_type() {
        Some(type_name) => graph::select_roots(&graph, type_name),
        None => graph::collect_objects(&graph),
    };

    let extractor = Extractor::new(schema);
    Ok(extractor.extract_all(&roots))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_inventory_selects_roots_by_schema_type() {
        let schema = Schema::load("type: vm\nfields:\n  name: name\n").unwrap();
        let inventory = json!({
            "_type": "Datacenter",
            "name": "dc1",
            "vms": [
                {"_type": "VirtualMachine", "name": "vm1"},
                {"_type": "VirtualMachine", "name": "vm2"}
            ]
        });

        let results = extract_inventory(&schema, &inventory).unwrap();
        assert_eq!(results.len(), 2);
        let rows: Vec<_> = results
            .into_iter()
            .map(|r| r.unwrap().row["name"].clone())
            .collect();
        assert_eq!(rows, vec![json!("vm1"), json!("vm2")]);
    }
}
