//! The extractor proper: field spec evaluation, flattening, row assembly

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::Result;
use crate::format;
use crate::graph::{GraphValue, ObjectRef};
use crate::path::VarEnv;
use crate::schema::{FieldSpec, NestedSpec, Schema, TableMode};

/// The two projections produced for one root object.
///
/// `row` keys follow the schema's `tabulate` order; `document` keys follow
/// `fields` declaration order. Both orders are part of the output contract.
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub row: Map<String, Value>,
    pub document: Map<String, Value>,
}

/// Tabular projection of a single field.
#[derive(Debug, Clone)]
pub enum TableValue {
    /// No value (renders as an empty cell / null).
    Absent,
    /// A scalar cell.
    Scalar(Value),
    /// Nested records that were not flattened; document mode only.
    NotTabulable,
}

/// Result of evaluating one field spec: both projections plus the raw
/// resolved value (kept so variables stay traversable by later paths).
#[derive(Debug, Clone)]
struct EvalResult {
    table: TableValue,
    document: Value,
    raw: GraphValue,
}

/// Per-root evaluation state: the variable environment for path resolution
/// plus the variables' full evaluation results for re-exposure.
struct EvalCtx {
    env: VarEnv,
    var_results: Vec<(String, EvalResult)>,
}

impl EvalCtx {
    fn var_result(&self, name: &str) -> Option<&EvalResult> {
        self.var_results
            .iter()
            .find_map(|(key, result)| (key == name).then_some(result))
    }
}

/// Evaluates one schema against root objects. Holds no mutable state:
/// a single extractor may serve concurrent evaluations.
pub struct Extractor<'a> {
    schema: &'a Schema,
}

impl<'a> Extractor<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Extractor { schema }
    }

    /// Evaluate the schema against one root object.
    ///
    /// Either fully completes and returns both projections, or fails with no
    /// partial result. Failures here are data problems scoped to this root;
    /// batch callers decide whether to skip or abort.
    pub fn extract(&self, root: &ObjectRef) -> Result<Extraction> {
        let root_value = GraphValue::Object(root.clone());
        let mut ctx = EvalCtx {
            env: VarEnv::new(),
            var_results: Vec::new(),
        };

        // Vars evaluate once per root, in declaration order, and are
        // invisible in the output unless a field re-exposes them.
        for (name, spec) in self.schema.vars() {
            let result = self.eval(spec, &root_value, &ctx)?;
            ctx.env.insert(name.clone(), result.raw.clone());
            ctx.var_results.push((name.clone(), result));
        }

        let mut results = Vec::with_capacity(self.schema.fields().len());
        for (name, spec) in self.schema.fields() {
            let result = self.eval(spec, &root_value, &ctx)?;
            results.push((name.as_str(), result));
        }

        let mut document = Map::new();
        for (name, result) in &results {
            document.insert(name.to_string(), result.document.clone());
        }

        let mut row = Map::new();
        for column in self.schema.tabulate() {
            let cell = results
                .iter()
                .find_map(|(name, result)| (*name == column.as_str()).then(|| &result.table));
            let value = match cell {
                Some(TableValue::Scalar(value)) => value.clone(),
                // Nested, unflattened records silently omit from the row.
                Some(TableValue::Absent) | Some(TableValue::NotTabulable) | None => Value::Null,
            };
            row.insert(column.clone(), value);
        }

        Ok(Extraction { row, document })
    }

    /// Evaluate the schema against a batch of roots. Per-object failures are
    /// logged and surfaced in place; sibling objects are unaffected.
    pub fn extract_all(&self, roots: &[ObjectRef]) -> Vec<Result<Extraction>> {
        roots
            .iter()
            .map(|root| {
                let result = self.extract(root);
                if let Err(err) = &result {
                    warn!(object = root.type_name(), error = %err, "extraction failed");
                }
                result
            })
            .collect()
    }

    fn eval(&self, spec: &FieldSpec, current: &GraphValue, ctx: &EvalCtx) -> Result<EvalResult> {
        match spec {
            FieldSpec::Leaf { path, formatters } => {
                // A bare `$name` with no formatters re-exposes the variable's
                // own evaluation result verbatim.
                if formatters.is_empty() {
                    if let Some(name) = path.as_bare_var() {
                        if let Some(result) = ctx.var_result(name) {
                            return Ok(result.clone());
                        }
                    }
                }

                let resolved = path.resolve(current, &ctx.env)?;
                self.eval_leaf(resolved, formatters)
            }
            FieldSpec::Nested(nested) => self.eval_nested(nested, current, ctx),
        }
    }

    fn eval_leaf(
        &self,
        resolved: GraphValue,
        formatters: &[crate::format::FormatDirective],
    ) -> Result<EvalResult> {
        match &resolved {
            GraphValue::Absent | GraphValue::Scalar(_) | GraphValue::Object(_) => {
                let formatted = format::apply(graph_to_json(&resolved), formatters)?;
                let table = if formatted.is_null() {
                    TableValue::Absent
                } else {
                    TableValue::Scalar(formatted.clone())
                };
                Ok(EvalResult {
                    table,
                    document: formatted,
                    raw: resolved,
                })
            }
            GraphValue::List(_) | GraphValue::Map(_) => {
                if let Some(directive) = formatters.first() {
                    return Err(crate::error::QuarryError::format(
                        directive.name(),
                        format!("cannot format a {}", resolved.kind()),
                    ));
                }
                Ok(EvalResult {
                    table: TableValue::NotTabulable,
                    document: graph_to_json(&resolved),
                    raw: resolved,
                })
            }
        }
    }

    fn eval_nested(
        &self,
        nested: &NestedSpec,
        current: &GraphValue,
        ctx: &EvalCtx,
    ) -> Result<EvalResult> {
        let root_value = match &nested.root {
            Some(path) => path.resolve(current, &ctx.env)?,
            None => current.clone(),
        };

        match &root_value {
            GraphValue::Absent => Ok(EvalResult {
                table: TableValue::Absent,
                document: Value::Null,
                raw: GraphValue::Absent,
            }),
            GraphValue::List(items) => {
                let mut documents = Vec::with_capacity(items.len());
                let mut cells = Vec::new();

                for item in items {
                    let record = self.eval_record(&nested.children, item, ctx)?;

                    let mut doc = Map::new();
                    let mut rendered = Vec::new();
                    for (name, result) in record {
                        if let TableValue::Scalar(value) = &result.table {
                            if let Some(text) = cell_text(value) {
                                rendered.push(text);
                            }
                        }
                        doc.insert(name, result.document);
                    }
                    documents.push(Value::Object(doc));
                    if !rendered.is_empty() {
                        cells.push(rendered.join(" "));
                    }
                }

                let table = match nested.table_mode {
                    // Source order and duplicates are preserved in the join.
                    TableMode::Flatten if !cells.is_empty() => {
                        TableValue::Scalar(Value::String(cells.join(", ")))
                    }
                    TableMode::Flatten => TableValue::Absent,
                    _ => TableValue::NotTabulable,
                };

                Ok(EvalResult {
                    table,
                    document: Value::Array(documents),
                    raw: root_value,
                })
            }
            _ => {
                let record = self.eval_record(&nested.children, &root_value, ctx)?;
                let mut doc = Map::new();
                for (name, result) in record {
                    let value = match nested.table_mode {
                        // Single embeds the record's tabulated view: scalar
                        // cells only, everything else reads as null.
                        TableMode::Single => match result.table {
                            TableValue::Scalar(value) => value,
                            TableValue::Absent | TableValue::NotTabulable => Value::Null,
                        },
                        _ => result.document,
                    };
                    doc.insert(name, value);
                }
                Ok(EvalResult {
                    table: TableValue::NotTabulable,
                    document: Value::Object(doc),
                    raw: root_value,
                })
            }
        }
    }

    fn eval_record(
        &self,
        children: &[(String, FieldSpec)],
        current: &GraphValue,
        ctx: &EvalCtx,
    ) -> Result<Vec<(String, EvalResult)>> {
        children
            .iter()
            .map(|(name, spec)| Ok((name.clone(), self.eval(spec, current, ctx)?)))
            .collect()
    }
}

/// Collapse a resolved value into its document-mode JSON shape. Managed
/// object references render as their `name` attribute (falling back to the
/// type name), which is how inventory reports usually cite related objects.
fn graph_to_json(value: &GraphValue) -> Value {
    match value {
        GraphValue::Absent => Value::Null,
        GraphValue::Scalar(v) => v.clone(),
        GraphValue::Object(obj) => match obj.try_get_attribute("name") {
            Some(GraphValue::Scalar(Value::String(name))) => Value::String(name),
            _ => Value::String(obj.type_name().to_string()),
        },
        GraphValue::List(items) => Value::Array(items.iter().map(graph_to_json).collect()),
        GraphValue::Map(entries) => {
            let mut map = Map::new();
            for (key, item) in entries {
                map.insert(key.clone(), graph_to_json(item));
            }
            Value::Object(map)
        }
    }
}

/// Render a scalar for a flattened cell. Nulls are skipped rather than
/// rendered as the string "null".
fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{select_roots, MemoryObject};
    use serde_json::json;

    fn inventory() -> ObjectRef {
        MemoryObject::from_json(&json!({
            "_type": "Datacenter",
            "name": "dc1",
            "clusters": [
                {
                    "_type": "ClusterComputeResource",
                    "name": "cluster1",
                    "vms": [
                        {
                            "_type": "VirtualMachine",
                            "name": "vm1",
                            "config": {"hardware": {"memoryMB": 4096, "numCPU": 2}},
                            "guest": {"ipAddress": null},
                            "nics": [
                                {"network": "prod", "mac": "00:11"},
                                {"network": "backup", "mac": "00:12"},
                                {"network": "backup", "mac": "00:13"}
                            ]
                        },
                        {
                            "_type": "VirtualMachine",
                            "name": "vm2",
                            "config": {"hardware": {"memoryMB": 8192, "numCPU": 4}},
                            "guest": {"ipAddress": "10.0.0.2"},
                            "nics": []
                        }
                    ]
                }
            ]
        }))
        .unwrap()
    }

    fn vm(name: &str) -> ObjectRef {
        let root = inventory();
        select_roots(&root, "vm")
            .into_iter()
            .find(|obj| {
                matches!(
                    obj.try_get_attribute("name"),
                    Some(GraphValue::Scalar(Value::String(n))) if n == name
                )
            })
            .unwrap()
    }

    const VM_SCHEMA: &str = r#"
type: vm
tabulate: [name, memory, vcpus, main_ip]
fields:
  name: name
  memory: config.hardware.memoryMB fmt=gib multiply=1048576
  vcpus: config.hardware.numCPU
  main_ip: guest.ipAddress
"#;

    #[test]
    fn end_to_end_row_matches_schema() {
        let schema = Schema::load(VM_SCHEMA).unwrap();
        let extraction = Extractor::new(&schema).extract(&vm("vm1")).unwrap();

        let expected: Vec<(&str, Value)> = vec![
            ("name", json!("vm1")),
            ("memory", json!(4.0)),
            ("vcpus", json!(2)),
            ("main_ip", Value::Null),
        ];
        let got: Vec<(&str, Value)> = extraction
            .row
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn reevaluation_is_byte_identical() {
        let schema = Schema::load(VM_SCHEMA).unwrap();
        let extractor = Extractor::new(&schema);
        let target = vm("vm1");

        let first = extractor.extract(&target).unwrap();
        let second = extractor.extract(&target).unwrap();
        assert_eq!(
            serde_json::to_string(&first.row).unwrap(),
            serde_json::to_string(&second.row).unwrap()
        );
        assert_eq!(
            serde_json::to_string(&first.document).unwrap(),
            serde_json::to_string(&second.document).unwrap()
        );
    }

    #[test]
    fn flatten_joins_elements_in_source_order_with_duplicates() {
        let schema = Schema::load(
            "type: vm\ntabulate: [name, networks]\nfields:\n  name: name\n  networks:\n    _root: nics\n    _table: flatten\n    network: network\n",
        )
        .unwrap();
        let extraction = Extractor::new(&schema).extract(&vm("vm1")).unwrap();

        assert_eq!(extraction.row["networks"], json!("prod, backup, backup"));
        // document mode keeps the full nested records
        assert_eq!(
            extraction.document["networks"],
            json!([
                {"network": "prod"},
                {"network": "backup"},
                {"network": "backup"}
            ])
        );
    }

    #[test]
    fn unflattened_sequence_is_omitted_from_the_row() {
        let schema = Schema::load(
            "type: vm\ntabulate: [name, nics]\nfields:\n  name: name\n  nics:\n    _root: nics\n    network: network\n    mac: mac\n",
        )
        .unwrap();
        let extraction = Extractor::new(&schema).extract(&vm("vm1")).unwrap();

        assert_eq!(extraction.row["nics"], Value::Null);
        assert_eq!(
            extraction.document["nics"],
            json!([
                {"network": "prod", "mac": "00:11"},
                {"network": "backup", "mac": "00:12"},
                {"network": "backup", "mac": "00:13"}
            ])
        );
    }

    #[test]
    fn empty_sequence_flattens_to_absent() {
        let schema = Schema::load(
            "type: vm\nfields:\n  networks:\n    _root: nics\n    _table: flatten\n    network: network\n",
        )
        .unwrap();
        let extraction = Extractor::new(&schema).extract(&vm("vm2")).unwrap();
        assert_eq!(extraction.row["networks"], Value::Null);
        assert_eq!(extraction.document["networks"], json!([]));
    }

    #[test]
    fn vars_are_invisible_until_reexposed() {
        let schema = Schema::load(
            "type: vm\nvars:\n  cluster_obj: ancestor(cluster)\nfields:\n  name: name\n  cluster: $cluster_obj.name\n",
        )
        .unwrap();
        let extraction = Extractor::new(&schema).extract(&vm("vm1")).unwrap();

        assert_eq!(extraction.row["cluster"], json!("cluster1"));
        assert!(!extraction.document.contains_key("cluster_obj"));
    }

    #[test]
    fn bare_var_reexposure_copies_the_var_result() {
        let schema = Schema::load(
            "type: vm\nvars:\n  mem: config.hardware.memoryMB fmt=gib multiply=1048576\nfields:\n  memory: $mem\n",
        )
        .unwrap();
        let extraction = Extractor::new(&schema).extract(&vm("vm1")).unwrap();
        assert_eq!(extraction.row["memory"], json!(4.0));
        assert_eq!(extraction.document["memory"], json!(4.0));
    }

    #[test]
    fn nested_with_no_root_reads_the_current_root() {
        let schema = Schema::load(
            "type: vm\nfields:\n  sizing:\n    memory_mb: config.hardware.memoryMB\n    vcpus: config.hardware.numCPU\n",
        )
        .unwrap();
        let extraction = Extractor::new(&schema).extract(&vm("vm1")).unwrap();
        assert_eq!(
            extraction.document["sizing"],
            json!({"memory_mb": 4096, "vcpus": 2})
        );
        assert_eq!(extraction.row["sizing"], Value::Null);
    }

    #[test]
    fn single_mode_embeds_the_record_as_scalar_cells() {
        let schema = Schema::load(
            "type: vm\ntabulate: [name, sizing]\nfields:\n  name: name\n  sizing:\n    _table: single\n    memory: config.hardware.memoryMB fmt=gib multiply=1048576\n    vcpus: config.hardware.numCPU\n",
        )
        .unwrap();
        let extraction = Extractor::new(&schema).extract(&vm("vm1")).unwrap();

        assert_eq!(
            extraction.document["sizing"],
            json!({"memory": 4.0, "vcpus": 2})
        );
        // the sub-table lives in the document only
        assert_eq!(extraction.row["sizing"], Value::Null);
    }

    #[test]
    fn single_mode_reads_untabulable_children_as_null() {
        let schema = Schema::load(
            "type: vm\nfields:\n  summary:\n    _table: single\n    name: name\n    nics: nics\n",
        )
        .unwrap();
        let extraction = Extractor::new(&schema).extract(&vm("vm1")).unwrap();
        assert_eq!(
            extraction.document["summary"],
            json!({"name": "vm1", "nics": null})
        );
    }

    #[test]
    fn extraction_serializes_with_both_projections() {
        let schema = Schema::load(VM_SCHEMA).unwrap();
        let extraction = Extractor::new(&schema).extract(&vm("vm1")).unwrap();

        let text = serde_json::to_string(&extraction).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["row"]["name"], json!("vm1"));
        assert_eq!(value["document"]["memory"], json!(4.0));
    }

    #[test]
    fn absent_leaf_stays_absent_through_formatters() {
        let schema = Schema::load(
            "type: vm\nfields:\n  ip_gib: guest.ipAddress fmt=gib multiply=1048576\n",
        )
        .unwrap();
        let extraction = Extractor::new(&schema).extract(&vm("vm1")).unwrap();
        assert_eq!(extraction.row["ip_gib"], Value::Null);
        assert_eq!(extraction.document["ip_gib"], Value::Null);
    }

    #[test]
    fn object_leaf_renders_its_name() {
        let schema = Schema::load("type: vm\nfields:\n  cluster: ancestor(cluster)\n").unwrap();
        let extraction = Extractor::new(&schema).extract(&vm("vm1")).unwrap();
        assert_eq!(extraction.row["cluster"], json!("cluster1"));
    }

    #[test]
    fn batch_isolates_per_object_failures() {
        // vm2's guest.ipAddress is a string; formatting it as gib fails for
        // vm2 only, vm1's null formats to null without error.
        let schema =
            Schema::load("type: vm\nfields:\n  odd: guest.ipAddress fmt=gib\n").unwrap();
        let root = inventory();
        let roots = select_roots(&root, "vm");
        let results = Extractor::new(&schema).extract_all(&roots);

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
