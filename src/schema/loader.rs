//! Schema loading and validation
//!
//! A schema document is YAML with top-level keys `help`, `type`, `tabulate`,
//! `vars` and `fields`. A field entry is either a string
//! (`path tokens... fmt=<name> <param>=<value>...`) or a nested mapping with
//! optional `_root` / `_table` keys and child field entries:
//!
//! ```yaml
//! help: Virtual machine inventory
//! type: vm
//! tabulate: [name, memory, cluster]
//! vars:
//!   cluster_obj: ancestor(ClusterComputeResource)
//! fields:
//!   name: name
//!   memory: config.hardware.memoryMB fmt=gib multiply=1048576
//!   cluster: $cluster_obj.name
//!   nics:
//!     _root: guest.net
//!     _table: flatten
//!     network: network
//! ```
//!
//! Loading runs parse and validation in one pass and either returns a
//! ready-to-use immutable [`Schema`] or a single `Config` error listing
//! every violation found.

use tracing::debug;

use crate::error::{QuarryError, Result};
use crate::format::FormatDirective;
use crate::path::PathExpr;
use crate::schema::model::{FieldSpec, NestedSpec, Schema, TableMode};

const ROOT_KEY: &str = "_root";
const TABLE_KEY: &str = "_table";

impl Schema {
    /// Parse and validate a schema document.
    pub fn load(text: &str) -> Result<Schema> {
        let doc: serde_yaml::Value = serde_yaml::from_str(text)?;
        let mut loader = Loader::default();
        let schema = loader.build(&doc);

        if !loader.violations.is_empty() {
            return Err(QuarryError::Config {
                violations: loader.violations,
            });
        }

        let schema = schema.expect("no violations implies a built schema");
        debug!(
            fields = schema.fields.len(),
            vars = schema.vars.len(),
            columns = schema.tabulate.len(),
            "schema loaded"
        );
        Ok(schema)
    }
}

#[derive(Default)]
struct Loader {
    violations: Vec<String>,
}

impl Loader {
    fn build(&mut self, doc: &serde_yaml::Value) -> Option<Schema> {
        let mapping = match doc {
            serde_yaml::Value::Mapping(mapping) => mapping,
            _ => {
                self.violations
                    .push("schema document must be a mapping".to_string());
                return None;
            }
        };

        let mut help = None;
        let mut object_type = None;
        let mut tabulate: Option<Vec<String>> = None;
        let mut vars = Vec::new();
        let mut fields = Vec::new();
        let mut fields_malformed = false;

        for (key, value) in mapping {
            let Some(key) = key.as_str() else {
                self.violations
                    .push(format!("non-string top-level key: {:?}", key));
                continue;
            };
            match key {
                "help" => help = self.expect_str(key, value),
                "type" => object_type = self.expect_str(key, value),
                "tabulate" => tabulate = self.string_list(value),
                "vars" => vars = self.field_map("vars", value).unwrap_or_default(),
                "fields" => match self.field_map("fields", value) {
                    Some(parsed) => fields = parsed,
                    None => fields_malformed = true,
                },
                other => self
                    .violations
                    .push(format!("unknown top-level key '{}'", other)),
            }
        }

        // A malformed fields section already carries its own violation.
        if fields.is_empty() && !fields_malformed {
            self.violations
                .push("schema declares no fields".to_string());
        }

        // Default column selection: every top-level field, declaration order.
        let tabulate =
            tabulate.unwrap_or_else(|| fields.iter().map(|(name, _)| name.clone()).collect());

        let schema = Schema {
            help,
            object_type,
            vars,
            fields,
            tabulate,
        };
        self.validate(&schema);

        if self.violations.is_empty() {
            Some(schema)
        } else {
            None
        }
    }

    fn expect_str(&mut self, key: &str, value: &serde_yaml::Value) -> Option<String> {
        match value.as_str() {
            Some(text) => Some(text.to_string()),
            None => {
                self.violations
                    .push(format!("'{}' must be a string", key));
                None
            }
        }
    }

    fn string_list(&mut self, value: &serde_yaml::Value) -> Option<Vec<String>> {
        let items = match value.as_sequence() {
            Some(items) => items,
            None => {
                self.violations
                    .push("'tabulate' must be a list of field names".to_string());
                return None;
            }
        };

        let mut names = Vec::with_capacity(items.len());
        for item in items {
            match item.as_str() {
                Some(name) => names.push(name.to_string()),
                None => self
                    .violations
                    .push(format!("'tabulate' entry {:?} is not a string", item)),
            }
        }
        Some(names)
    }

    fn field_map(
        &mut self,
        section: &str,
        value: &serde_yaml::Value,
    ) -> Option<Vec<(String, FieldSpec)>> {
        let mapping = match value.as_mapping() {
            Some(mapping) => mapping,
            None => {
                self.violations
                    .push(format!("'{}' must be a mapping", section));
                return None;
            }
        };

        let mut entries = Vec::with_capacity(mapping.len());
        for (key, entry) in mapping {
            let Some(name) = key.as_str() else {
                self.violations
                    .push(format!("'{}' has a non-string field name: {:?}", section, key));
                continue;
            };
            if let Some(spec) = self.field_spec(&format!("{}.{}", section, name), entry) {
                entries.push((name.to_string(), spec));
            }
        }
        Some(entries)
    }

    fn field_spec(&mut self, context: &str, value: &serde_yaml::Value) -> Option<FieldSpec> {
        match value {
            serde_yaml::Value::String(text) => self.leaf_spec(context, text),
            serde_yaml::Value::Mapping(mapping) => self.nested_spec(context, mapping),
            other => {
                self.violations.push(format!(
                    "{}: expected a path string or a nested mapping, got {:?}",
                    context, other
                ));
                None
            }
        }
    }

    fn leaf_spec(&mut self, context: &str, text: &str) -> Option<FieldSpec> {
        let tokens = split_tokens(text);
        if tokens.is_empty() {
            self.violations.push(format!("{}: empty field", context));
            return None;
        }

        let path = self.note(context, PathExpr::parse(&tokens[0]))?;
        let mut formatters: Vec<FormatDirective> = Vec::new();

        for token in &tokens[1..] {
            let Some((key, value)) = token.split_once('=') else {
                self.violations.push(format!(
                    "{}: expected 'key=value' after the path, got '{}'",
                    context, token
                ));
                continue;
            };

            if key == "fmt" {
                if let Some(directive) = self.note(context, FormatDirective::from_name(value)) {
                    formatters.push(directive);
                }
            } else if let Some(last) = formatters.last_mut() {
                let result = last.set_param(key, value);
                let _ = self.note(context, result);
            } else {
                self.violations.push(format!(
                    "{}: parameter '{}' appears before any 'fmt=' directive",
                    context, token
                ));
            }
        }

        Some(FieldSpec::Leaf { path, formatters })
    }

    fn nested_spec(
        &mut self,
        context: &str,
        mapping: &serde_yaml::Mapping,
    ) -> Option<FieldSpec> {
        let mut root = None;
        let mut table_mode = TableMode::default();
        let mut children = Vec::new();

        for (key, value) in mapping {
            let Some(key) = key.as_str() else {
                self.violations
                    .push(format!("{}: non-string key: {:?}", context, key));
                continue;
            };
            match key {
                ROOT_KEY => {
                    if let Some(text) = self.expect_str(ROOT_KEY, value) {
                        root = self.note(context, PathExpr::parse(&text));
                    }
                }
                TABLE_KEY => match value.as_str() {
                    Some("flatten") => table_mode = TableMode::Flatten,
                    Some("single") => table_mode = TableMode::Single,
                    other => self.violations.push(format!(
                        "{}: '_table' must be 'flatten' or 'single', got {:?}",
                        context, other
                    )),
                },
                child => {
                    if let Some(spec) =
                        self.field_spec(&format!("{}.{}", context, child), value)
                    {
                        children.push((child.to_string(), spec));
                    }
                }
            }
        }

        if children.is_empty() {
            self.violations
                .push(format!("{}: nested field declares no children", context));
            return None;
        }

        Some(FieldSpec::Nested(NestedSpec {
            root,
            table_mode,
            children,
        }))
    }

    /// Fold a parse result into the violation list, keeping the value.
    fn note<T>(&mut self, context: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(QuarryError::Config { violations }) => {
                self.violations
                    .extend(violations.into_iter().map(|v| format!("{}: {}", context, v)));
                None
            }
            Err(other) => {
                self.violations.push(format!("{}: {}", context, other));
                None
            }
        }
    }

    /// Cross-reference checks, run once the whole document is parsed.
    fn validate(&mut self, schema: &Schema) {
        for column in &schema.tabulate {
            if !schema.fields.iter().any(|(name, _)| name == column) {
                self.violations.push(format!(
                    "tabulate column '{}' does not exist in fields",
                    column
                ));
            }
        }

        // A var may reference only vars declared before it; a field may
        // reference any var.
        for (index, (name, spec)) in schema.vars.iter().enumerate() {
            let declared: Vec<&str> = schema.vars[..index]
                .iter()
                .map(|(n, _)| n.as_str())
                .collect();
            self.check_var_refs(&format!("vars.{}", name), spec, &declared);
        }
        let declared: Vec<&str> = schema.vars.iter().map(|(n, _)| n.as_str()).collect();
        for (name, spec) in &schema.fields {
            self.check_var_refs(&format!("fields.{}", name), spec, &declared);
        }
    }

    fn check_var_refs(&mut self, context: &str, spec: &FieldSpec, declared: &[&str]) {
        let check_path = |path: &PathExpr, violations: &mut Vec<String>| {
            for var in path.var_refs() {
                if !declared.contains(&var) {
                    violations.push(format!(
                        "{}: reference to undeclared variable '${}'",
                        context, var
                    ));
                }
            }
        };

        match spec {
            FieldSpec::Leaf { path, .. } => check_path(path, &mut self.violations),
            FieldSpec::Nested(nested) => {
                if let Some(root) = &nested.root {
                    check_path(root, &mut self.violations);
                }
                for (child, child_spec) in &nested.children {
                    self.check_var_refs(&format!("{}.{}", context, child), child_spec, declared);
                }
            }
        }
    }
}

/// Split a field string on whitespace, except inside single quotes (literal
/// mapping keys may contain spaces).
fn split_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut buffer = String::new();
    let mut in_quotes = false;

    for ch in text.chars() {
        match ch {
            '\'' => {
                in_quotes = !in_quotes;
                buffer.push(ch);
            }
            ch if ch.is_whitespace() && !in_quotes => {
                if !buffer.is_empty() {
                    tokens.push(std::mem::take(&mut buffer));
                }
            }
            ch => buffer.push(ch),
        }
    }
    if !buffer.is_empty() {
        tokens.push(buffer);
    }
    tokens
}
