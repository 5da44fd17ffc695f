//! Parsed schema data model
//!
//! Field declaration order is significant everywhere: `vars` and `fields`
//! are kept as ordered pairs, evaluation follows insertion order, and the
//! output contract (stable diffable reports) depends on it. The spec tree is
//! acyclic even though the data graph it walks may not be; recursion in the
//! engine is always over this tree.

use crate::format::FormatDirective;
use crate::path::PathExpr;

/// How a sequence-rooted nested spec projects into the tabular row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableMode {
    /// Contribute nothing to the row; document mode only.
    #[default]
    None,
    /// Join the per-element child values into one delimited cell.
    Flatten,
    /// Embed the nested record only in document mode, as a sub-record.
    Single,
}

/// A declarative unit describing one output field.
#[derive(Debug, Clone)]
pub enum FieldSpec {
    /// A path to resolve plus a formatter chain to apply.
    Leaf {
        path: PathExpr,
        formatters: Vec<FormatDirective>,
    },
    /// A sub-query: child fields evaluated against a re-rooted value.
    Nested(NestedSpec),
}

/// The nested variant of [`FieldSpec`].
#[derive(Debug, Clone)]
pub struct NestedSpec {
    /// Where the children evaluate from. `None` means the current root
    /// itself.
    pub root: Option<PathExpr>,
    pub table_mode: TableMode,
    /// Child fields, in declaration order.
    pub children: Vec<(String, FieldSpec)>,
}

/// A loaded, validated, immutable report schema.
#[derive(Debug, Clone)]
pub struct Schema {
    pub(crate) help: Option<String>,
    pub(crate) object_type: Option<String>,
    pub(crate) vars: Vec<(String, FieldSpec)>,
    pub(crate) fields: Vec<(String, FieldSpec)>,
    pub(crate) tabulate: Vec<String>,
}

impl Schema {
    /// Free-form description of the report, from the schema's `help` key.
    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    /// The object type this schema targets (possibly a short alias).
    pub fn object_type(&self) -> Option<&str> {
        self.object_type.as_deref()
    }

    /// Computed variables, in declaration (= evaluation) order.
    pub fn vars(&self) -> &[(String, FieldSpec)] {
        &self.vars
    }

    /// Output fields, in declaration (= evaluation) order.
    pub fn fields(&self) -> &[(String, FieldSpec)] {
        &self.fields
    }

    /// Column names selected for the tabular view, in column order.
    pub fn tabulate(&self) -> &[String] {
        &self.tabulate
    }
}
