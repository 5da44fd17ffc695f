//! Report schemas - the declarative description of what to extract
//!
//! A schema is parsed once from YAML text, validated eagerly (collecting
//! every violation, not just the first), and is immutable afterwards: one
//! `Schema` is reused across every root object processed in a run, including
//! concurrent evaluations.

pub mod loader;
pub mod model;

pub use model::{FieldSpec, NestedSpec, Schema, TableMode};
