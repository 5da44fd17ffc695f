//! Projection engine - evaluate a schema against root objects
//!
//! This module turns one root object plus one immutable [`crate::Schema`]
//! into a pair of views: a flat tabular row (spreadsheet/CSV shape) and a
//! full nested document (structured export shape). Computed variables are
//! evaluated first, then every field in declaration order; per-object
//! failures are scoped to that object and never abort its siblings.

pub mod engine;
pub mod tabulate;

pub use engine::{Extraction, Extractor, TableValue};
pub use tabulate::render_table;
