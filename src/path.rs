//! Path expressions - dotted attribute paths over the object graph
//!
//! A path string is tokenized on unescaped `.`. A token wrapped in single
//! quotes is a literal mapping key used verbatim (so keys containing dots,
//! like `'guestinfo.build.id'`, stay addressable). A token of the form
//! `name(Arg)` is a method-call segment; `ancestor(ClusterComputeResource)`
//! and `parent()` are the built-in capabilities. A leading `$name` token
//! reads a computed variable from the per-root environment.
//!
//! Resolution is strict left-to-right over a single current value. Absent
//! short-circuits attribute and key segments to Absent; a method call on an
//! absent value is a resolution error. The resolver never auto-maps over a
//! sequence - expanding sequences is the projection engine's job.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{QuarryError, Result};
use crate::graph::{search_ancestor, GraphValue};

static CALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\(([^()]*)\)$").unwrap());

/// One step of a path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Plain attribute access.
    Attr(String),
    /// Quoted literal key into a string-keyed mapping.
    Key(String),
    /// Method-style capability invocation with literal arguments.
    Call { name: String, args: Vec<String> },
    /// Reference to a computed variable (first segment only).
    Var(String),
}

/// A parsed, immutable path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    raw: String,
    segments: Vec<Segment>,
}

/// Per-root-object variable bindings, visible during path resolution.
///
/// Created fresh for each root object and discarded afterwards; never shared
/// between concurrent evaluations of different roots.
#[derive(Debug, Default)]
pub struct VarEnv {
    bindings: Vec<(String, GraphValue)>,
}

impl VarEnv {
    pub fn new() -> Self {
        VarEnv::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: GraphValue) {
        self.bindings.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&GraphValue> {
        self.bindings
            .iter()
            .find_map(|(key, value)| (key == name).then_some(value))
    }
}

impl PathExpr {
    /// Parse a raw path string into segments.
    pub fn parse(raw: &str) -> Result<PathExpr> {
        let tokens = tokenize(raw)?;
        let mut segments = Vec::with_capacity(tokens.len());

        for (index, token) in tokens.into_iter().enumerate() {
            let segment = match token {
                Token::Quoted(key) => Segment::Key(key),
                Token::Plain(text) => {
                    if let Some(name) = text.strip_prefix('$') {
                        if index != 0 {
                            return Err(QuarryError::config(format!(
                                "path '{}': variable reference '${}' must be the first segment",
                                raw, name
                            )));
                        }
                        if name.is_empty() {
                            return Err(QuarryError::config(format!(
                                "path '{}': empty variable reference",
                                raw
                            )));
                        }
                        Segment::Var(name.to_string())
                    } else if let Some(caps) = CALL_RE.captures(&text) {
                        let args = caps[2]
                            .split(',')
                            .map(str::trim)
                            .filter(|arg| !arg.is_empty())
                            .map(str::to_string)
                            .collect();
                        Segment::Call {
                            name: caps[1].to_string(),
                            args,
                        }
                    } else {
                        Segment::Attr(text)
                    }
                }
            };
            segments.push(segment);
        }

        if segments.is_empty() {
            return Err(QuarryError::config("empty path expression"));
        }

        Ok(PathExpr {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of the variables this path references.
    pub fn var_refs(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Var(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// If the whole path is a single `$name` reference, its name.
    pub fn as_bare_var(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [Segment::Var(name)] => Some(name.as_str()),
            _ => None,
        }
    }

    /// Resolve this path against a starting value.
    pub fn resolve(&self, start: &GraphValue, env: &VarEnv) -> Result<GraphValue> {
        let mut current = start.clone();

        for segment in &self.segments {
            current = match segment {
                Segment::Var(name) => env
                    .get(name)
                    .cloned()
                    // A missing binding is a schema bug, not missing data:
                    // validation should have rejected the reference.
                    .ok_or_else(|| {
                        QuarryError::config(format!("undeclared variable '${}'", name))
                    })?,
                Segment::Attr(name) => self.step_attr(&current, name)?,
                Segment::Key(key) => self.step_key(&current, key)?,
                Segment::Call { name, args } => self.step_call(&current, name, args)?,
            };
        }

        Ok(current)
    }

    fn step_attr(&self, current: &GraphValue, name: &str) -> Result<GraphValue> {
        match current {
            GraphValue::Absent => Ok(GraphValue::Absent),
            GraphValue::Object(obj) => {
                if !obj.has_attribute(name) {
                    return Err(QuarryError::resolution(
                        &self.raw,
                        format!("'{}' is not an attribute of {}", name, obj.type_name()),
                    ));
                }
                Ok(obj.try_get_attribute(name).unwrap_or(GraphValue::Absent))
            }
            GraphValue::Map(entries) => Ok(lookup(entries, name)),
            other => Err(QuarryError::resolution(
                &self.raw,
                format!("cannot read attribute '{}' of {}", name, other.kind()),
            )),
        }
    }

    fn step_key(&self, current: &GraphValue, key: &str) -> Result<GraphValue> {
        match current {
            GraphValue::Absent => Ok(GraphValue::Absent),
            GraphValue::Map(entries) => Ok(lookup(entries, key)),
            other => Err(QuarryError::resolution(
                &self.raw,
                format!("literal key '{}' applied to {}, not a mapping", key, other.kind()),
            )),
        }
    }

    fn step_call(&self, current: &GraphValue, name: &str, args: &[String]) -> Result<GraphValue> {
        if current.is_absent() {
            return Err(QuarryError::resolution(
                &self.raw,
                format!("method '{}()' called on an absent value", name),
            ));
        }

        match (name, args) {
            ("ancestor", [type_name]) => match current {
                GraphValue::Object(obj) => Ok(search_ancestor(obj, type_name)?
                    .map(GraphValue::Object)
                    .unwrap_or(GraphValue::Absent)),
                other => Err(QuarryError::resolution(
                    &self.raw,
                    format!("ancestor() called on {}, not a managed object", other.kind()),
                )),
            },
            ("ancestor", _) => Err(QuarryError::resolution(
                &self.raw,
                "ancestor() takes exactly one type argument",
            )),
            ("parent", []) => match current {
                GraphValue::Object(obj) => Ok(obj
                    .parent()
                    .map(GraphValue::Object)
                    .unwrap_or(GraphValue::Absent)),
                other => Err(QuarryError::resolution(
                    &self.raw,
                    format!("parent() called on {}, not a managed object", other.kind()),
                )),
            },
            ("parent", _) => Err(QuarryError::resolution(
                &self.raw,
                "parent() takes no arguments",
            )),
            _ => Err(QuarryError::resolution(
                &self.raw,
                format!("unknown method '{}()'", name),
            )),
        }
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn lookup(entries: &[(String, GraphValue)], key: &str) -> GraphValue {
    entries
        .iter()
        .find_map(|(entry_key, value)| (entry_key == key).then(|| value.clone()))
        .unwrap_or(GraphValue::Absent)
}

enum Token {
    Plain(String),
    Quoted(String),
}

fn tokenize(raw: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut buffer = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = raw.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(escaped) => buffer.push(escaped),
                None => {
                    return Err(QuarryError::config(format!(
                        "path '{}': trailing escape character",
                        raw
                    )))
                }
            },
            '\'' => {
                if in_quotes {
                    in_quotes = false;
                    quoted = true;
                } else if buffer.is_empty() {
                    in_quotes = true;
                } else {
                    return Err(QuarryError::config(format!(
                        "path '{}': quote in the middle of a segment",
                        raw
                    )));
                }
            }
            '.' if !in_quotes => {
                push_token(raw, &mut tokens, &mut buffer, &mut quoted)?;
            }
            _ => buffer.push(ch),
        }
    }

    if in_quotes {
        return Err(QuarryError::config(format!(
            "path '{}': unterminated quote",
            raw
        )));
    }
    push_token(raw, &mut tokens, &mut buffer, &mut quoted)?;

    Ok(tokens)
}

fn push_token(
    raw: &str,
    tokens: &mut Vec<Token>,
    buffer: &mut String,
    quoted: &mut bool,
) -> Result<()> {
    if buffer.is_empty() && !*quoted {
        return Err(QuarryError::config(format!(
            "path '{}': empty segment",
            raw
        )));
    }
    let text = std::mem::take(buffer);
    tokens.push(if *quoted {
        Token::Quoted(text)
    } else {
        Token::Plain(text)
    });
    *quoted = false;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryObject;
    use serde_json::json;

    fn vm() -> GraphValue {
        let root = MemoryObject::from_json(&json!({
            "_type": "ClusterComputeResource",
            "name": "cluster1",
            "vm": {
                "_type": "VirtualMachine",
                "name": "vm1",
                "config": {
                    "hardware": {"memoryMB": 4096},
                    "extraConfig": {"guestinfo.build.id": "42"}
                },
                "guest": {"ipAddress": null},
                "disks": [1, 2]
            }
        }))
        .unwrap();
        root.try_get_attribute("vm").unwrap()
    }

    #[test]
    fn parses_dotted_quoted_and_call_segments() {
        let path = PathExpr::parse("config.'guestinfo.build.id'.ancestor(dc)").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Attr("config".into()),
                Segment::Key("guestinfo.build.id".into()),
                Segment::Call {
                    name: "ancestor".into(),
                    args: vec!["dc".into()]
                },
            ]
        );
    }

    #[test]
    fn rejects_empty_segment_and_unterminated_quote() {
        assert!(PathExpr::parse("config..hardware").is_err());
        assert!(PathExpr::parse("config.'oops").is_err());
        assert!(PathExpr::parse("").is_err());
    }

    #[test]
    fn rejects_var_reference_after_first_segment() {
        assert!(PathExpr::parse("config.$disks").is_err());
        assert!(PathExpr::parse("$disks.capacity").is_ok());
    }

    #[test]
    fn resolves_through_nested_mappings() {
        let value = PathExpr::parse("config.hardware.memoryMB")
            .unwrap()
            .resolve(&vm(), &VarEnv::new())
            .unwrap();
        match value {
            GraphValue::Scalar(v) => assert_eq!(v, json!(4096)),
            other => panic!("expected scalar, got {:?}", other),
        }
    }

    #[test]
    fn quoted_key_addresses_dotted_mapping_key() {
        let value = PathExpr::parse("config.extraConfig.'guestinfo.build.id'")
            .unwrap()
            .resolve(&vm(), &VarEnv::new())
            .unwrap();
        match value {
            GraphValue::Scalar(v) => assert_eq!(v, json!("42")),
            other => panic!("expected scalar, got {:?}", other),
        }
    }

    #[test]
    fn missing_data_short_circuits_to_absent() {
        // guest.ipAddress is null, and everything below it stays absent
        let value = PathExpr::parse("guest.ipAddress")
            .unwrap()
            .resolve(&vm(), &VarEnv::new())
            .unwrap();
        assert!(value.is_absent());

        let value = PathExpr::parse("guest.ipAddress.family")
            .unwrap()
            .resolve(&vm(), &VarEnv::new())
            .unwrap();
        assert!(value.is_absent());
    }

    #[test]
    fn ancestor_call_walks_up_the_graph() {
        let value = PathExpr::parse("ancestor(ClusterComputeResource).name")
            .unwrap()
            .resolve(&vm(), &VarEnv::new())
            .unwrap();
        match value {
            GraphValue::Scalar(v) => assert_eq!(v, json!("cluster1")),
            other => panic!("expected scalar, got {:?}", other),
        }
    }

    #[test]
    fn method_call_on_absent_is_an_error() {
        let err = PathExpr::parse("guest.ipAddress.ancestor(dc)")
            .unwrap()
            .resolve(&vm(), &VarEnv::new())
            .unwrap_err();
        assert!(matches!(err, QuarryError::Resolution { .. }));
    }

    #[test]
    fn unknown_method_is_an_error() {
        let err = PathExpr::parse("frobnicate()")
            .unwrap()
            .resolve(&vm(), &VarEnv::new())
            .unwrap_err();
        assert!(matches!(err, QuarryError::Resolution { .. }));
    }

    #[test]
    fn sequences_are_not_auto_mapped() {
        let err = PathExpr::parse("disks.capacity")
            .unwrap()
            .resolve(&vm(), &VarEnv::new())
            .unwrap_err();
        assert!(matches!(err, QuarryError::Resolution { .. }));
    }

    #[test]
    fn attribute_on_scalar_is_an_error() {
        let err = PathExpr::parse("name.length")
            .unwrap()
            .resolve(&vm(), &VarEnv::new())
            .unwrap_err();
        assert!(matches!(err, QuarryError::Resolution { .. }));
    }

    #[test]
    fn variables_resolve_from_the_environment() {
        let mut env = VarEnv::new();
        env.insert("mem", GraphValue::Scalar(json!(4096)));

        let value = PathExpr::parse("$mem")
            .unwrap()
            .resolve(&vm(), &env)
            .unwrap();
        match value {
            GraphValue::Scalar(v) => assert_eq!(v, json!(4096)),
            other => panic!("expected scalar, got {:?}", other),
        }

        let err = PathExpr::parse("$missing")
            .unwrap()
            .resolve(&vm(), &env)
            .unwrap_err();
        assert!(matches!(err, QuarryError::Config { .. }));
    }
}
