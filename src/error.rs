use thiserror::Error;

/// Convenience result type for extraction operations.
pub type Result<T> = std::result::Result<T, QuarryError>;

/// Error type shared across schema loading, path resolution, formatting and
/// graph traversal.
///
/// `Config` is always raised at schema-load time and is fatal to the run.
/// The other variants are scoped to the evaluation of a single root object:
/// a failing object does not abort its siblings in a batch.
#[derive(Debug, Error)]
pub enum QuarryError {
    /// The schema text is structurally invalid, references an undeclared
    /// variable, uses an unknown formatter, or tabulates a missing field.
    /// Carries every violation found, not just the first.
    #[error("invalid schema: {}", .violations.join("; "))]
    Config { violations: Vec<String> },

    /// A path segment names an attribute or method not recognized on the
    /// current value.
    #[error("cannot resolve '{path}': {message}")]
    Resolution { path: String, message: String },

    /// A resolved raw value does not match the shape a formatter expects.
    #[error("formatter '{directive}': {message}")]
    Format { directive: String, message: String },

    /// Ancestor search exceeded its depth bound (malformed or cyclic data).
    #[error("traversal aborted: {0}")]
    Traversal(String),

    /// The schema document is not valid YAML.
    #[error("schema parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl QuarryError {
    /// A `Config` error carrying a single violation.
    pub fn config(message: impl Into<String>) -> Self {
        QuarryError::Config {
            violations: vec![message.into()],
        }
    }

    pub fn resolution(path: impl Into<String>, message: impl Into<String>) -> Self {
        QuarryError::Resolution {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn format(directive: impl Into<String>, message: impl Into<String>) -> Self {
        QuarryError::Format {
            directive: directive.into(),
            message: message.into(),
        }
    }
}
