//! Value formatting - pure transforms applied to resolved raw values
//!
//! A field spec may append formatter directives to its path (`fmt=gib
//! multiply=1048576`). Directives chain left to right, each receiving the
//! previous one's output. Formatting never touches the object graph, and an
//! absent raw value formats to absent no matter which directives are
//! declared. Unknown directive names and parameters are rejected when the
//! schema is loaded, never at format time.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::error::{QuarryError, Result};

const GIB: f64 = (1u64 << 30) as f64;

/// A named, parameterized value transform.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatDirective {
    /// Binary unit-scale: `value * multiply / 2^30`, rounded to one decimal.
    /// `multiply` converts the source unit to bytes (e.g. 1048576 for MB).
    Gib { multiply: f64 },
    /// Generic scale-by-constant with configurable rounding precision.
    Scale {
        multiply: f64,
        divide: f64,
        precision: u32,
    },
    /// Decode an integer epoch counter (seconds) or an ISO-8601 string into
    /// a canonical RFC 3339 UTC timestamp.
    Datetime,
}

impl FormatDirective {
    /// Create a directive from its schema name. Unknown names are a
    /// configuration error, surfaced at schema-load time.
    pub fn from_name(name: &str) -> Result<FormatDirective> {
        match name {
            "gib" => Ok(FormatDirective::Gib { multiply: 1.0 }),
            "scale" => Ok(FormatDirective::Scale {
                multiply: 1.0,
                divide: 1.0,
                precision: 1,
            }),
            "datetime" => Ok(FormatDirective::Datetime),
            other => Err(QuarryError::config(format!(
                "unknown formatter 'fmt={}'",
                other
            ))),
        }
    }

    /// Apply a `key=value` parameter token to this directive.
    pub fn set_param(&mut self, key: &str, value: &str) -> Result<()> {
        let parse_number = |value: &str| -> Result<f64> {
            value.parse::<f64>().map_err(|_| {
                QuarryError::config(format!(
                    "formatter parameter '{}={}' is not a number",
                    key, value
                ))
            })
        };

        match self {
            FormatDirective::Gib { multiply } if key == "multiply" => {
                *multiply = parse_number(value)?;
                Ok(())
            }
            FormatDirective::Scale { multiply, .. } if key == "multiply" => {
                *multiply = parse_number(value)?;
                Ok(())
            }
            FormatDirective::Scale { divide, .. } if key == "divide" => {
                *divide = parse_number(value)?;
                Ok(())
            }
            FormatDirective::Scale { precision, .. } if key == "precision" => {
                *precision = parse_number(value)? as u32;
                Ok(())
            }
            _ => Err(QuarryError::config(format!(
                "formatter '{}' does not accept parameter '{}'",
                self.name(),
                key
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FormatDirective::Gib { .. } => "gib",
            FormatDirective::Scale { .. } => "scale",
            FormatDirective::Datetime => "datetime",
        }
    }

    fn apply_one(&self, value: Value) -> Result<Value> {
        match self {
            FormatDirective::Gib { multiply } => {
                let raw = as_number(&value, self.name())?;
                number(round(raw * multiply / GIB, 1), self.name())
            }
            FormatDirective::Scale {
                multiply,
                divide,
                precision,
            } => {
                let raw = as_number(&value, self.name())?;
                number(round(raw * multiply / divide, *precision), self.name())
            }
            FormatDirective::Datetime => decode_datetime(value),
        }
    }
}

/// Apply a directive chain to a resolved raw value.
pub fn apply(value: Value, directives: &[FormatDirective]) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    let mut current = value;
    for directive in directives {
        current = directive.apply_one(current)?;
    }
    Ok(current)
}

fn as_number(value: &Value, directive: &str) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        QuarryError::format(directive, format!("expected a numeric value, got {}", value))
    })
}

fn number(value: f64, directive: &str) -> Result<Value> {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| QuarryError::format(directive, format!("result {} is not representable", value)))
}

fn round(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

fn decode_datetime(value: Value) -> Result<Value> {
    match &value {
        Value::Number(n) => {
            let secs = n.as_i64().ok_or_else(|| {
                QuarryError::format("datetime", format!("epoch value {} is not an integer", n))
            })?;
            let ts = Utc.timestamp_opt(secs, 0).single().ok_or_else(|| {
                QuarryError::format("datetime", format!("epoch value {} is out of range", secs))
            })?;
            Ok(Value::String(ts.to_rfc3339()))
        }
        Value::String(text) => {
            if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
                return Ok(Value::String(ts.with_timezone(&Utc).to_rfc3339()));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
                return Ok(Value::String(naive.and_utc().to_rfc3339()));
            }
            Err(QuarryError::format(
                "datetime",
                format!("'{}' is neither an epoch counter nor a timestamp", text),
            ))
        }
        other => Err(QuarryError::format(
            "datetime",
            format!("cannot decode {} as a timestamp", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn directive(tokens: &[(&str, &str)]) -> FormatDirective {
        let mut d = FormatDirective::from_name(tokens[0].1).unwrap();
        for (key, value) in &tokens[1..] {
            d.set_param(key, value).unwrap();
        }
        d
    }

    #[test]
    fn gib_converts_megabytes() {
        let d = directive(&[("fmt", "gib"), ("multiply", "1048576")]);
        assert_eq!(apply(json!(4096), &[d]).unwrap(), json!(4.0));
    }

    #[test]
    fn gib_rounds_to_one_decimal() {
        let d = directive(&[("fmt", "gib"), ("multiply", "1048576")]);
        assert_eq!(apply(json!(1500), &[d]).unwrap(), json!(1.5));
    }

    #[test]
    fn scale_uses_declared_precision() {
        let d = directive(&[("fmt", "scale"), ("divide", "1000"), ("precision", "2")]);
        assert_eq!(apply(json!(12345), &[d]).unwrap(), json!(12.35));
    }

    #[test]
    fn absent_propagates_through_any_chain() {
        let chain = vec![
            directive(&[("fmt", "gib"), ("multiply", "1048576")]),
            directive(&[("fmt", "scale")]),
        ];
        assert_eq!(apply(Value::Null, &chain).unwrap(), Value::Null);
    }

    #[test]
    fn datetime_decodes_epoch_zero() {
        let got = apply(json!(0), &[FormatDirective::Datetime]).unwrap();
        assert_eq!(got, json!("1970-01-01T00:00:00+00:00"));
    }

    #[test]
    fn datetime_is_idempotent_on_canonical_input() {
        let once = apply(json!("2024-06-01T12:30:00+02:00"), &[FormatDirective::Datetime]).unwrap();
        let twice = apply(once.clone(), &[FormatDirective::Datetime]).unwrap();
        assert_eq!(once, json!("2024-06-01T10:30:00+00:00"));
        assert_eq!(once, twice);
    }

    #[test]
    fn datetime_rejects_unrecognized_shapes() {
        let err = apply(json!("not a date"), &[FormatDirective::Datetime]).unwrap_err();
        assert!(matches!(err, QuarryError::Format { .. }));

        let err = apply(json!(true), &[FormatDirective::Datetime]).unwrap_err();
        assert!(matches!(err, QuarryError::Format { .. }));
    }

    #[test]
    fn non_numeric_into_unit_scale_is_a_format_error() {
        let d = directive(&[("fmt", "gib")]);
        let err = apply(json!("lots"), &[d]).unwrap_err();
        assert!(matches!(err, QuarryError::Format { .. }));
    }

    #[test]
    fn unknown_directive_name_is_a_config_error() {
        let err = FormatDirective::from_name("frobnicate").unwrap_err();
        assert!(matches!(err, QuarryError::Config { .. }));
    }

    #[test]
    fn unknown_parameter_is_a_config_error() {
        let mut d = FormatDirective::from_name("gib").unwrap();
        let err = d.set_param("divide", "7").unwrap_err();
        assert!(matches!(err, QuarryError::Config { .. }));
    }
}
