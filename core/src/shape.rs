//! Structural comparison between an agent's example query and a generated one.
//!
//! Only the *shape* is compared: key sets and value kinds, recursively. Literal
//! values in the example are placeholders and never compared.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};

/// How strictly generated queries must follow the example's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapePolicy {
    Off,
    #[default]
    Warn,
    Enforce,
}

impl FromStr for ShapePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "warn" => Ok(Self::Warn),
            "enforce" => Ok(Self::Enforce),
            other => Err(format!(
                "unsupported shape policy `{other}` (expected off|warn|enforce)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Object,
    Array,
    String,
    Number,
    Boolean,
    Null,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Object(_) => Self::Object,
            Value::Array(_) => Self::Array,
            Value::String(_) => Self::String,
            Value::Number(_) => Self::Number,
            Value::Bool(_) => Self::Boolean,
            Value::Null => Self::Null,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Null => "null",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MismatchKind {
    MissingKey,
    UnexpectedKey,
    TypeMismatch { expected: ValueKind, found: ValueKind },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShapeMismatch {
    pub path: String,
    #[serde(flatten)]
    pub kind: MismatchKind,
}

impl fmt::Display for ShapeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            MismatchKind::MissingKey => write!(f, "{}: missing key", self.path),
            MismatchKind::UnexpectedKey => write!(f, "{}: unexpected key", self.path),
            MismatchKind::TypeMismatch { expected, found } => {
                write!(f, "{}: expected {expected}, found {found}", self.path)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShapeReport {
    pub mismatches: Vec<ShapeMismatch>,
}

impl ShapeReport {
    pub fn conforms(&self) -> bool {
        self.mismatches.is_empty()
    }
}

impl fmt::Display for ShapeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, mismatch) in self.mismatches.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{mismatch}")?;
        }
        Ok(())
    }
}

pub fn check_shape(example: &Value, candidate: &Value) -> ShapeReport {
    let mut report = ShapeReport::default();
    compare(example, candidate, "$", &mut report.mismatches);
    report
}

fn compare(example: &Value, candidate: &Value, path: &str, out: &mut Vec<ShapeMismatch>) {
    match (example, candidate) {
        // A null placeholder says nothing about the expected type.
        (Value::Null, _) => {}
        (Value::Object(expected), Value::Object(found)) => compare_objects(expected, found, path, out),
        (Value::Array(expected), Value::Array(found)) => {
            let Some(element) = expected.first() else {
                return;
            };
            for (i, item) in found.iter().enumerate() {
                compare(element, item, &format!("{path}[{i}]"), out);
            }
        }
        _ => {
            let expected = ValueKind::of(example);
            let found = ValueKind::of(candidate);
            if expected != found {
                out.push(ShapeMismatch {
                    path: path.to_string(),
                    kind: MismatchKind::TypeMismatch { expected, found },
                });
            }
        }
    }
}

fn compare_objects(
    expected: &Map<String, Value>,
    found: &Map<String, Value>,
    path: &str,
    out: &mut Vec<ShapeMismatch>,
) {
    for (key, example_value) in expected {
        let child = format!("{path}.{key}");
        match found.get(key) {
            Some(value) => compare(example_value, value, &child, out),
            None => out.push(ShapeMismatch {
                path: child,
                kind: MismatchKind::MissingKey,
            }),
        }
    }
    for key in found.keys().filter(|key| !expected.contains_key(*key)) {
        out.push(ShapeMismatch {
            path: format!("{path}.{key}"),
            kind: MismatchKind::UnexpectedKey,
        });
    }
}
