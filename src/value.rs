//! Parameter values, access flags, and advisory type metadata.
//!
//! Values are modeled as a tagged union, with `type_hint`/`signature`
//! acting as the (advisory, unenforced) variant selector.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A parameter's value, encoded on the wire as JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A boolean switch.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating-point scalar.
    Float(f64),
    /// A percentage, 0–100. Distinct from `Int` only in its advisory
    /// `type_hint`/`signature` — the wire representation is a plain number.
    Percent(u8),
    /// A UTF-8 string.
    Str(String),
    /// A 2-component float vector.
    Vec2f([f64; 2]),
    /// A 3-component float vector.
    Vec3f([f64; 3]),
    /// A 4-component float vector.
    Vec4f([f64; 4]),
    /// A row-major matrix, e.g. a node's `_matrix` transform.
    Matrix(Vec<Vec<f64>>),
    /// A nested structural value, used by `_matrix`-style composite state
    /// and by CALL/SET payloads that don't fit a scalar/vector shape.
    Map(serde_json::Map<String, serde_json::Value>),
}

impl Value {
    /// Advisory type hint string, e.g. `"float"`, `"vec3f"`.
    pub fn type_hint(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Percent(_) => "percent",
            Value::Str(_) => "string",
            Value::Vec2f(_) => "vec2f",
            Value::Vec3f(_) => "vec3f",
            Value::Vec4f(_) => "vec4f",
            Value::Matrix(_) => "matrix",
            Value::Map(_) => "map",
        }
    }

    /// Compact signature tag, e.g. `"i"`, `"3f"`, mirroring this protocol's
    /// struct-packing signatures. Advisory only: there is no type-level
    /// enforcement against it.
    pub fn signature(&self) -> &'static str {
        match self {
            Value::Bool(_) => "b",
            Value::Int(_) => "i",
            Value::Float(_) => "f",
            Value::Percent(_) => "B",
            Value::Str(_) => "s",
            Value::Vec2f(_) => "2f",
            Value::Vec3f(_) => "3f",
            Value::Vec4f(_) => "4f",
            Value::Matrix(_) => "m",
            Value::Map(_) => "o",
        }
    }

    /// Bit-equal comparison on the encoded payload, used by the signal loop
    /// guard for value types where `PartialEq` would be lossy (floats
    /// compared bit-for-bit rather than numerically).
    pub fn bit_equal(&self, other: &Value) -> bool {
        serde_json::to_vec(self).ok() == serde_json::to_vec(other).ok()
    }
}

/// Access flags: readable, writable, emitter, signal-sink.
///
/// Stored as a compact struct rather than a bitflags type because the wire
/// representation is a four-letter string (`"rwes"`), which this type
/// parses and re-renders directly.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Access {
    /// Whether a GET may read the parameter's current value.
    pub readable: bool,
    /// Whether a SET may write the parameter's value.
    pub writable: bool,
    /// Whether a change fans out to subscribers and monitors as a SIG/MOD.
    pub emitter: bool,
    /// Whether the parameter accepts inbound SIG updates from a subscription.
    pub sink: bool,
}

impl Access {
    /// Parses an `"rwes"`-style flag string; any character not in that set
    /// is ignored, and any flag absent from `s` is `false`.
    pub fn parse(s: &str) -> Self {
        Self {
            readable: s.contains('r'),
            writable: s.contains('w'),
            emitter: s.contains('e'),
            sink: s.contains('s'),
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.readable {
            write!(f, "r")?;
        }
        if self.writable {
            write!(f, "w")?;
        }
        if self.emitter {
            write!(f, "e")?;
        }
        if self.sink {
            write!(f, "s")?;
        }
        Ok(())
    }
}

impl Serialize for Access {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Access {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Access::parse(&s))
    }
}

/// Optional numeric bounds on a parameter. Advisory only — the registry
/// never clamps a `set()` against these.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bounds {
    /// Lower bound, if any.
    pub min: Option<f64>,
    /// Upper bound, if any.
    pub max: Option<f64>,
    /// Suggested increment, if any.
    pub step: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_round_trips_through_string() {
        let access = Access::parse("rwes");
        assert_eq!(access.to_string(), "rwes");
        assert!(access.readable && access.writable && access.emitter && access.sink);
    }

    #[test]
    fn access_missing_flags_are_false() {
        let access = Access::parse("r");
        assert!(access.readable);
        assert!(!access.writable);
        assert!(!access.emitter);
        assert!(!access.sink);
    }

    #[test]
    fn bit_equal_distinguishes_nan_consistently() {
        let a = Value::Float(f64::NAN);
        let b = Value::Float(f64::NAN);
        // serde_json can't encode NaN; both fail to serialize identically,
        // so bit_equal degrades to `true` here rather than panicking.
        assert!(a.bit_equal(&b));
    }
}
