//! Dynamically-typed JSON-like value used for attributes, feature values, and condition operands.
use std::{
    collections::BTreeMap,
    hash::{Hash, Hasher},
};

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Relative tolerance used when comparing two non-integral numbers.
const RELATIVE_EPSILON: f64 = 1e-9;

/// A JSON-like value.
///
/// Numbers compare with a custom rule: two integral numbers are equal when they are equal as
/// 64-bit integers; two non-integral numbers are equal when they are within a small relative
/// tolerance. An integral and a non-integral number are never equal. This tolerates drift from
/// repeated (de)serialization through different platforms.
///
/// `Unknown` marks the absence of a value (e.g., a missing attribute path) and is never produced
/// by decoding JSON.
///
/// # Examples
/// ```
/// # use growthbook::Value;
/// assert_eq!(Value::from(0.1 + 0.2), Value::from(0.3));
/// assert_eq!(Value::from(3), Value::from(3.0));
/// assert_ne!(Value::from(3), Value::from("3"));
/// ```
#[derive(Debug, Clone, Default, From, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    /// JSON `null`.
    Null,
    /// A boolean value.
    #[from]
    Boolean(bool),
    /// A string value.
    #[from]
    String(String),
    /// A numerical value.
    #[from]
    Number(f64),
    /// An ordered list of values.
    Array(Vec<Value>),
    /// A string-keyed map of values.
    #[from]
    Object(BTreeMap<String, Value>),
    /// Absence of a value.
    #[default]
    Unknown,
}

impl Value {
    /// Return `true` for `Null` and `Unknown`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Null | Value::Unknown)
    }

    /// Return `true` for `Unknown`.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown)
    }

    /// Return `true` for strings, numbers, booleans, and null.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::Boolean(_) | Value::String(_) | Value::Number(_)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(v) => Some(v),
            _ => None,
        }
    }

    /// Fixed truthiness coercion used to derive `on`/`off` of a feature.
    ///
    /// `Null`, `Unknown`, `false`, `0`, `""`, empty arrays, and empty objects are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::Unknown => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(v) => !v.is_empty(),
            Value::Object(v) => !v.is_empty(),
        }
    }

    /// Name of the value type as reported by the `$type` condition operator.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Unknown => "undefined",
        }
    }

    /// String form used as input to the bucketing hash.
    ///
    /// Strings are used verbatim, numbers and booleans use their canonical JSON form. Other
    /// values cannot be hashed and produce an empty string.
    pub fn to_hash_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Number(n) => format_number(*n),
            Value::Boolean(b) => b.to_string(),
            Value::Null | Value::Unknown | Value::Array(_) | Value::Object(_) => String::new(),
        }
    }
}

/// Format number the way JSON producers do: integral values without a fractional part.
pub(crate) fn format_number(n: f64) -> String {
    if is_integral(n) {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

fn is_integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64
}

fn numbers_equal(a: f64, b: f64) -> bool {
    match (is_integral(a), is_integral(b)) {
        (true, true) => (a as i64) == (b as i64),
        (false, false) => {
            if a == b {
                return true;
            }
            let scale = a.abs().max(b.abs());
            (a - b).abs() <= RELATIVE_EPSILON * scale
        }
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Unknown, Value::Unknown) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => numbers_equal(*a, *b),
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null | Value::Unknown => {}
            Value::Boolean(b) => b.hash(state),
            Value::String(s) => s.hash(state),
            Value::Number(n) => {
                if is_integral(*n) {
                    (*n as i64).hash(state);
                } else {
                    // Tolerant equality never relates numbers of different sign, so the sign
                    // is the finest key that equal numbers always share.
                    n.is_sign_negative().hash(state);
                }
            }
            Value::Array(v) => v.hash(state),
            Value::Object(v) => v.hash(state),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(v) => Value::Array(v.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(v) => {
                Value::Object(v.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null | Value::Unknown => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(b),
            Value::String(s) => serde_json::Value::String(s),
            Value::Number(n) if is_integral(n) => serde_json::Value::from(n as i64),
            Value::Number(n) => serde_json::Number::from_f64(n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Array(v) => {
                serde_json::Value::Array(v.into_iter().map(serde_json::Value::from).collect())
            }
            Value::Object(v) => serde_json::Value::Object(
                v.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value.into())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Unknown => f.write_str("undefined"),
            other => write!(f, "{}", serde_json::Value::from(other.clone())),
        }
    }
}

impl log::kv::ToValue for Value {
    fn to_value(&self) -> log::kv::Value {
        log::kv::Value::from_display(self)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{hash_map::DefaultHasher, HashSet},
        hash::{Hash, Hasher},
    };

    use serde_json::json;

    use super::Value;

    fn hash_of(value: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn integral_numbers_compare_as_integers() {
        assert_eq!(Value::from(42), Value::from(42.0));
        assert_ne!(Value::from(42), Value::from(43));
        assert_eq!(hash_of(&Value::from(42)), hash_of(&Value::from(42.0)));
    }

    #[test]
    fn non_integral_numbers_tolerate_drift() {
        let a = Value::from(0.1 + 0.2);
        let b = Value::from(0.3);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(Value::from(0.3), Value::from(0.31));
    }

    #[test]
    fn equal_numbers_hash_alike_across_rounding_boundaries() {
        let mid = 1.5 + 2f64.powi(-24);
        let a = Value::from(mid - 1e-12);
        let b = Value::from(mid + 1e-12);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let set = HashSet::from([a]);
        assert!(set.contains(&b));
        assert!(!set.contains(&Value::from(-mid)));
    }

    #[test]
    fn integral_never_equals_non_integral() {
        assert_ne!(Value::from(1.0), Value::from(1.000_000_000_1));
    }

    #[test]
    fn different_kinds_are_not_equal() {
        assert_ne!(Value::from(1), Value::from("1"));
        assert_ne!(Value::from(true), Value::from(1));
        assert_ne!(Value::Null, Value::Unknown);
    }

    #[test]
    fn works_as_set_member() {
        let set: HashSet<Value> = [Value::from(1), Value::from("a"), Value::from(2.5)]
            .into_iter()
            .collect();
        assert!(set.contains(&Value::from(1.0)));
        assert!(set.contains(&Value::from("a")));
        assert!(set.contains(&Value::from(2.5)));
        assert!(!set.contains(&Value::from("b")));
    }

    #[test]
    fn decodes_json() {
        let value: Value = serde_json::from_value(json!({
            "a": [1, "x", null, true],
            "b": {"c": 1.5}
        }))
        .unwrap();
        let Value::Object(map) = &value else {
            panic!("expected object, got {value:?}");
        };
        assert_eq!(
            map["a"],
            Value::Array(vec![1.into(), "x".into(), Value::Null, true.into()])
        );
        assert_eq!(map["b"].as_object().unwrap()["c"], Value::from(1.5));
    }

    #[test]
    fn encodes_integral_numbers_without_fraction() {
        assert_eq!(serde_json::to_string(&Value::from(3.0)).unwrap(), "3");
        assert_eq!(serde_json::to_string(&Value::from(3.5)).unwrap(), "3.5");
        assert_eq!(serde_json::to_string(&Value::Unknown).unwrap(), "null");
    }

    #[test]
    fn truthiness() {
        for falsy in [
            Value::Null,
            Value::Unknown,
            Value::from(false),
            Value::from(0),
            Value::from(""),
            Value::Array(vec![]),
            Value::Object(Default::default()),
        ] {
            assert!(!falsy.is_truthy(), "{falsy:?} should be falsy");
        }
        for truthy in [
            Value::from(true),
            Value::from(1),
            Value::from(-0.5),
            Value::from("false"),
            Value::from(vec![0]),
        ] {
            assert!(truthy.is_truthy(), "{truthy:?} should be truthy");
        }
    }

    #[test]
    fn hash_string() {
        assert_eq!(Value::from("abc").to_hash_string(), "abc");
        assert_eq!(Value::from(123).to_hash_string(), "123");
        assert_eq!(Value::from(1.5).to_hash_string(), "1.5");
        assert_eq!(Value::from(true).to_hash_string(), "true");
        assert_eq!(Value::Null.to_hash_string(), "");
        assert_eq!(Value::from(vec![1]).to_hash_string(), "");
    }
}
