use std::collections::HashMap;

use crate::Value;

static UNKNOWN: Value = Value::Unknown;

/// Type alias for a HashMap representing user attributes.
///
/// Keys are strings representing attribute names.
///
/// # Examples
/// ```
/// # use growthbook::{Attributes, Value};
/// let attributes = [
///     ("id".to_owned(), "user-123".into()),
///     ("age".to_owned(), 30.into()),
///     ("is_premium_member".to_owned(), true.into()),
/// ].into_iter().collect::<Attributes>();
/// ```
pub type Attributes = HashMap<String, Value>;

/// Dot-separated path into nested attributes, e.g. `"company.plan.name"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributePath {
    raw: String,
    segments: Vec<String>,
}

impl AttributePath {
    pub fn new(raw: impl Into<String>) -> AttributePath {
        let raw = raw.into();
        let segments = raw.split('.').map(str::to_owned).collect();
        AttributePath { raw, segments }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl From<&str> for AttributePath {
    fn from(value: &str) -> Self {
        AttributePath::new(value)
    }
}

/// Something a condition can be evaluated against.
///
/// Missing paths resolve to [`Value::Unknown`].
pub trait PathLookup {
    fn lookup(&self, path: &AttributePath) -> &Value;
}

impl PathLookup for Attributes {
    fn lookup(&self, path: &AttributePath) -> &Value {
        let Some((first, rest)) = path.segments().split_first() else {
            return &UNKNOWN;
        };
        self.get(first).map_or(&UNKNOWN, |value| descend(value, rest))
    }
}

impl PathLookup for Value {
    fn lookup(&self, path: &AttributePath) -> &Value {
        descend(self, path.segments())
    }
}

fn descend<'a>(mut value: &'a Value, segments: &[String]) -> &'a Value {
    for segment in segments {
        value = match value {
            Value::Object(map) => map.get(segment).unwrap_or(&UNKNOWN),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index))
                .unwrap_or(&UNKNOWN),
            _ => &UNKNOWN,
        };
    }
    value
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AttributePath, Attributes, PathLookup};
    use crate::Value;

    fn attributes() -> Attributes {
        serde_json::from_value(json!({
            "id": "123",
            "company": {"plan": {"name": "pro"}, "seats": [10, 20]},
            "tags": ["a", "b"],
        }))
        .unwrap()
    }

    #[test]
    fn top_level() {
        assert_eq!(attributes().lookup(&"id".into()), &Value::from("123"));
    }

    #[test]
    fn nested_object() {
        assert_eq!(
            attributes().lookup(&"company.plan.name".into()),
            &Value::from("pro")
        );
    }

    #[test]
    fn array_index() {
        assert_eq!(attributes().lookup(&"company.seats.1".into()), &Value::from(20));
        assert_eq!(attributes().lookup(&"tags.5".into()), &Value::Unknown);
    }

    #[test]
    fn missing_path_is_unknown() {
        let attributes = attributes();
        assert!(attributes.lookup(&"country".into()).is_unknown());
        assert!(attributes.lookup(&"company.plan.price".into()).is_unknown());
        assert!(attributes.lookup(&"id.length".into()).is_unknown());
    }

    #[test]
    fn lookup_on_value() {
        let value = Value::from(json!({"a": {"b": true}}));
        assert_eq!(value.lookup(&AttributePath::new("a.b")), &Value::from(true));
    }
}
