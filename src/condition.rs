//! Targeting conditions modeled after MongoDB queries.
//!
//! Conditions are compiled once when a payload is decoded, so evaluation does not need to
//! re-inspect JSON or recompile regular expressions.
use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    attributes::{AttributePath, PathLookup},
    Value,
};

/// Named, server-defined sets of values referenced by `$inGroup`/`$notInGroup`.
pub type SavedGroups = HashMap<String, HashSet<Value>>;

/// A compiled targeting condition.
///
/// The original JSON is kept so that the condition serializes back to the same shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub struct Condition {
    source: serde_json::Value,
    node: Node,
}

#[derive(Debug, Clone)]
enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Nor(Vec<Node>),
    Not(Box<Node>),
    Field(AttributePath, ValueTest),
    /// Condition that is not a JSON object. Never matches.
    Invalid,
}

#[derive(Debug, Clone)]
enum ValueTest {
    Equals(Value),
    Operators(Vec<Operator>),
}

#[derive(Debug, Clone)]
enum Operator {
    Eq(Value),
    Ne(Value),
    Compare(Ordering, bool, Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    All(Vec<ValueTest>),
    ElemMatch(ElemMatch),
    Size(Box<ValueTest>),
    Exists(bool),
    Type(String),
    Regex(Option<Regex>),
    Not(Box<ValueTest>),
    InGroup(String),
    NotInGroup(String),
    Version(VersionOp, String),
    /// Unsupported operator or malformed operand. Never matches.
    Invalid,
}

#[derive(Debug, Clone)]
enum ElemMatch {
    Value(Box<ValueTest>),
    Condition(Box<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VersionOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Observes condition evaluation.
pub(crate) trait ConditionVisitor {
    /// Called after a field test has been evaluated.
    #[allow(unused_variables)]
    #[inline]
    fn on_field(&mut self, path: &AttributePath, matched: bool) {}
}

/// Dummy visitor that does nothing.
pub(crate) struct NoopConditionVisitor;

impl ConditionVisitor for NoopConditionVisitor {}

impl Condition {
    /// Evaluate condition against `attributes`.
    ///
    /// Missing attribute paths evaluate as [`Value::Unknown`]. Evaluation never fails: malformed
    /// conditions and unsupported operators simply don't match.
    pub fn eval(&self, attributes: &dyn PathLookup, saved_groups: &SavedGroups) -> bool {
        self.eval_with_visitor(attributes, saved_groups, &mut NoopConditionVisitor)
    }

    pub(crate) fn eval_with_visitor<V: ConditionVisitor>(
        &self,
        attributes: &dyn PathLookup,
        saved_groups: &SavedGroups,
        visitor: &mut V,
    ) -> bool {
        let mut eval = Eval {
            saved_groups,
            visitor,
        };
        eval.node(&self.node, attributes)
    }

    /// Return the JSON this condition was compiled from.
    pub fn as_json(&self) -> &serde_json::Value {
        &self.source
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl From<serde_json::Value> for Condition {
    fn from(source: serde_json::Value) -> Self {
        let node = compile_node(&source);
        Condition { source, node }
    }
}

impl From<Condition> for serde_json::Value {
    fn from(value: Condition) -> Self {
        value.source
    }
}

fn compile_node(json: &serde_json::Value) -> Node {
    let serde_json::Value::Object(object) = json else {
        return Node::Invalid;
    };

    let mut clauses = object
        .iter()
        .map(|(key, value)| match key.as_str() {
            "$and" => compile_list(value).map_or(Node::Invalid, Node::And),
            "$or" => compile_list(value).map_or(Node::Invalid, Node::Or),
            "$nor" => compile_list(value).map_or(Node::Invalid, Node::Nor),
            "$not" => Node::Not(Box::new(compile_node(value))),
            path => Node::Field(AttributePath::new(path), compile_value_test(value)),
        })
        .collect::<Vec<_>>();

    if clauses.len() == 1 {
        clauses.remove(0)
    } else {
        Node::And(clauses)
    }
}

fn compile_list(json: &serde_json::Value) -> Option<Vec<Node>> {
    Some(json.as_array()?.iter().map(compile_node).collect())
}

fn is_operator_object(json: &serde_json::Value) -> bool {
    json.as_object()
        .is_some_and(|object| !object.is_empty() && object.keys().all(|k| k.starts_with('$')))
}

fn compile_value_test(json: &serde_json::Value) -> ValueTest {
    match json.as_object() {
        Some(object) if is_operator_object(json) => ValueTest::Operators(
            object
                .iter()
                .map(|(op, operand)| compile_operator(op, operand))
                .collect(),
        ),
        _ => ValueTest::Equals(json.clone().into()),
    }
}

fn compile_operator(op: &str, operand: &serde_json::Value) -> Operator {
    let values = || -> Option<Vec<Value>> {
        Some(operand.as_array()?.iter().cloned().map(Value::from).collect())
    };
    let version = |op| {
        operand
            .as_str()
            .map_or(Operator::Invalid, |s| {
                Operator::Version(op, padded_version_string(s))
            })
    };

    match op {
        "$eq" => Operator::Eq(operand.clone().into()),
        "$ne" => Operator::Ne(operand.clone().into()),
        "$lt" => Operator::Compare(Ordering::Less, false, operand.clone().into()),
        "$lte" => Operator::Compare(Ordering::Less, true, operand.clone().into()),
        "$gt" => Operator::Compare(Ordering::Greater, false, operand.clone().into()),
        "$gte" => Operator::Compare(Ordering::Greater, true, operand.clone().into()),
        "$in" => values().map_or(Operator::Invalid, Operator::In),
        "$nin" => values().map_or(Operator::Invalid, Operator::Nin),
        "$all" => operand.as_array().map_or(Operator::Invalid, |items| {
            Operator::All(items.iter().map(compile_value_test).collect())
        }),
        "$elemMatch" => Operator::ElemMatch(if is_operator_object(operand) {
            ElemMatch::Value(Box::new(compile_value_test(operand)))
        } else {
            ElemMatch::Condition(Box::new(compile_node(operand)))
        }),
        "$size" => Operator::Size(Box::new(compile_value_test(operand))),
        "$exists" => Operator::Exists(Value::from(operand.clone()).is_truthy()),
        "$type" => operand
            .as_str()
            .map_or(Operator::Invalid, |s| Operator::Type(s.to_owned())),
        "$regex" => operand.as_str().map_or(Operator::Invalid, |s| {
            let regex = Regex::new(s);
            if let Err(err) = &regex {
                log::warn!(target: "growthbook", pattern = s, err:display; "invalid regex in condition");
            }
            Operator::Regex(regex.ok())
        }),
        "$not" => Operator::Not(Box::new(compile_value_test(operand))),
        "$inGroup" => operand
            .as_str()
            .map_or(Operator::Invalid, |s| Operator::InGroup(s.to_owned())),
        "$notInGroup" => operand
            .as_str()
            .map_or(Operator::Invalid, |s| Operator::NotInGroup(s.to_owned())),
        "$veq" => version(VersionOp::Eq),
        "$vne" => version(VersionOp::Ne),
        "$vgt" => version(VersionOp::Gt),
        "$vgte" => version(VersionOp::Gte),
        "$vlt" => version(VersionOp::Lt),
        "$vlte" => version(VersionOp::Lte),
        _ => {
            log::warn!(target: "growthbook", operator = op; "unsupported condition operator");
            Operator::Invalid
        }
    }
}

/// Normalize a version string so that versions compare correctly as plain strings.
///
/// A leading `v` and any `+build` suffix are dropped, numeric parts are left-padded to five
/// characters, and a release version without a prerelease tag gets a `~` part so that it sorts
/// after its prereleases.
///
/// ```
/// # use growthbook::condition::padded_version_string;
/// assert!(padded_version_string("1.10.0") > padded_version_string("1.9.0"));
/// assert!(padded_version_string("v1.0.0") > padded_version_string("1.0.0-beta.1"));
/// assert_eq!(padded_version_string("1.2.3+build7"), padded_version_string("v1.2.3"));
/// ```
pub fn padded_version_string(input: &str) -> String {
    let input = input.strip_prefix('v').unwrap_or(input);
    let input = input.split_once('+').map_or(input, |(version, _build)| version);

    let mut parts = input.split(['-', '.']).collect::<Vec<_>>();
    if parts.len() == 3 {
        parts.push("~");
    }

    parts
        .into_iter()
        .map(|part| {
            if !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) {
                format!("{part:>5}")
            } else {
                part.to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

struct Eval<'a, V> {
    saved_groups: &'a SavedGroups,
    visitor: &'a mut V,
}

impl<V: ConditionVisitor> Eval<'_, V> {
    fn node(&mut self, node: &Node, attributes: &dyn PathLookup) -> bool {
        match node {
            Node::And(nodes) => nodes.iter().all(|node| self.node(node, attributes)),
            // Empty `$or` matches everything.
            Node::Or(nodes) => {
                nodes.is_empty() || nodes.iter().any(|node| self.node(node, attributes))
            }
            Node::Nor(nodes) => {
                !(nodes.is_empty() || nodes.iter().any(|node| self.node(node, attributes)))
            }
            Node::Not(node) => !self.node(node, attributes),
            Node::Field(path, test) => {
                let matched = self.value_test(test, attributes.lookup(path));
                self.visitor.on_field(path, matched);
                matched
            }
            Node::Invalid => false,
        }
    }

    fn value_test(&mut self, test: &ValueTest, value: &Value) -> bool {
        match test {
            ValueTest::Equals(expected) => !value.is_unknown() && value == expected,
            ValueTest::Operators(operators) => {
                operators.iter().all(|op| self.operator(op, value))
            }
        }
    }

    fn operator(&mut self, op: &Operator, value: &Value) -> bool {
        match op {
            Operator::Eq(expected) => !value.is_unknown() && value == expected,
            Operator::Ne(expected) => !value.is_unknown() && value != expected,
            Operator::Compare(ordering, or_equal, expected) => {
                compare(value, expected).is_some_and(|o| o == *ordering || (*or_equal && o.is_eq()))
            }
            Operator::In(values) => is_in(value, |v| values.contains(v)),
            Operator::Nin(values) => !is_in(value, |v| values.contains(v)),
            Operator::All(tests) => match value {
                Value::Array(items) => tests
                    .iter()
                    .all(|test| items.iter().any(|item| self.value_test(test, item))),
                _ => false,
            },
            Operator::ElemMatch(elem_match) => match value {
                Value::Array(items) => items.iter().any(|item| match elem_match {
                    ElemMatch::Value(test) => self.value_test(test, item),
                    ElemMatch::Condition(node) => self.node(node, item),
                }),
                _ => false,
            },
            Operator::Size(test) => match value {
                Value::Array(items) => self.value_test(test, &Value::from(items.len() as f64)),
                _ => false,
            },
            Operator::Exists(expected) => !value.is_nullish() == *expected,
            Operator::Type(expected) => value.type_name() == expected,
            Operator::Regex(regex) => match (regex, value) {
                (Some(regex), Value::String(_) | Value::Number(_) | Value::Boolean(_)) => {
                    regex.is_match(&value.to_hash_string())
                }
                _ => false,
            },
            Operator::Not(test) => !self.value_test(test, value),
            Operator::InGroup(group) => self
                .saved_groups
                .get(group)
                .is_some_and(|members| is_in(value, |v| members.contains(v))),
            Operator::NotInGroup(group) => !self
                .saved_groups
                .get(group)
                .is_some_and(|members| is_in(value, |v| members.contains(v))),
            Operator::Version(op, expected) => {
                if !matches!(value, Value::String(_) | Value::Number(_)) {
                    return false;
                }
                let actual = padded_version_string(&value.to_hash_string());
                let actual = actual.as_str();
                let expected = expected.as_str();
                match op {
                    VersionOp::Eq => actual == expected,
                    VersionOp::Ne => actual != expected,
                    VersionOp::Gt => actual > expected,
                    VersionOp::Gte => actual >= expected,
                    VersionOp::Lt => actual < expected,
                    VersionOp::Lte => actual <= expected,
                }
            }
            Operator::Invalid => false,
        }
    }
}

/// Order two values: numerically if both are (or parse as) numbers, lexicographically if both
/// are strings. Anything else is incomparable.
fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    fn as_number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => Some(*n),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    match (actual, expected) {
        (Value::String(a), Value::String(b)) => match (as_number(actual), as_number(expected)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => Some(a.as_str().cmp(b.as_str())),
        },
        (Value::Number(_) | Value::String(_), Value::Number(_) | Value::String(_)) => {
            as_number(actual)?.partial_cmp(&as_number(expected)?)
        }
        _ => None,
    }
}

/// Membership test shared by `$in`, `$nin`, and saved groups. An array attribute is in the set
/// if any of its primitive elements is.
fn is_in(value: &Value, contains: impl Fn(&Value) -> bool) -> bool {
    match value {
        Value::Unknown => false,
        Value::Array(items) => items
            .iter()
            .any(|item| item.is_primitive() && contains(item)),
        _ => contains(value),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{padded_version_string, Condition, ConditionVisitor, SavedGroups};
    use crate::{
        attributes::{AttributePath, Attributes},
        Value,
    };

    fn attributes(json: serde_json::Value) -> Attributes {
        serde_json::from_value(json).unwrap()
    }

    fn eval(condition: serde_json::Value, attrs: serde_json::Value) -> bool {
        Condition::from(condition).eval(&attributes(attrs), &SavedGroups::new())
    }

    #[test]
    fn equality() {
        assert!(eval(json!({"country": "IN"}), json!({"country": "IN"})));
        assert!(!eval(json!({"country": "IN"}), json!({"country": "US"})));
        assert!(!eval(json!({"country": "IN"}), json!({})));
        assert!(eval(json!({"tags": ["a", "b"]}), json!({"tags": ["a", "b"]})));
        assert!(!eval(json!({"tags": ["a", "b"]}), json!({"tags": ["b", "a"]})));
        assert!(eval(json!({"n": 1}), json!({"n": 1.0})));
        assert!(!eval(json!({"n": 1}), json!({"n": "1"})));
    }

    #[test]
    fn empty_condition_matches() {
        assert!(eval(json!({}), json!({})));
    }

    #[test]
    fn non_object_condition_never_matches() {
        assert!(!eval(json!([]), json!({})));
        assert!(!eval(json!("country"), json!({"country": "IN"})));
    }

    #[test]
    fn nested_path() {
        let condition = json!({"company.plan": "pro"});
        assert!(eval(condition.clone(), json!({"company": {"plan": "pro"}})));
        assert!(!eval(condition.clone(), json!({"company": "pro"})));
        assert!(!eval(condition, json!({})));
    }

    #[test]
    fn and_or_nor_not() {
        let attrs = json!({"age": 30, "country": "IN"});
        assert!(eval(json!({"$and": [{"age": 30}, {"country": "IN"}]}), attrs.clone()));
        assert!(!eval(json!({"$and": [{"age": 30}, {"country": "US"}]}), attrs.clone()));
        assert!(eval(json!({"$or": [{"age": 1}, {"country": "IN"}]}), attrs.clone()));
        assert!(!eval(json!({"$or": [{"age": 1}, {"country": "US"}]}), attrs.clone()));
        assert!(eval(json!({"$or": []}), attrs.clone()));
        assert!(eval(json!({"$nor": [{"age": 1}, {"country": "US"}]}), attrs.clone()));
        assert!(!eval(json!({"$nor": [{"age": 30}]}), attrs.clone()));
        assert!(eval(json!({"$not": {"country": "US"}}), attrs.clone()));
        assert!(!eval(json!({"$not": {"country": "IN"}}), attrs));
    }

    #[test]
    fn top_level_keys_are_combined() {
        let condition = json!({"$or": [{"age": 30}, {"age": 40}], "country": "IN"});
        assert!(eval(condition.clone(), json!({"age": 30, "country": "IN"})));
        assert!(!eval(condition, json!({"age": 30, "country": "US"})));
    }

    #[derive(Default)]
    struct RecordingVisitor {
        visited: Vec<String>,
    }

    impl ConditionVisitor for RecordingVisitor {
        fn on_field(&mut self, path: &AttributePath, _matched: bool) {
            self.visited.push(path.as_str().to_owned());
        }
    }

    #[test]
    fn and_short_circuits() {
        let condition = Condition::from(json!({"$and": [{"country": "US"}, {"probe": true}]}));
        let mut visitor = RecordingVisitor::default();
        assert!(!condition.eval_with_visitor(
            &attributes(json!({"country": "IN", "probe": true})),
            &SavedGroups::new(),
            &mut visitor,
        ));
        assert_eq!(visitor.visited, vec!["country"]);
    }

    #[test]
    fn or_short_circuits() {
        let condition = Condition::from(json!({"$or": [{"country": "IN"}, {"probe": true}]}));
        let mut visitor = RecordingVisitor::default();
        assert!(condition.eval_with_visitor(
            &attributes(json!({"country": "IN"})),
            &SavedGroups::new(),
            &mut visitor,
        ));
        assert_eq!(visitor.visited, vec!["country"]);
    }

    #[test]
    fn comparisons() {
        assert!(eval(json!({"age": {"$gt": 18}}), json!({"age": 19})));
        assert!(!eval(json!({"age": {"$gt": 18}}), json!({"age": 18})));
        assert!(eval(json!({"age": {"$gte": 18}}), json!({"age": 18})));
        assert!(eval(json!({"age": {"$lt": 18}}), json!({"age": 17.5})));
        assert!(eval(json!({"age": {"$lte": 18, "$gte": 10}}), json!({"age": 18})));
        assert!(!eval(json!({"age": {"$lte": 18, "$gte": 10}}), json!({"age": 9})));
        // numeric strings compare as numbers
        assert!(eval(json!({"age": {"$gt": 9}}), json!({"age": "10"})));
        // strings compare lexicographically
        assert!(eval(json!({"name": {"$lt": "bob"}}), json!({"name": "alice"})));
        assert!(!eval(json!({"name": {"$gt": "bob"}}), json!({"name": "alice"})));
    }

    #[test]
    fn comparisons_against_unknown_are_false() {
        for op in ["$gt", "$gte", "$lt", "$lte", "$eq", "$veq", "$vgt", "$regex"] {
            let mut operators = serde_json::Map::new();
            operators.insert(op.to_owned(), json!("1"));
            assert!(!eval(json!({"age": operators}), json!({})), "{op}");
        }
        assert!(!eval(json!({"age": {"$gt": 1}}), json!({"age": null})));
        assert!(!eval(json!({"age": {"$gt": 1}}), json!({"age": true})));
    }

    #[test]
    fn eq_ne() {
        assert!(eval(json!({"a": {"$eq": "x"}}), json!({"a": "x"})));
        assert!(!eval(json!({"a": {"$eq": "x"}}), json!({"a": "y"})));
        assert!(eval(json!({"a": {"$ne": "x"}}), json!({"a": "y"})));
        assert!(!eval(json!({"a": {"$ne": "x"}}), json!({"a": "x"})));
        assert!(!eval(json!({"a": {"$ne": "x"}}), json!({})));
        assert!(eval(json!({"a": {"$ne": "x"}}), json!({"a": null})));
        assert!(eval(json!({"a": {"$nin": ["x"]}}), json!({})));
    }

    #[test]
    fn in_nin() {
        let condition = json!({"country": {"$in": ["IN", "US"]}});
        assert!(eval(condition.clone(), json!({"country": "IN"})));
        assert!(!eval(condition.clone(), json!({"country": "UK"})));
        assert!(!eval(condition, json!({})));

        let condition = json!({"country": {"$nin": ["IN", "US"]}});
        assert!(!eval(condition.clone(), json!({"country": "IN"})));
        assert!(eval(condition.clone(), json!({"country": "UK"})));
        assert!(eval(condition, json!({})));
    }

    #[test]
    fn in_with_array_attribute() {
        let condition = json!({"tags": {"$in": ["a", "z"]}});
        assert!(eval(condition.clone(), json!({"tags": ["x", "a"]})));
        assert!(!eval(condition.clone(), json!({"tags": ["x", "y"]})));
        assert!(!eval(condition, json!({"tags": []})));
    }

    #[test]
    fn in_with_non_array_operand_never_matches() {
        assert!(!eval(json!({"a": {"$in": "a"}}), json!({"a": "a"})));
    }

    #[test]
    fn exists() {
        assert!(eval(json!({"a": {"$exists": false}}), json!({})));
        assert!(!eval(json!({"a": {"$exists": true}}), json!({})));
        assert!(eval(json!({"a": {"$exists": true}}), json!({"a": 0})));
        assert!(!eval(json!({"a": {"$exists": false}}), json!({"a": ""})));
        assert!(eval(json!({"a": {"$exists": false}}), json!({"a": null})));
    }

    #[test]
    fn type_check() {
        assert!(eval(json!({"a": {"$type": "string"}}), json!({"a": "x"})));
        assert!(eval(json!({"a": {"$type": "number"}}), json!({"a": 1})));
        assert!(eval(json!({"a": {"$type": "boolean"}}), json!({"a": false})));
        assert!(eval(json!({"a": {"$type": "array"}}), json!({"a": []})));
        assert!(eval(json!({"a": {"$type": "object"}}), json!({"a": {}})));
        assert!(eval(json!({"a": {"$type": "null"}}), json!({"a": null})));
        assert!(eval(json!({"a": {"$type": "undefined"}}), json!({})));
        assert!(!eval(json!({"a": {"$type": "string"}}), json!({"a": 1})));
    }

    #[test]
    fn regex() {
        let condition = json!({"email": {"$regex": "@example\\.com$"}});
        assert!(eval(condition.clone(), json!({"email": "a@example.com"})));
        assert!(!eval(condition, json!({"email": "a@example.org"})));
        assert!(eval(json!({"n": {"$regex": "^12"}}), json!({"n": 123})));
    }

    #[test]
    fn invalid_regex_never_matches() {
        assert!(!eval(json!({"a": {"$regex": "(["}}), json!({"a": "(["})));
    }

    #[test]
    fn unknown_operator_never_matches() {
        assert!(!eval(json!({"a": {"$bogus": 1}}), json!({"a": 1})));
    }

    #[test]
    fn not_operator() {
        assert!(eval(json!({"a": {"$not": {"$gt": 5}}}), json!({"a": 3})));
        assert!(!eval(json!({"a": {"$not": {"$gt": 5}}}), json!({"a": 7})));
    }

    #[test]
    fn size() {
        assert!(eval(json!({"tags": {"$size": 2}}), json!({"tags": ["a", "b"]})));
        assert!(eval(json!({"tags": {"$size": {"$gt": 1}}}), json!({"tags": ["a", "b"]})));
        assert!(!eval(json!({"tags": {"$size": 0}}), json!({"tags": "a"})));
        assert!(!eval(json!({"tags": {"$size": 0}}), json!({})));
    }

    #[test]
    fn all() {
        let condition = json!({"tags": {"$all": ["a", "b"]}});
        assert!(eval(condition.clone(), json!({"tags": ["b", "c", "a"]})));
        assert!(!eval(condition.clone(), json!({"tags": ["a", "c"]})));
        assert!(!eval(condition, json!({"tags": "a"})));
    }

    #[test]
    fn elem_match() {
        let condition = json!({"scores": {"$elemMatch": {"$gt": 10}}});
        assert!(eval(condition.clone(), json!({"scores": [1, 20]})));
        assert!(!eval(condition.clone(), json!({"scores": [1, 2]})));
        assert!(!eval(condition, json!({"scores": 20})));

        let condition = json!({"orders": {"$elemMatch": {"status": "paid", "total": {"$gt": 5}}}});
        assert!(eval(
            condition.clone(),
            json!({"orders": [{"status": "new", "total": 50}, {"status": "paid", "total": 6}]})
        ));
        assert!(!eval(
            condition,
            json!({"orders": [{"status": "paid", "total": 1}]})
        ));
    }

    #[test]
    fn saved_groups() {
        let groups: SavedGroups = [(
            "beta".to_owned(),
            [Value::from("u1"), Value::from("u2")].into_iter().collect(),
        )]
        .into_iter()
        .collect();

        let in_group = Condition::from(json!({"id": {"$inGroup": "beta"}}));
        let not_in_group = Condition::from(json!({"id": {"$notInGroup": "beta"}}));
        let missing_group = Condition::from(json!({"id": {"$inGroup": "alpha"}}));

        let u1 = attributes(json!({"id": "u1"}));
        let u3 = attributes(json!({"id": "u3"}));
        let anonymous = attributes(json!({}));

        assert!(in_group.eval(&u1, &groups));
        assert!(!in_group.eval(&u3, &groups));
        assert!(!in_group.eval(&anonymous, &groups));
        assert!(!not_in_group.eval(&u1, &groups));
        assert!(not_in_group.eval(&u3, &groups));
        assert!(not_in_group.eval(&anonymous, &groups));
        assert!(!missing_group.eval(&u1, &groups));
    }

    #[test]
    fn versions() {
        assert!(eval(json!({"v": {"$vgt": "1.9.0"}}), json!({"v": "1.10.0"})));
        assert!(eval(json!({"v": {"$vlt": "1.0.0"}}), json!({"v": "1.0.0-beta"})));
        assert!(eval(json!({"v": {"$veq": "1.2.3"}}), json!({"v": "v1.2.3+build"})));
        assert!(eval(json!({"v": {"$vne": "1.2.3"}}), json!({"v": "1.2.4"})));
        assert!(eval(json!({"v": {"$vgte": "1.2.3", "$vlte": "1.2.3"}}), json!({"v": "1.2.3"})));
        assert!(eval(json!({"v": {"$vgt": "2.0.0"}}), json!({"v": "10.0.0-rc.1"})));
    }

    #[test]
    fn padded_versions() {
        assert_eq!(padded_version_string("1.2.3"), "    1-    2-    3-~");
        assert_eq!(padded_version_string("v1.2.3-rc.1+build123"), "    1-    2-    3-rc-    1");
    }

    #[test]
    fn serializes_to_source() {
        let source = json!({"$or": [{"a": {"$gt": 1}}, {"b": "x"}]});
        let condition: Condition = serde_json::from_value(source.clone()).unwrap();
        assert_eq!(serde_json::to_value(&condition).unwrap(), source);
    }
}
