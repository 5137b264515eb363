//! Row filter predicates.
//!
//! Filters use the JSON syntax `{"field": {"_op": operand}}`, combined with
//! `{"_and": [...]}` and `{"_or": [...]}`. String operands may name a request
//! variable (`$CURRENT_USER`, `$CURRENT_ROLE`, `$NOW`) or another column of the
//! same row (`$FIELD(name)`). Several keys in one object are ANDed.

use crate::error::ValidationError;
use crate::physical::Row;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Nin,
    Null,
    Nnull,
    Contains,
    Ncontains,
    StartsWith,
    EndsWith,
    Between,
    Empty,
    Nempty,
}

impl Operator {
    const ALL: [Operator; 17] = [
        Operator::Eq,
        Operator::Neq,
        Operator::Lt,
        Operator::Lte,
        Operator::Gt,
        Operator::Gte,
        Operator::In,
        Operator::Nin,
        Operator::Null,
        Operator::Nnull,
        Operator::Contains,
        Operator::Ncontains,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::Between,
        Operator::Empty,
        Operator::Nempty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "_eq",
            Self::Neq => "_neq",
            Self::Lt => "_lt",
            Self::Lte => "_lte",
            Self::Gt => "_gt",
            Self::Gte => "_gte",
            Self::In => "_in",
            Self::Nin => "_nin",
            Self::Null => "_null",
            Self::Nnull => "_nnull",
            Self::Contains => "_contains",
            Self::Ncontains => "_ncontains",
            Self::StartsWith => "_starts_with",
            Self::EndsWith => "_ends_with",
            Self::Between => "_between",
            Self::Empty => "_empty",
            Self::Nempty => "_nempty",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.as_str() == s)
    }
}

/// Request variables a filter can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    CurrentUser,
    CurrentRole,
    Now,
}

impl Variable {
    fn as_str(&self) -> &'static str {
        match self {
            Self::CurrentUser => "$CURRENT_USER",
            Self::CurrentRole => "$CURRENT_ROLE",
            Self::Now => "$NOW",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    Variable(Variable),
    /// Another column of the row under test.
    Field(String),
    List(Vec<Operand>),
}

impl Operand {
    fn parse(value: &Value) -> Operand {
        match value {
            Value::String(s) => match s.as_str() {
                "$CURRENT_USER" => Operand::Variable(Variable::CurrentUser),
                "$CURRENT_ROLE" => Operand::Variable(Variable::CurrentRole),
                "$NOW" => Operand::Variable(Variable::Now),
                _ => match s
                    .strip_prefix("$FIELD(")
                    .and_then(|rest| rest.strip_suffix(')'))
                {
                    Some(name) => Operand::Field(name.to_string()),
                    None => Operand::Value(value.clone()),
                },
            },
            Value::Array(items) => Operand::List(items.iter().map(Operand::parse).collect()),
            other => Operand::Value(other.clone()),
        }
    }

    fn resolve(&self, vars: &FilterVariables) -> Operand {
        match self {
            Operand::Variable(var) => vars
                .value_of(*var)
                .map_or_else(|| self.clone(), Operand::Value),
            Operand::List(items) => Operand::List(items.iter().map(|o| o.resolve(vars)).collect()),
            other => other.clone(),
        }
    }

    /// Value of the operand for `row`, or `None` while it still holds a
    /// variable the request had no value for.
    fn evaluate(&self, row: &Row) -> Option<Value> {
        match self {
            Operand::Value(v) => Some(v.clone()),
            Operand::Variable(_) => None,
            Operand::Field(name) => Some(row.get(name).cloned().unwrap_or(Value::Null)),
            Operand::List(items) => items
                .iter()
                .map(|o| o.evaluate(row))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }

    fn collect_fields<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Operand::Field(name) => {
                out.insert(name.as_str());
            }
            Operand::List(items) => {
                for item in items {
                    item.collect_fields(out);
                }
            }
            _ => {}
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Operand::Value(v) => v.clone(),
            Operand::Variable(var) => Value::String(var.as_str().to_string()),
            Operand::Field(name) => Value::String(format!("$FIELD({})", name)),
            Operand::List(items) => Value::Array(items.iter().map(Operand::to_value).collect()),
        }
    }
}

/// Values substituted for request variables.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterVariables {
    pub user: Option<String>,
    pub role: Option<String>,
    pub now: DateTime<Utc>,
}

impl FilterVariables {
    fn value_of(&self, var: Variable) -> Option<Value> {
        match var {
            Variable::CurrentUser => self.user.clone().map(Value::String),
            Variable::CurrentRole => self.role.clone().map(Value::String),
            Variable::Now => Some(Value::String(self.now.to_rfc3339())),
        }
    }
}

/// A parsed filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Condition {
        field: String,
        op: Operator,
        operand: Operand,
    },
}

fn invalid(msg: impl Into<String>) -> ValidationError {
    ValidationError::InvalidFilter(msg.into())
}

impl Filter {
    /// The filter every row satisfies.
    pub fn always() -> Filter {
        Filter::And(Vec::new())
    }

    pub fn parse(value: &Value) -> Result<Filter, ValidationError> {
        let object = value
            .as_object()
            .ok_or_else(|| invalid(format!("expected an object, found {}", value)))?;
        let mut parts = Vec::with_capacity(object.len());
        for (key, inner) in object {
            match key.as_str() {
                "_and" | "_or" => {
                    let items = inner
                        .as_array()
                        .ok_or_else(|| invalid(format!("'{}' takes an array", key)))?;
                    let filters = items
                        .iter()
                        .map(Filter::parse)
                        .collect::<Result<Vec<_>, _>>()?;
                    parts.push(if key == "_and" {
                        Filter::And(filters)
                    } else {
                        Filter::Or(filters)
                    });
                }
                field if field.starts_with('_') => {
                    return Err(invalid(format!("unknown logical operator '{}'", field)))
                }
                field => parts.extend(Self::parse_conditions(field, inner)?),
            }
        }
        Ok(match parts.len() {
            1 => parts.remove(0),
            _ => Filter::And(parts),
        })
    }

    fn parse_conditions(field: &str, value: &Value) -> Result<Vec<Filter>, ValidationError> {
        let ops = value.as_object().ok_or_else(|| {
            invalid(format!(
                "condition on '{}' must be an object of operators",
                field
            ))
        })?;
        if ops.is_empty() {
            return Err(invalid(format!("condition on '{}' has no operator", field)));
        }
        ops.iter()
            .map(|(name, raw)| {
                let op = Operator::parse(name)
                    .ok_or_else(|| invalid(format!("unknown operator '{}'", name)))?;
                let operand = Operand::parse(raw);
                match op {
                    Operator::In | Operator::Nin if !matches!(operand, Operand::List(_)) => {
                        return Err(invalid(format!("'{}' takes an array", name)))
                    }
                    Operator::Between => match &operand {
                        Operand::List(items) if items.len() == 2 => {}
                        _ => return Err(invalid("'_between' takes an array of two values")),
                    },
                    Operator::Null | Operator::Nnull | Operator::Empty | Operator::Nempty
                        if !raw.is_boolean() =>
                    {
                        return Err(invalid(format!("'{}' takes a boolean", name)))
                    }
                    _ => {}
                }
                Ok(Filter::Condition {
                    field: field.to_string(),
                    op,
                    operand,
                })
            })
            .collect()
    }

    /// Substitutes request variables. Column references stay in place.
    pub fn resolve(&self, vars: &FilterVariables) -> Filter {
        match self {
            Filter::And(items) => Filter::And(items.iter().map(|f| f.resolve(vars)).collect()),
            Filter::Or(items) => Filter::Or(items.iter().map(|f| f.resolve(vars)).collect()),
            Filter::Condition { field, op, operand } => Filter::Condition {
                field: field.clone(),
                op: *op,
                operand: operand.resolve(vars),
            },
        }
    }

    /// ANDs two filters, flattening nested conjunctions.
    pub fn and(self, other: Filter) -> Filter {
        let mut items = Vec::new();
        for filter in [self, other] {
            match filter {
                Filter::And(inner) => items.extend(inner),
                single => items.push(single),
            }
        }
        match items.len() {
            1 => items.remove(0),
            _ => Filter::And(items),
        }
    }

    /// ORs a list of filters.
    pub fn any(mut filters: Vec<Filter>) -> Filter {
        match filters.len() {
            1 => filters.remove(0),
            _ => Filter::Or(filters),
        }
    }

    /// A condition whose operand is an unresolved variable never matches.
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::And(items) => items.iter().all(|f| f.matches(row)),
            Filter::Or(items) => items.iter().any(|f| f.matches(row)),
            Filter::Condition { field, op, operand } => {
                let actual = row.get(field).unwrap_or(&Value::Null);
                operand
                    .evaluate(row)
                    .map_or(false, |expected| evaluate(*op, actual, &expected))
            }
        }
    }

    /// Every column the filter reads, column references included.
    pub fn fields(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Filter::And(items) | Filter::Or(items) => {
                for item in items {
                    item.collect_fields(out);
                }
            }
            Filter::Condition { field, operand, .. } => {
                out.insert(field.as_str());
                operand.collect_fields(out);
            }
        }
    }

    /// Serializes the filter back to its JSON syntax.
    pub fn to_value(&self) -> Value {
        match self {
            Filter::And(items) => {
                serde_json::json!({ "_and": items.iter().map(Filter::to_value).collect::<Vec<_>>() })
            }
            Filter::Or(items) => {
                serde_json::json!({ "_or": items.iter().map(Filter::to_value).collect::<Vec<_>>() })
            }
            Filter::Condition { field, op, operand } => {
                let mut inner = Map::new();
                inner.insert(op.as_str().to_string(), operand.to_value());
                let mut outer = Map::new();
                outer.insert(field.clone(), Value::Object(inner));
                Value::Object(outer)
            }
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(h), Value::String(n)) => h.contains(n.as_str()),
        (Value::Array(items), n) => items.iter().any(|item| loose_eq(item, n)),
        _ => false,
    }
}

fn evaluate(op: Operator, actual: &Value, operand: &Value) -> bool {
    let flag = operand.as_bool().unwrap_or(true);
    match op {
        Operator::Eq => loose_eq(actual, operand),
        Operator::Neq => !loose_eq(actual, operand),
        Operator::Lt => compare(actual, operand) == Some(Ordering::Less),
        Operator::Lte => matches!(
            compare(actual, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Gt => compare(actual, operand) == Some(Ordering::Greater),
        Operator::Gte => matches!(
            compare(actual, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::In => operand
            .as_array()
            .map_or(false, |items| items.iter().any(|v| loose_eq(actual, v))),
        Operator::Nin => operand
            .as_array()
            .map_or(true, |items| !items.iter().any(|v| loose_eq(actual, v))),
        Operator::Null => actual.is_null() == flag,
        Operator::Nnull => actual.is_null() != flag,
        Operator::Contains => contains(actual, operand),
        Operator::Ncontains => !contains(actual, operand),
        Operator::StartsWith => match (actual, operand) {
            (Value::String(a), Value::String(p)) => a.starts_with(p.as_str()),
            _ => false,
        },
        Operator::EndsWith => match (actual, operand) {
            (Value::String(a), Value::String(p)) => a.ends_with(p.as_str()),
            _ => false,
        },
        Operator::Between => match operand.as_array().map(Vec::as_slice) {
            Some([low, high]) => {
                matches!(
                    compare(actual, low),
                    Some(Ordering::Greater | Ordering::Equal)
                ) && matches!(
                    compare(actual, high),
                    Some(Ordering::Less | Ordering::Equal)
                )
            }
            _ => false,
        },
        Operator::Empty => is_empty(actual) == flag,
        Operator::Nempty => is_empty(actual) != flag,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    fn vars(user: &str) -> FilterVariables {
        FilterVariables {
            user: Some(user.to_string()),
            role: Some("editor".to_string()),
            now: Utc::now(),
        }
    }

    #[test]
    fn owner_filter_resolves_current_user() {
        let filter = Filter::parse(&json!({"owner": {"_eq": "$CURRENT_USER"}}))
            .unwrap()
            .resolve(&vars("u1"));
        assert!(filter.matches(&row(json!({"owner": "u1"}))));
        assert!(!filter.matches(&row(json!({"owner": "u2"}))));
        assert_eq!(filter.to_value(), json!({"owner": {"_eq": "u1"}}));
    }

    #[test]
    fn missing_user_never_matches() {
        let anonymous = FilterVariables {
            user: None,
            role: Some("editor".to_string()),
            now: Utc::now(),
        };
        for raw in [
            json!({"owner": {"_eq": "$CURRENT_USER"}}),
            json!({"owner": {"_neq": "$CURRENT_USER"}}),
            json!({"owner": {"_nin": ["$CURRENT_USER"]}}),
        ] {
            let filter = Filter::parse(&raw).unwrap().resolve(&anonymous);
            assert!(!filter.matches(&row(json!({"owner": null}))), "{}", raw);
            assert!(!filter.matches(&row(json!({"title": "orphan"}))), "{}", raw);
            assert!(!filter.matches(&row(json!({"owner": "u1"}))), "{}", raw);
        }

        let filter = Filter::parse(&json!({"owner": {"_eq": "$CURRENT_USER"}}))
            .unwrap()
            .resolve(&anonymous);
        assert_eq!(filter.to_value(), json!({"owner": {"_eq": "$CURRENT_USER"}}));
    }

    #[test]
    fn logical_groups_and_ranges() {
        let filter = Filter::parse(&json!({
            "_or": [
                {"status": {"_eq": "published"}},
                {"_and": [
                    {"price": {"_between": [10, 20]}},
                    {"title": {"_starts_with": "Draft"}}
                ]}
            ]
        }))
        .unwrap();
        assert!(filter.matches(&row(json!({"status": "published"}))));
        assert!(filter.matches(&row(json!({"status": "draft", "price": 15.5, "title": "Draft A"}))));
        assert!(!filter.matches(&row(json!({"status": "draft", "price": 25, "title": "Draft A"}))));
    }

    #[test]
    fn field_references_compare_columns() {
        let filter = Filter::parse(&json!({"spent": {"_lte": "$FIELD(budget)"}})).unwrap();
        assert!(filter.matches(&row(json!({"spent": 5, "budget": 10}))));
        assert!(!filter.matches(&row(json!({"spent": 15, "budget": 10}))));
        assert_eq!(
            filter.to_value(),
            json!({"spent": {"_lte": "$FIELD(budget)"}})
        );
    }

    #[test]
    fn null_and_membership_operators() {
        let filter = Filter::parse(&json!({"archived_at": {"_null": true}, "tag": {"_in": ["a", "b"]}}))
            .unwrap();
        assert!(filter.matches(&row(json!({"tag": "a"}))));
        assert!(!filter.matches(&row(json!({"tag": "c"}))));
        assert!(!filter.matches(&row(json!({"tag": "a", "archived_at": "2024-01-01T00:00:00Z"}))));
    }

    #[test]
    fn malformed_filters_are_rejected() {
        assert!(Filter::parse(&json!({"title": {"_like": "x"}})).is_err());
        assert!(Filter::parse(&json!({"title": "x"})).is_err());
        assert!(Filter::parse(&json!({"tag": {"_in": "a"}})).is_err());
        assert!(Filter::parse(&json!({"_xor": []})).is_err());
        assert!(Filter::parse(&json!([1])).is_err());
    }

    #[test]
    fn and_flattens() {
        let a = Filter::parse(&json!({"a": {"_eq": 1}})).unwrap();
        let b = Filter::parse(&json!({"b": {"_eq": 2}, "c": {"_eq": 3}})).unwrap();
        match a.and(b) {
            Filter::And(items) => assert_eq!(items.len(), 3),
            other => panic!("expected a conjunction, got {}", other),
        }
        assert!(Filter::always().matches(&Row::new()));
    }

    #[test]
    fn fields_include_column_references() {
        let filter = Filter::parse(&json!({
            "_or": [{"price": {"_lt": "$FIELD(cost)"}}, {"status": {"_eq": "draft"}}]
        }))
        .unwrap();
        let fields: Vec<&str> = filter.fields().into_iter().collect();
        assert_eq!(fields, vec!["cost", "price", "status"]);
    }
}
