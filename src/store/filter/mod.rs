//! Filter expressions for the in-memory record store
//!
//! Filters look like `message != "" && author.email ~ "example.com"`.
//! A filter is parsed once, checked against the collection schema (unknown
//! fields, non-relation path segments and unknown macros are rejected) and
//! then evaluated per record. Paths that cross a relation resolve through
//! a [`RecordLookup`]; a comparison holds if any reached value satisfies it.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};

use super::model::{Collection, Record, Value, parse_datetime};
use super::RequestInfo;

pub mod lexer;
pub mod parser;

pub use parser::FilterParser;

/// Filter parse or schema error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterError(String);

impl FilterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for FilterError {}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    NotLike,
}

/// Request-scoped placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroRef {
    Now,
    Method,
    Auth(String),
    Query(String),
    Data(String),
    Headers(String),
}

/// Comparison operand
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Field(Vec<String>),
    Macro(MacroRef),
}

/// Parsed filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// Schema and record access needed to check and evaluate filters
pub trait RecordLookup {
    /// Collection by name or id
    fn collection(&self, name_or_id: &str) -> Option<&Collection>;

    /// Record by collection id and record id
    fn record(&self, collection_id: &str, id: &str) -> Option<&Record>;
}

/// Everything a filter can read besides the record itself
pub struct EvalContext<'a> {
    pub request: &'a RequestInfo,
    pub lookup: &'a dyn RecordLookup,
    pub now: DateTime<Utc>,
}

/// Parse a filter string
pub fn parse(input: &str) -> Result<Expr, FilterError> {
    FilterParser::parse(input)
}

/// Check that every segment of `path` resolves through `root`'s schema
///
/// All segments but the last must be relation fields; the last must be any
/// field of the collection reached. Returns that final collection.
pub fn check_path<'a>(
    path: &[String],
    root: &'a Collection,
    lookup: &'a dyn RecordLookup,
) -> Result<&'a Collection, FilterError> {
    let Some((last, relations)) = path.split_last() else {
        return Err(FilterError::new("empty field path"));
    };

    let mut current = root;
    for segment in relations {
        let field = current.field(segment).ok_or_else(|| {
            FilterError::new(format!("unknown field \"{segment}\" in \"{}\"", current.name))
        })?;
        let (target, _) = field.kind.relation().ok_or_else(|| {
            FilterError::new(format!("field \"{segment}\" is not a relation"))
        })?;
        current = lookup.collection(target).ok_or_else(|| {
            FilterError::new(format!("missing related collection \"{target}\""))
        })?;
    }

    if !current.has_field(last) {
        return Err(FilterError::new(format!(
            "unknown field \"{last}\" in \"{}\"",
            current.name
        )));
    }
    Ok(current)
}

impl Expr {
    /// Validate all field paths against the collection schema
    pub fn check(&self, root: &Collection, lookup: &dyn RecordLookup) -> Result<(), FilterError> {
        match self {
            Expr::Compare { left, right, .. } => {
                for operand in [left, right] {
                    if let Operand::Field(path) = operand {
                        check_path(path, root, lookup)?;
                    }
                }
                Ok(())
            }
            Expr::And(a, b) | Expr::Or(a, b) => {
                a.check(root, lookup)?;
                b.check(root, lookup)
            }
        }
    }

    /// Evaluate against a record
    pub fn matches(&self, record: &Record, ctx: &EvalContext<'_>) -> bool {
        match self {
            Expr::Compare { left, op, right } => {
                let left = operand_values(left, record, ctx);
                let right = operand_values(right, record, ctx);
                compare_sets(&left, *op, &right)
            }
            Expr::And(a, b) => a.matches(record, ctx) && b.matches(record, ctx),
            Expr::Or(a, b) => a.matches(record, ctx) || b.matches(record, ctx),
        }
    }
}

/// Values reached by following `path` from `record`; never empty
pub fn path_values(path: &[String], record: &Record, lookup: &dyn RecordLookup) -> Vec<Value> {
    let Some((last, relations)) = path.split_last() else {
        return vec![Value::Null];
    };

    let mut current: Vec<&Record> = vec![record];
    for segment in relations {
        let mut next = Vec::new();
        for r in &current {
            let Some(target) = lookup
                .collection(r.collection_id())
                .and_then(|c| c.field(segment))
                .and_then(|f| f.kind.relation())
                .map(|(target, _)| target)
            else {
                continue;
            };
            for id in r.relation_ids(segment) {
                if let Some(related) = lookup.record(target, &id) {
                    next.push(related);
                }
            }
        }
        current = next;
    }

    let mut values = Vec::new();
    for r in current {
        match r.get(last) {
            Value::List(items) => values.extend(items),
            value => values.push(value),
        }
    }
    if values.is_empty() {
        values.push(Value::Null);
    }
    values
}

fn operand_values(operand: &Operand, record: &Record, ctx: &EvalContext<'_>) -> Vec<Value> {
    match operand {
        Operand::Literal(value) => vec![value.clone()],
        Operand::Field(path) => path_values(path, record, ctx.lookup),
        Operand::Macro(m) => vec![macro_value(m, ctx)],
    }
}

fn macro_value(m: &MacroRef, ctx: &EvalContext<'_>) -> Value {
    let from_map = |map: &std::collections::BTreeMap<String, serde_json::Value>, key: &str| {
        map.get(key).cloned().map(Value::from).unwrap_or_default()
    };

    match m {
        MacroRef::Now => Value::DateTime(ctx.now),
        MacroRef::Method => Value::Text(ctx.request.method.clone()),
        MacroRef::Auth(field) => ctx.request.principal.auth_field(field),
        MacroRef::Query(key) => from_map(&ctx.request.query, key),
        MacroRef::Data(key) => from_map(&ctx.request.data, key),
        MacroRef::Headers(key) => from_map(&ctx.request.headers, key),
    }
}

fn compare_sets(left: &[Value], op: CompareOp, right: &[Value]) -> bool {
    match op {
        CompareOp::Eq => any_pair(left, right, |l, r| compare_values(l, r) == Some(Ordering::Equal)),
        CompareOp::Ne => !any_pair(left, right, |l, r| compare_values(l, r) == Some(Ordering::Equal)),
        CompareOp::Gt => any_pair(left, right, |l, r| {
            compare_values(l, r) == Some(Ordering::Greater)
        }),
        CompareOp::Ge => any_pair(left, right, |l, r| {
            matches!(compare_values(l, r), Some(Ordering::Greater | Ordering::Equal))
        }),
        CompareOp::Lt => any_pair(left, right, |l, r| compare_values(l, r) == Some(Ordering::Less)),
        CompareOp::Le => any_pair(left, right, |l, r| {
            matches!(compare_values(l, r), Some(Ordering::Less | Ordering::Equal))
        }),
        CompareOp::Like => any_pair(left, right, |l, r| like(&l.to_string(), &r.to_string())),
        CompareOp::NotLike => !any_pair(left, right, |l, r| like(&l.to_string(), &r.to_string())),
    }
}

fn any_pair(left: &[Value], right: &[Value], pred: impl Fn(&Value, &Value) -> bool) -> bool {
    left.iter().any(|l| right.iter().any(|r| pred(l, r)))
}

/// Order two values, coercing text to the other side's type when it parses
///
/// Null compares as the empty string.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, other) => compare_values(&Value::Text(String::new()), other),
        (other, Value::Null) => compare_values(other, &Value::Text(String::new())),
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            as_f64(a)?.partial_cmp(&as_f64(b)?)
        }
        (Value::Int(_) | Value::Float(_), Value::Text(s)) => match s.trim().parse::<f64>() {
            Ok(n) => as_f64(a)?.partial_cmp(&n),
            Err(_) => Some(a.to_string().cmp(s)),
        },
        (Value::DateTime(x), Value::DateTime(y)) => Some(x.cmp(y)),
        (Value::DateTime(x), Value::Text(s)) => match parse_datetime(s) {
            Some(y) => Some(x.cmp(&y)),
            None => Some(a.to_string().cmp(s)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Text(s)) => match s.as_str() {
            "true" => Some(x.cmp(&true)),
            "false" => Some(x.cmp(&false)),
            _ => Some(a.to_string().cmp(s)),
        },
        (Value::Bool(x), Value::Int(_) | Value::Float(_)) => {
            (*x as i64 as f64).partial_cmp(&as_f64(b)?)
        }
        (Value::Text(_), Value::Int(_) | Value::Float(_) | Value::DateTime(_) | Value::Bool(_))
        | (Value::Int(_) | Value::Float(_), Value::Bool(_)) => {
            compare_values(b, a).map(Ordering::reverse)
        }
        _ => Some(a.to_string().cmp(&b.to_string())),
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(n) => Some(*n as f64),
        Value::Float(n) => Some(*n),
        _ => None,
    }
}

/// Case-insensitive contains; `%` in the pattern matches any run of characters
fn like(text: &str, pattern: &str) -> bool {
    let text = text.to_lowercase();
    let pattern = pattern.to_lowercase();

    if !pattern.contains('%') {
        return text.contains(&pattern);
    }

    let parts: Vec<&str> = pattern.split('%').collect();
    let mut rest = text.as_str();
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(*part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(*part);
        } else {
            match rest.find(*part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::{CollectionKind, Field, FieldKind};
    use crate::store::Principal;
    use std::collections::HashMap;

    struct Fixture {
        collections: Vec<Collection>,
        records: HashMap<(String, String), Record>,
    }

    impl RecordLookup for Fixture {
        fn collection(&self, name_or_id: &str) -> Option<&Collection> {
            self.collections
                .iter()
                .find(|c| c.id == name_or_id || c.name == name_or_id)
        }

        fn record(&self, collection_id: &str, id: &str) -> Option<&Record> {
            self.records
                .get(&(collection_id.to_string(), id.to_string()))
        }
    }

    fn fixture() -> (Fixture, Record) {
        let users = Collection::new("users", "users", CollectionKind::Auth)
            .with_field(Field::new("name", FieldKind::Text));
        let messages = Collection::new("msgs", "messages", CollectionKind::Base)
            .with_field(Field::new("message", FieldKind::Text))
            .with_field(Field::new("score", FieldKind::Number))
            .with_field(Field::relation("author", "users"));

        let ann = Record::new(&users)
            .with_id("u1")
            .with("name", "Ann")
            .with("email", "ann@example.com");
        let message = Record::new(&messages)
            .with_id("m1")
            .with("message", "Hello World")
            .with("score", Value::Int(7))
            .with("author", "u1");

        let mut records = HashMap::new();
        records.insert(("users".to_string(), "u1".to_string()), ann);

        (
            Fixture {
                collections: vec![users, messages],
                records,
            },
            message,
        )
    }

    fn eval(filter: &str, principal: Principal) -> bool {
        let (lookup, record) = fixture();
        let request = RequestInfo::read(principal);
        let ctx = EvalContext {
            request: &request,
            lookup: &lookup,
            now: Utc::now(),
        };
        let expr = parse(filter).unwrap();
        expr.check(lookup.collection("messages").unwrap(), &lookup)
            .unwrap();
        expr.matches(&record, &ctx)
    }

    #[test]
    fn test_basic_comparisons() {
        assert!(eval("message != ''", Principal::Anonymous));
        assert!(eval("score > 5 && score <= 7", Principal::Anonymous));
        assert!(eval("score = '7'", Principal::Anonymous));
        assert!(!eval("score < 7 || message = 'nope'", Principal::Anonymous));
        assert!(eval("message ~ 'hello'", Principal::Anonymous));
        assert!(eval("message ~ 'hel%rld'", Principal::Anonymous));
        assert!(eval("message !~ 'bye'", Principal::Anonymous));
        assert!(eval("created <= @now", Principal::Anonymous));
    }

    #[test]
    fn test_relation_paths() {
        assert!(eval("author.email = 'ann@example.com'", Principal::Anonymous));
        assert!(!eval("author.name = 'Bob'", Principal::Anonymous));
    }

    #[test]
    fn test_auth_macro() {
        let (lookup, _) = fixture();
        let ann = lookup.record("users", "u1").unwrap().clone();
        assert!(eval("author = @request.auth.id", Principal::Record(ann)));
        assert!(!eval("author = @request.auth.id", Principal::Anonymous));
        assert!(eval("@request.method = 'GET'", Principal::Anonymous));
    }

    #[test]
    fn test_check_rejects_unknown_paths() {
        let (lookup, _) = fixture();
        let messages = lookup.collection("messages").unwrap();

        for filter in ["wrong_field != ''", "message.name = 1", "author.nope = 1"] {
            let expr = parse(filter).unwrap();
            assert!(expr.check(messages, &lookup).is_err(), "{filter}");
        }
    }

    #[test]
    fn test_null_equals_empty() {
        assert_eq!(
            compare_values(&Value::Null, &Value::Text(String::new())),
            Some(Ordering::Equal)
        );
        assert_eq!(
            compare_values(&Value::Text("3".into()), &Value::Int(2)),
            Some(Ordering::Greater)
        );
    }
}
