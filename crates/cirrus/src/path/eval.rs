//! Tree-walking interpreter for compiled field paths.
//!
//! Evaluation is total: a node applied to a value of the wrong shape yields
//! `null` instead of an error, so a missing field anywhere in a path simply
//! resolves the whole path to `null`.

use std::borrow::Cow;
use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::parser::{Ast, Comparator};

static NULL: Value = Value::Null;

pub(crate) fn evaluate<'a>(ast: &'a Ast, data: &'a Value) -> Cow<'a, Value> {
    match ast {
        Ast::Current => Cow::Borrowed(data),
        Ast::Field(name) => Cow::Borrowed(data.get(name.as_str()).unwrap_or(&NULL)),
        Ast::Index(index) => Cow::Borrowed(index_array(data, *index).unwrap_or(&NULL)),
        Ast::Literal(value) => Cow::Borrowed(value),
        Ast::Subexpression(lhs, rhs) | Ast::Pipe(lhs, rhs) => chain(evaluate(lhs, data), rhs),
        Ast::Projection(lhs, rhs) => {
            let left = evaluate(lhs, data);
            match left.as_ref() {
                Value::Array(items) => Cow::Owned(project(items.iter(), rhs)),
                _ => Cow::Borrowed(&NULL),
            }
        }
        Ast::ValueProjection(lhs, rhs) => {
            let left = evaluate(lhs, data);
            match left.as_ref() {
                Value::Object(map) => Cow::Owned(project(map.values(), rhs)),
                _ => Cow::Borrowed(&NULL),
            }
        }
        Ast::Flatten(inner) => {
            let inner = evaluate(inner, data);
            let Value::Array(items) = inner.as_ref() else {
                return Cow::Borrowed(&NULL);
            };
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Array(nested) => out.extend(nested.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Cow::Owned(Value::Array(out))
        }
        Ast::FilterProjection {
            lhs,
            rhs,
            condition,
        } => {
            let left = evaluate(lhs, data);
            let Value::Array(items) = left.as_ref() else {
                return Cow::Borrowed(&NULL);
            };
            let kept = items
                .iter()
                .filter(|item| is_truthy(&evaluate(condition, item)));
            Cow::Owned(project(kept, rhs))
        }
        Ast::Compare(comparator, lhs, rhs) => {
            let left = evaluate(lhs, data);
            let right = evaluate(rhs, data);
            match compare(*comparator, &left, &right) {
                Some(result) => Cow::Owned(Value::Bool(result)),
                None => Cow::Borrowed(&NULL),
            }
        }
        Ast::Or(lhs, rhs) => {
            let left = evaluate(lhs, data);
            if is_truthy(&left) { left } else { evaluate(rhs, data) }
        }
        Ast::And(lhs, rhs) => {
            let left = evaluate(lhs, data);
            if is_truthy(&left) { evaluate(rhs, data) } else { left }
        }
        Ast::Not(inner) => Cow::Owned(Value::Bool(!is_truthy(&evaluate(inner, data)))),
        Ast::MultiList(items) => {
            if data.is_null() {
                return Cow::Borrowed(&NULL);
            }
            let values = items
                .iter()
                .map(|item| evaluate(item, data).into_owned())
                .collect();
            Cow::Owned(Value::Array(values))
        }
        Ast::MultiHash(pairs) => {
            if data.is_null() {
                return Cow::Borrowed(&NULL);
            }
            let map: Map<String, Value> = pairs
                .iter()
                .map(|(key, item)| (key.clone(), evaluate(item, data).into_owned()))
                .collect();
            Cow::Owned(Value::Object(map))
        }
        Ast::Function(name, args) => {
            let args: Vec<Cow<'_, Value>> = args.iter().map(|arg| evaluate(arg, data)).collect();
            Cow::Owned(call(name, &args))
        }
    }
}

/// Evaluate `rhs` against the result of a previous step.
fn chain<'a>(left: Cow<'a, Value>, rhs: &'a Ast) -> Cow<'a, Value> {
    match left {
        Cow::Borrowed(value) => evaluate(rhs, value),
        Cow::Owned(value) => Cow::Owned(evaluate(rhs, &value).into_owned()),
    }
}

/// Apply `rhs` to every element, dropping null results.
fn project<'v>(items: impl Iterator<Item = &'v Value>, rhs: &Ast) -> Value {
    Value::Array(
        items
            .map(|item| evaluate(rhs, item))
            .filter(|value| !value.is_null())
            .map(Cow::into_owned)
            .collect(),
    )
}

fn index_array(data: &Value, index: i64) -> Option<&Value> {
    let items = data.as_array()?;
    let position = if index < 0 {
        items.len().checked_sub(index.unsigned_abs() as usize)?
    } else {
        index as usize
    };
    items.get(position)
}

/// JMESPath truthiness: empty containers, empty strings, `false` and `null` are false.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(_) => true,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => left == right,
    }
}

fn compare(comparator: Comparator, left: &Value, right: &Value) -> Option<bool> {
    match comparator {
        Comparator::Eq => return Some(values_equal(left, right)),
        Comparator::Ne => return Some(!values_equal(left, right)),
        _ => {}
    }

    // Ordering is only defined between numbers.
    let ordering = left.as_f64()?.partial_cmp(&right.as_f64()?)?;
    Some(match comparator {
        Comparator::Lt => ordering == Ordering::Less,
        Comparator::Lte => ordering != Ordering::Greater,
        Comparator::Gt => ordering == Ordering::Greater,
        Comparator::Gte => ordering != Ordering::Less,
        Comparator::Eq | Comparator::Ne => unreachable!("handled above"),
    })
}

fn call(name: &str, args: &[Cow<'_, Value>]) -> Value {
    let arg = |i: usize| args.get(i).map(Cow::as_ref).unwrap_or(&NULL);

    match name {
        "contains" => match (arg(0), arg(1)) {
            (Value::Array(items), needle) => {
                Value::Bool(items.iter().any(|item| values_equal(item, needle)))
            }
            (Value::String(haystack), Value::String(needle)) => {
                Value::Bool(haystack.contains(needle.as_str()))
            }
            _ => Value::Null,
        },
        "length" => match arg(0) {
            Value::String(s) => Value::from(s.chars().count()),
            Value::Array(items) => Value::from(items.len()),
            Value::Object(map) => Value::from(map.len()),
            _ => Value::Null,
        },
        "to_string" => match arg(0) {
            Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        },
        "join" => match (arg(0), arg(1)) {
            (Value::String(glue), Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str())
                .collect::<Option<Vec<_>>>()
                .map(|parts| Value::String(parts.join(glue)))
                .unwrap_or(Value::Null),
            _ => Value::Null,
        },
        "keys" => match arg(0) {
            Value::Object(map) => map.keys().cloned().map(Value::String).collect(),
            _ => Value::Null,
        },
        "values" => match arg(0) {
            Value::Object(map) => map.values().cloned().collect(),
            _ => Value::Null,
        },
        "starts_with" => match (arg(0), arg(1)) {
            (Value::String(subject), Value::String(prefix)) => {
                Value::Bool(subject.starts_with(prefix.as_str()))
            }
            _ => Value::Null,
        },
        "not_null" => args
            .iter()
            .find(|value| !value.is_null())
            .map(|value| value.as_ref().clone())
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}
