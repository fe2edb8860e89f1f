//! Expression evaluator.
//!
//! Walks a built [`Expr`] tree against a variable scope. Evaluation never
//! fails: missing identifiers, unknown functions, and nonsensical operand
//! combinations all degrade to `Null` (with a diagnostic) so that flow
//! execution can continue past a bad expression.

use std::collections::HashMap;

use serde_json::Value;

use super::ast::Expr;

/// Read-only variable scope used for identifier resolution.
///
/// Implemented by the flow runtime context; tests implement it directly to
/// probe evaluation order.
pub trait Scope {
    /// Resolve a (possibly dotted) identifier path, `None` when any segment
    /// is missing.
    fn lookup(&self, path: &str) -> Option<Value>;
}

impl Scope for HashMap<String, Value> {
    fn lookup(&self, path: &str) -> Option<Value> {
        lookup_path(|key| self.get(key), path)
    }
}

/// Dotted-path resolution shared by every scope implementation: an exact key
/// match wins over path descent, so a variable literally named `a.b` shadows
/// the path `a` → `b`.
pub(crate) fn lookup_path<'a, F>(root: F, path: &str) -> Option<Value>
where
    F: Fn(&str) -> Option<&'a Value>,
{
    if let Some(value) = root(path) {
        return Some(value.clone());
    }

    let mut segments = path.split('.');
    let mut current = root(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

/// Evaluate an expression tree against a scope.
pub fn evaluate_ast(expr: &Expr, scope: &dyn Scope) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Identifier(path) => scope.lookup(path).unwrap_or(Value::Null),
        Expr::Unary { op, operand } => apply_unary(op, &evaluate_ast(operand, scope)),
        Expr::Binary { op, left, right } => match op.as_str() {
            // Short-circuit forms return operand values, not re-coerced
            // booleans.
            "&&" => {
                let lhs = evaluate_ast(left, scope);
                if truthy(&lhs) {
                    evaluate_ast(right, scope)
                } else {
                    lhs
                }
            }
            "||" => {
                let lhs = evaluate_ast(left, scope);
                if truthy(&lhs) {
                    lhs
                } else {
                    evaluate_ast(right, scope)
                }
            }
            _ => apply_binary(op, &evaluate_ast(left, scope), &evaluate_ast(right, scope)),
        },
        Expr::Call { name, args } => {
            let values: Vec<Value> = args.iter().map(|arg| evaluate_ast(arg, scope)).collect();
            match call_builtin(name, &values) {
                Some(result) => result,
                None => {
                    tracing::warn!(function = %name, "unknown expression function");
                    Value::Null
                }
            }
        }
        Expr::Ternary {
            condition,
            when_true,
            when_false,
        } => {
            if truthy(&evaluate_ast(condition, scope)) {
                evaluate_ast(when_true, scope)
            } else {
                evaluate_ast(when_false, scope)
            }
        }
    }
}

fn apply_unary(op: &str, operand: &Value) -> Value {
    match op {
        "!" => Value::Bool(!truthy(operand)),
        "u-" => match numeric(operand) {
            Some(n) => number_value(-n),
            None => Value::Null,
        },
        "u+" => match numeric(operand) {
            Some(n) => number_value(n),
            None => Value::Null,
        },
        other => {
            tracing::warn!(op = %other, "unknown unary operator");
            Value::Null
        }
    }
}

fn apply_binary(op: &str, left: &Value, right: &Value) -> Value {
    match op {
        "==" => Value::Bool(loose_eq(left, right)),
        "!=" => Value::Bool(!loose_eq(left, right)),
        "===" => Value::Bool(strict_eq(left, right)),
        "!==" => Value::Bool(!strict_eq(left, right)),
        "+" | "-" | "*" | "/" | "%" | "<" | "<=" | ">" | ">=" => {
            // Numeric coercion applies only when *both* sides look numeric;
            // otherwise the operands are used as-is, which preserves string
            // concatenation through `+`.
            if let (Some(l), Some(r)) = (numeric(left), numeric(right)) {
                apply_numeric(op, l, r)
            } else {
                apply_non_numeric(op, left, right)
            }
        }
        other => {
            tracing::warn!(op = %other, "unknown binary operator");
            Value::Null
        }
    }
}

fn apply_numeric(op: &str, l: f64, r: f64) -> Value {
    match op {
        "+" => number_value(l + r),
        "-" => number_value(l - r),
        "*" => number_value(l * r),
        "/" => number_value(l / r),
        "%" => number_value(l % r),
        "<" => Value::Bool(l < r),
        "<=" => Value::Bool(l <= r),
        ">" => Value::Bool(l > r),
        ">=" => Value::Bool(l >= r),
        _ => Value::Null,
    }
}

fn apply_non_numeric(op: &str, left: &Value, right: &Value) -> Value {
    match op {
        "+" => Value::String(format!("{}{}", to_display(left), to_display(right))),
        "<" | "<=" | ">" | ">=" => match (left, right) {
            (Value::String(l), Value::String(r)) => Value::Bool(match op {
                "<" => l < r,
                "<=" => l <= r,
                ">" => l > r,
                _ => l >= r,
            }),
            _ => Value::Bool(false),
        },
        _ => {
            tracing::debug!(op = %op, "non-numeric operands for arithmetic operator");
            Value::Null
        }
    }
}

/// General truthiness: `null`, `false`, `0`, and the empty string are falsy;
/// everything else (including non-empty collections) is truthy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Boolean coercion used for `toBool` and for equality against a boolean
/// operand: strings count as true only for the spreadsheet-style set
/// `true`/`1`/`yes`/`y` (case-insensitive).
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "y"
        ),
        other => truthy(other),
    }
}

/// Whether a value "looks like a number": a numeric type, or a non-empty
/// string that parses cleanly to a finite number.
pub(crate) fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// Build a JSON number, collapsing integral results to integers so that
/// `2 + 3` renders as `5` rather than `5.0`. Non-finite results degrade to
/// `Null`.
pub(crate) fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

/// Render a value into the string form used for concatenation and template
/// substitution: `null` disappears, scalars print plainly, collections print
/// as JSON.
pub(crate) fn to_display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    if matches!(left, Value::Bool(_)) || matches!(right, Value::Bool(_)) {
        return coerce_bool(left) == coerce_bool(right);
    }
    if let (Some(l), Some(r)) = (numeric(left), numeric(right)) {
        return l == r;
    }
    left == right
}

fn strict_eq(left: &Value, right: &Value) -> bool {
    if let (Value::Number(l), Value::Number(r)) = (left, right) {
        return l.as_f64() == r.as_f64();
    }
    left == right
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Fixed built-in function registry. Returns `None` for unknown names so the
/// caller can degrade instead of failing.
fn call_builtin(name: &str, args: &[Value]) -> Option<Value> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Null);
    let result = match name {
        "len" | "length" => {
            let n = match arg(0) {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                _ => 0,
            };
            Value::from(n as i64)
        }
        "upper" | "toUpper" => Value::String(to_display(&arg(0)).to_uppercase()),
        "lower" | "toLower" => Value::String(to_display(&arg(0)).to_lowercase()),
        "trim" => Value::String(to_display(&arg(0)).trim().to_string()),
        "toNumber" | "number" => match numeric(&arg(0)) {
            Some(n) => number_value(n),
            None => Value::Null,
        },
        "toBool" | "bool" => Value::Bool(coerce_bool(&arg(0))),
        "contains" => match arg(0) {
            Value::Array(items) => Value::Bool(items.iter().any(|item| loose_eq(item, &arg(1)))),
            other => Value::Bool(to_display(&other).contains(&to_display(&arg(1)))),
        },
        "startsWith" => Value::Bool(to_display(&arg(0)).starts_with(&to_display(&arg(1)))),
        "endsWith" => Value::Bool(to_display(&arg(0)).ends_with(&to_display(&arg(1)))),
        "isEmpty" => Value::Bool(is_empty_value(&arg(0))),
        "coalesce" | "firstNonEmpty" => args
            .iter()
            .find(|value| !is_empty_value(value))
            .cloned()
            .unwrap_or(Value::Null),
        // The list helpers are pure: they return edited copies and never
        // mutate their input.
        "addItem" => {
            let mut items = match arg(0) {
                Value::Array(items) => items,
                _ => Vec::new(),
            };
            items.push(arg(1));
            Value::Array(items)
        }
        "removeItem" => {
            let items = match arg(0) {
                Value::Array(items) => items,
                _ => Vec::new(),
            };
            let needle = arg(1);
            Value::Array(
                items
                    .into_iter()
                    .filter(|item| !loose_eq(item, &needle))
                    .collect(),
            )
        }
        "removeAt" => {
            let mut items = match arg(0) {
                Value::Array(items) => items,
                _ => Vec::new(),
            };
            if let Some(index) = numeric(&arg(1)).map(|n| n as usize) {
                if index < items.len() {
                    items.remove(index);
                }
            }
            Value::Array(items)
        }
        "join" => {
            let items = match arg(0) {
                Value::Array(items) => items,
                other => vec![other],
            };
            let sep = to_display(&arg(1));
            Value::String(
                items
                    .iter()
                    .map(to_display)
                    .collect::<Vec<_>>()
                    .join(&sep),
            )
        }
        _ => return None,
    };
    Some(result)
}
