use indexmap::IndexMap;
use tables::{Environment, Value};

use crate::ast::{BinaryOperator, Expr, UnaryOperator};
use crate::builtins;
use crate::error::EvalError;

const MAX_DEPTH: usize = 256;

/// Evaluate an expression against the bindings visible in `env`.
pub fn evaluate(expr: &Expr, env: &Environment) -> Result<Value, EvalError> {
    eval(expr, env, 0)
}

fn eval(expr: &Expr, env: &Environment, depth: usize) -> Result<Value, EvalError> {
    if depth > MAX_DEPTH {
        return Err(EvalError::TooDeep);
    }

    match expr {
        // --- Literals ---
        Expr::Null => Ok(Value::Null),
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Text(s) => Ok(Value::Text(s.clone())),
        Expr::Boolean(b) => Ok(Value::Bool(*b)),
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, env, depth + 1))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Expr::Record(fields) => {
            let mut record = IndexMap::new();
            for (name, value) in fields {
                record.insert(name.clone(), eval(value, env, depth + 1)?);
            }
            Ok(Value::Record(record))
        }

        // --- References ---
        Expr::Variable(name, span) => match env.get(name) {
            Some(Value::Error(message)) => Err(EvalError::Upstream {
                name: name.clone(),
                message: message.clone(),
                span: span.clone(),
            }),
            Some(value) => Ok(value.clone()),
            None => Err(EvalError::UndefinedVariable {
                name: name.clone(),
                span: span.clone(),
            }),
        },

        Expr::Member { object, field } => {
            let object = eval(object, env, depth + 1)?;
            member(&object, field)
        }

        Expr::Index { object, index } => {
            let object = eval(object, env, depth + 1)?;
            let index = eval(index, env, depth + 1)?;
            match (&object, &index) {
                (Value::List(items), Value::Number(n)) => list_index(items, *n),
                (Value::Text(text), Value::Number(n)) => {
                    let chars: Vec<char> = text.chars().collect();
                    let position = resolve_index(*n, chars.len())?;
                    Ok(Value::Text(chars[position].to_string()))
                }
                (Value::Record(_), Value::Text(field)) => member(&object, field),
                _ => Err(EvalError::type_error(
                    "list[number] or record[text]",
                    format!("{}[{}]", object.type_name(), index.type_name()),
                )),
            }
        }

        Expr::Call { name, args, span } => {
            let args = args
                .iter()
                .map(|arg| eval(arg, env, depth + 1))
                .collect::<Result<Vec<_>, _>>()?;
            builtins::call(name, args, span)
        }

        // --- Operations ---
        Expr::Unary { operator, operand } => {
            let val = eval(operand, env, depth + 1)?;
            match operator {
                UnaryOperator::Negation => Ok(Value::Number(-coerce_number(&val)?)),
                UnaryOperator::LogicalNot => Ok(Value::Bool(val.is_falsy())),
            }
        }

        Expr::Binary { operator, left, right } => {
            let l = eval(left, env, depth + 1)?;
            // Logical operators short-circuit
            match operator {
                BinaryOperator::LogicalAnd if l.is_falsy() => return Ok(Value::Bool(false)),
                BinaryOperator::LogicalOr if l.is_truthy() => return Ok(Value::Bool(true)),
                _ => {}
            }
            let r = eval(right, env, depth + 1)?;
            eval_binary_op(*operator, &l, &r)
        }

        // --- Conditional ---
        Expr::Conditional {
            condition,
            true_branch,
            false_branch,
        } => {
            if eval(condition, env, depth + 1)?.is_truthy() {
                eval(true_branch, env, depth + 1)
            } else {
                match false_branch {
                    Some(fb) => eval(fb, env, depth + 1),
                    None => Ok(Value::Null),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn member(object: &Value, field: &str) -> Result<Value, EvalError> {
    match object {
        Value::Record(_) => object.field(field).cloned().ok_or_else(|| EvalError::MissingField {
            field: field.to_string(),
            type_name: object.type_name().to_string(),
        }),
        Value::List(items) if field == "length" => Ok(Value::Number(items.len() as f64)),
        Value::Text(text) if field == "length" => Ok(Value::Number(text.chars().count() as f64)),
        other => Err(EvalError::MissingField {
            field: field.to_string(),
            type_name: other.type_name().to_string(),
        }),
    }
}

/// Negative indices count from the end.
fn resolve_index(n: f64, len: usize) -> Result<usize, EvalError> {
    let index = n.trunc() as i64;
    let resolved = if index < 0 { len as i64 + index } else { index };
    if resolved < 0 || resolved >= len as i64 {
        return Err(EvalError::IndexOutOfBounds { index, len });
    }
    Ok(resolved as usize)
}

fn list_index(items: &[Value], n: f64) -> Result<Value, EvalError> {
    let position = resolve_index(n, items.len())?;
    Ok(items[position].clone())
}

pub(crate) fn coerce_number(val: &Value) -> Result<f64, EvalError> {
    match val {
        Value::Number(n) => Ok(*n),
        other => Err(EvalError::type_error("number", other.type_name())),
    }
}

fn eval_binary_op(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match op {
        BinaryOperator::Addition => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::Text(a), b) => Ok(Value::Text(format!("{}{}", a, b))),
            (a, Value::Text(b)) => Ok(Value::Text(format!("{}{}", a, b))),
            (Value::List(a), Value::List(b)) => Ok(Value::List(a.iter().chain(b).cloned().collect())),
            _ => Err(EvalError::type_error(
                "matching numeric, text or list types",
                format!("{} + {}", left.type_name(), right.type_name()),
            )),
        },
        BinaryOperator::Subtraction => numeric_binop(left, right, |a, b| a - b),
        BinaryOperator::Multiplication => numeric_binop(left, right, |a, b| a * b),
        BinaryOperator::Division => {
            let a = coerce_number(left)?;
            let b = coerce_number(right)?;
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::Number(a / b))
        }
        BinaryOperator::Modulo => {
            let a = coerce_number(left)?;
            let b = coerce_number(right)?;
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::Number(a % b))
        }
        BinaryOperator::Equality => Ok(Value::Bool(left == right)),
        BinaryOperator::Inequality => Ok(Value::Bool(left != right)),
        BinaryOperator::GreaterThan => compare(left, right, |o| o.is_gt()),
        BinaryOperator::LessThan => compare(left, right, |o| o.is_lt()),
        BinaryOperator::GreaterThanOrEqual => compare(left, right, |o| o.is_ge()),
        BinaryOperator::LessThanOrEqual => compare(left, right, |o| o.is_le()),
        BinaryOperator::LogicalAnd => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOperator::LogicalOr => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
    }
}

fn numeric_binop(left: &Value, right: &Value, f: impl Fn(f64, f64) -> f64) -> Result<Value, EvalError> {
    let a = coerce_number(left)?;
    let b = coerce_number(right)?;
    Ok(Value::Number(f(a, b)))
}

/// Numbers compare numerically and text lexically. NaN compares false.
fn compare(left: &Value, right: &Value, f: impl Fn(std::cmp::Ordering) -> bool) -> Result<Value, EvalError> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        _ => {
            return Err(EvalError::type_error(
                "two numbers or two texts",
                format!("{} and {}", left.type_name(), right.type_name()),
            ));
        }
    };
    Ok(Value::Bool(ordering.is_some_and(f)))
}
