use std::ops::Range;

use tables::Value;

use crate::error::EvalError;
use crate::evaluator::coerce_number;

pub fn call(name: &str, args: Vec<Value>, span: &Range<usize>) -> Result<Value, EvalError> {
    match name {
        "len" => {
            let [value] = exactly::<1>(name, args)?;
            match &value {
                Value::List(items) => Ok(Value::Number(items.len() as f64)),
                Value::Text(text) => Ok(Value::Number(text.chars().count() as f64)),
                Value::Record(fields) => Ok(Value::Number(fields.len() as f64)),
                other => Err(EvalError::type_error("list, text or record", other.type_name())),
            }
        }
        "sum" => {
            let numbers = numbers(args)?;
            Ok(Value::Number(numbers.iter().sum()))
        }
        "min" => fold_numbers(name, args, f64::min),
        "max" => fold_numbers(name, args, f64::max),
        "abs" => {
            let [value] = exactly::<1>(name, args)?;
            Ok(Value::Number(coerce_number(&value)?.abs()))
        }
        "round" => {
            let [value] = exactly::<1>(name, args)?;
            Ok(Value::Number(coerce_number(&value)?.round()))
        }
        "upper" => {
            let [value] = exactly::<1>(name, args)?;
            Ok(Value::Text(coerce_text(&value)?.to_uppercase()))
        }
        "lower" => {
            let [value] = exactly::<1>(name, args)?;
            Ok(Value::Text(coerce_text(&value)?.to_lowercase()))
        }
        "text" => {
            let [value] = exactly::<1>(name, args)?;
            Ok(Value::Text(value.to_string()))
        }
        "keys" => {
            let [value] = exactly::<1>(name, args)?;
            match value {
                Value::Record(fields) => Ok(Value::List(fields.keys().map(|key| Value::from(key.as_str())).collect())),
                other => Err(EvalError::type_error("record", other.type_name())),
            }
        }
        _ => Err(EvalError::UnknownFunction {
            name: name.to_string(),
            span: span.clone(),
        }),
    }
}

fn exactly<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N], EvalError> {
    let got = args.len();
    args.try_into().map_err(|_| EvalError::Arity {
        name: name.to_string(),
        expected: N,
        got,
    })
}

fn coerce_text(value: &Value) -> Result<&str, EvalError> {
    match value {
        Value::Text(text) => Ok(text),
        other => Err(EvalError::type_error("text", other.type_name())),
    }
}

/// A single list argument is spread, so `sum([1, 2])` and `sum(1, 2)` agree.
fn numbers(args: Vec<Value>) -> Result<Vec<f64>, EvalError> {
    let values = match <[Value; 1]>::try_from(args) {
        Ok([Value::List(items)]) => items,
        Ok([single]) => vec![single],
        Err(args) => args,
    };
    values.iter().map(coerce_number).collect()
}

fn fold_numbers(name: &str, args: Vec<Value>, f: fn(f64, f64) -> f64) -> Result<Value, EvalError> {
    let numbers = numbers(args)?;
    numbers
        .into_iter()
        .reduce(f)
        .map(Value::Number)
        .ok_or_else(|| EvalError::Arity {
            name: name.to_string(),
            expected: 1,
            got: 0,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_ok(name: &str, args: Vec<Value>) -> Value {
        call(name, args, &(0..0)).expect("call")
    }

    fn nums(values: &[f64]) -> Vec<Value> {
        values.iter().copied().map(Value::Number).collect()
    }

    #[test]
    fn aggregates_spread_a_single_list() {
        assert_eq!(call_ok("sum", nums(&[1.0, 2.0, 3.0])), Value::Number(6.0));
        assert_eq!(call_ok("sum", vec![Value::List(nums(&[4.0, 5.0]))]), Value::Number(9.0));
        assert_eq!(call_ok("sum", vec![]), Value::Number(0.0));
        assert_eq!(call_ok("max", nums(&[1.0, 7.0, 3.0])), Value::Number(7.0));
        assert_eq!(call_ok("min", vec![Value::List(nums(&[4.0, -5.0]))]), Value::Number(-5.0));
    }

    #[test]
    fn arity_and_unknown_names() {
        assert!(matches!(
            call("len", vec![], &(0..3)),
            Err(EvalError::Arity { expected: 1, got: 0, .. })
        ));
        assert!(matches!(call("max", vec![], &(0..3)), Err(EvalError::Arity { .. })));
        let err = call("nope", vec![], &(2..6)).expect_err("unknown");
        assert_eq!(err.span(), Some(2..6));
    }

    #[test]
    fn text_helpers() {
        assert_eq!(call_ok("upper", vec![Value::from("ab")]), Value::from("AB"));
        assert_eq!(call_ok("text", vec![Value::Number(2.0)]), Value::from("2"));
        assert_eq!(call_ok("len", vec![Value::from("héllo")]), Value::Number(5.0));
    }
}
