use tables::{Environment, Value};

use crate::error::Error;
use crate::evaluator::evaluate;
use crate::parser::parse_expression;

pub fn evaluate_source(source: &str, env: &Environment) -> Result<Value, Error> {
    let expr = parse_expression(source)?;
    Ok(evaluate(&expr, env)?)
}

/// Evaluate a cell's source. Blank source has no result; failures come back
/// as [`Value::Error`] so one broken cell never stops its siblings.
pub fn compute(source: &str, env: &Environment) -> Option<Value> {
    if source.trim().is_empty() {
        return None;
    }
    match evaluate_source(source, env) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::debug!("cell failed to evaluate: {}", err);
            Some(Value::error(err.to_string()))
        }
    }
}
