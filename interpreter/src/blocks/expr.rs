use tables::block::{Block, BlockLibrary, Updater};
use tables::{Environment, Value};

use crate::compute::compute;

/// A code cell: one expression evaluated against the cell's scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprBlock;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExprState {
    pub source: String,
    /// Value computed at the last environment change. Not persisted.
    pub last: Option<Value>,
}

impl ExprState {
    pub fn new(source: impl Into<String>) -> Self {
        ExprState {
            source: source.into(),
            last: None,
        }
    }
}

impl Block for ExprBlock {
    type State = ExprState;

    fn init(&self) -> ExprState {
        ExprState::default()
    }

    fn result(&self, state: &ExprState, env: &Environment) -> Option<Value> {
        compute(&state.source, env)
    }

    fn on_environment_change(&self, state: &ExprState, _update: &Updater<ExprState>, env: &Environment) -> ExprState {
        ExprState {
            source: state.source.clone(),
            last: compute(&state.source, env),
        }
    }

    fn to_json(&self, state: &ExprState) -> serde_json::Value {
        serde_json::Value::String(state.source.clone())
    }

    fn from_json(&self, json: &serde_json::Value, _env: &Environment, _library: &BlockLibrary) -> ExprState {
        match json.as_str() {
            Some(source) => ExprState::new(source),
            None => {
                tracing::warn!("expression cell JSON is not a string; starting empty");
                self.init()
            }
        }
    }
}
