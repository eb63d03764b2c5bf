use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::block::{Action, Block, BlockLibrary, BlockState, DynBlock, Updater};
use crate::environment::Environment;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorMode {
    #[default]
    Choose,
    Run,
}

#[derive(Clone)]
pub enum Chosen {
    Empty,
    Resolved {
        name: String,
        block: Rc<dyn DynBlock>,
        state: BlockState,
    },
    /// Placeholder for a variant the library does not know. The raw JSON is
    /// kept so saving the document does not lose it.
    Unresolved {
        name: String,
        json: serde_json::Value,
    },
}

impl PartialEq for Chosen {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Chosen::Empty, Chosen::Empty) => true,
            (
                Chosen::Resolved { name: a, state: sa, .. },
                Chosen::Resolved { name: b, state: sb, .. },
            ) => a == b && sa == sb,
            (
                Chosen::Unresolved { name: a, json: ja },
                Chosen::Unresolved { name: b, json: jb },
            ) => a == b && ja == jb,
            _ => false,
        }
    }
}

impl fmt::Debug for Chosen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chosen::Empty => write!(f, "Empty"),
            Chosen::Resolved { name, state, .. } => f
                .debug_struct("Resolved")
                .field("name", name)
                .field("state", state)
                .finish(),
            Chosen::Unresolved { name, json } => f
                .debug_struct("Unresolved")
                .field("name", name)
                .field("json", json)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorState {
    pub mode: SelectorMode,
    pub expr: String,
    pub inner: Chosen,
}

impl SelectorState {
    pub fn is_resolved(&self) -> bool {
        matches!(self.inner, Chosen::Resolved { .. })
    }

    /// The chosen variant's name and state, if one is resolved.
    pub fn resolved(&self) -> Option<(&str, &BlockState)> {
        match &self.inner {
            Chosen::Resolved { name, state, .. } => Some((name, state)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorBlock;

impl SelectorBlock {
    /// Resolve `expr` against `library` and run the chosen variant from its
    /// initial state. An unknown name leaves the state unchanged.
    pub fn choose(&self, state: &SelectorState, library: &BlockLibrary) -> SelectorState {
        match library.get(state.expr.trim()) {
            Some(block) => SelectorState {
                mode: SelectorMode::Run,
                expr: state.expr.clone(),
                inner: Chosen::Resolved {
                    name: state.expr.trim().to_string(),
                    state: block.init_state(),
                    block,
                },
            },
            None => {
                tracing::debug!("no block variant named {:?}", state.expr);
                state.clone()
            }
        }
    }

    pub fn set_expr(&self, state: &SelectorState, expr: impl Into<String>) -> SelectorState {
        SelectorState {
            expr: expr.into(),
            ..state.clone()
        }
    }

    /// Switch modes. `Run` is only entered when a variant is resolved.
    pub fn set_mode(&self, state: &SelectorState, mode: SelectorMode) -> SelectorState {
        if mode == SelectorMode::Run && !state.is_resolved() {
            return state.clone();
        }
        SelectorState {
            mode,
            ..state.clone()
        }
    }

    /// Apply `action` to the chosen variant's state. No-op without one.
    pub fn update_inner(
        &self,
        state: &SelectorState,
        action: impl FnOnce(&BlockState) -> BlockState,
    ) -> SelectorState {
        match &state.inner {
            Chosen::Resolved { name, block, state: inner } => SelectorState {
                inner: Chosen::Resolved {
                    name: name.clone(),
                    block: Rc::clone(block),
                    state: action(inner),
                },
                ..state.clone()
            },
            _ => state.clone(),
        }
    }

    fn load_inner(
        &self,
        expr: &str,
        json: &serde_json::Value,
        env: &Environment,
        library: &BlockLibrary,
    ) -> Chosen {
        let name = expr.trim();
        if name.is_empty() {
            return Chosen::Empty;
        }
        match library.get(name) {
            Some(block) => {
                let state = if json.is_null() {
                    block.init_state()
                } else {
                    block.state_from_json(json, env, library)
                };
                Chosen::Resolved {
                    name: name.to_string(),
                    block,
                    state,
                }
            }
            None => {
                tracing::warn!("unresolved block variant {:?}; keeping a placeholder", name);
                Chosen::Unresolved {
                    name: name.to_string(),
                    json: json.clone(),
                }
            }
        }
    }
}

impl Block for SelectorBlock {
    type State = SelectorState;

    fn init(&self) -> SelectorState {
        SelectorState {
            mode: SelectorMode::Choose,
            expr: String::new(),
            inner: Chosen::Empty,
        }
    }

    fn result(&self, state: &SelectorState, env: &Environment) -> Option<Value> {
        match (state.mode, &state.inner) {
            (SelectorMode::Run, Chosen::Resolved { block, state, .. }) => block.state_result(state, env),
            _ => None,
        }
    }

    fn on_environment_change(
        &self,
        state: &SelectorState,
        update: &Updater<SelectorState>,
        env: &Environment,
    ) -> SelectorState {
        let Chosen::Resolved { name, block, state: inner } = &state.inner else {
            return state.clone();
        };
        let inner_update = update.focus(|selector: SelectorState, action: Action<BlockState>| {
            SelectorBlock.update_inner(&selector, |inner| action(inner.clone()))
        });
        SelectorState {
            inner: Chosen::Resolved {
                name: name.clone(),
                block: Rc::clone(block),
                state: block.state_on_environment_change(inner, &inner_update, env),
            },
            ..state.clone()
        }
    }

    fn to_json(&self, state: &SelectorState) -> serde_json::Value {
        let inner = match &state.inner {
            Chosen::Empty => serde_json::Value::Null,
            Chosen::Resolved { block, state, .. } => block.state_to_json(state),
            Chosen::Unresolved { json, .. } => json.clone(),
        };
        serde_json::json!({
            "mode": state.mode,
            "expr": state.expr,
            "inner": inner,
        })
    }

    fn from_json(&self, json: &serde_json::Value, env: &Environment, library: &BlockLibrary) -> SelectorState {
        let mode = json
            .get("mode")
            .and_then(|mode| SelectorMode::deserialize(mode).ok())
            .unwrap_or_default();
        let expr = json
            .get("expr")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let inner_json = json.get("inner").unwrap_or(&serde_json::Value::Null);
        let inner = self.load_inner(&expr, inner_json, env, library);
        SelectorState { mode, expr, inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::UpdateQueue;
    use crate::block::testing::{LookupBlock, LookupState, NumberBlock};

    fn library() -> BlockLibrary {
        BlockLibrary::new()
            .with("number", NumberBlock)
            .with("lookup", LookupBlock)
    }

    #[test]
    fn choose_mode_exposes_nothing() {
        let selector = SelectorBlock;
        let state = selector.set_expr(&selector.init(), "number");
        assert_eq!(selector.result(&state, &Environment::new()), None);
    }

    #[test]
    fn choosing_runs_the_variant() {
        let selector = SelectorBlock;
        let state = selector.choose(&selector.set_expr(&selector.init(), "number"), &library());
        assert_eq!(state.mode, SelectorMode::Run);
        let state = selector.update_inner(&state, |_| BlockState::new(7.0_f64));
        assert_eq!(selector.result(&state, &Environment::new()), Some(Value::Number(7.0)));
    }

    #[test]
    fn choosing_unknown_name_is_a_no_op() {
        let selector = SelectorBlock;
        let state = selector.set_expr(&selector.init(), "nope");
        assert_eq!(selector.choose(&state, &library()), state);
        assert_eq!(selector.set_mode(&state, SelectorMode::Run).mode, SelectorMode::Choose);
    }

    #[test]
    fn round_trips_through_json() {
        let selector = SelectorBlock;
        let json = serde_json::json!({ "mode": "run", "expr": "number", "inner": 2.5 });
        let state = selector.from_json(&json, &Environment::new(), &library());
        assert_eq!(selector.result(&state, &Environment::new()), Some(Value::Number(2.5)));
        assert_eq!(selector.to_json(&state), json);
    }

    #[test]
    fn unknown_variant_loads_as_placeholder() {
        let selector = SelectorBlock;
        let json = serde_json::json!({ "mode": "run", "expr": "chart", "inner": { "series": [1, 2] } });
        let state = selector.from_json(&json, &Environment::new(), &library());
        assert!(matches!(state.inner, Chosen::Unresolved { .. }));
        assert_eq!(selector.result(&state, &Environment::new()), None);
        assert_eq!(selector.to_json(&state), json);
    }

    #[test]
    fn malformed_json_degrades_to_init() {
        let selector = SelectorBlock;
        let state = selector.from_json(&serde_json::json!([1, 2, 3]), &Environment::new(), &library());
        assert_eq!(state, selector.init());
    }

    #[test]
    fn environment_change_reaches_the_chosen_variant() {
        let selector = SelectorBlock;
        let json = serde_json::json!({ "mode": "run", "expr": "lookup", "inner": "x" });
        let state = selector.from_json(&json, &Environment::new(), &library());
        let env = Environment::single("x", Value::Number(1.0));
        let queue = UpdateQueue::new();
        let once = selector.on_environment_change(&state, &queue.updater(), &env);
        let twice = selector.on_environment_change(&once, &queue.updater(), &env);
        assert_eq!(once, twice);
        let (_, inner) = once.resolved().expect("resolved");
        assert_eq!(
            inner.downcast_ref::<LookupState>().and_then(|s| s.seen.clone()),
            Some(Value::Number(1.0))
        );
    }
}
