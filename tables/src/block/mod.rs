pub mod library;
pub mod selector;
pub mod updater;

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::environment::Environment;
use crate::value::Value;

pub use library::BlockLibrary;
pub use updater::{Action, UpdateQueue, Updater};

pub trait Block: fmt::Debug + 'static {
    type State: Clone + fmt::Debug + PartialEq + 'static;

    /// State of a freshly created instance.
    fn init(&self) -> Self::State;

    /// The value this block exposes to its container, or `None` when it has
    /// nothing to expose. Must not panic on partially-invalid state; failures
    /// come back as [`Value::Error`].
    fn result(&self, state: &Self::State, env: &Environment) -> Option<Value>;

    /// Re-derive state after the ambient environment changed.
    ///
    /// Calling this twice with the same environment yields the same state as
    /// calling it once. `update` accepts deferred updates to this state.
    fn on_environment_change(
        &self,
        state: &Self::State,
        _update: &Updater<Self::State>,
        _env: &Environment,
    ) -> Self::State {
        state.clone()
    }

    fn to_json(&self, state: &Self::State) -> serde_json::Value;

    /// Load state from JSON. Malformed input degrades to [`Block::init`];
    /// nested variants are resolved through `library`.
    fn from_json(&self, json: &serde_json::Value, env: &Environment, library: &BlockLibrary) -> Self::State;
}

trait ErasedState: Any + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn eq_state(&self, other: &dyn ErasedState) -> bool;
}

impl<T: Any + fmt::Debug + PartialEq> ErasedState for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_state(&self, other: &dyn ErasedState) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }
}

/// Shared, immutable state of some block variant.
#[derive(Clone)]
pub struct BlockState(Rc<dyn ErasedState>);

impl BlockState {
    pub fn new<T: Any + fmt::Debug + PartialEq>(state: T) -> Self {
        BlockState(Rc::new(state))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.0).as_any().downcast_ref::<T>()
    }
}

impl PartialEq for BlockState {
    fn eq(&self, other: &Self) -> bool {
        (*self.0).eq_state(&*other.0)
    }
}

impl fmt::Debug for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Object-safe view of a [`Block`] over [`BlockState`].
pub trait DynBlock: fmt::Debug {
    fn init_state(&self) -> BlockState;
    fn state_result(&self, state: &BlockState, env: &Environment) -> Option<Value>;
    fn state_on_environment_change(
        &self,
        state: &BlockState,
        update: &Updater<BlockState>,
        env: &Environment,
    ) -> BlockState;
    fn state_to_json(&self, state: &BlockState) -> serde_json::Value;
    fn state_from_json(&self, json: &serde_json::Value, env: &Environment, library: &BlockLibrary) -> BlockState;
}

impl<B: Block> DynBlock for B {
    fn init_state(&self) -> BlockState {
        BlockState::new(self.init())
    }

    fn state_result(&self, state: &BlockState, env: &Environment) -> Option<Value> {
        match state.downcast_ref::<B::State>() {
            Some(state) => self.result(state, env),
            None => {
                tracing::warn!("state {:?} does not belong to block {:?}", state, self);
                None
            }
        }
    }

    fn state_on_environment_change(
        &self,
        state: &BlockState,
        update: &Updater<BlockState>,
        env: &Environment,
    ) -> BlockState {
        let Some(typed) = state.downcast_ref::<B::State>() else {
            return state.clone();
        };
        let typed_update = update.focus(|erased: BlockState, action: Action<B::State>| {
            let current = erased.downcast_ref::<B::State>().cloned();
            match current {
                Some(current) => BlockState::new(action(current)),
                None => erased,
            }
        });
        BlockState::new(self.on_environment_change(typed, &typed_update, env))
    }

    fn state_to_json(&self, state: &BlockState) -> serde_json::Value {
        match state.downcast_ref::<B::State>() {
            Some(state) => self.to_json(state),
            None => {
                tracing::warn!("cannot serialize foreign state {:?} with block {:?}", state, self);
                serde_json::Value::Null
            }
        }
    }

    fn state_from_json(&self, json: &serde_json::Value, env: &Environment, library: &BlockLibrary) -> BlockState {
        BlockState::new(self.from_json(json, env, library))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Holds a number and exposes it; `null` or junk JSON loads as `0`.
    #[derive(Debug, Clone, Copy)]
    pub struct NumberBlock;

    impl Block for NumberBlock {
        type State = f64;

        fn init(&self) -> f64 {
            0.0
        }

        fn result(&self, state: &f64, _env: &Environment) -> Option<Value> {
            Some(Value::Number(*state))
        }

        fn to_json(&self, state: &f64) -> serde_json::Value {
            serde_json::json!(state)
        }

        fn from_json(&self, json: &serde_json::Value, _env: &Environment, _library: &BlockLibrary) -> f64 {
            json.as_f64().unwrap_or_else(|| self.init())
        }
    }

    /// State is a binding name; the result is that binding's value, and
    /// `on_environment_change` caches what the name currently resolves to.
    #[derive(Debug, Clone, Copy)]
    pub struct LookupBlock;

    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct LookupState {
        pub name: String,
        pub seen: Option<Value>,
    }

    impl LookupState {
        pub fn of(name: &str) -> Self {
            LookupState {
                name: name.to_string(),
                seen: None,
            }
        }
    }

    impl Block for LookupBlock {
        type State = LookupState;

        fn init(&self) -> LookupState {
            LookupState::default()
        }

        fn result(&self, state: &LookupState, env: &Environment) -> Option<Value> {
            env.get(&state.name).cloned()
        }

        fn on_environment_change(
            &self,
            state: &LookupState,
            _update: &Updater<LookupState>,
            env: &Environment,
        ) -> LookupState {
            LookupState {
                name: state.name.clone(),
                seen: env.get(&state.name).cloned(),
            }
        }

        fn to_json(&self, state: &LookupState) -> serde_json::Value {
            serde_json::json!(state.name)
        }

        fn from_json(&self, json: &serde_json::Value, _env: &Environment, _library: &BlockLibrary) -> LookupState {
            json.as_str().map(LookupState::of).unwrap_or_default()
        }
    }
}
