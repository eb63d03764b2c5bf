use serde::{Deserialize, Serialize};

use crate::block::{Action, Block, BlockLibrary, Updater};
use crate::environment::Environment;
use crate::multiple::{self, Id, Identified};
use crate::propagate::map_with_env;
use crate::value::Value;

pub type LineId = Id;

/// How a line is displayed. Persisted with the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Block,
    Result,
    Collapsed,
}

impl Visibility {
    /// `collapsed -> block -> result -> collapsed`.
    pub fn next(self) -> Self {
        match self {
            Visibility::Block => Visibility::Result,
            Visibility::Result => Visibility::Collapsed,
            Visibility::Collapsed => Visibility::Block,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line<S> {
    pub id: LineId,
    pub name: String,
    pub visibility: Visibility,
    pub state: S,
}

impl<S> Identified for Line<S> {
    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }
}

impl<S> Line<S> {
    pub fn new(id: LineId, state: S) -> Self {
        Line {
            id,
            name: String::new(),
            visibility: Visibility::default(),
            state,
        }
    }

    /// The name this line binds: its own, or the positional default.
    pub fn binding_name(&self) -> String {
        if self.name.trim().is_empty() {
            line_default_name(self.id)
        } else {
            self.name.trim().to_string()
        }
    }
}

pub fn line_default_name(id: LineId) -> String {
    format!("Result_{}", id)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetState<S> {
    lines: Vec<Line<S>>,
    /// Ids below this were handed out during this list's lifetime.
    next_id: LineId,
}

impl<S: Clone> SheetState<S> {
    /// A sheet with one fresh line.
    pub fn new(init: S) -> Self {
        SheetState {
            lines: vec![Line::new(0, init)],
            next_id: 1,
        }
    }

    /// Build from loaded lines. Falls back to a fresh sheet when empty.
    pub fn from_lines(lines: Vec<Line<S>>, next_id: LineId, init: S) -> Self {
        if lines.is_empty() {
            return SheetState::new(init);
        }
        let next_id = next_id.max(multiple::next_free_id(&lines));
        SheetState { lines, next_id }
    }

    pub fn lines(&self) -> &[Line<S>] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn next_free_id(&self) -> LineId {
        self.next_id.max(multiple::next_free_id(&self.lines))
    }

    pub fn line_index(&self, id: LineId) -> Option<usize> {
        multiple::find_index(&self.lines, id)
    }

    pub fn get_line(&self, id: LineId) -> Option<&Line<S>> {
        self.line_index(id).map(|index| &self.lines[index])
    }

    /// A fresh line with the next free id. Not inserted.
    pub fn new_line(&self, init: S) -> Line<S> {
        Line::new(self.next_free_id(), init)
    }

    pub fn insert_before(&self, id: LineId, line: Line<S>) -> Self {
        self.insert_at_offset(id, 0, line)
    }

    pub fn insert_after(&self, id: LineId, line: Line<S>) -> Self {
        self.insert_at_offset(id, 1, line)
    }

    fn insert_at_offset(&self, id: LineId, offset: usize, line: Line<S>) -> Self {
        let Some(index) = self.line_index(id) else {
            tracing::debug!("insert next to missing line {}", id);
            return self.clone();
        };
        if self.line_index(line.id).is_some() {
            tracing::debug!("line id {} already in use", line.id);
            return self.clone();
        }
        let next_id = self.next_id.max(line.id.saturating_add(1));
        let mut lines = self.lines.clone();
        lines.insert(index + offset, line);
        SheetState { lines, next_id }
    }

    /// Replace exactly the line with `id`; every other line is kept as is.
    /// A missing id leaves the sheet unchanged.
    pub fn update_line_with_id(&self, id: LineId, f: impl FnOnce(&Line<S>) -> Line<S>) -> Self {
        let Some(index) = self.line_index(id) else {
            tracing::debug!("update for missing line {} dropped", id);
            return self.clone();
        };
        let mut lines = self.lines.clone();
        let updated = f(&lines[index]);
        lines[index] = Line { id, ..updated };
        SheetState {
            lines,
            next_id: self.next_id,
        }
    }

    pub fn update_line_state(&self, id: LineId, action: impl FnOnce(S) -> S) -> Self {
        self.update_line_with_id(id, |line| Line {
            state: action(line.state.clone()),
            ..line.clone()
        })
    }

    pub fn set_name(&self, id: LineId, name: impl Into<String>) -> Self {
        let name = name.into();
        self.update_line_with_id(id, |line| Line {
            name,
            ..line.clone()
        })
    }

    pub fn cycle_visibility(&self, id: LineId) -> Self {
        self.update_line_with_id(id, |line| Line {
            visibility: line.visibility.next(),
            ..line.clone()
        })
    }

    /// Remove one line. Deleting the only line yields a fresh sheet, so a
    /// sheet is never empty.
    pub fn delete_line(&self, id: LineId, init: S) -> Self {
        if self.line_index(id).is_none() {
            return self.clone();
        }
        if self.lines.len() <= 1 {
            return SheetState::new(init);
        }
        SheetState {
            lines: self.lines.iter().filter(|line| line.id != id).cloned().collect(),
            next_id: self.next_free_id(),
        }
    }

    /// The line that should take focus once `id` is deleted: the previous
    /// line, or the first remaining one.
    pub fn focus_after_delete(&self, id: LineId) -> Option<LineId> {
        let index = self.line_index(id)?;
        let remaining: Vec<&Line<S>> = self.lines.iter().filter(|line| line.id != id).collect();
        if remaining.is_empty() {
            return None;
        }
        let target = index.saturating_sub(1).min(remaining.len() - 1);
        Some(remaining[target].id)
    }

    /// The line `offset` positions away from `id`, clamped to the sheet.
    pub fn relative_line(&self, id: LineId, offset: isize) -> Option<&Line<S>> {
        let index = self.line_index(id)? as isize;
        let last = self.lines.len() as isize - 1;
        let target = (index + offset).clamp(0, last);
        self.lines.get(target as usize)
    }
}

/// A block whose state is a sheet of `B` lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct SheetBlock<B> {
    inner: B,
}

impl<B: Block> SheetBlock<B> {
    pub fn new(inner: B) -> Self {
        SheetBlock { inner }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// The binding one line contributes to the lines after it.
    pub fn line_to_env(&self, line: &Line<B::State>, env: &Environment) -> Environment {
        let result = self.inner.result(&line.state, env).unwrap_or(Value::Null);
        Environment::single(line.binding_name(), result)
    }

    /// The environment each line sees, in line order.
    pub fn line_scopes(&self, state: &SheetState<B::State>, env: &Environment) -> Vec<Environment> {
        map_with_env(state.lines(), env, |line, local_env| {
            (local_env.clone(), self.line_to_env(line, local_env))
        })
    }

    /// Each line's result in its own scope.
    pub fn line_results(&self, state: &SheetState<B::State>, env: &Environment) -> Vec<(LineId, Option<Value>)> {
        map_with_env(state.lines(), env, |line, local_env| {
            let result = self.inner.result(&line.state, local_env);
            (
                (line.id, result.clone()),
                Environment::single(line.binding_name(), result.unwrap_or(Value::Null)),
            )
        })
    }

    pub fn insert_line_before(&self, state: &SheetState<B::State>, id: LineId) -> SheetState<B::State> {
        state.insert_before(id, state.new_line(self.inner.init()))
    }

    pub fn insert_line_after(&self, state: &SheetState<B::State>, id: LineId) -> SheetState<B::State> {
        state.insert_after(id, state.new_line(self.inner.init()))
    }

    pub fn delete_line(&self, state: &SheetState<B::State>, id: LineId) -> SheetState<B::State> {
        state.delete_line(id, self.inner.init())
    }

    /// Updater for one line's inner state. Updates that arrive after the line
    /// was deleted find no line with `id` and are dropped.
    pub fn line_updater(update: &Updater<SheetState<B::State>>, id: LineId) -> Updater<B::State> {
        update.focus(move |sheet: SheetState<B::State>, action: Action<B::State>| {
            sheet.update_line_state(id, action)
        })
    }

    fn line_from_json(
        &self,
        json: &serde_json::Value,
        env: &Environment,
        library: &BlockLibrary,
    ) -> Line<B::State> {
        let id = json.get("id").and_then(serde_json::Value::as_i64).unwrap_or(-1);
        let name = json
            .get("name")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let visibility = json
            .get("visibility")
            .and_then(|v| Visibility::deserialize(v).ok())
            .unwrap_or_default();
        let state = match json.get("state") {
            Some(state) => self.inner.from_json(state, env, library),
            None => self.inner.init(),
        };
        Line {
            id,
            name,
            visibility,
            state,
        }
    }
}

impl<B: Block> Block for SheetBlock<B> {
    type State = SheetState<B::State>;

    fn init(&self) -> Self::State {
        SheetState::new(self.inner.init())
    }

    fn result(&self, state: &Self::State, env: &Environment) -> Option<Value> {
        Some(multiple::result_record(state.lines(), env, |line, local_env| {
            self.line_to_env(line, local_env)
        }))
    }

    fn on_environment_change(
        &self,
        state: &Self::State,
        update: &Updater<Self::State>,
        env: &Environment,
    ) -> Self::State {
        let lines = map_with_env(state.lines(), env, |line, local_env| {
            let line_update = Self::line_updater(update, line.id);
            let updated = Line {
                state: self.inner.on_environment_change(&line.state, &line_update, local_env),
                ..line.clone()
            };
            let contribution = self.line_to_env(&updated, local_env);
            (updated, contribution)
        });
        SheetState {
            lines,
            next_id: state.next_id,
        }
    }

    fn to_json(&self, state: &Self::State) -> serde_json::Value {
        let lines: Vec<serde_json::Value> = state
            .lines()
            .iter()
            .map(|line| {
                serde_json::json!({
                    "id": line.id,
                    "name": line.name,
                    "visibility": line.visibility,
                    "state": self.inner.to_json(&line.state),
                })
            })
            .collect();
        serde_json::json!({ "lines": lines, "nextId": state.next_id })
    }

    fn from_json(&self, json: &serde_json::Value, env: &Environment, library: &BlockLibrary) -> Self::State {
        let lines_json = match json {
            serde_json::Value::Array(lines) => Some(lines),
            other => other.get("lines").and_then(serde_json::Value::as_array),
        };
        let Some(lines_json) = lines_json else {
            tracing::warn!("sheet JSON has no line list; starting empty");
            return self.init();
        };
        let next_id = json.get("nextId").and_then(serde_json::Value::as_i64).unwrap_or(0);

        let mut lines: Vec<Line<B::State>> = map_with_env(lines_json, env, |line_json, local_env| {
            let line = self.line_from_json(line_json, local_env, library);
            let contribution = self.line_to_env(&line, local_env);
            (line, contribution)
        });

        let fresh = multiple::repair_ids(&mut lines, next_id);
        SheetState::from_lines(lines, fresh, self.inner.init())
    }
}
