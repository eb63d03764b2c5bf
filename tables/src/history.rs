use std::collections::VecDeque;

pub const DEFAULT_DEPTH: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct History<S> {
    past: VecDeque<S>,
    present: S,
    future: Vec<S>,
    depth: usize,
}

impl<S: Clone + PartialEq> History<S> {
    pub fn new(present: S) -> Self {
        Self::with_depth(present, DEFAULT_DEPTH)
    }

    /// A history that keeps at most `depth` undo steps. The oldest steps are
    /// discarded first.
    pub fn with_depth(present: S, depth: usize) -> Self {
        History {
            past: VecDeque::new(),
            present,
            future: Vec::new(),
            depth,
        }
    }

    pub fn inner(&self) -> &S {
        &self.present
    }

    pub fn into_inner(self) -> S {
        self.present
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Record an edit. Edits that change nothing are not recorded, and any
    /// recorded edit clears the redo stack.
    pub fn update(&mut self, action: impl FnOnce(&S) -> S) {
        let next = action(&self.present);
        if next == self.present {
            return;
        }
        let previous = std::mem::replace(&mut self.present, next);
        if self.depth > 0 {
            self.past.push_back(previous);
            while self.past.len() > self.depth {
                self.past.pop_front();
            }
        }
        self.future.clear();
    }

    /// Rewrite the present without recording an undo step.
    pub fn refresh(&mut self, action: impl FnOnce(&S) -> S) {
        self.present = action(&self.present);
    }

    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.past.pop_back() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, previous);
        self.future.push(current);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(next) = self.future.pop() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, next);
        self.past.push_back(current);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undo_then_redo_restores() {
        let mut history = History::new(0);
        history.update(|n| n + 1);
        history.update(|n| n + 1);
        assert_eq!(*history.inner(), 2);
        assert!(history.undo());
        assert_eq!(*history.inner(), 1);
        assert!(history.redo());
        assert_eq!(*history.inner(), 2);
        assert!(!history.redo());
    }

    #[test]
    fn new_edit_clears_redo() {
        let mut history = History::new(0);
        history.update(|_| 5);
        history.undo();
        assert!(history.can_redo());
        history.update(|_| 7);
        assert!(!history.can_redo());
        assert!(history.undo());
        assert_eq!(*history.inner(), 0);
    }

    #[test]
    fn no_op_edits_are_not_recorded() {
        let mut history = History::new(3);
        history.update(|n| *n);
        assert!(!history.can_undo());
    }

    #[test]
    fn refresh_is_invisible_to_undo() {
        let mut history = History::new(1);
        history.update(|_| 2);
        history.refresh(|n| n * 10);
        assert_eq!(*history.inner(), 20);
        assert!(history.undo());
        assert_eq!(*history.inner(), 1);
        assert!(!history.undo());
    }

    #[test]
    fn depth_bounds_undo_steps() {
        let mut history = History::with_depth(0, 2);
        for _ in 0..5 {
            history.update(|n| n + 1);
        }
        assert!(history.undo());
        assert!(history.undo());
        assert!(!history.undo());
        assert_eq!(*history.inner(), 3);
    }
}
