use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// A deferred state transition.
pub type Action<S> = Box<dyn FnOnce(S) -> S>;

/// Handle through which a block requests a later update of its own state.
///
/// The handle never touches state directly. Actions travel up to whoever
/// owns the root state and are applied there, addressed by id or path, so a
/// completion that arrives after its line or page was deleted finds nothing
/// to update and is dropped.
pub struct Updater<S> {
    dispatch: Rc<dyn Fn(Action<S>)>,
}

impl<S> Clone for Updater<S> {
    fn clone(&self) -> Self {
        Updater {
            dispatch: Rc::clone(&self.dispatch),
        }
    }
}

impl<S> fmt::Debug for Updater<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Updater")
    }
}

impl<S: 'static> Updater<S> {
    pub fn new(dispatch: impl Fn(Action<S>) + 'static) -> Self {
        Updater {
            dispatch: Rc::new(dispatch),
        }
    }

    /// An updater whose actions go nowhere.
    pub fn detached() -> Self {
        Updater::new(|_action| {
            tracing::debug!("dropping update sent to a detached updater");
        })
    }

    pub fn update(&self, action: impl FnOnce(S) -> S + 'static) {
        (self.dispatch)(Box::new(action));
    }

    /// Derive an updater for a part of `S`.
    ///
    /// `lens` receives the whole state and the child action and must return
    /// the whole state with the action applied to the addressed part (or
    /// unchanged when that part no longer exists).
    pub fn focus<T: 'static>(&self, lens: impl Fn(S, Action<T>) -> S + 'static) -> Updater<T> {
        let parent = self.clone();
        let lens = Rc::new(lens);
        Updater::new(move |action: Action<T>| {
            let lens = Rc::clone(&lens);
            parent.update(move |state| lens(state, action));
        })
    }
}

/// Pending actions for one root state, applied in FIFO order.
pub struct UpdateQueue<S> {
    pending: Rc<RefCell<VecDeque<Action<S>>>>,
}

impl<S> Default for UpdateQueue<S> {
    fn default() -> Self {
        UpdateQueue {
            pending: Rc::new(RefCell::new(VecDeque::new())),
        }
    }
}

impl<S: 'static> UpdateQueue<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updater(&self) -> Updater<S> {
        let pending = Rc::clone(&self.pending);
        Updater::new(move |action| pending.borrow_mut().push_back(action))
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Apply every pending action, including ones enqueued while applying.
    pub fn apply(&self, mut state: S) -> S {
        loop {
            let next = self.pending.borrow_mut().pop_front();
            match next {
                Some(action) => state = action(state),
                None => return state,
            }
        }
    }
}
