pub mod pages;

use crate::block::{Action, Block, BlockLibrary, Updater};
use crate::config::{Config, DocumentConfig};
use crate::environment::Environment;
use crate::history::{History, DEFAULT_DEPTH};
use crate::multiple;
use crate::value::Value;

pub use pages::{Page, PageId, TEMPLATE_ID};

#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub sidebar_open: bool,
    /// Path of the focused page. May dangle after edits; lookups then find
    /// nothing.
    pub open_page: Vec<PageId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInner<S> {
    pub view_state: ViewState,
    pub template: Page<S>,
    pub pages: Vec<Page<S>>,
    /// Top-level page ids below this were handed out during this document's
    /// lifetime.
    pub next_page_id: PageId,
}

pub type DocumentState<S> = History<DocumentInner<S>>;

impl<S: Clone> DocumentInner<S> {
    pub fn new(init: S, sidebar_open: bool) -> Self {
        DocumentInner {
            view_state: ViewState {
                sidebar_open,
                open_page: Vec::new(),
            },
            template: Page::new(TEMPLATE_ID, init),
            pages: Vec::new(),
            next_page_id: 0,
        }
    }

    pub fn get_page_at(&self, path: &[PageId]) -> Option<&Page<S>> {
        pages::get_page_at(path, &self.pages)
    }

    pub fn get_open_page(&self) -> Option<&Page<S>> {
        self.get_page_at(&self.view_state.open_page)
    }

    pub fn open_page(&self, path: &[PageId]) -> Self {
        DocumentInner {
            view_state: ViewState {
                open_page: path.to_vec(),
                ..self.view_state.clone()
            },
            ..self.clone()
        }
    }

    pub fn set_sidebar_open(&self, sidebar_open: bool) -> Self {
        DocumentInner {
            view_state: ViewState {
                sidebar_open,
                ..self.view_state.clone()
            },
            ..self.clone()
        }
    }

    pub fn toggle_sidebar(&self) -> Self {
        self.set_sidebar_open(!self.view_state.sidebar_open)
    }

    /// Id for a new top-level page. Deleted pages' ids are not reused.
    pub fn next_free_page_id(&self) -> PageId {
        multiple::high_water(self.next_page_id, &self.pages)
    }

    /// Append a copy of the template as the last child of the page at
    /// `path`, or as the last top-level page when `path` is empty, and open
    /// it. An unresolvable path leaves the document unchanged.
    pub fn add_page_at(&self, path: &[PageId]) -> Self {
        let add_sibling = |siblings: &[Page<S>], id: PageId| -> Vec<Page<S>> {
            let page = Page {
                id,
                name: pages::page_default_name(id),
                ..self.template.clone()
            };
            let mut siblings = siblings.to_vec();
            siblings.push(page);
            siblings
        };

        if path.is_empty() {
            let id = self.next_free_page_id();
            return DocumentInner {
                pages: add_sibling(&self.pages, id),
                next_page_id: id.saturating_add(1),
                ..self.open_page(&[id])
            };
        }

        let Some(parent) = self.get_page_at(path) else {
            tracing::debug!("cannot add a page under missing path {:?}", path);
            return self.clone();
        };
        let id = parent.next_free_child_id();
        let children = add_sibling(&parent.children, id);
        let pages = pages::update_page_at(path, &self.pages, |page| Page {
            children,
            next_child_id: id.saturating_add(1),
            ..page.clone()
        });
        let open_page = [path, &[id]].concat();
        DocumentInner {
            pages,
            ..self.open_page(&open_page)
        }
    }

    /// Remove the page at `path` with its subtree. If the open page was in
    /// that subtree, focus moves to the first remaining sibling, else the
    /// parent, else the root.
    pub fn delete_page_at(&self, path: &[PageId]) -> Self {
        let Some((id, parent)) = path.split_last() else {
            return self.clone();
        };
        if self.get_page_at(path).is_none() {
            tracing::debug!("cannot delete missing page {:?}", path);
            return self.clone();
        }
        let pages = if parent.is_empty() {
            self.pages.iter().filter(|page| page.id != *id).cloned().collect()
        } else {
            pages::update_page_at(parent, &self.pages, |page| Page {
                children: page.children.iter().filter(|child| child.id != *id).cloned().collect(),
                ..page.clone()
            })
        };
        let deleted = DocumentInner {
            pages,
            ..self.clone()
        };
        if !self.view_state.open_page.starts_with(path) {
            return deleted;
        }
        let fallback = match pages::get_siblings_at(path, &deleted.pages).and_then(|siblings| siblings.first()) {
            Some(first) => [parent, &[first.id]].concat(),
            None => parent.to_vec(),
        };
        deleted.open_page(&fallback)
    }

    pub fn update_page_state(&self, path: &[PageId], action: impl FnOnce(S) -> S) -> Self {
        DocumentInner {
            pages: pages::update_page_at(path, &self.pages, |page| Page {
                state: action(page.state.clone()),
                ..page.clone()
            }),
            ..self.clone()
        }
    }

    pub fn update_open_page(&self, action: impl FnOnce(S) -> S) -> Self {
        self.update_page_state(&self.view_state.open_page, action)
    }

    pub fn rename_page(&self, path: &[PageId], name: impl Into<String>) -> Self {
        let name = name.into();
        DocumentInner {
            pages: pages::update_page_at(path, &self.pages, |page| Page {
                name,
                ..page.clone()
            }),
            ..self.clone()
        }
    }
}

/// A block whose state is a document of `B` pages.
///
/// Edits made through the methods here are recorded in the document's
/// history. Re-deriving after an environment change is not.
#[derive(Debug, Clone)]
pub struct DocumentBlock<B> {
    inner: B,
    history_depth: usize,
    defaults: DocumentConfig,
}

impl<B: Block> DocumentBlock<B> {
    pub fn new(inner: B) -> Self {
        DocumentBlock {
            inner,
            history_depth: DEFAULT_DEPTH,
            defaults: DocumentConfig::default(),
        }
    }

    pub fn with_config(inner: B, config: &Config) -> Self {
        DocumentBlock {
            inner,
            history_depth: config.history.depth,
            defaults: config.document.clone(),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn wrap(&self, inner: DocumentInner<B::State>) -> DocumentState<B::State> {
        History::with_depth(inner, self.history_depth)
    }

    /// The environment the open page sees. Without an open page this is
    /// `env` itself.
    pub fn get_open_page_env(&self, doc: &DocumentInner<B::State>, env: &Environment) -> Environment {
        pages::get_env_at(&self.inner, &doc.view_state.open_page, &doc.pages, env).unwrap_or_else(|| env.clone())
    }

    pub fn page_result(&self, doc: &DocumentInner<B::State>, path: &[PageId], env: &Environment) -> Option<Value> {
        let page = doc.get_page_at(path)?;
        let page_env = pages::get_env_at(&self.inner, path, &doc.pages, env)?;
        self.inner.result(&page.state, &page_env)
    }

    pub fn add_page_at(&self, state: &mut DocumentState<B::State>, path: &[PageId]) {
        state.update(|doc| doc.add_page_at(path));
    }

    pub fn delete_page_at(&self, state: &mut DocumentState<B::State>, path: &[PageId]) {
        state.update(|doc| doc.delete_page_at(path));
    }

    pub fn rename_page(&self, state: &mut DocumentState<B::State>, path: &[PageId], name: &str) {
        state.update(|doc| doc.rename_page(path, name));
    }

    pub fn open_page(&self, state: &mut DocumentState<B::State>, path: &[PageId]) {
        state.update(|doc| doc.open_page(path));
    }

    pub fn set_sidebar_open(&self, state: &mut DocumentState<B::State>, open: bool) {
        state.update(|doc| doc.set_sidebar_open(open));
    }

    pub fn toggle_sidebar(&self, state: &mut DocumentState<B::State>) {
        state.update(DocumentInner::toggle_sidebar);
    }

    pub fn update_open_page(&self, state: &mut DocumentState<B::State>, action: impl FnOnce(B::State) -> B::State) {
        state.update(|doc| doc.update_open_page(action));
    }

    /// Re-derive every page against `env` in place.
    pub fn refresh(&self, state: &mut DocumentState<B::State>, update: &Updater<DocumentState<B::State>>, env: &Environment) {
        *state = self.on_environment_change(state, update, env);
    }

    /// Updater for the state of the page at `path`. Updates that arrive after
    /// the page was deleted find nothing at `path` and are dropped.
    pub fn page_updater(update: &Updater<DocumentState<B::State>>, path: Vec<PageId>) -> Updater<B::State> {
        update.focus(move |mut doc: DocumentState<B::State>, action: Action<B::State>| {
            doc.refresh(|inner| inner.update_page_state(&path, action));
            doc
        })
    }
}

impl<B: Block> Block for DocumentBlock<B> {
    type State = DocumentState<B::State>;

    fn init(&self) -> Self::State {
        self.wrap(DocumentInner::new(self.inner.init(), self.defaults.sidebar_open))
    }

    fn result(&self, state: &Self::State, env: &Environment) -> Option<Value> {
        Some(multiple::result_record(&state.inner().pages, env, |page, local_env| {
            pages::page_to_env(&self.inner, page, local_env)
        }))
    }

    fn on_environment_change(
        &self,
        state: &Self::State,
        update: &Updater<Self::State>,
        env: &Environment,
    ) -> Self::State {
        let mut next = state.clone();
        next.refresh(|doc| {
            let pages = pages::update_pages(
                &[],
                &doc.pages,
                |path, page, local_env| {
                    let page_update = Self::page_updater(update, path.to_vec());
                    Page {
                        state: self.inner.on_environment_change(&page.state, &page_update, local_env),
                        ..page.clone()
                    }
                },
                &self.inner,
                env,
            );
            DocumentInner { pages, ..doc.clone() }
        });
        next
    }

    fn to_json(&self, state: &Self::State) -> serde_json::Value {
        let doc = state.inner();
        serde_json::json!({
            "pages": pages::pages_to_json(&self.inner, &doc.pages),
            "template": pages::page_to_json(&self.inner, &doc.template),
            "nextPageId": doc.next_page_id,
            "viewState": {
                "sidebarOpen": doc.view_state.sidebar_open,
                "openPage": doc.view_state.open_page,
            },
        })
    }

    fn from_json(&self, json: &serde_json::Value, env: &Environment, library: &BlockLibrary) -> Self::State {
        if !json.is_object() {
            tracing::warn!("document JSON is not an object; starting a new document");
            return self.init();
        }
        let pages = pages::pages_from_json(
            &self.inner,
            json.get("pages").unwrap_or(&serde_json::Value::Null),
            env,
            library,
        );
        let template = match json.get("template") {
            Some(template) => Page {
                id: TEMPLATE_ID,
                ..pages::page_from_json(&self.inner, template, env, library)
            },
            None => Page::new(TEMPLATE_ID, self.inner.init()),
        };
        let next_page_id = json.get("nextPageId").and_then(serde_json::Value::as_i64).unwrap_or(0);
        let view_state = json.get("viewState");
        let sidebar_open = view_state
            .and_then(|view| view.get("sidebarOpen"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(self.defaults.sidebar_open);
        let open_page = view_state
            .and_then(|view| view.get("openPage"))
            .and_then(serde_json::Value::as_array)
            .map(|ids| ids.iter().filter_map(serde_json::Value::as_i64).collect())
            .unwrap_or_default();
        self.wrap(DocumentInner {
            view_state: ViewState {
                sidebar_open,
                open_page,
            },
            template,
            next_page_id: multiple::high_water(next_page_id, &pages),
            pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::UpdateQueue;
    use crate::block::testing::{LookupBlock, LookupState, NumberBlock};

    fn numbers() -> DocumentBlock<NumberBlock> {
        DocumentBlock::new(NumberBlock)
    }

    #[test]
    fn init_has_no_pages() {
        let doc = numbers().init();
        assert!(doc.inner().pages.is_empty());
        assert!(doc.inner().view_state.sidebar_open);
        assert_eq!(doc.inner().template.id, TEMPLATE_ID);
        assert!(doc.inner().get_open_page().is_none());
    }

    #[test]
    fn added_pages_copy_the_template_and_open() {
        let block = numbers();
        let mut doc = block.init();
        doc.refresh(|inner| DocumentInner {
            template: Page::new(TEMPLATE_ID, 7.0),
            ..inner.clone()
        });
        block.add_page_at(&mut doc, &[]);
        block.add_page_at(&mut doc, &[]);
        let inner = doc.inner();
        let names: Vec<&str> = inner.pages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Untitled_0", "Untitled_1"]);
        assert_eq!(inner.pages[1].state, 7.0);
        assert_eq!(inner.view_state.open_page, vec![1]);
    }

    #[test]
    fn add_under_a_page_creates_a_child() {
        let block = numbers();
        let mut doc = block.init();
        block.add_page_at(&mut doc, &[]);
        block.add_page_at(&mut doc, &[0]);
        assert_eq!(doc.inner().view_state.open_page, vec![0, 0]);
        assert!(doc.inner().get_page_at(&[0, 0]).is_some());

        let before = doc.clone();
        block.add_page_at(&mut doc, &[4, 2]);
        assert_eq!(doc, before);
    }

    #[test]
    fn sibling_ids_stay_unique() {
        let block = numbers();
        let mut doc = block.init();
        for step in 0..12 {
            if step % 4 == 3 {
                let first = doc.inner().pages[0].id;
                block.delete_page_at(&mut doc, &[first]);
            } else {
                block.add_page_at(&mut doc, &[]);
            }
            let mut ids: Vec<PageId> = doc.inner().pages.iter().map(|p| p.id).collect();
            let count = ids.len();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), count);
        }
    }

    #[test]
    fn deleting_the_open_page_moves_focus() {
        let block = numbers();
        let mut doc = block.init();
        block.add_page_at(&mut doc, &[]);
        block.add_page_at(&mut doc, &[]);
        block.add_page_at(&mut doc, &[1]);
        assert_eq!(doc.inner().view_state.open_page, vec![1, 0]);

        block.delete_page_at(&mut doc, &[1, 0]);
        assert_eq!(doc.inner().view_state.open_page, vec![1]);

        block.delete_page_at(&mut doc, &[1]);
        assert_eq!(doc.inner().view_state.open_page, vec![0]);

        block.delete_page_at(&mut doc, &[0]);
        assert!(doc.inner().view_state.open_page.is_empty());
        assert!(doc.inner().pages.is_empty());
    }

    #[test]
    fn deleting_another_page_keeps_focus() {
        let block = numbers();
        let mut doc = block.init();
        block.add_page_at(&mut doc, &[]);
        block.add_page_at(&mut doc, &[]);
        block.delete_page_at(&mut doc, &[0]);
        assert_eq!(doc.inner().view_state.open_page, vec![1]);
        let before = doc.clone();
        block.delete_page_at(&mut doc, &[]);
        block.delete_page_at(&mut doc, &[9]);
        assert_eq!(doc, before);
    }

    #[test]
    fn edits_are_undoable() {
        let block = numbers();
        let mut doc = block.init();
        block.add_page_at(&mut doc, &[]);
        block.update_open_page(&mut doc, |n| n + 5.0);
        assert_eq!(doc.inner().get_open_page().map(|p| p.state), Some(5.0));
        assert!(doc.undo());
        assert_eq!(doc.inner().get_open_page().map(|p| p.state), Some(0.0));
        assert!(doc.undo());
        assert_eq!(doc.inner(), block.init().inner());
        assert!(!doc.undo());
    }

    #[test]
    fn result_records_top_level_pages() {
        let block = numbers();
        let mut doc = block.init();
        block.add_page_at(&mut doc, &[]);
        block.update_open_page(&mut doc, |_| 3.0);
        block.rename_page(&mut doc, &[0], "total");
        let result = block.result(&doc, &Environment::new()).expect("document result");
        assert_eq!(result.field("total"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn open_page_env_sees_elder_pages() {
        let block = numbers();
        let mut doc = block.init();
        block.add_page_at(&mut doc, &[]);
        block.update_open_page(&mut doc, |_| 2.0);
        block.add_page_at(&mut doc, &[]);
        let env = block.get_open_page_env(doc.inner(), &Environment::new());
        assert_eq!(env.get("Untitled_0"), Some(&Value::Number(2.0)));
        assert!(!env.contains("Untitled_1"));
        assert_eq!(block.page_result(doc.inner(), &[0], &Environment::new()), Some(Value::Number(2.0)));
    }

    #[test]
    fn environment_change_is_idempotent_and_unrecorded() {
        let block = DocumentBlock::new(LookupBlock);
        let mut doc = block.init();
        block.add_page_at(&mut doc, &[]);
        block.update_open_page(&mut doc, |_| LookupState::of("x"));
        block.add_page_at(&mut doc, &[0]);
        block.update_open_page(&mut doc, |_| LookupState::of("x"));

        let env = Environment::single("x", Value::from("outer"));
        let queue = UpdateQueue::new();
        let once = block.on_environment_change(&doc, &queue.updater(), &env);
        let twice = block.on_environment_change(&once, &queue.updater(), &env);
        assert_eq!(once, twice);
        assert_eq!(
            once.inner().get_page_at(&[0, 0]).and_then(|p| p.state.seen.clone()),
            Some(Value::from("outer"))
        );

        let mut undone = once.clone();
        assert!(undone.undo());
        assert_eq!(
            undone.inner().get_page_at(&[0, 0]).map(|p| p.state.clone()),
            Some(LookupState::default())
        );
    }

    #[test]
    fn late_update_for_deleted_page_is_dropped() {
        let block = numbers();
        let mut doc = block.init();
        block.add_page_at(&mut doc, &[]);
        block.add_page_at(&mut doc, &[]);
        let queue = UpdateQueue::new();
        DocumentBlock::<NumberBlock>::page_updater(&queue.updater(), vec![1]).update(|n| n + 1.0);
        DocumentBlock::<NumberBlock>::page_updater(&queue.updater(), vec![0]).update(|n| n + 1.0);
        block.delete_page_at(&mut doc, &[1]);
        let applied = queue.apply(doc.clone());
        assert_eq!(applied.inner().get_page_at(&[0]).map(|p| p.state), Some(1.0));
        assert_eq!(applied.inner().pages.len(), 1);
    }

    #[test]
    fn late_update_never_lands_on_a_reused_id() {
        let block = numbers();
        let mut doc = block.init();
        block.add_page_at(&mut doc, &[]);
        block.add_page_at(&mut doc, &[]);
        let queue = UpdateQueue::new();
        DocumentBlock::<NumberBlock>::page_updater(&queue.updater(), vec![1]).update(|_| 42.0);
        block.delete_page_at(&mut doc, &[1]);
        block.add_page_at(&mut doc, &[]);

        let ids: Vec<PageId> = doc.inner().pages.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 2]);
        assert_eq!(doc.inner().view_state.open_page, vec![2]);
        let applied = queue.apply(doc.clone());
        assert_eq!(applied.inner(), doc.inner());
    }

    #[test]
    fn child_ids_are_not_reused() {
        let block = numbers();
        let mut doc = block.init();
        block.add_page_at(&mut doc, &[]);
        block.add_page_at(&mut doc, &[0]);
        block.add_page_at(&mut doc, &[0]);
        block.delete_page_at(&mut doc, &[0, 1]);
        block.add_page_at(&mut doc, &[0]);
        assert_eq!(doc.inner().view_state.open_page, vec![0, 2]);

        let mut loaded = block.from_json(&block.to_json(&doc), &Environment::new(), &BlockLibrary::new());
        block.delete_page_at(&mut loaded, &[0, 2]);
        block.delete_page_at(&mut loaded, &[0]);
        block.add_page_at(&mut loaded, &[]);
        assert_eq!(loaded.inner().view_state.open_page, vec![1]);
    }

    #[test]
    fn huge_page_ids_load_and_grow() {
        let block = numbers();
        let json = serde_json::json!({ "pages": [{ "id": i64::MAX, "name": "big" }], "nextPageId": i64::MAX });
        let mut doc = block.from_json(&json, &Environment::new(), &BlockLibrary::new());
        assert_eq!(doc.inner().pages[0].id, 0);
        block.add_page_at(&mut doc, &[]);
        block.add_page_at(&mut doc, &[]);
        let ids: Vec<PageId> = doc.inner().pages.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, multiple::MAX_ID, multiple::MAX_ID + 1]);
    }

    #[test]
    fn json_round_trip_resets_history() {
        let block = numbers();
        let mut doc = block.init();
        block.add_page_at(&mut doc, &[]);
        block.add_page_at(&mut doc, &[0]);
        block.update_open_page(&mut doc, |_| 4.0);
        block.set_sidebar_open(&mut doc, false);

        let loaded = block.from_json(&block.to_json(&doc), &Environment::new(), &BlockLibrary::new());
        assert_eq!(loaded.inner(), doc.inner());
        assert!(!loaded.can_undo());
        assert_eq!(
            block.result(&loaded, &Environment::new()),
            block.result(&doc, &Environment::new())
        );
    }

    #[test]
    fn malformed_json_degrades() {
        let block = numbers();
        let library = BlockLibrary::new();
        assert_eq!(block.from_json(&serde_json::json!(12), &Environment::new(), &library), block.init());

        let partial = serde_json::json!({ "pages": "nope", "viewState": { "openPage": [3, "x"] } });
        let loaded = block.from_json(&partial, &Environment::new(), &library);
        assert!(loaded.inner().pages.is_empty());
        assert_eq!(loaded.inner().view_state.open_page, vec![3]);
        assert!(loaded.inner().get_open_page().is_none());
        assert_eq!(loaded.inner().template, Page::new(TEMPLATE_ID, 0.0));
    }

    #[test]
    fn config_sets_defaults() {
        let mut config = Config::default();
        config.history.depth = 1;
        config.document.sidebar_open = false;
        let block = DocumentBlock::with_config(NumberBlock, &config);
        let mut doc = block.init();
        assert!(!doc.inner().view_state.sidebar_open);
        block.add_page_at(&mut doc, &[]);
        block.add_page_at(&mut doc, &[]);
        assert!(doc.undo());
        assert!(!doc.undo());
    }
}
