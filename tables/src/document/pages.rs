use crate::block::{Block, BlockLibrary};
use crate::environment::Environment;
use crate::multiple::{self, Id, Identified};
use crate::propagate::{env_before, map_with_env};
use crate::value::Value;

pub type PageId = Id;

/// Id of the page that seeds new pages.
pub const TEMPLATE_ID: PageId = -1;

#[derive(Debug, Clone, PartialEq)]
pub struct Page<S> {
    pub id: PageId,
    pub name: String,
    pub state: S,
    pub children: Vec<Page<S>>,
    /// Child ids below this were handed out during this page's lifetime.
    pub next_child_id: PageId,
}

impl<S> Identified for Page<S> {
    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }
}

impl<S> Page<S> {
    pub fn new(id: PageId, state: S) -> Self {
        Page {
            id,
            name: String::new(),
            state,
            children: Vec::new(),
            next_child_id: 0,
        }
    }

    /// Id for a new child. Deleted children's ids are not reused.
    pub fn next_free_child_id(&self) -> PageId {
        multiple::high_water(self.next_child_id, &self.children)
    }
}

pub fn page_default_name(id: PageId) -> String {
    format!("Untitled_{}", id)
}

/// Descend id by id. The empty path selects no page.
pub fn get_page_at<'a, S>(path: &[PageId], pages: &'a [Page<S>]) -> Option<&'a Page<S>> {
    let (first, rest) = path.split_first()?;
    let page = pages.iter().find(|page| page.id == *first)?;
    if rest.is_empty() {
        Some(page)
    } else {
        get_page_at(rest, &page.children)
    }
}

/// The sibling list that holds the page at `path`.
pub fn get_siblings_at<'a, S>(path: &[PageId], pages: &'a [Page<S>]) -> Option<&'a [Page<S>]> {
    match path.split_last() {
        None => None,
        Some((_, [])) => Some(pages),
        Some((_, parent)) => get_page_at(parent, pages).map(|page| page.children.as_slice()),
    }
}

/// Replace the page at `path` with `f(page)`. An empty or unresolvable path
/// returns the pages unchanged.
pub fn update_page_at<S: Clone>(
    path: &[PageId],
    pages: &[Page<S>],
    f: impl FnOnce(&Page<S>) -> Page<S>,
) -> Vec<Page<S>> {
    let Some((first, rest)) = path.split_first() else {
        return pages.to_vec();
    };
    let Some(index) = multiple::find_index(pages, *first) else {
        tracing::debug!("page path segment {} not found", first);
        return pages.to_vec();
    };
    let mut updated = pages.to_vec();
    let page = &pages[index];
    updated[index] = if rest.is_empty() {
        Page { id: page.id, ..f(page) }
    } else {
        Page {
            children: update_page_at(rest, &page.children, f),
            ..page.clone()
        }
    };
    updated
}

/// What a page contributes to its younger siblings: its name bound to its
/// result. Unnamed pages contribute nothing.
pub fn page_to_env<B: Block>(inner: &B, page: &Page<B::State>, env: &Environment) -> Environment {
    let name = page.name.trim();
    if name.is_empty() {
        return Environment::new();
    }
    let result = inner.result(&page.state, env).unwrap_or(Value::Null);
    Environment::single(name, result)
}

/// The environment `page` sees among `siblings`: `env` extended by every
/// elder sibling. A page that is not among `siblings` sees `env`.
pub fn get_page_env<B: Block>(
    inner: &B,
    page: &Page<B::State>,
    siblings: &[Page<B::State>],
    env: &Environment,
) -> Environment {
    let Some(index) = multiple::find_index(siblings, page.id) else {
        return env.clone();
    };
    env_before(siblings, index, env, |sibling, local_env| page_to_env(inner, sibling, local_env))
}

/// The environment of the page at `path`, computed from the root down.
pub fn get_env_at<B: Block>(inner: &B, path: &[PageId], pages: &[Page<B::State>], env: &Environment) -> Option<Environment> {
    let (first, rest) = path.split_first()?;
    let page = pages.iter().find(|page| page.id == *first)?;
    let local_env = get_page_env(inner, page, pages, env);
    if rest.is_empty() {
        Some(local_env)
    } else {
        get_env_at(inner, rest, &page.children, &local_env)
    }
}

/// Rebuild every page in tree order. `f` gets each page's path and effective
/// environment; children are rebuilt after their parent, from the parent's
/// environment. Pages are visited once and never reordered.
pub fn update_pages<B, F>(
    prefix: &[PageId],
    pages: &[Page<B::State>],
    mut f: F,
    inner: &B,
    env: &Environment,
) -> Vec<Page<B::State>>
where
    B: Block,
    F: FnMut(&[PageId], &Page<B::State>, &Environment) -> Page<B::State>,
{
    update_pages_with(prefix, pages, &mut f, inner, env)
}

fn update_pages_with<B, F>(
    prefix: &[PageId],
    pages: &[Page<B::State>],
    f: &mut F,
    inner: &B,
    env: &Environment,
) -> Vec<Page<B::State>>
where
    B: Block,
    F: FnMut(&[PageId], &Page<B::State>, &Environment) -> Page<B::State>,
{
    map_with_env(pages, env, |page, local_env| {
        let path = [prefix, &[page.id]].concat();
        let updated = f(&path, page, local_env);
        let children = update_pages_with(&path, &updated.children, &mut *f, inner, local_env);
        let updated = Page { children, ..updated };
        let contribution = page_to_env(inner, &updated, local_env);
        (updated, contribution)
    })
}

/// Depth-first, pre-order walk with each page's path and environment.
pub fn visit_pages<B, F>(pages: &[Page<B::State>], inner: &B, env: &Environment, mut f: F)
where
    B: Block,
    F: FnMut(&[PageId], &Page<B::State>, &Environment),
{
    visit_pages_with(&[], pages, inner, env, &mut f);
}

fn visit_pages_with<B, F>(prefix: &[PageId], pages: &[Page<B::State>], inner: &B, env: &Environment, f: &mut F)
where
    B: Block,
    F: FnMut(&[PageId], &Page<B::State>, &Environment),
{
    let mut local_env = env.clone();
    for page in pages {
        let path = [prefix, &[page.id]].concat();
        f(&path, page, &local_env);
        visit_pages_with(&path, &page.children, inner, &local_env, f);
        local_env = local_env.extend(&page_to_env(inner, page, &local_env));
    }
}

pub fn page_to_json<B: Block>(inner: &B, page: &Page<B::State>) -> serde_json::Value {
    serde_json::json!({
        "id": page.id,
        "name": page.name,
        "state": inner.to_json(&page.state),
        "children": pages_to_json(inner, &page.children),
        "nextChildId": page.next_child_id,
    })
}

pub fn pages_to_json<B: Block>(inner: &B, pages: &[Page<B::State>]) -> serde_json::Value {
    serde_json::Value::Array(pages.iter().map(|page| page_to_json(inner, page)).collect())
}

/// Load one page. Missing fields take defaults; a missing id is `-1` and is
/// repaired by [`pages_from_json`].
pub fn page_from_json<B: Block>(
    inner: &B,
    json: &serde_json::Value,
    env: &Environment,
    library: &BlockLibrary,
) -> Page<B::State> {
    let id = json.get("id").and_then(serde_json::Value::as_i64).unwrap_or(TEMPLATE_ID);
    let name = json
        .get("name")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();
    let state = match json.get("state") {
        Some(state) => inner.from_json(state, env, library),
        None => inner.init(),
    };
    let children: Vec<Page<B::State>> = json
        .get("children")
        .map(|children| pages_from_json(inner, children, env, library))
        .unwrap_or_default();
    let next_child_id = json.get("nextChildId").and_then(serde_json::Value::as_i64).unwrap_or(0);
    Page {
        id,
        name,
        state,
        next_child_id: multiple::high_water(next_child_id, &children),
        children,
    }
}

/// Load a sibling list; ids are repaired so they stay unique. Anything but
/// an array loads as no pages.
pub fn pages_from_json<B: Block>(
    inner: &B,
    json: &serde_json::Value,
    env: &Environment,
    library: &BlockLibrary,
) -> Vec<Page<B::State>> {
    let Some(items) = json.as_array() else {
        if !json.is_null() {
            tracing::warn!("page list is not an array; loading no pages");
        }
        return Vec::new();
    };
    let mut pages = map_with_env(items, env, |item, local_env| {
        let page = page_from_json(inner, item, local_env, library);
        let contribution = page_to_env(inner, &page, local_env);
        (page, contribution)
    });
    multiple::repair_ids(&mut pages, 0);
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::testing::{LookupBlock, LookupState, NumberBlock};

    fn page(id: PageId, name: &str, state: f64, children: Vec<Page<f64>>) -> Page<f64> {
        Page {
            id,
            name: name.to_string(),
            state,
            next_child_id: multiple::next_free_id(&children),
            children,
        }
    }

    fn tree() -> Vec<Page<f64>> {
        vec![
            page(1, "a", 1.0, vec![page(4, "a1", 10.0, vec![]), page(5, "a2", 20.0, vec![])]),
            page(2, "b", 2.0, vec![page(5, "b1", 30.0, vec![])]),
        ]
    }

    #[test]
    fn paths_resolve_by_id() {
        let pages = tree();
        assert_eq!(get_page_at(&[2, 5], &pages).map(|p| p.name.as_str()), Some("b1"));
        assert_eq!(get_page_at(&[1, 5], &pages).map(|p| p.name.as_str()), Some("a2"));
        assert!(get_page_at(&[], &pages).is_none());
        assert!(get_page_at(&[2, 4], &pages).is_none());
        assert!(get_page_at(&[9], &pages).is_none());
    }

    #[test]
    fn unresolvable_update_is_a_no_op() {
        let pages = tree();
        assert_eq!(update_page_at(&[2, 4], &pages, |p| Page { state: 0.0, ..p.clone() }), pages);
        assert_eq!(update_page_at(&[], &pages, |p| Page { state: 0.0, ..p.clone() }), pages);
    }

    #[test]
    fn update_replaces_only_the_target() {
        let pages = tree();
        let updated = update_page_at(&[1, 5], &pages, |p| Page { state: 99.0, ..p.clone() });
        assert_eq!(get_page_at(&[1, 5], &updated).map(|p| p.state), Some(99.0));
        assert_eq!(updated[1], pages[1]);
        assert_eq!(updated[0].children[0], pages[0].children[0]);
    }

    #[test]
    fn pages_see_elder_siblings_only() {
        let pages = tree();
        let env = get_env_at(&NumberBlock, &[2], &pages, &Environment::new()).expect("page env");
        assert_eq!(env.get("a"), Some(&Value::Number(1.0)));
        assert!(!env.contains("b"));

        let nested = get_env_at(&NumberBlock, &[1, 5], &pages, &Environment::new()).expect("nested env");
        assert_eq!(nested.names(), vec!["a1"]);
        let younger = get_env_at(&NumberBlock, &[2, 5], &pages, &Environment::new()).expect("younger env");
        assert_eq!(younger.names(), vec!["a"]);
    }

    #[test]
    fn update_pages_visits_each_page_once_in_order() {
        let pages = tree();
        let mut seen = Vec::new();
        let updated = update_pages(
            &[],
            &pages,
            |path, page, _env| {
                seen.push(path.to_vec());
                page.clone()
            },
            &NumberBlock,
            &Environment::new(),
        );
        assert_eq!(updated, pages);
        assert_eq!(seen, vec![vec![1], vec![1, 4], vec![1, 5], vec![2], vec![2, 5]]);
    }

    #[test]
    fn visit_matches_update_environments() {
        let mut first = Page::new(0, LookupState::of("x"));
        first.name = "first".into();
        let pages = vec![first, Page::new(1, LookupState::of("first"))];
        let env = Environment::single("x", Value::Number(3.0));
        let mut visited = Vec::new();
        visit_pages(&pages, &LookupBlock, &env, |path, page, local_env| {
            visited.push((path.to_vec(), LookupBlock.result(&page.state, local_env)));
        });
        assert_eq!(
            visited,
            vec![(vec![0], Some(Value::Number(3.0))), (vec![1], Some(Value::Number(3.0)))]
        );
    }

    #[test]
    fn json_round_trip_and_repair() {
        let pages = tree();
        let json = pages_to_json(&NumberBlock, &pages);
        let loaded = pages_from_json(&NumberBlock, &json, &Environment::new(), &BlockLibrary::new());
        assert_eq!(loaded, pages);

        let broken = serde_json::json!([{ "id": 1, "name": "x" }, { "id": 1, "state": 2 }, "junk"]);
        let loaded = pages_from_json(&NumberBlock, &broken, &Environment::new(), &BlockLibrary::new());
        let ids: Vec<PageId> = loaded.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(loaded[1].state, 2.0);
        assert!(loaded[2].children.is_empty());
    }

    #[test]
    fn child_high_water_survives_json() {
        let mut parent = page(0, "p", 0.0, vec![page(0, "c", 1.0, vec![])]);
        parent.next_child_id = 5;
        assert_eq!(parent.next_free_child_id(), 5);
        let loaded = pages_from_json(
            &NumberBlock,
            &pages_to_json(&NumberBlock, &[parent.clone()]),
            &Environment::new(),
            &BlockLibrary::new(),
        );
        assert_eq!(loaded, vec![parent]);

        let stale = serde_json::json!([{ "id": 0, "children": [{ "id": 7 }], "nextChildId": 2 }]);
        let loaded = pages_from_json(&NumberBlock, &stale, &Environment::new(), &BlockLibrary::new());
        assert_eq!(loaded[0].next_free_child_id(), 8);

        let huge = serde_json::json!([{ "id": i64::MAX, "nextChildId": i64::MAX }]);
        let loaded = pages_from_json(&NumberBlock, &huge, &Environment::new(), &BlockLibrary::new());
        assert_eq!(loaded[0].id, 0);
        assert_eq!(loaded[0].next_free_child_id(), multiple::MAX_ID);
    }
}
