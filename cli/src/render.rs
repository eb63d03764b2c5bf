use std::io::{self, Write};
use std::path::Path;

use interpreter::RootBlock;
use tables::document::pages::visit_pages;
use tables::{Block, BlockLibrary, Environment, PageId, StoreError, UpdateQueue, Value};

pub type RootState = <RootBlock as Block>::State;

/// Upper bound on refresh rounds while blocks keep queueing updates.
const MAX_SETTLE_ROUNDS: usize = 8;

#[derive(Debug, Default)]
pub struct Options {
    /// Print only the page at this path.
    pub page: Option<Vec<PageId>>,
    /// Print each sheet line under its page.
    pub lines: bool,
}

/// Parse a page path written as `1/2`. An empty string is the root.
pub fn parse_path(text: &str) -> Result<Vec<PageId>, String> {
    text.split('/')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            part.trim()
                .parse::<PageId>()
                .map_err(|_| format!("invalid page id {:?} in path {:?}", part, text))
        })
        .collect()
}

pub fn format_path(path: &[PageId]) -> String {
    path.iter().map(PageId::to_string).collect::<Vec<_>>().join("/")
}

pub fn open_file(block: &RootBlock, path: &Path, library: &BlockLibrary) -> Result<RootState, StoreError> {
    let env = Environment::new();
    let mut state = tables::store::load(block, path, &env, library)?;
    settle(block, &mut state, &env);
    Ok(state)
}

pub fn open_str(block: &RootBlock, source: &str, library: &BlockLibrary) -> RootState {
    let env = Environment::new();
    let mut state = tables::store::parse(block, source, &env, library);
    settle(block, &mut state, &env);
    state
}

/// Re-derive every page, then apply whatever the blocks queued and repeat
/// until nothing is pending.
fn settle(block: &RootBlock, state: &mut RootState, env: &Environment) {
    let queue = UpdateQueue::new();
    for round in 0..MAX_SETTLE_ROUNDS {
        block.refresh(state, &queue.updater(), env);
        if queue.is_empty() {
            return;
        }
        tracing::debug!("applying {} queued update(s) in round {}", queue.len(), round);
        *state = queue.apply(state.clone());
    }
    tracing::warn!("document still had pending updates after {} rounds", MAX_SETTLE_ROUNDS);
}

struct Row {
    depth: usize,
    label: String,
    value: Option<Value>,
    lines: Vec<(String, Option<Value>)>,
}

fn page_label(id: PageId, name: &str) -> String {
    if name.trim().is_empty() {
        format!("#{}", id)
    } else {
        name.to_string()
    }
}

fn show(value: &Option<Value>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "-".to_string(),
    }
}

/// Print `name: result` for each page, indented by depth.
pub fn write_results(block: &RootBlock, state: &RootState, options: &Options, out: &mut impl Write) -> io::Result<()> {
    let sheet = block.inner();
    let mut rows = Vec::new();
    visit_pages(&state.inner().pages, sheet, &Environment::new(), |path, page, env| {
        if options.page.as_deref().is_some_and(|only| only != path) {
            return;
        }
        let lines = if options.lines {
            page.state
                .lines()
                .iter()
                .zip(sheet.line_results(&page.state, env))
                .map(|(line, (_, value))| (line.binding_name(), value))
                .collect()
        } else {
            Vec::new()
        };
        rows.push(Row {
            depth: if options.page.is_some() { 0 } else { path.len() - 1 },
            label: page_label(page.id, &page.name),
            value: sheet.result(&page.state, env),
            lines,
        });
    });

    if let Some(only) = &options.page {
        if rows.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no page at {}", format_path(only)),
            ));
        }
    }

    for row in rows {
        let indent = "  ".repeat(row.depth);
        writeln!(out, "{}{}: {}", indent, row.label, show(&row.value))?;
        for (name, value) in &row.lines {
            writeln!(out, "{}  {} = {}", indent, name, show(value))?;
        }
    }
    Ok(())
}

/// Print the page tree with paths; the open page is marked with `*`.
pub fn write_tree(block: &RootBlock, state: &RootState, out: &mut impl Write) -> io::Result<()> {
    let doc = state.inner();
    let mut rows = Vec::new();
    visit_pages(&doc.pages, block.inner(), &Environment::new(), |path, page, _env| {
        let marker = if path == doc.view_state.open_page.as_slice() { "*" } else { " " };
        rows.push(format!(
            "{}{} [{}] {}",
            "  ".repeat(path.len() - 1),
            marker,
            format_path(path),
            page_label(page.id, &page.name)
        ));
    });
    for row in rows {
        writeln!(out, "{}", row)?;
    }
    Ok(())
}

pub fn count_pages(block: &RootBlock, state: &RootState) -> usize {
    let mut count = 0;
    visit_pages(&state.inner().pages, block.inner(), &Environment::new(), |_, _, _| count += 1);
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_parse_and_format() {
        assert_eq!(parse_path("1/2"), Ok(vec![1, 2]));
        assert_eq!(parse_path(""), Ok(vec![]));
        assert!(parse_path("1/x").is_err());
        assert_eq!(format_path(&[3, 0]), "3/0");
    }

    #[test]
    fn results_are_indented_by_depth() {
        let block = interpreter::root_block(&tables::Config::default());
        let source = r#"{
            "pages": [
                { "id": 0, "name": "a", "state": { "lines": [
                    { "id": 0, "name": "x", "state": { "mode": "run", "expr": "expr", "inner": "1 + 1" } }
                ] }, "children": [
                    { "id": 0, "name": "", "state": { "lines": [] } }
                ] }
            ]
        }"#;
        let state = open_str(&block, source, &interpreter::standard_library());
        let mut out = Vec::new();
        let options = Options { page: None, lines: true };
        write_results(&block, &state, &options, &mut out).expect("write");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "a: {x: 2}\n  x = 2\n  #0: {Result_0: null}\n    Result_0 = -\n"
        );
    }
}
