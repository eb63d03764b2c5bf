use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use interpreter::{root_block, standard_library};
use tables::Config;

use crate::render::{self, Options};

const TEST_SUFFIX: &str = ".test.json";

#[derive(Debug, Deserialize)]
pub struct TestConfig {
    /// Human-readable test description.
    #[serde(default)]
    pub description: Option<String>,

    /// Print only this page, e.g. `"1/0"`.
    #[serde(default)]
    pub page: Option<String>,

    /// Print sheet lines under each page.
    #[serde(default)]
    pub lines: bool,

    /// Print the page tree instead of results.
    #[serde(default)]
    pub tree: bool,

    /// Settings applied while loading the document.
    #[serde(default)]
    pub config: Config,

    /// Expected exact output (trimmed comparison).
    #[serde(default)]
    pub expect_output: Option<String>,
}

/// Split a scenario file into its TOML frontmatter and JSON document.
fn parse_test_file(content: &str) -> Result<(TestConfig, &str), String> {
    let content = content.trim_start_matches('\u{feff}');
    let rest = content
        .strip_prefix("---")
        .ok_or("missing opening --- frontmatter delimiter")?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')).unwrap_or(rest);

    let close = rest.find("\n---").ok_or("missing closing --- frontmatter delimiter")?;
    let frontmatter = rest[..close].trim_end_matches('\r');
    let document = &rest[close + 4..];

    let config = toml::from_str(frontmatter).map_err(|e| format!("TOML parse error: {}", e))?;
    Ok((config, document))
}

pub enum TestOutcome {
    Pass,
    Fail(String),
}

pub struct TestResult {
    pub path: PathBuf,
    pub description: Option<String>,
    pub outcome: TestOutcome,
}

impl TestResult {
    fn label(&self) -> &str {
        self.description
            .as_deref()
            .or_else(|| self.path.file_name().and_then(|name| name.to_str()))
            .map(|name| name.trim_end_matches(TEST_SUFFIX))
            .unwrap_or("?")
    }
}

fn run_single_test(path: &Path) -> TestResult {
    let fail = |description: Option<String>, reason: String| TestResult {
        path: path.to_path_buf(),
        description,
        outcome: TestOutcome::Fail(reason),
    };

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => return fail(None, format!("cannot read file: {}", e)),
    };
    let (config, document) = match parse_test_file(&content) {
        Ok(pair) => pair,
        Err(e) => return fail(None, format!("frontmatter error: {}", e)),
    };
    let description = config.description.clone();

    if let Err(e) = serde_json::from_str::<serde_json::Value>(document) {
        return fail(description, format!("document is not JSON: {}", e));
    }

    let page = match config.page.as_deref().map(render::parse_path).transpose() {
        Ok(page) => page,
        Err(e) => return fail(description, e),
    };

    let block = root_block(&config.config);
    let state = render::open_str(&block, document, &standard_library());

    let mut output = Vec::new();
    let written = if config.tree {
        render::write_tree(&block, &state, &mut output)
    } else {
        let options = Options {
            page,
            lines: config.lines,
        };
        render::write_results(&block, &state, &options, &mut output)
    };
    if let Err(e) = written {
        return fail(description, e.to_string());
    }

    if let Some(expected) = &config.expect_output {
        let actual = String::from_utf8_lossy(&output);
        if actual.trim() != expected.trim() {
            return fail(
                description,
                format!(
                    "output mismatch\n  expected:\n{}\n  actual:\n{}",
                    indent(expected.trim()),
                    indent(actual.trim())
                ),
            );
        }
    }

    TestResult {
        path: path.to_path_buf(),
        description,
        outcome: TestOutcome::Pass,
    }
}

fn indent(text: &str) -> String {
    text.lines().map(|line| format!("    {}", line)).collect::<Vec<_>>().join("\n")
}

/// Discover scenario files grouped by category (subfolder relative to root).
/// Files directly in `root` get category "" (uncategorized).
fn discover_categorized(root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut categories: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    collect_tests(root, root, &mut categories);
    for files in categories.values_mut() {
        files.sort();
    }
    categories
}

fn collect_tests(dir: &Path, root: &Path, out: &mut BTreeMap<String, Vec<PathBuf>>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_tests(&path, root, out);
            continue;
        }
        let is_test = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(TEST_SUFFIX));
        if is_test {
            let category = path
                .parent()
                .and_then(|parent| parent.strip_prefix(root).ok())
                .map(|parent| parent.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            out.entry(category).or_default().push(path);
        }
    }
}

fn category_label(category: &str) -> &str {
    if category.is_empty() { "(root)" } else { category }
}

pub fn list_categories(path: &Path) {
    if path.is_file() {
        eprintln!("(single file, no categories)");
        return;
    }

    let categories = discover_categorized(path);
    if categories.is_empty() {
        eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
        return;
    }

    eprintln!("available categories:");
    for (category, files) in &categories {
        eprintln!("  {} ({} tests)", category_label(category), files.len());
    }
}

struct Palette {
    no_color: bool,
}

impl Palette {
    fn paint(&self, code: &str, text: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            format!("\x1b[{}m{}\x1b[0m", code, text)
        }
    }

    fn pass(&self) -> String {
        self.paint("32", "PASS")
    }

    fn fail(&self) -> String {
        self.paint("31", "FAIL")
    }

    fn bold(&self, text: &str) -> String {
        self.paint("1", text)
    }
}

/// Pick the categories to run. Unknown names are reported and skipped.
fn select<'a>(
    all: &'a BTreeMap<String, Vec<PathBuf>>,
    requested: &[String],
) -> BTreeMap<&'a str, &'a Vec<PathBuf>> {
    if requested.is_empty() {
        return all.iter().map(|(k, v)| (k.as_str(), v)).collect();
    }
    let mut selected = BTreeMap::new();
    for request in requested {
        let request = request.trim_matches('/');
        let prefix = format!("{}/", request);
        let before = selected.len();
        for (category, files) in all {
            if category == request || category.starts_with(&prefix) {
                selected.insert(category.as_str(), files);
            }
        }
        if selected.len() == before {
            let available: Vec<&str> = all.keys().map(|k| category_label(k)).collect();
            eprintln!(
                "warning: category '{}' not found (available: {})",
                request,
                available.join(", ")
            );
        }
    }
    selected
}

/// Run every scenario under `path` (or a single file).
/// If `categories` is non-empty, only run tests in those categories.
/// Returns exit code: 0 = all pass, 1 = any failure.
pub fn run_tests(path: &Path, no_color: bool, categories: &[String]) -> i32 {
    let palette = Palette { no_color };

    let groups: Vec<(String, Vec<PathBuf>)> = if path.is_file() {
        vec![(String::new(), vec![path.to_path_buf()])]
    } else {
        let all = discover_categorized(path);
        if all.is_empty() {
            eprintln!("no {} files found in {}", TEST_SUFFIX, path.display());
            return 1;
        }
        select(&all, categories)
            .into_iter()
            .map(|(category, files)| (category.to_string(), files.clone()))
            .collect()
    };
    if groups.is_empty() {
        eprintln!("no matching categories found");
        return 1;
    }

    let mut passed = 0usize;
    let mut failures: Vec<TestResult> = Vec::new();

    for (category, files) in &groups {
        if !path.is_file() {
            eprintln!();
            eprintln!("{}", palette.bold(category_label(category)));
        }
        for file in files {
            let result = run_single_test(file);
            if matches!(result.outcome, TestOutcome::Pass) {
                passed += 1;
                eprintln!("  {}  {}", palette.pass(), result.label());
            } else {
                eprintln!("  {}  {}", palette.fail(), result.label());
                failures.push(result);
            }
        }
    }

    if !failures.is_empty() {
        eprintln!();
        eprintln!("failures:");
        for failure in &failures {
            eprintln!();
            eprintln!("  --- {} ---", failure.path.display());
            if let TestOutcome::Fail(reason) = &failure.outcome {
                for line in reason.lines() {
                    eprintln!("  {}", line);
                }
            }
        }
    }

    eprintln!();
    let failed = failures.len();
    if failed == 0 {
        eprintln!("test result: {}. {} passed, 0 failed", palette.paint("32", "ok"), passed);
        0
    } else {
        eprintln!(
            "test result: {}. {} passed, {} failed (of {})",
            palette.paint("31", "FAILED"),
            passed,
            failed,
            passed + failed
        );
        1
    }
}
