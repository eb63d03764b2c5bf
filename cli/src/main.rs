mod render;
mod test_runner;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing_subscriber::EnvFilter;

use interpreter::{RootBlock, evaluate_source, root_block, standard_library};
use tables::{Config, Environment, PageId};

use render::{Options, RootState};

const SUBCOMMANDS: &[&str] = &["run", "page", "eval", "test", "help"];

#[derive(Parser)]
#[command(name = "tables", version, about = "Evaluate and edit block documents")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// TOML file with history and document settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a document and print its page results
    Run(RunArgs),

    /// Edit the page tree of a document file
    #[command(subcommand)]
    Page(PageCommand),

    /// Evaluate a single expression
    Eval(EvalArgs),

    /// Run .test.json scenario files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Document file (JSON)
    file: PathBuf,

    /// Print only the page at this path, e.g. `1/2`
    #[arg(short, long)]
    page: Option<String>,

    /// Load only, don't print results (exit 0 if readable)
    #[arg(long)]
    check: bool,

    /// Print the page tree with paths
    #[arg(long)]
    tree: bool,

    /// Also print every sheet line
    #[arg(long)]
    lines: bool,
}

#[derive(Subcommand)]
enum PageCommand {
    /// Add a page copied from the template
    Add {
        file: PathBuf,

        /// Parent page path; omit for a top-level page
        #[arg(long)]
        at: Option<String>,
    },

    /// Delete the page at a path, with its children
    Delete {
        file: PathBuf,

        #[arg(long)]
        at: String,
    },
}

#[derive(clap::Args)]
struct EvalArgs {
    /// Expression source
    expr: String,

    /// Bind `name=expression` before evaluating. Later bindings see earlier ones.
    #[arg(short, long = "bind")]
    bindings: Vec<String>,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.json file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    init_tracing();

    // `tables doc.json` runs the document like `tables run doc.json`.
    let args = inject_run(std::env::args().collect());
    let cli = Cli::parse_from(&args);
    let config = load_config(cli.config.as_deref());

    match cli.command {
        Command::Run(run_args) => do_run(run_args, &config),
        Command::Page(page_command) => do_page(page_command, &config),
        Command::Eval(eval_args) => do_eval(eval_args, cli.no_color),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code = test_runner::run_tests(path, cli.no_color, &test_args.category);
            process::exit(exit_code);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn inject_run(mut args: Vec<String>) -> Vec<String> {
    let mut index = 1;
    while index < args.len() {
        let arg = &args[index];
        if arg == "--config" {
            index += 2;
            continue;
        }
        if !arg.starts_with('-') {
            if !SUBCOMMANDS.contains(&arg.as_str()) {
                args.insert(index, "run".to_string());
            }
            break;
        }
        index += 1;
    }
    args
}

fn load_config(path: Option<&Path>) -> Config {
    let Some(path) = path else {
        return Config::default();
    };
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => fail(format!("cannot read config '{}': {}", path.display(), e)),
    };
    match toml::from_str(&text) {
        Ok(config) => config,
        Err(e) => fail(format!("invalid config '{}': {}", path.display(), e)),
    }
}

fn fail(message: String) -> ! {
    eprintln!("error: {}", message);
    process::exit(1);
}

fn page_path(text: &str) -> Vec<PageId> {
    render::parse_path(text).unwrap_or_else(|e| fail(e))
}

fn do_run(args: RunArgs, config: &Config) {
    let block = root_block(config);
    let library = standard_library();
    let state = render::open_file(&block, &args.file, &library).unwrap_or_else(|e| fail(e.to_string()));

    if args.check {
        eprintln!(
            "ok: {} loaded ({} pages)",
            args.file.display(),
            render::count_pages(&block, &state)
        );
        return;
    }

    let mut stdout = std::io::stdout();
    if args.tree {
        if let Err(e) = render::write_tree(&block, &state, &mut stdout) {
            fail(e.to_string());
        }
        return;
    }

    let options = Options {
        page: args.page.as_deref().map(page_path),
        lines: args.lines,
    };
    if let Err(e) = render::write_results(&block, &state, &options, &mut stdout) {
        fail(e.to_string());
    }
}

fn do_page(command: PageCommand, config: &Config) {
    let block = root_block(config);
    let library = standard_library();

    let (file, path, adding) = match &command {
        PageCommand::Add { file, at } => (file, at.as_deref().map(page_path).unwrap_or_default(), true),
        PageCommand::Delete { file, at } => (file, page_path(at), false),
    };
    let mut state = render::open_file(&block, file, &library).unwrap_or_else(|e| fail(e.to_string()));
    if let Err(e) = edit_pages(&block, &mut state, &path, adding) {
        fail(e);
    }

    if let Err(e) = tables::store::save(&block, &state, file) {
        fail(e.to_string());
    }
    let open = render::format_path(&state.inner().view_state.open_page);
    if adding {
        eprintln!("added page {}", open);
    } else {
        eprintln!("deleted page {}; now open: {}", render::format_path(&path), open);
    }
}

/// Add a page under `path` (the root when empty) or delete the page at it.
fn edit_pages(block: &RootBlock, state: &mut RootState, path: &[PageId], adding: bool) -> Result<(), String> {
    let resolves = state.inner().get_page_at(path).is_some() || (adding && path.is_empty());
    if !resolves {
        return Err(format!("no page at {}", render::format_path(path)));
    }
    if adding {
        block.add_page_at(state, path);
    } else {
        block.delete_page_at(state, path);
    }
    Ok(())
}

fn do_eval(args: EvalArgs, no_color: bool) {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let writer = StandardStream::stderr(color_choice);
    let config = term::Config::default();
    let mut files = SimpleFiles::new();

    let mut env = Environment::new();
    let bindings = args.bindings.iter().map(|binding| match binding.split_once('=') {
        Some((name, source)) => (format!("--bind {}", name.trim()), name.trim(), source),
        None => fail(format!("--bind expects name=expression, got {:?}", binding)),
    });
    let bindings: Vec<_> = bindings.collect();

    for (file_name, name, source) in bindings {
        let file_id = files.add(file_name, source.to_string());
        match evaluate_source(source, &env) {
            Ok(value) => env = env.extend(&Environment::single(name, value)),
            Err(error) => {
                let diagnostic = error.to_diagnostic(file_id);
                let _ = term::emit_to_write_style(&mut writer.lock(), &config, &files, &diagnostic);
                process::exit(1);
            }
        }
    }

    let file_id = files.add("<expr>".to_string(), args.expr.clone());
    match evaluate_source(&args.expr, &env) {
        Ok(value) => println!("{}", value),
        Err(error) => {
            let diagnostic = error.to_diagnostic(file_id);
            let _ = term::emit_to_write_style(&mut writer.lock(), &config, &files, &diagnostic);
            process::exit(1);
        }
    }
}
