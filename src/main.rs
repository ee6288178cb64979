use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use codeshift::assistant::{Assistant, AssistantSettings, RefactorScope};
use codeshift::commit::StrategyChoice;
use codeshift::config::{self, Config};
use codeshift::diff::{diff_text, DiffStats};
use codeshift::llm::BackendKind;
use codeshift::logging;
use codeshift::prompt::TransformKind;
use codeshift::render::{render, render_file_html};
use codeshift::workspace::LocalStore;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const TERMINAL_COLUMN_WIDTH: usize = 60;
/// Exit status after a second Ctrl-C, as a shell reports SIGINT
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "codeshift",
    about = "Transform source files with a language model, review the diffs, commit to GitHub",
    version
)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Model backend, overriding the config file
    #[arg(long, value_enum, global = true)]
    backend: Option<BackendArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum BackendArg {
    Remote,
    Local,
    Fallback,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Remote => BackendKind::Remote,
            BackendArg::Local => BackendKind::Local,
            BackendArg::Fallback => BackendKind::Fallback,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CommitArg {
    Auto,
    Separate,
    Single,
}

impl From<CommitArg> for StrategyChoice {
    fn from(arg: CommitArg) -> Self {
        match arg {
            CommitArg::Auto => StrategyChoice::Auto,
            CommitArg::Separate => StrategyChoice::Separate,
            CommitArg::Single => StrategyChoice::Single,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Line diff of two files
    Diff {
        old: PathBuf,
        new: PathBuf,
        /// Emit HTML markup instead of terminal columns
        #[arg(long)]
        html: bool,
    },
    /// Ask the model for a report (analyze, docs, format, tests, comments, summarize, custom)
    Run {
        kind: String,
        /// Files or directories; the saved set when empty
        paths: Vec<PathBuf>,
        /// Instruction for the `custom` kind
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Refactor files, show the diffs and optionally commit them
    Refactor {
        /// Files or directories; the saved set when empty
        paths: Vec<PathBuf>,
        /// Only the first file
        #[arg(long)]
        first: bool,
        /// Commit accepted changes; without it the diffs are only shown
        #[arg(long, value_enum, num_args = 0..=1, default_missing_value = "auto")]
        commit: Option<CommitArg>,
        /// Leave a file out of the commit (repeatable)
        #[arg(long = "exclude", value_name = "NAME")]
        exclude: Vec<String>,
        /// Commit message (prefix for separate commits)
        #[arg(short, long)]
        message: Option<String>,
        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Manage the locally saved file set
    Files {
        #[command(subcommand)]
        action: FilesAction,
    },
    /// Store the API key and GitHub token in the system keychain
    Setup,
}

#[derive(Subcommand, Debug)]
enum FilesAction {
    /// Load files and save them for later runs
    Save { paths: Vec<PathBuf> },
    /// List the saved files
    Restore,
    /// Forget the saved files
    Clear,
    /// Write the saved files to DIR/project-bundle.txt
    Bundle { dir: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let config = Config::load();
    match cli.command {
        Commands::Diff { old, new, html } => cmd_diff(&old, &new, html),
        Commands::Setup => config::setup_credentials_interactive(),
        Commands::Files { action } => cmd_files(action),
        Commands::Run {
            kind,
            paths,
            prompt,
        } => {
            let kind = TransformKind::parse(&kind, prompt.as_deref())
                .with_context(|| format!("Unknown transformation '{}'", kind))?;
            let assistant = build_assistant(&config, cli.backend, &paths)?;
            let answer = assistant.run_report(&kind).await?;
            println!("{answer}");
            Ok(())
        }
        Commands::Refactor {
            paths,
            first,
            commit,
            exclude,
            message,
            yes,
        } => {
            let mut assistant = build_assistant(&config, cli.backend, &paths)?;
            if commit.is_some() {
                let cwd = std::env::current_dir()?;
                assistant = assistant.with_host(Arc::new(config.open_host(&cwd)?));
            }
            let options = RefactorOptions {
                scope: if first {
                    RefactorScope::First
                } else {
                    RefactorScope::All
                },
                commit: commit.map(StrategyChoice::from),
                exclude,
                message,
                yes,
            };
            cmd_refactor(&mut assistant, &config, options).await
        }
    }
}

fn local_store() -> Result<LocalStore> {
    LocalStore::default_location().context("Could not determine data directory")
}

/// Assistant over `paths`, or over the saved set when `paths` is empty.
fn build_assistant(
    config: &Config,
    backend: Option<BackendArg>,
    paths: &[PathBuf],
) -> Result<Assistant> {
    let backend = config.build_backend(backend.map(BackendKind::from))?;
    let settings = AssistantSettings {
        branch: config.branch.clone(),
        context_limit: config.context_limit,
        batch_threshold: config.batch_threshold,
    };
    let mut assistant =
        Assistant::new(Arc::from(backend), settings).with_store(local_store()?);

    let count = if paths.is_empty() {
        assistant.restore_local()?
    } else {
        let cwd = std::env::current_dir()?;
        assistant.load_paths(paths, &cwd)
    };
    if count == 0 {
        bail!("No files loaded. Pass paths or save a set with `codeshift files save`.");
    }
    eprintln!(
        "  Loaded {} file(s), backend: {}",
        count,
        assistant.backend_name()
    );
    Ok(assistant)
}

fn cmd_diff(old: &Path, new: &Path, html: bool) -> Result<()> {
    let before = std::fs::read_to_string(old)
        .with_context(|| format!("Failed to read {}", old.display()))?;
    let after = std::fs::read_to_string(new)
        .with_context(|| format!("Failed to read {}", new.display()))?;
    let ops = diff_text(&before, &after)
        .with_context(|| format!("{} and {}", old.display(), new.display()))?;
    let view = render(&ops);
    if html {
        println!(
            "{}",
            render_file_html(&new.display().to_string(), true, &view)
        );
    } else {
        print!("{}", view.to_terminal(TERMINAL_COLUMN_WIDTH));
        eprintln!("  {}", format_stats(&DiffStats::from_ops(&ops)));
    }
    Ok(())
}

fn cmd_files(action: FilesAction) -> Result<()> {
    let store = local_store()?;
    match action {
        FilesAction::Save { paths } => {
            if paths.is_empty() {
                bail!("Pass the files or directories to save");
            }
            let cwd = std::env::current_dir()?;
            let files = codeshift::workspace::load_paths(&paths, &cwd);
            if files.is_empty() {
                bail!("No text files found");
            }
            store.save(&files)?;
            println!("Saved {} file(s) to {}", files.len(), store.path().display());
        }
        FilesAction::Restore => {
            let files = store.load();
            if files.is_empty() {
                println!("No saved files");
            }
            for file in files {
                println!("{}\t{} chars", file.name, file.content.chars().count());
            }
        }
        FilesAction::Clear => {
            store.clear()?;
            println!("Cleared saved files");
        }
        FilesAction::Bundle { dir } => {
            let files = store.load();
            if files.is_empty() {
                bail!("No saved files to bundle");
            }
            let path = codeshift::workspace::export_bundle(&files, &dir)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

struct RefactorOptions {
    scope: RefactorScope,
    commit: Option<StrategyChoice>,
    exclude: Vec<String>,
    message: Option<String>,
    yes: bool,
}

async fn cmd_refactor(
    assistant: &mut Assistant,
    config: &Config,
    options: RefactorOptions,
) -> Result<()> {
    let cancel = CancellationToken::new();
    tokio::spawn(forward_interrupts(
        tokio::signal::ctrl_c,
        cancel.clone(),
        || std::process::exit(INTERRUPTED_EXIT_CODE),
    ));

    assistant.preview_refactor(options.scope, &cancel).await?;

    let Some(review) = assistant.review_mut() else {
        bail!("No review was opened");
    };
    for name in &options.exclude {
        if !review.toggle(name, false) {
            warn!(name = %name, "--exclude names a file that is not under review");
        }
    }

    for item in review.items() {
        let mark = if item.accepted { "[x]" } else { "[ ]" };
        match item.edit_script() {
            Ok(ops) => {
                println!(
                    "{} {}  ({})",
                    mark,
                    item.name,
                    format_stats(&DiffStats::from_ops(&ops))
                );
                print!("{}", render(&ops).to_terminal(TERMINAL_COLUMN_WIDTH));
            }
            Err(err) => println!("{} {}  ({})", mark, item.name, err),
        }
        println!();
    }
    for skipped in review.skipped() {
        println!("[-] {}  (skipped: {})", skipped.name, skipped.reason);
    }
    println!("{}", review.summary());
    let accepted = review.accepted_count();

    let Some(choice) = options.commit else {
        assistant.cancel_review();
        return Ok(());
    };
    if accepted == 0 {
        assistant.cancel_review();
        println!("Nothing to commit");
        return Ok(());
    }

    let question = format!(
        "Commit {} file(s) to branch {}?",
        accepted,
        config.branch
    );
    if !options.yes && !confirm(&question, &cancel).await? {
        assistant.cancel_review();
        println!("Cancelled");
        return Ok(());
    }

    let report = assistant
        .commit(choice, options.message.as_deref())
        .await?;
    println!(
        "Committed {} file(s) as {}",
        report.paths.len(),
        report.strategy.label()
    );
    if let Some(commit) = report.commit {
        println!("Branch {} now at {}", config.branch, commit);
    }
    Ok(())
}

fn format_stats(stats: &DiffStats) -> String {
    if stats.is_identical() {
        "no changes".to_string()
    } else {
        format!("+{} -{}", stats.added, stats.removed)
    }
}

/// Route Ctrl-C presses: the first cancels `cancel`, a second one calls `quit`.
///
/// `next` resolves once per press; an error means no more presses can arrive.
async fn forward_interrupts<F, Fut>(mut next: F, cancel: CancellationToken, quit: impl FnOnce())
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    if next().await.is_err() {
        return;
    }
    cancel.cancel();
    eprintln!();
    eprintln!("  Stopping, press Ctrl-C again to quit");
    if next().await.is_ok() {
        quit();
    }
}

/// Ask a yes/no question. A Ctrl-C while waiting ends the process.
async fn confirm(question: &str, cancel: &CancellationToken) -> Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;
    let read = tokio::task::spawn_blocking(|| {
        let mut answer = String::new();
        io::stdin().read_line(&mut answer).map(|_| answer)
    });
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            // The blocked stdin read would keep the runtime alive
            eprintln!("  Cancelled");
            std::process::exit(INTERRUPTED_EXIT_CODE)
        }
        answer = read => {
            let answer = answer??;
            Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
        }
    }
}
