mod config;
mod db;
mod editor;
mod error;
mod history;
mod i18n;
mod lifecycle;
mod lint;
mod logging;
mod model;
mod search;
mod tui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use regex::Regex;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::thread;

use config::Config;
use db::{Database, ListFilter};
use error::Error;
use history::{resolve_history_path, run_import_pass, ImportStats, IngestAborted};
use i18n::I18n;
use lifecycle::{render_summary, CommandEdit, Lifecycle};
use lint::{ScriptLinter, ShellCheck};
use model::{CommandStatus, LintStatus, PersistedCommand};
use search::CommandMatcher;
use tui::{BrowseExit, Browser, ImportUpdate};

const DEFAULT_LIST_WIDTH: u16 = 100;

#[derive(Parser)]
#[command(name = "scb", version)]
#[command(about = "")]
struct Cli {
    /// Database file (overrides SHELL_CMD_BOOK_DB and the config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import new history in the background and open the browser
    Browse {
        /// History file to import from
        #[arg(long)]
        history_file: Option<PathBuf>,
    },
    /// Import new commands from the history file once
    Import {
        /// History file to import from
        #[arg(long)]
        history_file: Option<PathBuf>,
    },
    /// Print stored commands
    List {
        /// Only commands with this status
        #[arg(long)]
        status: Option<CommandStatus>,
        /// Fuzzy filter on id, title and script
        #[arg(long, short)]
        query: Option<String>,
        /// Include deleted commands
        #[arg(long)]
        all: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one command in full
    Show { id: i64 },
    /// Delete a command
    Delete {
        id: i64,
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },
    /// Join commands, in the given order, into a new bookmarked one
    Compose {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Bookmark a command
    Bookmark { id: i64 },
    /// Archive a command
    Archive { id: i64 },
    /// Mark a command obsolete
    Obsolete { id: i64 },
    /// Edit title or description; without flags the script opens in $EDITOR
    Edit {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Run shellcheck on a command again
    Lint { id: i64 },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{} {:#}", "error:".red().bold(), err);
        std::process::exit(exit_code(&err));
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(err) = err.downcast_ref::<Error>() {
        return err.exit_code();
    }
    if let Some(aborted) = err.downcast_ref::<IngestAborted>() {
        return aborted.error.exit_code();
    }
    1
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let needs_help = args.len() == 2 && matches!(args[1].as_str(), "--help" | "-h" | "help");

    if needs_help {
        // Help still works with a broken config or no home directory.
        let config = Config::new().unwrap_or_default();
        print_help(&I18n::new(&config.get_effective_language()));
        return Ok(());
    }

    let cli = Cli::parse();
    let config = Config::new().context("cannot load ~/.scb/config.toml")?;
    let i18n = I18n::new(&config.get_effective_language());
    logging::init(&Config::log_dir()?).context("cannot set up logging")?;

    let db_path = match cli.db {
        Some(path) => path,
        None => config.db_path()?,
    };
    tracing::debug!(db = %db_path.display(), "opening database");
    let db = Database::open(&db_path)
        .with_context(|| format!("cannot open database {}", db_path.display()))?;

    let linter = if config.import.lint { ShellCheck::detect() } else { None };
    let linter_ref = linter.as_ref().map(|l| l as &dyn ScriptLinter);
    let lifecycle = Lifecycle::new(&db, linter_ref);

    match cli.command.unwrap_or(Commands::Browse { history_file: None }) {
        Commands::Browse { history_file } => {
            let history_path = resolve_history_path(config.history_path(history_file.as_deref()).as_deref())?;
            let ignore_patterns = config.ignore_patterns()?;

            let (updates, receiver) = mpsc::channel();
            let worker = spawn_import(db_path, history_path, ignore_patterns, linter.clone(), updates);

            let exit = Browser::new(
                &db,
                linter_ref,
                &i18n,
                config.display.summary_length,
                config.display.alt_screen,
            )
            .with_import_updates(receiver)
            .run()?;

            if let BrowseExit::Print(script) = &exit {
                println!("{}", script);
                io::stdout().flush()?;
            }
            wait_for_import(worker);
            if exit == BrowseExit::NotInteractive {
                let commands = db.list_commands(&ListFilter::default())?;
                print_list(&commands, &i18n);
            }
        }
        Commands::Import { history_file } => {
            let history_path = resolve_history_path(config.history_path(history_file.as_deref()).as_deref())?;
            let ignore_patterns = config.ignore_patterns()?;
            if config.import.lint && linter.is_none() {
                println!("{}", i18n.t("lint_disabled").yellow());
            }

            match run_import_pass(&db, linter_ref, &ignore_patterns, &history_path) {
                Ok(stats) => print_stats(&stats, &i18n),
                Err(aborted) => {
                    print_stats(&aborted.stats, &i18n);
                    println!("{}", i18n.t_format("import_aborted", &[&aborted.error.to_string()]).red());
                    return Err(aborted.into());
                }
            }
        }
        Commands::List {
            status,
            query,
            all,
            json,
        } => {
            let filter = ListFilter {
                status,
                include_deleted: all,
            };
            let mut commands = db.list_commands(&filter)?;
            if let Some(query) = query {
                let matcher = CommandMatcher::new();
                commands = matcher
                    .filter(&query, &commands)
                    .into_iter()
                    .map(|i| commands[i].clone())
                    .collect();
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&commands)?);
            } else {
                print_list(&commands, &i18n);
            }
        }
        Commands::Show { id } => {
            let command = db.require_command(id)?;
            print_command(&command, &i18n);
        }
        Commands::Delete { id, yes } => {
            let mut command = db.require_command(id)?;
            let summary = render_summary(&command, config.display.summary_length);
            if !yes && !confirm(&i18n.t_format("confirm_delete_prompt", &[&summary]))? {
                println!("{}", i18n.t("delete_aborted").yellow());
                return Ok(());
            }
            lifecycle.delete(&mut command)?;
            println!("{}", i18n.t_format("deleted_command", &[&id.to_string()]).green());
        }
        Commands::Compose { ids } => {
            let sources = ids
                .iter()
                .map(|id| db.require_command(*id))
                .collect::<error::Result<Vec<_>>>()?;
            let composed = lifecycle.compose(&sources)?;
            println!(
                "{}",
                i18n.t_format(
                    "composed_command",
                    &[&composed.id.to_string(), &sources.len().to_string()]
                )
                .green()
            );
            println!("{}", composed.script);
        }
        Commands::Bookmark { id } => {
            let mut command = db.require_command(id)?;
            lifecycle.bookmark(&mut command)?;
            println!("{}", i18n.t_format("bookmarked_command", &[&id.to_string()]).green());
        }
        Commands::Archive { id } => {
            let mut command = db.require_command(id)?;
            lifecycle.archive(&mut command)?;
            println!("{}", i18n.t_format("archived_command", &[&id.to_string()]).green());
        }
        Commands::Obsolete { id } => {
            let mut command = db.require_command(id)?;
            lifecycle.mark_obsolete(&mut command)?;
            println!("{}", i18n.t_format("obsoleted_command", &[&id.to_string()]).green());
        }
        Commands::Edit {
            id,
            title,
            description,
        } => {
            let mut command = db.require_command(id)?;
            let edit = if title.is_none() && description.is_none() {
                match editor::edit_script(&editor::editor_command(), &command.script)? {
                    Some(script) => {
                        println!("{}", i18n.t("editor_diff").cyan().bold());
                        print!("{}", editor::diff_text(&command.script, &script));
                        CommandEdit {
                            script: Some(script),
                            ..Default::default()
                        }
                    }
                    None => CommandEdit::default(),
                }
            } else {
                CommandEdit {
                    title,
                    description,
                    script: None,
                }
            };

            if edit.is_empty() {
                println!("{}", i18n.t_format("edit_unchanged", &[&id.to_string()]).yellow());
                return Ok(());
            }
            lifecycle.edit(&mut command, edit)?;
            println!("{}", i18n.t_format("edited_command", &[&id.to_string()]).green());
        }
        Commands::Lint { id } => {
            let mut command = db.require_command(id)?;
            if linter.is_none() {
                println!("{}", i18n.t("lint_disabled").yellow());
            }
            lifecycle.relint(&mut command)?;
            println!(
                "{}",
                i18n.t_format(
                    "lint_result",
                    &[&id.to_string(), &lint_label(command.lint_status, 0).to_string()]
                )
            );
        }
    }

    Ok(())
}

/// Background pass for the browser. It opens its own connection; the
/// browser reloads when the update arrives.
fn spawn_import(
    db_path: PathBuf,
    history_path: PathBuf,
    ignore_patterns: Vec<Regex>,
    linter: Option<ShellCheck>,
    updates: Sender<ImportUpdate>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let update = match Database::open(&db_path) {
            Ok(db) => {
                let linter = linter.as_ref().map(|l| l as &dyn ScriptLinter);
                match run_import_pass(&db, linter, &ignore_patterns, &history_path) {
                    Ok(stats) => ImportUpdate::Finished(stats),
                    Err(aborted) => ImportUpdate::Aborted {
                        stats: aborted.stats,
                        message: aborted.error.to_string(),
                    },
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "import thread cannot open database");
                ImportUpdate::Aborted {
                    stats: ImportStats::default(),
                    message: err.to_string(),
                }
            }
        };
        // The browser may already be gone.
        let _ = updates.send(update);
    })
}

/// Let a running pass finish before the process exits.
fn wait_for_import(worker: thread::JoinHandle<()>) {
    if !worker.is_finished() {
        tracing::debug!("waiting for history import to finish");
    }
    if worker.join().is_err() {
        tracing::error!("import thread panicked");
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt.yellow());
    io::stdout().flush().ok();
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return Ok(false);
    }
    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_stats(stats: &ImportStats, i18n: &I18n) {
    println!(
        "{}",
        i18n.t_format(
            "import_summary",
            &[
                &stats.parsed.to_string(),
                &stats.imported.to_string(),
                &stats.already_exists.to_string(),
                &stats.filtered_out.to_string(),
                &stats.skipped.to_string(),
                &stats.error.to_string(),
            ]
        )
        .green()
    );
    if stats.below_watermark > 0 {
        println!(
            "{}",
            i18n.t_format("import_below_watermark", &[&stats.below_watermark.to_string()]).dimmed()
        );
    }
}

fn status_label(status: CommandStatus) -> ColoredString {
    let label = format!("{:<10}", status.as_str());
    match status {
        CommandStatus::Imported => label.normal(),
        CommandStatus::Bookmarked => label.yellow(),
        CommandStatus::Saved => label.green(),
        CommandStatus::Obsolete | CommandStatus::Archived => label.dimmed(),
        CommandStatus::Deleted => label.red(),
    }
}

fn lint_label(status: LintStatus, width: usize) -> ColoredString {
    let label = format!("{:<width$}", status.as_str());
    match status {
        LintStatus::Ok => label.green(),
        LintStatus::Warning => label.yellow(),
        LintStatus::Error => label.red().bold(),
        LintStatus::CheckFailed | LintStatus::Unavailable => label.dimmed(),
    }
}

fn print_list(commands: &[PersistedCommand], i18n: &I18n) {
    if commands.is_empty() {
        println!("{}", i18n.t("no_records").yellow());
        return;
    }

    let width = crossterm::terminal::size()
        .map(|(cols, _)| cols)
        .unwrap_or(DEFAULT_LIST_WIDTH) as usize;
    // "#12345  IMPORTED   UNAVAILABLE  "
    let prefix_width = 33;
    for command in commands {
        println!(
            "{}  {} {} {}",
            format!("{:>6}", format!("#{}", command.id)).yellow(),
            status_label(command.status),
            lint_label(command.lint_status, 12),
            render_summary(command, width.saturating_sub(prefix_width).max(20))
        );
    }
    println!();
    println!("{}", i18n.t_format("total_records", &[&commands.len().to_string()]).dimmed());
}

fn print_command(command: &PersistedCommand, i18n: &I18n) {
    let local = |ts: &chrono::DateTime<chrono::Utc>| {
        ts.with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    };
    let field = |key: &str| format!("{}:", i18n.t(key)).cyan().bold();

    println!("{} {}", field("field_id"), command.id);
    if !command.title.is_empty() {
        println!("{} {}", field("field_title"), command.title);
    }
    if !command.description.is_empty() {
        println!("{} {}", field("field_description"), command.description);
    }
    println!("{} {}", field("field_status"), status_label(command.status));
    println!("{} {}", field("field_lint"), lint_label(command.lint_status, 0));
    println!("{} {}", field("field_created"), local(&command.created_at));
    println!("{} {}", field("field_modified"), local(&command.modified_at));
    println!("{} {}s", field("field_elapsed"), command.elapsed_seconds);
    println!("{}", field("field_script"));
    println!("{}", command.script);
}

fn print_help(i18n: &I18n) {
    let commands = [
        ("browse", "help_browse"),
        ("import", "help_import"),
        ("list", "help_list"),
        ("show", "help_show"),
        ("delete", "help_delete"),
        ("compose", "help_compose"),
        ("bookmark", "help_bookmark"),
        ("archive", "help_archive"),
        ("obsolete", "help_obsolete"),
        ("edit", "help_edit"),
        ("lint", "help_lint"),
    ];

    println!("{}", i18n.t("help_about"));
    println!();
    println!("{} scb [OPTIONS] [COMMAND]", i18n.t("help_label_usage"));
    println!();
    println!("{}", i18n.t("help_label_commands"));
    for (name, key) in commands {
        println!("  {:<9} {}", name.green(), i18n.t(key));
    }
    println!();
    println!("{}", i18n.t("help_label_options"));
    println!("  {}", i18n.t("help_db_option"));
    println!("  -h, --help   Print help");
    println!("  -V, --version  Print version");
    println!();
    println!("{}", i18n.t("help_config_section"));
    for key in [
        "help_config_db_path",
        "help_config_history_file",
        "help_config_ignore",
        "help_config_lint",
        "help_config_summary_length",
        "help_config_alt_screen",
    ] {
        println!("  - {}", i18n.t(key));
    }
    println!();
    println!("{}", i18n.t("help_env_section"));
    println!("  - {}", i18n.t("help_env_db"));
    println!("  - {}", i18n.t("help_env_debug"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_browse() {
        let cli = Cli::try_parse_from(["scb"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.db.is_none());
    }

    #[test]
    fn cli_parses_list_filters() {
        let cli = Cli::try_parse_from(["scb", "list", "--status", "bookmarked", "-q", "git", "--json"]).unwrap();
        match cli.command {
            Some(Commands::List {
                status,
                query,
                all,
                json,
            }) => {
                assert_eq!(status, Some(CommandStatus::Bookmarked));
                assert_eq!(query.as_deref(), Some("git"));
                assert!(!all);
                assert!(json);
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn import_worker_completes_after_browser_left() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("scb.db");
        let history_path = dir.path().join("history");
        std::fs::write(&history_path, "ls\npwd\n: 1700000000:0;make\n").unwrap();
        let db = Database::open(&db_path).unwrap();

        let (updates, receiver) = mpsc::channel();
        drop(receiver);
        let worker = spawn_import(db_path, history_path, Vec::new(), None, updates);
        wait_for_import(worker);

        let stored = db.list_commands(&ListFilter::default()).unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[test]
    fn version_flag_needs_no_config() {
        let err = Cli::try_parse_from(["scb", "--version"]).err().unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn cli_rejects_unknown_status() {
        assert!(Cli::try_parse_from(["scb", "list", "--status", "pending"]).is_err());
    }

    #[test]
    fn compose_needs_ids_in_order() {
        assert!(Cli::try_parse_from(["scb", "compose"]).is_err());
        let cli = Cli::try_parse_from(["scb", "--db", "/tmp/x.db", "compose", "3", "1"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        match cli.command {
            Some(Commands::Compose { ids }) => assert_eq!(ids, vec![3, 1]),
            _ => panic!("expected compose"),
        }
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        let not_found = anyhow::Error::from(Error::CommandNotFound(4)).context("show");
        assert_eq!(exit_code(&not_found), 3);

        let aborted = IngestAborted {
            stats: ImportStats::default(),
            error: Error::NoHomeDir,
        };
        assert_eq!(exit_code(&anyhow::Error::from(aborted)), 2);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);
    }
}
