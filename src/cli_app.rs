//! Top-level CLI definition and dispatch.

use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::thread::JoinHandle;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use column_buffer::column::sim::{Script, SimReport, run_script};
use column_buffer::core::config::Config;
use column_buffer::core::errors::ClbError;
use column_buffer::fetch::backoff::BackoffSchedule;
use column_buffer::logger::activity::{ActivityLoggerHandle, spawn_logger};
use column_buffer::store::kv::{FileStore, KeyValueStore};
use column_buffer::store::snapshot::restore_column;

/// Column Buffer - inspect, tune and rehearse feed column buffering.
#[derive(Debug, Parser)]
#[command(
    name = "clb",
    author,
    version,
    about = "Column Buffer - scroll buffering and fetch scheduling for feed columns",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// View and check configuration.
    Config(ConfigArgs),
    /// Summarize persisted columns, or one column by key.
    Inspect(InspectArgs),
    /// Print the backoff schedule between empty polls.
    Backoff,
    /// Replay a JSON event script against an in-memory column.
    Simulate(SimulateArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct InspectArgs {
    /// Column key; lists every stored column when omitted.
    #[arg(value_name = "KEY")]
    key: Option<String>,
    /// Override the store directory.
    #[arg(long, value_name = "DIR")]
    store_dir: Option<PathBuf>,
    /// Number of newest items to print.
    #[arg(long, default_value_t = 5)]
    limit: usize,
}

#[derive(Debug, Clone, Args)]
struct SimulateArgs {
    /// Script file (JSON).
    #[arg(value_name = "SCRIPT")]
    script: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

impl From<ClbError> for CliError {
    fn from(err: ClbError) -> Self {
        match err {
            ClbError::InvalidConfig { .. }
            | ClbError::MissingConfig { .. }
            | ClbError::ConfigParse { .. }
            | ClbError::StoreCorrupt { .. } => Self::User(err.to_string()),
            _ => Self::Runtime(err.to_string()),
        }
    }
}

pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Config(args) => run_config(cli, args),
        Command::Inspect(args) => run_inspect(cli, args),
        Command::Backoff => run_backoff(cli),
        Command::Simulate(args) => run_simulate(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match args.command.unwrap_or(ConfigCommand::Show) {
        ConfigCommand::Path => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();
            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => write_json_line(&json!({
                    "command": "config path",
                    "path": path.to_string_lossy(),
                    "exists": exists,
                }))?,
            }
            Ok(())
        }
        ConfigCommand::Show => {
            let config = Config::load(cli.config.as_deref())?;
            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Runtime(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => write_json_line(&json!({
                    "command": "config show",
                    "config": serde_json::to_value(&config)?,
                }))?,
            }
            Ok(())
        }
        ConfigCommand::Validate => {
            let config = Config::load(cli.config.as_deref())?;
            let hash = config.stable_hash()?;
            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", "Configuration is valid.".green());
                    println!("  Source: {}", config.paths.config_file.display());
                    println!("  Hash: {hash}");
                }
                OutputMode::Json => write_json_line(&json!({
                    "command": "config validate",
                    "valid": true,
                    "path": config.paths.config_file.to_string_lossy(),
                    "hash": hash,
                }))?,
            }
            Ok(())
        }
    }
}

// ──────────────────── inspect ────────────────────

fn run_inspect(cli: &Cli, args: &InspectArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let store = FileStore::new(
        args.store_dir
            .clone()
            .unwrap_or_else(|| config.paths.store_dir.clone()),
    );
    let keys = match &args.key {
        Some(key) => vec![key.clone()],
        None => store.keys()?,
    };

    let mut summaries = Vec::with_capacity(keys.len());
    for key in &keys {
        let restored =
            restore_column::<Value, _>(&store, key, &config.column, config.scroll.clone(), None)?;
        let Some(restored) = restored else {
            return Err(CliError::User(format!(
                "no persisted column named {key:?} in {}",
                store.dir().display()
            )));
        };
        let column = restored.column;
        let status = *column.fetch_status();
        let newest: Vec<Value> = column.buffer().iter().take(args.limit).cloned().collect();
        summaries.push(json!({
            "key": key,
            "items": column.buffer().committed_size(),
            "status": status.label(),
            "wake_at": status.wake_at().map(|t| t.to_rfc3339()),
            "backoff_step": status.backoff().map(|b| b.step()),
            "newest": newest,
        }));
    }

    match output_mode(cli) {
        OutputMode::Human => {
            if summaries.is_empty() {
                println!("No persisted columns in {}", store.dir().display());
            }
            for summary in &summaries {
                print_summary(summary);
            }
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "inspect",
            "store_dir": store.dir().to_string_lossy(),
            "columns": summaries,
        }))?,
    }
    Ok(())
}

fn print_summary(summary: &Value) {
    let label = summary["status"].as_str().unwrap_or("unknown");
    let status = match label {
        "forbidden" => label.red().bold(),
        "available" => label.green(),
        "next_fetch_at" | "fetching" => label.yellow(),
        _ => label.normal(),
    };
    println!(
        "{}  {} items  {status}",
        summary["key"].as_str().unwrap_or_default().bold(),
        summary["items"]
    );
    if let Some(wake) = summary["wake_at"].as_str() {
        println!("  next poll: {wake}");
    }
    if let Some(items) = summary["newest"].as_array() {
        for item in items {
            println!("  - {item}");
        }
    }
}

// ──────────────────── backoff ────────────────────

fn run_backoff(cli: &Cli) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let schedule = BackoffSchedule::from_config(&config.backoff);
    let steps: Vec<(u8, u64)> = schedule
        .steps()
        .map(|(b, delay)| (b.step(), delay.as_secs()))
        .collect();

    match output_mode(cli) {
        OutputMode::Human => {
            println!("{:>4}  {:>10}", "step".bold(), "delay".bold());
            for (step, secs) in &steps {
                println!("{step:>4}  {:>10}", format_secs(*secs));
            }
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "backoff",
            "base_secs": config.backoff.base_secs,
            "max_secs": config.backoff.max_secs,
            "steps": steps
                .iter()
                .map(|(step, secs)| json!({ "step": step, "delay_secs": secs }))
                .collect::<Vec<_>>(),
        }))?,
    }
    Ok(())
}

/// `3725` -> `1h 2m 5s`
fn format_secs(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let mut parts = Vec::new();
    if h > 0 {
        parts.push(format!("{h}h"));
    }
    if m > 0 {
        parts.push(format!("{m}m"));
    }
    if s > 0 || parts.is_empty() {
        parts.push(format!("{s}s"));
    }
    parts.join(" ")
}

// ──────────────────── simulate ────────────────────

fn run_simulate(cli: &Cli, args: &SimulateArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let raw = fs::read_to_string(&args.script).map_err(|e| {
        CliError::User(format!("cannot read script {}: {e}", args.script.display()))
    })?;
    let script: Script = serde_json::from_str(&raw)
        .map_err(|e| CliError::User(format!("invalid script {}: {e}", args.script.display())))?;

    let logger = start_logger(&config);
    let report = run_script(
        &script,
        &config.column,
        config.scroll.clone(),
        logger.as_ref().map(|(handle, _)| handle.clone()),
    );
    stop_logger(logger);

    match output_mode(cli) {
        OutputMode::Human => print_report(&report),
        OutputMode::Json => write_json_line(&json!({
            "command": "simulate",
            "report": serde_json::to_value(&report)?,
        }))?,
    }
    Ok(())
}

fn print_report(report: &SimReport) {
    println!(
        "{} {}  tier {}  take {}  offset {}",
        "viewport".bold(),
        report.viewport,
        report.tier,
        report.amount_to_take,
        report.offset
    );
    println!(
        "{} committed, {} pending, {} visible",
        report.committed,
        report.pending,
        report.visible.len()
    );
    for item in &report.visible {
        println!("  {item}");
    }
    if !report.notices.is_empty() {
        println!("{}", "notices (newest first)".bold());
        for notice in &report.notices {
            println!("  {}", notice.dimmed());
        }
    }
    if report.unsettled_events > 0 {
        println!(
            "{}",
            format!("{} events did not settle", report.unsettled_events).yellow()
        );
    }
}

// ──────────────────── helpers ────────────────────

type LoggerThread = (ActivityLoggerHandle, JoinHandle<()>);

fn start_logger(config: &Config) -> Option<LoggerThread> {
    if !config.logging.enabled {
        return None;
    }
    match spawn_logger(&config.logging) {
        Ok(logger) => Some(logger),
        Err(e) => {
            eprintln!("clb: activity logging disabled: {e}");
            None
        }
    }
}

fn stop_logger(logger: Option<LoggerThread>) {
    if let Some((handle, join)) = logger
        && handle.shutdown().is_ok()
    {
        let _ = join.join();
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("CLB_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
