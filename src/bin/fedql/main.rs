//! Binary entry point for the fedql shell.
#![forbid(unsafe_code)]

mod config;
mod ui;

use std::error::Error;
use std::io::BufRead;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use fedql::query::profile::profile_snapshot;
use fedql::{CommandOutput, Engine, Permissions};
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;
use crate::ui::{Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "fedql",
    version,
    about = "Query declared record types with SQL across memory, SQLite and REST backings"
)]
struct Cli {
    #[arg(long, env = "FEDQL_CONFIG", value_name = "FILE", help = "Config file path")]
    config: Option<PathBuf>,

    #[arg(
        long,
        env = "FEDQL_PERMISSIONS",
        value_name = "select,insert,...",
        help = "Override the configured permission set"
    )]
    permissions: Option<Permissions>,

    #[arg(
        long,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for results"
    )]
    format: OutputFormat,

    #[arg(long, value_enum, default_value_t = Theme::Auto, help = "Color theme")]
    theme: Theme,

    #[arg(
        short = 'e',
        long = "execute",
        value_name = "SQL",
        help = "Run a statement or dot command and exit (repeatable)"
    )]
    execute: Vec<String>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.clone())?;
    let engine = config.build_engine(cli.permissions)?;
    tracing::debug!(
        config = ?config.path(),
        tables = engine.catalog().len(),
        "cli.engine.ready"
    );
    let ui = Ui::new(cli.theme);

    if !cli.execute.is_empty() {
        for input in &cli.execute {
            let output = engine.command(input)?;
            emit(&cli.format, &output, |_| ui.output(&output))?;
        }
        if let Some(snapshot) = profile_snapshot(false) {
            eprintln!("profile: {snapshot}");
        }
        return Ok(());
    }
    repl(&engine, &ui, cli.format)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FEDQL_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Reads one statement per line until EOF or `.quit`. Failures are reported
/// and the session continues.
fn repl(engine: &Engine, ui: &Ui, format: OutputFormat) -> Result<(), Box<dyn Error>> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let mut failed = false;
    loop {
        ui.prompt();
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, ".quit" | ".exit") {
            break;
        }
        match engine.command(input) {
            Ok(output) => emit(&format, &output, |_| ui.output(&output))?,
            Err(err) => {
                failed = true;
                ui.error(err.code(), &err.to_string());
            }
        }
    }
    if failed && !ui.interactive() {
        return Err("one or more statements failed".into());
    }
    Ok(())
}

fn emit<F>(format: &OutputFormat, value: &CommandOutput, printer: F) -> Result<(), Box<dyn Error>>
where
    F: Fn(OutputFormat),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(OutputFormat::Text),
    }
    Ok(())
}
