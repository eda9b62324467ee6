//! portdb command-line shell.
//!
//! Runs SQL from `-c`, a script file, or stdin. Without input flags and on
//! a terminal it starts an interactive prompt.

use std::fs;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use portdb::db::{Database, DatabaseConfig, OutputMode, Repl, ReplConfig};

/// In-memory SQL database with EXPORT DATABASE / IMPORT DATABASE
#[derive(Parser, Debug)]
#[command(name = "portdb", version, about)]
struct Args {
    /// Execute SQL and exit (may be repeated)
    #[arg(short = 'c', long = "command")]
    commands: Vec<String>,

    /// Execute SQL from a file and exit
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Import a database directory before running anything else
    #[arg(short = 'i', long)]
    import: Option<PathBuf>,

    /// Start in csv output mode
    #[arg(long)]
    csv: bool,

    /// Default CSV delimiter for EXPORT DATABASE
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Default number of tables EXPORT DATABASE writes in parallel
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Log statements and plans to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "portdb=debug" } else { "portdb=warn" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns false when any statement failed.
fn run(args: Args) -> Result<bool, Box<dyn std::error::Error>> {
    let config = DatabaseConfig::new()
        .verbose(args.verbose)
        .delimiter(args.delimiter)
        .export_threads(args.threads);
    let mut db = Database::with_config(config)?;

    if let Some(dir) = &args.import {
        let summary = db.import_from(dir)?;
        tracing::info!(tables = summary.tables, rows = summary.rows, "imported {}", dir.display());
    }

    let scripted = !args.commands.is_empty() || args.file.is_some();
    let repl_config = ReplConfig {
        mode: if args.csv { OutputMode::Csv } else { OutputMode::Table },
        interactive: !scripted && io::stdin().is_terminal(),
        ..ReplConfig::default()
    };
    let mut repl = Repl::with_config(db, repl_config);

    if scripted {
        let stdout = io::stdout();
        let stderr = io::stderr();
        let (mut out, mut err) = (stdout.lock(), stderr.lock());
        for sql in &args.commands {
            repl.execute_script(sql, &mut out, &mut err)?;
        }
        if let Some(path) = &args.file {
            let sql = fs::read_to_string(path)?;
            repl.execute_script(&sql, &mut out, &mut err)?;
        }
    } else {
        repl.run()?;
    }

    Ok(repl.failures() == 0)
}
