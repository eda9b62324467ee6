//! Interactive REPL (Read-Eval-Print Loop) for portdb.
//!
//! Reads statements line by line until a statement is complete, so a
//! statement may span lines. Lines starting with `.` at the start of a
//! statement are shell commands.

use std::io::{self, BufRead, IsTerminal, Write};
use std::time::Instant;

use super::api::{Database, DatabaseError};
use crate::executor::{QueryResult, ResultSet};
use crate::sql::{is_complete, split_statements, ParseError};
use crate::transfer::{codec, format_record};

/// How result sets are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Aligned columns with a header rule.
    Table,
    /// CSV with a header, quoted like the export data files.
    Csv,
}

/// REPL configuration.
#[derive(Debug, Clone)]
pub struct ReplConfig {
    /// Prompt string.
    pub prompt: String,
    /// Show timing information.
    pub timing: bool,
    /// Max rows to display in table mode.
    pub max_rows: usize,
    /// Result output mode.
    pub mode: OutputMode,
    /// Print row counts after DML.
    pub changes: bool,
    /// Show the banner and prompts.
    pub interactive: bool,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            prompt: "portdb> ".into(),
            timing: false,
            max_rows: 100,
            mode: OutputMode::Table,
            changes: false,
            interactive: io::stdin().is_terminal(),
        }
    }
}

/// The interactive REPL.
pub struct Repl {
    db: Database,
    config: ReplConfig,
    history: Vec<String>,
    total_changes: usize,
    failures: usize,
}

impl Repl {
    /// Create a new REPL with the given database.
    pub fn new(db: Database) -> Self {
        Self::with_config(db, ReplConfig::default())
    }

    /// Create a REPL with custom configuration.
    pub fn with_config(db: Database, config: ReplConfig) -> Self {
        Self {
            db,
            config,
            history: Vec::new(),
            total_changes: 0,
            failures: 0,
        }
    }

    /// Number of statements that failed so far.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Get the database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run the REPL on stdin / stdout.
    pub fn run(&mut self) -> io::Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let mut stderr = io::stderr();
        self.run_with(stdin.lock(), &mut stdout, &mut stderr)
    }

    /// Run the REPL over any input; results go to `out`, errors to `err`.
    pub fn run_with<R: BufRead, W: Write, E: Write>(&mut self, input: R, out: &mut W, err: &mut E) -> io::Result<()> {
        if self.config.interactive {
            self.print_banner(out)?;
        }

        let mut buffer = String::new();
        let mut lines = input.lines();
        loop {
            if self.config.interactive {
                let prompt = if buffer.is_empty() { self.config.prompt.as_str() } else { "   ...> " };
                write!(out, "{}", prompt)?;
                out.flush()?;
            }

            let Some(line) = lines.next().transpose()? else {
                break;
            };

            if buffer.is_empty() && line.trim_start().starts_with('.') {
                self.history.push(line.trim().to_string());
                if self.handle_command(line.trim(), out, err)? {
                    return Ok(());
                }
                continue;
            }

            if !buffer.is_empty() {
                buffer.push('\n');
            }
            buffer.push_str(&line);

            if is_complete(&buffer) {
                let text = std::mem::take(&mut buffer);
                if !text.trim().is_empty() {
                    self.history.push(text.trim().to_string());
                }
                self.execute_script(&text, out, err)?;
            }
        }

        // a final statement without its semicolon
        if !buffer.trim().is_empty() {
            self.execute_script(&buffer, out, err)?;
        }
        if self.config.interactive {
            writeln!(out)?;
        }
        Ok(())
    }

    /// Run every statement in `sql`, reporting each failure and carrying on.
    pub fn execute_script<W: Write, E: Write>(&mut self, sql: &str, out: &mut W, err: &mut E) -> io::Result<()> {
        for statement in split_statements(sql) {
            let start = Instant::now();
            match self.db.execute(&statement) {
                Ok(result) => {
                    self.print_result(&result, out)?;
                    if self.config.timing {
                        writeln!(out, "Run Time: {:.3} ms", start.elapsed().as_secs_f64() * 1000.0)?;
                    }
                }
                Err(DatabaseError::Parse(ParseError::EmptyQuery)) => {}
                Err(e) => {
                    self.failures += 1;
                    writeln!(err, "Error: {}", e)?;
                }
            }
        }
        Ok(())
    }

    fn print_banner<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "portdb v{}", env!("CARGO_PKG_VERSION"))?;
        writeln!(out, "Enter \".help\" for usage hints.")
    }

    /// Handle a dot-command. Returns true when the shell should exit.
    fn handle_command<W: Write, E: Write>(&mut self, cmd: &str, out: &mut W, err: &mut E) -> io::Result<bool> {
        let parts: Vec<&str> = cmd.trim_start_matches('.').split_whitespace().collect();
        let command = parts.first().map(|s| s.to_lowercase());

        match command.as_deref() {
            Some("help") => self.print_help(out)?,
            Some("quit") | Some("exit") => return Ok(true),
            Some("tables") => {
                for table in self.db.tables() {
                    writeln!(out, "{}", table)?;
                }
            }
            Some("schema") => match parts.get(1) {
                Some(table) => match self.db.table_schema(table) {
                    Some(schema) => writeln!(out, "{}", schema.to_ddl())?,
                    None => {
                        self.failures += 1;
                        writeln!(err, "Error: no such table: {}", table)?;
                    }
                },
                None => {
                    let mut names = self.db.tables();
                    names.sort();
                    for name in names {
                        if let Some(schema) = self.db.table_schema(&name) {
                            writeln!(out, "{}", schema.to_ddl())?;
                        }
                    }
                }
            },
            Some("mode") => match parts.get(1).map(|m| m.to_lowercase()).as_deref() {
                Some("csv") => self.config.mode = OutputMode::Csv,
                Some("table") => self.config.mode = OutputMode::Table,
                _ => writeln!(err, "Usage: .mode csv|table")?,
            },
            Some("changes") => match parts.get(1).map(|m| m.to_lowercase()).as_deref() {
                Some("on") => self.config.changes = true,
                Some("off") => self.config.changes = false,
                _ => writeln!(err, "Usage: .changes on|off")?,
            },
            Some("timing") => {
                self.config.timing = match parts.get(1).map(|m| m.to_lowercase()).as_deref() {
                    Some("on") => true,
                    Some("off") => false,
                    _ => !self.config.timing,
                };
            }
            Some("history") => {
                for (i, entry) in self.history.iter().enumerate() {
                    writeln!(out, "{:>4}  {}", i + 1, entry)?;
                }
            }
            Some(other) => {
                writeln!(err, "Unknown command: .{}", other)?;
                writeln!(err, "Enter \".help\" for usage hints.")?;
            }
            None => {}
        }
        Ok(false)
    }

    fn print_help<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, ".changes on|off        Show rows changed by each INSERT/UPDATE/DELETE")?;
        writeln!(out, ".help                  Show this message")?;
        writeln!(out, ".history               Show statements entered so far")?;
        writeln!(out, ".mode csv|table        Set the result output mode")?;
        writeln!(out, ".quit                  Exit")?;
        writeln!(out, ".schema [table]        Show CREATE statements")?;
        writeln!(out, ".tables                List tables")?;
        writeln!(out, ".timing [on|off]       Show how long each statement took")?;
        writeln!(out)?;
        writeln!(out, "EXPORT DATABASE '<dir>' [(FORMAT CSV, DELIMITER ',', HEADER true, SCHEMA 'name', THREADS n)]")?;
        writeln!(out, "IMPORT DATABASE '<dir>'")
    }

    fn print_result<W: Write>(&mut self, result: &QueryResult, out: &mut W) -> io::Result<()> {
        match result {
            QueryResult::Success { message } | QueryResult::Transaction { message } => {
                if self.config.mode == OutputMode::Table && self.config.interactive {
                    writeln!(out, "{}", message)?;
                }
            }
            QueryResult::Modified { rows_affected } => {
                self.total_changes += rows_affected;
                if self.config.changes {
                    writeln!(out, "changes: {}   total_changes: {}", rows_affected, self.total_changes)?;
                }
            }
            QueryResult::Select(rs) => match self.config.mode {
                OutputMode::Csv => write_csv(rs, out)?,
                OutputMode::Table => self.write_table(rs, out)?,
            },
        }
        Ok(())
    }

    fn write_table<W: Write>(&self, rs: &ResultSet, out: &mut W) -> io::Result<()> {
        let shown = rs.len().min(self.config.max_rows);
        let cells: Vec<Vec<String>> = rs
            .iter()
            .take(shown)
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect();

        let mut widths: Vec<usize> = rs.columns.iter().map(|c| c.chars().count()).collect();
        for row in &cells {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let line = |values: &[String]| {
            values
                .iter()
                .zip(&widths)
                .map(|(v, w)| format!("{:w$}", v, w = *w))
                .collect::<Vec<_>>()
                .join(" | ")
        };
        writeln!(out, "{}", line(&rs.columns).trim_end())?;
        writeln!(
            out,
            "{}",
            widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-")
        )?;
        for row in &cells {
            writeln!(out, "{}", line(row).trim_end())?;
        }

        if rs.len() > shown {
            writeln!(out, "... ({} more rows)", rs.len() - shown)?;
        }
        writeln!(out, "({} {})", rs.len(), if rs.len() == 1 { "row" } else { "rows" })
    }
}

/// CSV with a header row; NULL prints as an empty field.
fn write_csv<W: Write>(rs: &ResultSet, out: &mut W) -> io::Result<()> {
    out.write_all(format_record(rs.columns.iter().map(|c| Some(c.as_str())), ',').as_bytes())?;
    for row in rs.iter() {
        let fields: Vec<Option<String>> = row.iter().map(codec::encode).collect();
        out.write_all(format_record(fields.iter().map(|f| f.as_deref()), ',').as_bytes())?;
    }
    Ok(())
}
