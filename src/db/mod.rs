//! High-level Database API and REPL interface.
//!
//! `Database` wraps the executor with configuration and convenience
//! helpers; `Repl` is the line-oriented shell the binary runs.

mod api;
mod repl;

pub use api::{Database, DatabaseConfig, DatabaseError, DatabaseResult, DatabaseStats};
pub use repl::{OutputMode, Repl, ReplConfig};
