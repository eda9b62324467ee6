//! SQL parsing and AST types for portdb.
//!
//! Uses `sqlparser` crate for parsing, then converts to our internal AST
//! representation for execution. Batches are split on `;` by [`split_statements`]
//! before parsing.

mod ast;
mod error;
mod parser;
mod split;

pub use ast::*;
pub use error::{ParseError, ParseResult};
pub use parser::Parser;
pub use split::{is_complete, split_statements};
