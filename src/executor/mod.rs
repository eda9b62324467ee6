//! Query execution engine for portdb.
//!
//! Uses the Volcano/Iterator model where each operator produces
//! rows one at a time. The executor also runs DDL, DML, transaction
//! control and the EXPORT / IMPORT DATABASE statements.

mod error;
mod eval;
#[allow(clippy::module_inception)]
mod executor;
mod operators;
mod result;

pub use error::{ExecuteError, ExecuteResult};
pub use eval::{compare, like_match, EvalContext};
pub use executor::QueryExecutor;
pub use operators::{build_operator, Operator};
pub use result::{QueryResult, ResultSet};
