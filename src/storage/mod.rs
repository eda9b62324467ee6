//! storage layer for portdb
//!
//! rows are held in memory, one `TableData` per table, keyed by qualified
//! table name. the upper layers (executor, transfer) read rows through
//! `TableData::rows` and write through the index-enforcing mutators.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     DatabaseState                           │
//! │        (catalog + rows; cloned as a transaction snapshot)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                       ┌─────────────┐
//!                       │  TableData  │
//!                       │ rows + keys │
//!                       └─────────────┘
//!                              │
//!                              ▼
//!                       ┌─────────────┐
//!                       │    Value    │
//!                       │ (typed row) │
//!                       └─────────────┘
//! ```

mod errors;
mod state;
mod table;
mod types;

pub use errors::{StorageError, StorageResult};
pub use state::DatabaseState;
pub use table::{TableData, UniqueIndex};
pub use types::{IndexKey, Row, RowId, Value};
