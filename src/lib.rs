//! portdb - an in-memory SQL database that moves whole databases in and
//! out of directories.
//!
//! `EXPORT DATABASE '<dir>'` writes one CSV file per table plus a
//! `manifest.json` holding the DDL needed to rebuild every schema,
//! sequence, table and view in dependency order. `IMPORT DATABASE '<dir>'`
//! replays that manifest into another database.
//!
//! # Example
//!
//! ```no_run
//! use portdb::db::Database;
//!
//! let mut db = Database::new();
//! db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
//! db.execute("INSERT INTO users VALUES (1, 'Alice')").unwrap();
//! db.execute("EXPORT DATABASE '/tmp/users_export'").unwrap();
//!
//! let mut copy = Database::new();
//! copy.execute("IMPORT DATABASE '/tmp/users_export'").unwrap();
//! ```

pub mod catalog;
pub mod db;
pub mod executor;
pub mod planner;
pub mod sql;
pub mod storage;
pub mod transaction;
pub mod transfer;
