//! Storage Layer - SQLite-backed persistence
//!
//! One store file holds one table per cached function:
//! - parameter columns, in declaration order, forming the primary key
//! - `return` (scalar results) or `return_0 .. return_{n-1}` (tuple results)

pub mod schema;
pub mod query;
pub mod sqlite;

pub use schema::{ColumnSpec, TableDef};
pub use query::Statements;
pub use sqlite::{CacheStore, ColumnInfo, TableInfo, DEFAULT_DB_PATH};
