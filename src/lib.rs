//! # dbcache - Persistent function memoization backed by SQLite
//!
//! Wrap a pure (or idempotent) function and every distinct argument tuple's
//! result is stored in a SQLite table derived from the function's signature.
//! Later calls with the same arguments, in this process or a later one, are
//! answered from the table without running the function again.
//!
//! dbcache provides:
//! - Type mapping from declared value types to SQLite column types
//! - Signature descriptors built once at registration time
//! - Table and statement generation per cached function
//! - A lazily opened store handle shared by every cached function
//! - Typed registration through compile-time type tokens
//!
//! ```no_run
//! use dbcache::{CacheStore, Memoized};
//!
//! let store = CacheStore::open(".func.db");
//! let square = Memoized::new(&store, "square", &["n"], |(n,): (i64,)| n * n)?;
//! assert_eq!(square.call((12,))?, 144);
//! # Ok::<(), dbcache::Error>(())
//! ```

pub mod types;
pub mod signature;
pub mod storage;
pub mod cache;
pub mod memoize;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use types::{ColumnType, StorageType, TypeDecl, ValueType};
pub use signature::{FunctionDecl, ParamDecl, Parameter, ReturnShape, Signature};
pub use storage::{CacheStore, TableDef};
pub use cache::{CacheTable, CachedFunction, ReturnValue};
pub use memoize::{CacheArgs, CacheReturn, CacheValue, Memoized};
pub use rusqlite::types::Value;

/// Boxed error produced by a wrapped function body
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for dbcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for dbcache operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("type of parameter {0} must be given")]
    MissingParameterType(String),

    #[error("return type of {0} must be given")]
    MissingReturnType(String),

    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error("unsupported union: {0} (expected exactly one type and None)")]
    UnsupportedUnion(String),

    #[error("tuple return type of {0} has no element types")]
    UntypedTuple(String),

    #[error("invalid annotation: {0}")]
    InvalidAnnotation(String),

    #[error("invalid name: {0:?}")]
    InvalidName(String),

    #[error("duplicate parameter {param} in {function}")]
    DuplicateParameter { function: String, param: String },

    #[error("parameter {param} of {function} has no default but follows one that does")]
    NonDefaultAfterDefault { function: String, param: String },

    #[error("{function} takes {expected} parameters but {found} names were given")]
    ArityMismatch {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("cannot bind arguments for {function}: {reason}")]
    Binding { function: String, reason: String },

    #[error("{function} returned a value that does not match its declared {expected} return")]
    ShapeMismatch { function: String, expected: String },

    #[error("column {column} holds {expected}, got {found}")]
    ValueMismatch {
        column: String,
        expected: &'static str,
        found: String,
    },

    #[error("{function} would share table {existing} (SQLite names ignore case)")]
    TableNameClash { function: String, existing: String },

    #[error("cannot decode {found} as {expected}")]
    Decode {
        expected: &'static str,
        found: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("wrapped function failed: {0}")]
    Function(#[source] BoxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
