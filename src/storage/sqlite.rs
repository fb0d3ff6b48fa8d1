//! SQLite store handle

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info, trace};

use super::schema::{quote_ident, TableDef};
use crate::{Error, Result};

/// Default store file, relative to the working directory
pub const DEFAULT_DB_PATH: &str = ".func.db";

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

struct State {
    conn: Option<Connection>,
    /// Tables already created (or found) through this handle, keyed by
    /// lowercased name
    ensured: HashMap<String, String>,
}

/// Handle to one cache store file.
///
/// The connection is opened on first use and lives as long as the last
/// clone of the handle. Every cached function registered against the same
/// handle shares that connection and owns one table in it.
#[derive(Clone)]
pub struct CacheStore {
    location: Location,
    busy_timeout: Option<Duration>,
    state: Arc<Mutex<State>>,
}

impl CacheStore {
    /// Handle for a store file (created on first use if missing)
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self::with_location(Location::File(path.as_ref().to_path_buf()))
    }

    /// Handle for a private in-memory store (for testing)
    pub fn open_in_memory() -> Self {
        Self::with_location(Location::Memory)
    }

    fn with_location(location: Location) -> Self {
        Self {
            location,
            busy_timeout: None,
            state: Arc::new(Mutex::new(State {
                conn: None,
                ensured: HashMap::new(),
            })),
        }
    }

    /// Wait this long on a locked store file instead of failing at once.
    /// Only affects a connection that has not been opened yet.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    /// Path of the store file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            Location::File(path) => Some(path),
            Location::Memory => None,
        }
    }

    /// Whether the connection has been opened yet
    pub fn is_open(&self) -> bool {
        self.lock().conn.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = match &self.location {
            Location::File(path) => {
                info!(path = %path.display(), "opening cache store");
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Connection::open(path)?
            }
            Location::Memory => {
                debug!("opening in-memory cache store");
                Connection::open_in_memory()?
            }
        };
        if let Some(timeout) = self.busy_timeout {
            conn.busy_timeout(timeout)?;
        }
        conn.set_prepared_statement_cache_capacity(64);
        Ok(conn)
    }

    /// Run `f` against the connection, opening it first if needed.
    ///
    /// The connection stays locked while `f` runs; `f` must not call back
    /// into a cached function on the same store.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut state = self.lock();
        let conn = self.connection(&mut state)?;
        f(conn)
    }

    fn connection<'s>(&self, state: &'s mut State) -> Result<&'s Connection> {
        let conn = match state.conn.take() {
            Some(conn) => conn,
            None => self.connect()?,
        };
        Ok(state.conn.insert(conn))
    }

    /// Create the table if it does not exist yet, committing before
    /// returning. Runs the DDL at most once per handle and table name.
    ///
    /// SQLite table names ignore case, so a table whose name differs from
    /// `table.name` only in case is reported as [`Error::TableNameClash`]
    /// instead of being shared.
    pub fn ensure_table(&self, table: &TableDef) -> Result<()> {
        let mut state = self.lock();
        let folded = table.name.to_ascii_lowercase();
        if let Some(existing) = state.ensured.get(&folded) {
            return clash(table, existing);
        }
        let conn = self.connection(&mut state)?;
        let sql = table.create_statement();
        trace!(%sql, "ensuring table");
        let tx = conn.unchecked_transaction()?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                [&table.name],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(existing) = &existing {
            clash(table, existing)?;
        }
        tx.execute(&sql, [])?;
        tx.commit()?;
        state.ensured.insert(folded, table.name.clone());
        info!(table = %table.name, "cache table ready");
        Ok(())
    }

    // ========== Inspection ==========

    /// All cache tables with their row counts
    pub fn tables(&self) -> Result<Vec<TableInfo>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut tables = Vec::with_capacity(names.len());
            for name in names {
                let rows: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM {}", quote_ident(&name)),
                    [],
                    |row| row.get(0),
                )?;
                tables.push(TableInfo { name, rows: rows as usize });
            }
            Ok(tables)
        })
    }

    /// Columns of a table, in table order
    pub fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
            let columns = stmt
                .query_map([], |row| {
                    Ok(ColumnInfo {
                        name: row.get(1)?,
                        declared_type: row.get(2)?,
                        not_null: row.get(3)?,
                        primary_key: row.get::<_, i64>(5)? > 0,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(columns)
        })
    }

    /// Up to `limit` raw rows of a table
    pub fn rows(&self, table: &str, limit: usize) -> Result<Vec<Vec<Value>>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT * FROM {} LIMIT ?1", quote_ident(table)))?;
            let width = stmt.column_count();
            let rows = stmt
                .query_map([limit as i64], |row| {
                    (0..width).map(|i| row.get::<_, Value>(i)).collect::<rusqlite::Result<Vec<Value>>>()
                })?
                .collect::<rusqlite::Result<Vec<Vec<Value>>>>()?;
            Ok(rows)
        })
    }

    /// Number of rows in a table
    pub fn count(&self, table: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)), [], |row| {
                row.get(0)
            })?;
            Ok(count as usize)
        })
    }
}

fn clash(table: &TableDef, existing: &str) -> Result<()> {
    if existing == table.name {
        return Ok(());
    }
    Err(Error::TableNameClash {
        function: table.name.clone(),
        existing: existing.to_string(),
    })
}

impl Default for CacheStore {
    /// Handle for [`DEFAULT_DB_PATH`] in the working directory
    fn default() -> Self {
        Self::open(DEFAULT_DB_PATH)
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("location", &self.location)
            .field("open", &self.is_open())
            .finish()
    }
}

/// A column as reported by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}

/// A cache table and its size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub rows: usize,
}

impl std::fmt::Display for TableInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} entries", self.name, self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{FunctionDecl, Signature};
    use crate::types::TypeDecl;

    fn table(name: &str) -> TableDef {
        let decl = FunctionDecl::new(name).param("x", TypeDecl::int()).returns(TypeDecl::text());
        TableDef::from_signature(&Signature::from_decl(decl).unwrap()).unwrap()
    }

    #[test]
    fn test_opens_lazily() {
        let store = CacheStore::open_in_memory();
        assert!(!store.is_open());
        assert!(store.path().is_none());

        store.tables().unwrap();
        assert!(store.is_open());
    }

    #[test]
    fn test_clones_share_connection() {
        let store = CacheStore::open_in_memory();
        let other = store.clone();

        store.ensure_table(&table("shared")).unwrap();
        assert!(other.is_open());
        assert_eq!(other.tables().unwrap(), vec![TableInfo { name: "shared".into(), rows: 0 }]);
    }

    #[test]
    fn test_ensure_table_is_idempotent() {
        let store = CacheStore::open_in_memory();
        let def = table("f");

        store.ensure_table(&def).unwrap();
        store
            .with_conn(|conn| {
                conn.execute(r#"INSERT INTO "f" ("x", "return") VALUES (1, 'one')"#, [])?;
                Ok(())
            })
            .unwrap();
        store.ensure_table(&def).unwrap();

        assert_eq!(store.count("f").unwrap(), 1);
        let columns = store.columns("f").unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!((columns[0].name.as_str(), columns[0].declared_type.as_str()), ("x", "INT"));
        assert!(columns[0].primary_key && columns[0].not_null);
        assert_eq!(columns[1].name, "return");
        assert!(!columns[1].primary_key);
        assert_eq!(
            store.rows("f", 10).unwrap(),
            vec![vec![Value::Integer(1), Value::Text("one".into())]]
        );
    }

    #[test]
    fn test_table_names_clash_ignoring_case() {
        let store = CacheStore::open_in_memory();
        store.ensure_table(&table("Calc")).unwrap();
        store.ensure_table(&table("Calc")).unwrap();

        assert!(matches!(
            store.ensure_table(&table("calc")),
            Err(Error::TableNameClash { function, existing }) if function == "calc" && existing == "Calc"
        ));

        // A fresh handle finds the existing table in the file
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        CacheStore::open(&path).ensure_table(&table("Calc")).unwrap();
        assert!(matches!(
            CacheStore::open(&path).ensure_table(&table("CALC")),
            Err(Error::TableNameClash { .. })
        ));
    }

    #[test]
    fn test_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");
        let store = CacheStore::open(&path).with_busy_timeout(Duration::from_millis(100));

        store.ensure_table(&table("f")).unwrap();
        assert!(path.exists());
    }
}
