//! Cache lookup and population
//!
//! [`CacheTable`] answers lookups and stores results for one registered
//! signature. [`CachedFunction`] puts a function body behind it: bind the
//! arguments, look them up, and on a miss run the body and upsert the
//! result before returning it.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, OptionalExtension};
use tracing::{debug, trace};

use crate::signature::{FunctionDecl, ReturnShape, Signature};
use crate::storage::{CacheStore, Statements, TableDef};
use crate::{BoxError, Error, Result};

/// A function result, shaped like its declared return
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnValue {
    Scalar(Value),
    Tuple(Vec<Value>),
}

impl ReturnValue {
    /// Stored values, in return column order
    pub fn values(&self) -> &[Value] {
        match self {
            ReturnValue::Scalar(value) => std::slice::from_ref(value),
            ReturnValue::Tuple(values) => values,
        }
    }
}

impl From<Value> for ReturnValue {
    fn from(value: Value) -> Self {
        ReturnValue::Scalar(value)
    }
}

/// Append a result to its key, giving the row to upsert.
///
/// Fails with [`Error::ShapeMismatch`] if the result does not have the
/// declared shape.
pub fn pack_row(signature: &Signature, key: &[Value], result: &ReturnValue) -> Result<Vec<Value>> {
    let fits = match (&signature.return_shape, result) {
        (ReturnShape::Scalar(_), ReturnValue::Scalar(_)) => true,
        (ReturnShape::Tuple(types), ReturnValue::Tuple(values)) => types.len() == values.len(),
        _ => false,
    };
    if !fits || key.len() != signature.parameters.len() {
        return Err(Error::ShapeMismatch {
            function: signature.name.clone(),
            expected: signature.return_shape.describe(),
        });
    }

    let mut row = Vec::with_capacity(key.len() + result.values().len());
    row.extend_from_slice(key);
    row.extend_from_slice(result.values());
    Ok(row)
}

/// Rebuild a result from the return columns of a stored row
pub fn unpack_row(signature: &Signature, mut columns: Vec<Value>) -> Result<ReturnValue> {
    match &signature.return_shape {
        ReturnShape::Scalar(_) if columns.len() == 1 => Ok(ReturnValue::Scalar(columns.remove(0))),
        ReturnShape::Tuple(types) if columns.len() == types.len() => Ok(ReturnValue::Tuple(columns)),
        shape => Err(Error::ShapeMismatch {
            function: signature.name.clone(),
            expected: shape.describe(),
        }),
    }
}

/// The stored side of one cached function
#[derive(Debug, Clone)]
pub struct CacheTable {
    signature: Signature,
    table: TableDef,
    statements: Statements,
    store: CacheStore,
}

impl CacheTable {
    /// Derive the table for `signature`, make sure it exists in `store`, and
    /// prepare its statements. Nothing is written if the signature cannot be
    /// mapped to columns.
    pub fn register(store: &CacheStore, signature: Signature) -> Result<Self> {
        let table = TableDef::from_signature(&signature)?;
        store.ensure_table(&table)?;
        let statements = Statements::for_table(&table);
        trace!(lookup = %statements.lookup, upsert = %statements.upsert, "prepared cache statements");

        Ok(Self {
            signature,
            table,
            statements,
            store: store.clone(),
        })
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn table(&self) -> &TableDef {
        &self.table
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Stored result for a fully bound key, if any.
    ///
    /// Key values must fit their columns ([`Error::ValueMismatch`]).
    pub fn lookup(&self, key: &[Value]) -> Result<Option<ReturnValue>> {
        self.table.check_values(key)?;
        let width = self.signature.return_shape.arity();
        let columns = self.store.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&self.statements.lookup)?;
            let columns = stmt
                .query_row(params_from_iter(key.iter()), |row| {
                    (0..width).map(|i| row.get::<_, Value>(i)).collect::<rusqlite::Result<Vec<Value>>>()
                })
                .optional()?;
            Ok(columns)
        })?;

        columns.map(|c| unpack_row(&self.signature, c)).transpose()
    }

    /// Store a result for a fully bound key, replacing any previous one,
    /// and commit.
    pub fn upsert(&self, key: &[Value], result: &ReturnValue) -> Result<()> {
        let row = pack_row(&self.signature, key, result)?;
        self.table.check_values(&row)?;
        self.store.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            if let Some(clear) = &self.statements.clear_key {
                tx.prepare_cached(clear)?.execute(params_from_iter(key.iter()))?;
            }
            tx.prepare_cached(&self.statements.upsert)?
                .execute(params_from_iter(row.iter()))?;
            tx.commit()?;
            Ok(())
        })?;
        debug!(function = %self.signature.name, "stored result");
        Ok(())
    }

    /// Number of cached entries
    pub fn len(&self) -> Result<usize> {
        self.store.count(&self.table.name)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

type Body = Box<dyn Fn(&[Value]) -> std::result::Result<ReturnValue, BoxError>>;

/// A function body behind a persistent cache, called with dynamic values.
///
/// Arguments are positional; omitted trailing arguments take their declared
/// defaults. The body receives the fully bound argument list.
pub struct CachedFunction {
    table: CacheTable,
    body: Body,
}

impl CachedFunction {
    /// Validate `decl`, ensure its table exists, and wrap `body`.
    pub fn register<F, E>(store: &CacheStore, decl: FunctionDecl, body: F) -> Result<Self>
    where
        F: Fn(&[Value]) -> std::result::Result<ReturnValue, E> + 'static,
        E: Into<BoxError> + 'static,
    {
        let signature = Signature::from_decl(decl)?;
        let table = CacheTable::register(store, signature)?;
        Ok(Self {
            table,
            body: Box::new(move |args: &[Value]| body(args).map_err(Into::into)),
        })
    }

    pub fn signature(&self) -> &Signature {
        self.table.signature()
    }

    pub fn table(&self) -> &CacheTable {
        &self.table
    }

    /// Return the cached result for `args`, computing and storing it on a
    /// miss. The body runs at most once per distinct bound argument list.
    pub fn call(&self, args: &[Value]) -> Result<ReturnValue> {
        let key = self.signature().bind(args)?;
        if let Some(hit) = self.table.lookup(&key)? {
            debug!(function = %self.signature().name, "cache hit");
            return Ok(hit);
        }
        debug!(function = %self.signature().name, "cache miss");
        self.compute(key)
    }

    /// Run the body even if a result is cached, replacing the stored one.
    pub fn recompute(&self, args: &[Value]) -> Result<ReturnValue> {
        let key = self.signature().bind(args)?;
        self.compute(key)
    }

    fn compute(&self, key: Vec<Value>) -> Result<ReturnValue> {
        let result = (self.body)(&key).map_err(Error::Function)?;
        self.table.upsert(&key, &result)?;
        Ok(result)
    }
}

impl std::fmt::Debug for CachedFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedFunction").field("table", &self.table).finish_non_exhaustive()
    }
}
