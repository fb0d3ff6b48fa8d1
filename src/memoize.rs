//! Typed memoization
//!
//! Rust functions declare their cacheable shape through type tokens instead
//! of annotations: each supported value type implements [`CacheValue`],
//! argument tuples implement [`CacheArgs`], and scalar or tuple results
//! implement [`CacheReturn`]. The declaration is assembled once, when a
//! [`Memoized`] is created.

use std::convert::Infallible;
use std::marker::PhantomData;

use rusqlite::types::Value;
use tracing::debug;

use crate::cache::{CacheTable, ReturnValue};
use crate::signature::{FunctionDecl, Signature};
use crate::storage::CacheStore;
use crate::types::TypeDecl;
use crate::{BoxError, Error, Result};

fn kind_of(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => format!("integer {}", i),
        Value::Real(r) => format!("real {}", r),
        Value::Text(_) => "text".to_string(),
        Value::Blob(b) => format!("{}-byte blob", b.len()),
    }
}

fn decode_error<T>(expected: &'static str, value: &Value) -> Result<T> {
    Err(Error::Decode {
        expected,
        found: kind_of(value),
    })
}

/// A Rust type that can be stored in one column
pub trait CacheValue: Sized {
    /// Declared type of the column
    fn type_decl() -> TypeDecl;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self>;
}

impl CacheValue for i64 {
    fn type_decl() -> TypeDecl {
        TypeDecl::int()
    }

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(i),
            other => decode_error("int", &other),
        }
    }
}

macro_rules! narrow_integer {
    ($($t:ty),+) => {$(
        impl CacheValue for $t {
            fn type_decl() -> TypeDecl {
                TypeDecl::int()
            }

            fn to_value(&self) -> Value {
                Value::Integer(i64::from(*self))
            }

            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::Integer(i) => match <$t>::try_from(i) {
                        Ok(v) => Ok(v),
                        Err(_) => decode_error(stringify!($t), &Value::Integer(i)),
                    },
                    other => decode_error(stringify!($t), &other),
                }
            }
        }
    )+};
}

narrow_integer!(i32, u32, i16, u16, u8);

/// NaN cannot be stored (SQLite binds it as NULL) and fails with
/// [`Error::ValueMismatch`].
impl CacheValue for f64 {
    fn type_decl() -> TypeDecl {
        TypeDecl::float()
    }

    fn to_value(&self) -> Value {
        Value::Real(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Real(r) => Ok(r),
            // REAL affinity may hand back whole numbers as integers
            Value::Integer(i) => Ok(i as f64),
            other => decode_error("float", &other),
        }
    }
}

impl CacheValue for String {
    fn type_decl() -> TypeDecl {
        TypeDecl::text()
    }

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            other => decode_error("str", &other),
        }
    }
}

impl CacheValue for Vec<u8> {
    fn type_decl() -> TypeDecl {
        TypeDecl::bytes()
    }

    fn to_value(&self) -> Value {
        Value::Blob(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(b) => Ok(b),
            other => decode_error("bytes", &other),
        }
    }
}

impl CacheValue for bool {
    fn type_decl() -> TypeDecl {
        TypeDecl::boolean()
    }

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(i != 0),
            other => decode_error("bool", &other),
        }
    }
}

impl<T: CacheValue> CacheValue for Option<T> {
    fn type_decl() -> TypeDecl {
        TypeDecl::optional(T::type_decl())
    }

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// An argument tuple; one parameter per element
pub trait CacheArgs {
    fn type_decls() -> Vec<TypeDecl>;

    fn to_values(&self) -> Vec<Value>;
}

impl CacheArgs for () {
    fn type_decls() -> Vec<TypeDecl> {
        Vec::new()
    }

    fn to_values(&self) -> Vec<Value> {
        Vec::new()
    }
}

macro_rules! args_tuple {
    ($($name:ident),+) => {
        impl<$($name: CacheValue),+> CacheArgs for ($($name,)+) {
            fn type_decls() -> Vec<TypeDecl> {
                vec![$($name::type_decl()),+]
            }

            #[allow(non_snake_case)]
            fn to_values(&self) -> Vec<Value> {
                let ($($name,)+) = self;
                vec![$($name.to_value()),+]
            }
        }
    };
}

args_tuple!(A);
args_tuple!(A, B);
args_tuple!(A, B, C);
args_tuple!(A, B, C, D);
args_tuple!(A, B, C, D, E);
args_tuple!(A, B, C, D, E, F);

/// A function result: a single value or a fixed-arity tuple of values
pub trait CacheReturn: Sized {
    fn type_decl() -> TypeDecl;

    fn to_return(&self) -> ReturnValue;

    fn from_return(value: ReturnValue) -> Result<Self>;
}

fn expected_scalar<T>() -> Result<T> {
    Err(Error::Decode {
        expected: "scalar",
        found: "tuple".to_string(),
    })
}

macro_rules! scalar_return {
    ($($t:ty),+) => {$(
        impl CacheReturn for $t {
            fn type_decl() -> TypeDecl {
                <$t as CacheValue>::type_decl()
            }

            fn to_return(&self) -> ReturnValue {
                ReturnValue::Scalar(self.to_value())
            }

            fn from_return(value: ReturnValue) -> Result<Self> {
                match value {
                    ReturnValue::Scalar(v) => <$t as CacheValue>::from_value(v),
                    ReturnValue::Tuple(_) => expected_scalar(),
                }
            }
        }
    )+};
}

scalar_return!(i64, i32, u32, i16, u16, u8, f64, String, Vec<u8>, bool);

impl<T: CacheValue> CacheReturn for Option<T> {
    fn type_decl() -> TypeDecl {
        <Self as CacheValue>::type_decl()
    }

    fn to_return(&self) -> ReturnValue {
        ReturnValue::Scalar(self.to_value())
    }

    fn from_return(value: ReturnValue) -> Result<Self> {
        match value {
            ReturnValue::Scalar(v) => <Self as CacheValue>::from_value(v),
            ReturnValue::Tuple(_) => expected_scalar(),
        }
    }
}

macro_rules! tuple_return {
    ($len:literal; $($name:ident),+) => {
        impl<$($name: CacheValue),+> CacheReturn for ($($name,)+) {
            fn type_decl() -> TypeDecl {
                TypeDecl::Tuple(vec![$($name::type_decl()),+])
            }

            #[allow(non_snake_case)]
            fn to_return(&self) -> ReturnValue {
                let ($($name,)+) = self;
                ReturnValue::Tuple(vec![$($name.to_value()),+])
            }

            fn from_return(value: ReturnValue) -> Result<Self> {
                let values = match value {
                    ReturnValue::Tuple(values) if values.len() == $len => values,
                    ReturnValue::Tuple(values) => {
                        return Err(Error::Decode {
                            expected: concat!($len, "-tuple"),
                            found: format!("{}-tuple", values.len()),
                        });
                    }
                    ReturnValue::Scalar(v) => {
                        return Err(Error::Decode {
                            expected: concat!($len, "-tuple"),
                            found: kind_of(&v),
                        });
                    }
                };
                let mut values = values.into_iter();
                Ok(($(
                    $name::from_value(values.next().unwrap_or(Value::Null))?,
                )+))
            }
        }
    };
}

tuple_return!(2; A, B);
tuple_return!(3; A, B, C);
tuple_return!(4; A, B, C, D);

type Body<A, R> = Box<dyn Fn(A) -> std::result::Result<R, BoxError>>;

/// A typed function behind a persistent cache.
///
/// ```no_run
/// use dbcache::{CacheStore, Memoized};
///
/// let store = CacheStore::default();
/// let image = Memoized::new(&store, "get_image", &["card", "size"], |(card, size): (String, String)| {
///     format!("https://example.invalid/{}/{}.jpg", size, card)
/// })?;
/// let url = image.call(("Karn".to_string(), "small".to_string()))?;
/// # Ok::<(), dbcache::Error>(())
/// ```
pub struct Memoized<A, R> {
    table: CacheTable,
    body: Body<A, R>,
    _marker: PhantomData<fn(A) -> R>,
}

impl<A, R> Memoized<A, R>
where
    A: CacheArgs + 'static,
    R: CacheReturn + 'static,
{
    /// Register an infallible function under `name`, with one parameter
    /// name per element of `A`.
    pub fn new<F>(store: &CacheStore, name: &str, params: &[&str], f: F) -> Result<Self>
    where
        F: Fn(A) -> R + 'static,
    {
        Self::try_new(store, name, params, move |args: A| Ok::<R, Infallible>(f(args)))
    }

    /// Register a fallible function. Errors are returned as
    /// [`Error::Function`] and never cached.
    pub fn try_new<F, E>(store: &CacheStore, name: &str, params: &[&str], f: F) -> Result<Self>
    where
        F: Fn(A) -> std::result::Result<R, E> + 'static,
        E: Into<BoxError> + 'static,
    {
        let signature = Signature::from_decl(declaration::<A, R>(name, params)?)?;
        let table = CacheTable::register(store, signature)?;
        Ok(Self {
            table,
            body: Box::new(move |args: A| f(args).map_err(Into::into)),
            _marker: PhantomData,
        })
    }

    pub fn signature(&self) -> &Signature {
        self.table.signature()
    }

    pub fn table(&self) -> &CacheTable {
        &self.table
    }

    /// Cached result for `args`, computed and stored on a miss
    pub fn call(&self, args: A) -> Result<R> {
        let key = args.to_values();
        if let Some(hit) = self.table.lookup(&key)? {
            debug!(function = %self.signature().name, "cache hit");
            return R::from_return(hit);
        }
        debug!(function = %self.signature().name, "cache miss");
        self.compute(key, args)
    }

    /// Run the function even if a result is cached, replacing the stored one
    pub fn recompute(&self, args: A) -> Result<R> {
        let key = args.to_values();
        self.compute(key, args)
    }

    fn compute(&self, key: Vec<Value>, args: A) -> Result<R> {
        let result = (self.body)(args).map_err(Error::Function)?;
        self.table.upsert(&key, &result.to_return())?;
        Ok(result)
    }
}

impl<A, R> std::fmt::Debug for Memoized<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memoized").field("table", &self.table).finish_non_exhaustive()
    }
}

/// Build the declaration for a typed function
fn declaration<A: CacheArgs, R: CacheReturn>(name: &str, params: &[&str]) -> Result<FunctionDecl> {
    let types = A::type_decls();
    if types.len() != params.len() {
        return Err(Error::ArityMismatch {
            function: name.to_string(),
            expected: types.len(),
            found: params.len(),
        });
    }

    let mut decl = FunctionDecl::new(name).returns(R::type_decl());
    for (param, ty) in params.iter().zip(types) {
        decl = decl.param(*param, ty);
    }
    Ok(decl)
}
