//! Value types and their storage mapping
//!
//! A declared type is a small annotation tree ([`TypeDecl`]). Only five base
//! types can be stored, each optionally paired with the absence marker:
//! - `int` -> INTEGER
//! - `float` -> REAL
//! - `str` -> TEXT
//! - `bytes` -> BLOB
//! - `bool` -> INTEGER (0 / 1)
//!
//! Annotations can also be written as strings (`"str | None"`,
//! `"Optional[int]"`, `"tuple[int, str]"`) for declarations that come from
//! configuration files.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Semantic value types that can be cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Integer,
    Real,
    Text,
    Blob,
    Boolean,
}

impl ValueType {
    /// Canonical annotation name
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Integer => "int",
            ValueType::Real => "float",
            ValueType::Text => "str",
            ValueType::Blob => "bytes",
            ValueType::Boolean => "bool",
        }
    }

    /// Look up a base type by any of its accepted spellings
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" | "integer" | "i64" | "i32" => Some(ValueType::Integer),
            "float" | "real" | "f64" => Some(ValueType::Real),
            "str" | "text" | "String" => Some(ValueType::Text),
            "bytes" | "blob" => Some(ValueType::Blob),
            "bool" | "boolean" => Some(ValueType::Boolean),
            _ => None,
        }
    }

    /// Column type this value is stored as
    pub fn storage_type(&self) -> StorageType {
        match self {
            ValueType::Integer | ValueType::Boolean => StorageType::Integer,
            ValueType::Real => StorageType::Real,
            ValueType::Text => StorageType::Text,
            ValueType::Blob => StorageType::Blob,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// SQLite column storage types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    Integer,
    Real,
    Text,
    Blob,
}

impl StorageType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            StorageType::Integer => "INTEGER",
            StorageType::Real => "REAL",
            StorageType::Text => "TEXT",
            StorageType::Blob => "BLOB",
        }
    }

    pub fn nullable_name(&self) -> &'static str {
        match self {
            StorageType::Integer => "INTEGER or NULL",
            StorageType::Real => "REAL or NULL",
            StorageType::Text => "TEXT or NULL",
            StorageType::Blob => "BLOB or NULL",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// A column's storage type plus its nullability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnType {
    pub storage: StorageType,
    pub nullable: bool,
}

impl ColumnType {
    pub fn required(storage: StorageType) -> Self {
        Self { storage, nullable: false }
    }

    pub fn nullable(storage: StorageType) -> Self {
        Self { storage, nullable: true }
    }
}

/// A declared type, as written in a function annotation.
///
/// Declarations are accepted as-is; whether they can be stored is decided by
/// [`map_type`] when a function is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDecl {
    /// One of the supported base types
    Base(ValueType),
    /// The absence marker (`None`)
    None,
    /// Any other named type, kept verbatim for error messages
    Named(String),
    /// Alternatives, e.g. `int | None`
    Union(Vec<TypeDecl>),
    /// Fixed-arity tuple; empty when no element types were given
    Tuple(Vec<TypeDecl>),
}

impl TypeDecl {
    pub fn int() -> Self {
        TypeDecl::Base(ValueType::Integer)
    }

    pub fn float() -> Self {
        TypeDecl::Base(ValueType::Real)
    }

    pub fn text() -> Self {
        TypeDecl::Base(ValueType::Text)
    }

    pub fn bytes() -> Self {
        TypeDecl::Base(ValueType::Blob)
    }

    pub fn boolean() -> Self {
        TypeDecl::Base(ValueType::Boolean)
    }

    /// `inner | None`, without flattening
    pub fn optional(inner: TypeDecl) -> Self {
        TypeDecl::Union(vec![inner, TypeDecl::None])
    }

    /// Build a union the way annotation unions behave: nested unions are
    /// flattened, duplicates dropped, and a single alternative collapses to
    /// itself.
    pub fn union_of(alternatives: impl IntoIterator<Item = TypeDecl>) -> Self {
        let mut flat: Vec<TypeDecl> = Vec::new();
        for alt in alternatives {
            let parts = match alt {
                TypeDecl::Union(inner) => inner,
                other => vec![other],
            };
            for part in parts {
                if !flat.contains(&part) {
                    flat.push(part);
                }
            }
        }
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            TypeDecl::Union(flat)
        }
    }
}

impl fmt::Display for TypeDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDecl::Base(v) => write!(f, "{}", v),
            TypeDecl::None => write!(f, "None"),
            TypeDecl::Named(name) => write!(f, "{}", name),
            TypeDecl::Union(alts) => write!(f, "{}", join(alts, " | ")),
            TypeDecl::Tuple(elems) if elems.is_empty() => write!(f, "tuple"),
            TypeDecl::Tuple(elems) => write!(f, "tuple[{}]", join(elems, ", ")),
        }
    }
}

fn join(decls: &[TypeDecl], sep: &str) -> String {
    decls.iter().map(ToString::to_string).collect::<Vec<_>>().join(sep)
}

/// Map a declared type to its column type.
///
/// Non-optional base types give a NOT NULL column. An optional type must be
/// exactly two alternatives, one of them `None`, the other a base type.
pub fn map_type(decl: &TypeDecl) -> Result<ColumnType> {
    match decl {
        TypeDecl::Base(v) => Ok(ColumnType::required(v.storage_type())),
        TypeDecl::Union(alts) => {
            let inner = match alts.as_slice() {
                [TypeDecl::None, other] | [other, TypeDecl::None] => other,
                _ => return Err(Error::UnsupportedUnion(decl.to_string())),
            };
            match inner {
                TypeDecl::Base(v) => Ok(ColumnType::nullable(v.storage_type())),
                TypeDecl::None | TypeDecl::Union(_) => {
                    Err(Error::UnsupportedUnion(decl.to_string()))
                }
                other => Err(Error::UnsupportedType(other.to_string())),
            }
        }
        TypeDecl::None | TypeDecl::Named(_) | TypeDecl::Tuple(_) => {
            Err(Error::UnsupportedType(decl.to_string()))
        }
    }
}

// ========== Annotation Parsing ==========

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Open,
    Close,
    Comma,
    Pipe,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '[' => tokens.push(Token::Open),
            ']' => tokens.push(Token::Close),
            ',' => tokens.push(Token::Comma),
            '|' => tokens.push(Token::Pipe),
            c if c.is_whitespace() => {}
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' || next == '.' {
                        ident.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(Error::InvalidAnnotation(format!(
                    "unexpected {:?} at {} in {:?}",
                    other, pos, input
                )));
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn error(&self, what: &str) -> Error {
        Error::InvalidAnnotation(format!("{} in {:?}", what, self.source))
    }

    fn union(&mut self) -> Result<TypeDecl> {
        let mut alts = vec![self.primary()?];
        while self.peek() == Some(&Token::Pipe) {
            self.bump();
            alts.push(self.primary()?);
        }
        Ok(if alts.len() == 1 { alts.remove(0) } else { TypeDecl::union_of(alts) })
    }

    fn arguments(&mut self) -> Result<Option<Vec<TypeDecl>>> {
        if self.peek() != Some(&Token::Open) {
            return Ok(None);
        }
        self.bump();

        let mut args = Vec::new();
        if self.peek() == Some(&Token::Close) {
            self.bump();
            return Ok(Some(args));
        }
        loop {
            args.push(self.union()?);
            match self.bump() {
                Some(Token::Comma) => continue,
                Some(Token::Close) => return Ok(Some(args)),
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
    }

    fn primary(&mut self) -> Result<TypeDecl> {
        let name = match self.bump() {
            Some(Token::Ident(name)) => name,
            _ => return Err(self.error("expected a type name")),
        };
        let name = name.strip_prefix("typing.").unwrap_or(&name).to_string();
        let args = self.arguments()?;

        match (name.as_str(), args) {
            ("None" | "NoneType" | "null", None) => Ok(TypeDecl::None),
            ("Optional", Some(mut args)) if args.len() == 1 => {
                Ok(TypeDecl::union_of([args.remove(0), TypeDecl::None]))
            }
            ("Optional", _) => Err(self.error("Optional takes exactly one type")),
            ("Union", Some(args)) if !args.is_empty() => Ok(TypeDecl::union_of(args)),
            ("Union", _) => Err(self.error("Union needs at least one type")),
            ("tuple" | "Tuple", args) => Ok(TypeDecl::Tuple(args.unwrap_or_default())),
            (base, None) => Ok(ValueType::from_name(base)
                .map(TypeDecl::Base)
                .unwrap_or_else(|| TypeDecl::Named(base.to_string()))),
            (other, Some(args)) => Ok(TypeDecl::Named(format!("{}[{}]", other, join(&args, ", ")))),
        }
    }
}

impl FromStr for TypeDecl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parser = Parser {
            source: s,
            tokens: tokenize(s)?,
            pos: 0,
        };
        let decl = parser.union()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("trailing input"));
        }
        Ok(decl)
    }
}

impl Serialize for TypeDecl {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TypeDecl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
