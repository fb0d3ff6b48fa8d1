//! Table definitions derived from signatures

use rusqlite::types::Value;

use crate::signature::Signature;
use crate::types::{map_type, StorageType};
use crate::{Error, Result};

/// Quote an identifier for use in SQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// One column of a cache table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub storage: StorageType,
    pub nullable: bool,
}

impl ColumnSpec {
    /// Column definition as it appears in CREATE TABLE
    pub fn definition(&self) -> String {
        self.definition_as(self.storage.as_sql())
    }

    fn definition_as(&self, declared_type: &str) -> String {
        let mut def = format!("{} {}", quote_ident(&self.name), declared_type);
        if !self.nullable {
            def.push_str(" NOT NULL");
        }
        def
    }

    /// Check that `value` can be stored here as is.
    ///
    /// NaN is rejected: SQLite binds it as NULL.
    pub fn check(&self, value: &Value) -> Result<()> {
        let fits = match (self.storage, value) {
            (_, Value::Null) => self.nullable,
            (StorageType::Real, Value::Real(r)) => !r.is_nan(),
            (StorageType::Real, Value::Integer(_)) => true,
            (StorageType::Integer, Value::Integer(_)) => true,
            (StorageType::Text, Value::Text(_)) => true,
            (StorageType::Blob, Value::Blob(_)) => true,
            _ => false,
        };
        if fits {
            return Ok(());
        }
        Err(Error::ValueMismatch {
            column: self.name.clone(),
            expected: if self.nullable { self.storage.nullable_name() } else { self.storage.as_sql() },
            found: match value {
                Value::Real(r) if r.is_nan() => "NaN".to_string(),
                other => other.data_type().to_string(),
            },
        })
    }
}

/// The table backing one cached function.
///
/// Parameter columns come first and make up the primary key; return
/// columns follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    key_len: usize,
}

impl TableDef {
    /// Map every parameter and return component to a column
    pub fn from_signature(signature: &Signature) -> Result<Self> {
        let mut columns = Vec::with_capacity(signature.parameters.len() + signature.return_shape.arity());

        for param in &signature.parameters {
            let column = map_type(&param.ty)?;
            columns.push(ColumnSpec {
                name: param.name.clone(),
                storage: column.storage,
                nullable: column.nullable,
            });
        }

        let names = signature.return_shape.column_names();
        for (name, ty) in names.into_iter().zip(signature.return_shape.types()) {
            let column = map_type(ty)?;
            columns.push(ColumnSpec {
                name,
                storage: column.storage,
                nullable: column.nullable,
            });
        }

        Ok(Self {
            name: signature.name.clone(),
            columns,
            key_len: signature.parameters.len(),
        })
    }

    pub fn key_columns(&self) -> &[ColumnSpec] {
        &self.columns[..self.key_len]
    }

    pub fn return_columns(&self) -> &[ColumnSpec] {
        &self.columns[self.key_len..]
    }

    /// SQLite treats NULLs in a primary key as distinct, so such keys (and
    /// the empty key) cannot rely on INSERT OR REPLACE alone.
    pub fn needs_key_clear(&self) -> bool {
        self.key_len == 0 || self.key_columns().iter().any(|c| c.nullable)
    }

    /// Check a row (or a key prefix of one) against the column types
    pub fn check_values(&self, values: &[Value]) -> Result<()> {
        self.columns.iter().zip(values).try_for_each(|(column, value)| column.check(value))
    }

    /// CREATE TABLE IF NOT EXISTS statement for this table.
    ///
    /// A lone INTEGER primary key column would alias the rowid, which
    /// replaces NULL keys with fresh row numbers; such a column is declared
    /// `INT` instead (same affinity).
    pub fn create_statement(&self) -> String {
        let rowid_alias = self.key_len == 1 && self.columns[0].storage == StorageType::Integer;
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| match i {
                0 if rowid_alias => column.definition_as("INT"),
                _ => column.definition(),
            })
            .collect();
        if self.key_len > 0 {
            let key: Vec<String> = self.key_columns().iter().map(|c| quote_ident(&c.name)).collect();
            parts.push(format!("PRIMARY KEY({})", key.join(", ")));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&self.name),
            parts.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::FunctionDecl;
    use crate::types::TypeDecl;
    use crate::Error;

    fn table_for(decl: FunctionDecl) -> Result<TableDef> {
        TableDef::from_signature(&Signature::from_decl(decl)?)
    }

    #[test]
    fn test_scalar_table() {
        let table = table_for(
            FunctionDecl::new("get_image")
                .param("card", TypeDecl::text())
                .param("size", TypeDecl::text())
                .returns(TypeDecl::text()),
        )
        .unwrap();

        assert_eq!(table.key_columns().len(), 2);
        assert_eq!(table.return_columns()[0].name, "return");
        assert_eq!(
            table.create_statement(),
            r#"CREATE TABLE IF NOT EXISTS "get_image" ("card" TEXT NOT NULL, "size" TEXT NOT NULL, "return" TEXT NOT NULL, PRIMARY KEY("card", "size"))"#
        );
        assert!(!table.needs_key_clear());
    }

    #[test]
    fn test_tuple_and_optional_columns() {
        let table = table_for(
            FunctionDecl::new("stats")
                .param("id", TypeDecl::int())
                .param("flag", TypeDecl::optional(TypeDecl::boolean()))
                .returns(TypeDecl::Tuple(vec![TypeDecl::float(), TypeDecl::optional(TypeDecl::bytes())])),
        )
        .unwrap();

        let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "flag", "return_0", "return_1"]);
        assert_eq!(table.columns[1].definition(), r#""flag" INTEGER"#);
        assert_eq!(table.columns[2].definition(), r#""return_0" REAL NOT NULL"#);
        assert_eq!(table.columns[3].definition(), r#""return_1" BLOB"#);
        assert!(table.needs_key_clear());
    }

    #[test]
    fn test_no_parameters_has_no_primary_key() {
        let table = table_for(FunctionDecl::new("now").returns(TypeDecl::int())).unwrap();
        assert!(!table.create_statement().contains("PRIMARY KEY"));
        assert!(table.needs_key_clear());
    }

    #[test]
    fn test_unsupported_column_types() {
        let three_way = "int | str | None".parse().unwrap();
        let err = table_for(FunctionDecl::new("f").param("x", three_way).returns(TypeDecl::int()));
        assert!(matches!(err, Err(Error::UnsupportedUnion(_))));

        let err = table_for(
            FunctionDecl::new("f")
                .param("x", TypeDecl::int())
                .returns(TypeDecl::Tuple(vec![TypeDecl::int(), TypeDecl::Named("list[str]".into())])),
        );
        assert!(matches!(err, Err(Error::UnsupportedType(_))));
    }

    #[test]
    fn test_single_integer_key_is_not_a_rowid_alias() {
        let table = table_for(
            FunctionDecl::new("label")
                .param("n", TypeDecl::optional(TypeDecl::int()))
                .returns(TypeDecl::text()),
        )
        .unwrap();
        assert_eq!(
            table.create_statement(),
            r#"CREATE TABLE IF NOT EXISTS "label" ("n" INT, "return" TEXT NOT NULL, PRIMARY KEY("n"))"#
        );

        let pair = table_for(
            FunctionDecl::new("pair")
                .param("a", TypeDecl::int())
                .param("b", TypeDecl::int())
                .returns(TypeDecl::int()),
        )
        .unwrap();
        assert!(pair.create_statement().contains(r#""a" INTEGER NOT NULL"#));
    }

    #[test]
    fn test_check_values() {
        let table = table_for(
            FunctionDecl::new("scale")
                .param("x", TypeDecl::float())
                .param("tag", TypeDecl::optional(TypeDecl::text()))
                .returns(TypeDecl::bytes()),
        )
        .unwrap();

        table.check_values(&[Value::Real(1.5), Value::Null, Value::Blob(vec![1])]).unwrap();
        table.check_values(&[Value::Integer(2)]).unwrap();

        assert!(matches!(
            table.check_values(&[Value::Text("1.5".into())]),
            Err(Error::ValueMismatch { column, expected: "REAL", .. }) if column == "x"
        ));
        assert!(matches!(
            table.check_values(&[Value::Real(f64::NAN)]),
            Err(Error::ValueMismatch { found, .. }) if found == "NaN"
        ));
        assert!(matches!(
            table.check_values(&[Value::Real(0.0), Value::Null, Value::Null]),
            Err(Error::ValueMismatch { column, .. }) if column == "return"
        ));
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
