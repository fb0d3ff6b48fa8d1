//! Lookup and upsert statements for a cache table

use super::schema::{quote_ident, ColumnSpec, TableDef};

/// SQL templates for one cache table, built once at registration.
///
/// Placeholders are numbered in table column order: `?1 ..` for the key in
/// `lookup` and `clear_key`, `?1 ..` for the whole row in `upsert`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statements {
    /// Select the return columns for one key
    pub lookup: String,
    /// Insert a full row, replacing any row with the same primary key
    pub upsert: String,
    /// Delete the row for one key; only for tables where the primary key
    /// cannot detect the conflict by itself
    pub clear_key: Option<String>,
}

impl Statements {
    pub fn for_table(table: &TableDef) -> Self {
        let name = quote_ident(&table.name);
        let predicate = key_predicate(table.key_columns());

        let returns: Vec<String> = table.return_columns().iter().map(|c| quote_ident(&c.name)).collect();
        let lookup = format!("SELECT {} FROM {}{}", returns.join(", "), name, predicate);

        let columns: Vec<String> = table.columns.iter().map(|c| quote_ident(&c.name)).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let upsert = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            name,
            columns.join(", "),
            placeholders.join(", ")
        );

        let clear_key = table
            .needs_key_clear()
            .then(|| format!("DELETE FROM {}{}", name, predicate));

        Self { lookup, upsert, clear_key }
    }
}

/// ` WHERE a = ?1 AND b IS ?2`; nullable columns compare with IS so that a
/// NULL argument matches a stored NULL.
fn key_predicate(key: &[ColumnSpec]) -> String {
    if key.is_empty() {
        return String::new();
    }
    let terms: Vec<String> = key
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let op = if c.nullable { "IS" } else { "=" };
            format!("{} {} ?{}", quote_ident(&c.name), op, i + 1)
        })
        .collect();
    format!(" WHERE {}", terms.join(" AND "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{FunctionDecl, Signature};
    use crate::types::TypeDecl;

    fn statements(decl: FunctionDecl) -> Statements {
        let sig = Signature::from_decl(decl).unwrap();
        Statements::for_table(&TableDef::from_signature(&sig).unwrap())
    }

    #[test]
    fn test_scalar_statements() {
        let stmts = statements(
            FunctionDecl::new("get_image")
                .param("card", TypeDecl::text())
                .param("size", TypeDecl::text())
                .returns(TypeDecl::text()),
        );

        assert_eq!(
            stmts.lookup,
            r#"SELECT "return" FROM "get_image" WHERE "card" = ?1 AND "size" = ?2"#
        );
        assert_eq!(
            stmts.upsert,
            r#"INSERT OR REPLACE INTO "get_image" ("card", "size", "return") VALUES (?1, ?2, ?3)"#
        );
        assert_eq!(stmts.clear_key, None);
    }

    #[test]
    fn test_tuple_statements() {
        let stmts = statements(
            FunctionDecl::new("pair")
                .param("id", TypeDecl::int())
                .returns(TypeDecl::Tuple(vec![TypeDecl::int(), TypeDecl::text()])),
        );
        assert_eq!(stmts.lookup, r#"SELECT "return_0", "return_1" FROM "pair" WHERE "id" = ?1"#);
        assert!(stmts.upsert.ends_with("VALUES (?1, ?2, ?3)"));
    }

    #[test]
    fn test_nullable_key_uses_is() {
        let stmts = statements(
            FunctionDecl::new("f")
                .param("a", TypeDecl::int())
                .param("b", TypeDecl::optional(TypeDecl::text()))
                .returns(TypeDecl::int()),
        );
        assert!(stmts.lookup.ends_with(r#"WHERE "a" = ?1 AND "b" IS ?2"#));
        assert_eq!(
            stmts.clear_key.as_deref(),
            Some(r#"DELETE FROM "f" WHERE "a" = ?1 AND "b" IS ?2"#)
        );
    }

    #[test]
    fn test_no_parameters() {
        let stmts = statements(FunctionDecl::new("now").returns(TypeDecl::int()));
        assert_eq!(stmts.lookup, r#"SELECT "return" FROM "now""#);
        assert_eq!(stmts.clear_key.as_deref(), Some(r#"DELETE FROM "now""#));
    }
}
