use crate::storage::TableInfo;
use tabled::{builder::Builder, settings::Style, Table, Tabled};

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Function")]
    pub function: String,
    #[tabled(rename = "Entries")]
    pub entries: usize,
}

/// One row per cache table
pub fn tables_table(tables: &[TableInfo]) -> String {
    if tables.is_empty() {
        return String::new();
    }

    let rows: Vec<TableRow> = tables
        .iter()
        .map(|t| TableRow {
            function: t.name.clone(),
            entries: t.rows,
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// A free-form grid with a header row
pub fn grid(header: &[String], rows: &[Vec<String>]) -> String {
    let mut builder = Builder::default();
    builder.push_record(header.iter().cloned());
    for row in rows {
        builder.push_record(row.iter().cloned());
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_table_lists_entries() {
        let rendered = tables_table(&[TableInfo {
            name: "get_image".into(),
            rows: 3,
        }]);
        assert!(rendered.contains("Function"));
        assert!(rendered.contains("get_image"));
        assert!(rendered.contains('3'));
        assert!(tables_table(&[]).is_empty());
    }

    #[test]
    fn test_grid_has_header_and_rows() {
        let rendered = grid(
            &["card".to_string(), "return".to_string()],
            &[vec!["Karn".to_string(), "https://img".to_string()]],
        );
        assert!(rendered.contains("card"));
        assert!(rendered.contains("Karn"));
    }
}
