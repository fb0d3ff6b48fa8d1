use owo_colors::OwoColorize;
use rusqlite::types::Value;

use crate::storage::ColumnInfo;
use crate::ui::{theme, Icons};

/// Longest text cell shown before truncation
const TEXT_WIDTH: usize = 60;

pub fn header(text: &str) {
    println!("{} {}", Icons::DATABASE, text.style(theme().title));
}

pub fn section(title: &str) {
    println!("\n{}", title.style(theme().title));
}

pub fn success(message: &str) {
    println!("{} {}", Icons::CHECK, message.style(theme().ok));
}

pub fn error(message: &str) {
    eprintln!("{} {}", Icons::CROSS, message.style(theme().failure));
}

pub fn warn(message: &str) {
    eprintln!("{} {}", Icons::WARN, message.style(theme().caution));
}

pub fn info(label: &str, value: &str) {
    println!("{} {}: {}", Icons::INFO, label.style(theme().label), value);
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().label), value);
}

pub fn empty(message: &str) {
    println!("{} {}", Icons::EMPTY, message.style(theme().label));
}

/// Print one generated SQL statement
pub fn sql(statement: &str) {
    println!("{};", statement.style(theme().sql));
}

/// `🔑 card  TEXT` style description of a stored column
pub fn column_line(column: &ColumnInfo) -> String {
    let (icon, name) = if column.primary_key {
        (Icons::KEY, column.name.style(theme().key).to_string())
    } else {
        (" ", column.name.clone())
    };
    let nullability = if column.not_null { "" } else { " NULL" };
    format!(
        "  {} {} {}{}",
        icon,
        name,
        column.declared_type.style(theme().column_type),
        nullability.style(theme().null)
    )
}

/// Render a stored value for a table cell
pub fn cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".style(theme().null).to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Text(s) if s.chars().count() > TEXT_WIDTH => {
            format!("{}…", s.chars().take(TEXT_WIDTH - 1).collect::<String>())
        }
        Value::Text(s) => s.clone(),
        Value::Blob(b) => format!("<{} bytes>", b.len()).style(theme().blob).to_string(),
    }
}

/// Text shown after a truncated listing
pub fn more(hidden: usize) -> String {
    format!("… {} more", hidden).style(theme().label).to_string()
}
