pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{cell, column_line, empty, error, header, info, more, section, sql, success, summary_row, warn};
pub use table::{grid, tables_table};
pub use theme::{theme, Theme};
