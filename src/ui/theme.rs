use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Styles for store inspection output
#[derive(Debug, Clone)]
pub struct Theme {
    pub title: Style,
    pub ok: Style,
    pub failure: Style,
    pub caution: Style,
    pub label: Style,
    /// Primary-key column names
    pub key: Style,
    /// Declared column types
    pub column_type: Style,
    pub null: Style,
    pub blob: Style,
    pub sql: Style,
}

impl Theme {
    /// Colors on a terminal unless `NO_COLOR` is set
    pub fn for_stdout() -> Self {
        let no_color = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
        if no_color || !console::Term::stdout().is_term() {
            Self::plain()
        } else {
            Self::colored()
        }
    }

    pub fn colored() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            ok: Style::new().green().bold(),
            failure: Style::new().red().bold(),
            caution: Style::new().yellow().bold(),
            label: Style::new().white().dimmed(),
            key: Style::new().yellow(),
            column_type: Style::new().blue(),
            null: Style::new().bright_black().italic(),
            blob: Style::new().magenta(),
            sql: Style::new().bright_black(),
        }
    }

    pub fn plain() -> Self {
        let none = Style::new();
        Self {
            title: none,
            ok: none,
            failure: none,
            caution: none,
            label: none,
            key: none,
            column_type: none,
            null: none,
            blob: none,
            sql: none,
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::for_stdout)
}
