//! dbcache CLI - Inspect persistent function caches

use clap::{Parser, Subcommand};
use dbcache::config::{self, DbcacheConfig};
use dbcache::storage::{Statements, TableDef};
use dbcache::ui;
use dbcache::{CacheStore, Signature, Value};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "dbcache")]
#[command(version)]
#[command(about = "Inspect persistent function caches stored in SQLite")]
#[command(long_about = r#"
dbcache stores the results of memoized functions in one SQLite file,
one table per function. This tool lists and prints those tables and
checks function declarations from dbcache.toml.

Example usage:
  dbcache tables
  dbcache show get_image --limit 5
  dbcache schema --apply
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the store file (overrides the config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List cached functions and their entry counts
    Tables,

    /// Print the cached entries of one function
    Show {
        /// Function (table) name
        function: String,

        /// Maximum number of rows to print
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Validate the functions declared in the config and print their SQL
    Schema {
        /// Also create the tables in the store
        #[arg(long)]
        apply: bool,
    },

    /// Write a starter config file
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let loaded = config::load_config(Some(&config_path))?;

    let mut settings = loaded.clone().unwrap_or_default();
    if let Some(database) = &cli.database {
        settings.database = Some(database.display().to_string());
    }
    let store = settings.store();

    match cli.command {
        Commands::Tables => run_tables(&store),
        Commands::Show { function, limit, json } => run_show(&store, &function, limit, json),
        Commands::Schema { apply } => run_schema(&store, loaded.as_ref(), &config_path, apply),
        Commands::Init { force } => run_init(&config_path, force),
    }
}

/// Inspection never creates a store file
fn require_store(store: &CacheStore) -> anyhow::Result<&Path> {
    match store.path() {
        Some(path) if path.exists() => Ok(path),
        Some(path) => anyhow::bail!("no cache store at {}", path.display()),
        None => anyhow::bail!("no cache store path configured"),
    }
}

fn run_tables(store: &CacheStore) -> anyhow::Result<()> {
    let path = require_store(store)?;
    let tables = store.tables()?;

    ui::header(&format!("Cache store {}", path.display()));
    if tables.is_empty() {
        ui::empty("No cached functions.");
        return Ok(());
    }

    println!("{}", ui::tables_table(&tables));
    let total: usize = tables.iter().map(|t| t.rows).sum();
    ui::summary_row("Functions:", &tables.len().to_string());
    ui::summary_row("Entries:", &total.to_string());
    Ok(())
}

fn run_show(store: &CacheStore, function: &str, limit: usize, json: bool) -> anyhow::Result<()> {
    require_store(store)?;
    if !store.tables()?.iter().any(|t| t.name == function) {
        anyhow::bail!("no cached function named {}", function);
    }

    let columns = store.columns(function)?;
    let rows = store.rows(function, limit)?;
    let total = store.count(function)?;

    if json {
        let records: Vec<serde_json::Value> = rows
            .iter()
            .map(|row| {
                let record: serde_json::Map<String, serde_json::Value> = columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| (column.name.clone(), json_value(value)))
                    .collect();
                serde_json::Value::Object(record)
            })
            .collect();
        let schema: Vec<serde_json::Value> = columns
            .iter()
            .map(|c| {
                serde_json::json!({
                    "name": c.name,
                    "type": c.declared_type,
                    "nullable": !c.not_null,
                    "key": c.primary_key,
                })
            })
            .collect();
        let data = serde_json::json!({
            "function": function,
            "columns": schema,
            "entries": total,
            "rows": records,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    ui::header(function);
    for column in &columns {
        println!("{}", ui::column_line(column));
    }

    ui::section("Entries");
    if rows.is_empty() {
        ui::empty("No entries.");
        return Ok(());
    }
    let header: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
    let cells: Vec<Vec<String>> = rows.iter().map(|row| row.iter().map(ui::cell).collect()).collect();
    println!("{}", ui::grid(&header, &cells));
    if total > rows.len() {
        println!("{}", ui::more(total - rows.len()));
    }
    Ok(())
}

fn run_schema(
    store: &CacheStore,
    config: Option<&DbcacheConfig>,
    config_path: &Path,
    apply: bool,
) -> anyhow::Result<()> {
    let Some(config) = config else {
        anyhow::bail!("no config at {} (run `dbcache init`)", config_path.display());
    };
    if config.functions.is_empty() {
        ui::warn("No functions declared.");
        return Ok(());
    }

    let declarations = config.declarations();
    let count = declarations.len();
    let mut invalid = 0;
    for decl in declarations {
        let name = decl.name.clone();
        let derived = Signature::from_decl(decl)
            .and_then(|signature| TableDef::from_signature(&signature).map(|table| (signature, table)));

        let (signature, table) = match derived {
            Ok(derived) => derived,
            Err(e) => {
                invalid += 1;
                ui::error(&format!("{}: {}", name, e));
                continue;
            }
        };

        ui::section(&signature.to_string());
        let statements = Statements::for_table(&table);
        ui::sql(&table.create_statement());
        ui::sql(&statements.lookup);
        if let Some(clear) = &statements.clear_key {
            ui::sql(clear);
        }
        ui::sql(&statements.upsert);

        if apply {
            store.ensure_table(&table)?;
            ui::success(&format!("Table {} ready", table.name));
        }
    }

    if invalid > 0 {
        anyhow::bail!("{} of {} declarations are invalid", invalid, count);
    }
    Ok(())
}

fn run_init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    let sample = config::sample_config();
    config::write_config(config_path, &sample, force)?;
    config::ensure_db_dir(&sample.database_path())?;

    ui::success(&format!("Wrote {}", config_path.display()));
    ui::info("Store", &sample.database_path().display().to_string());
    Ok(())
}

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Real(r) => serde_json::Value::from(*r),
        Value::Text(s) => serde_json::Value::from(s.as_str()),
        Value::Blob(b) => serde_json::Value::from(b.iter().map(|byte| format!("{:02x}", byte)).collect::<String>()),
    }
}
