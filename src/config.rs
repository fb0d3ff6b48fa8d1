use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::signature::{FunctionDecl, ParamDecl};
use crate::storage::{CacheStore, DEFAULT_DB_PATH};
use crate::types::TypeDecl;
use rusqlite::types::Value;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DbcacheConfig {
    pub database: Option<String>,
    pub busy_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionConfig>,
}

/// A cached function declared in the config file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionConfig {
    pub name: String,
    pub returns: Option<TypeDecl>,
    #[serde(default)]
    pub params: Vec<ParamConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Option<TypeDecl>,
    pub default: Option<DefaultValue>,
}

/// A TOML scalar used as a parameter default
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DefaultValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<DefaultValue> for Value {
    fn from(value: DefaultValue) -> Self {
        match value {
            DefaultValue::Bool(b) => Value::Integer(i64::from(b)),
            DefaultValue::Integer(i) => Value::Integer(i),
            DefaultValue::Float(f) => Value::Real(f),
            DefaultValue::Text(s) => Value::Text(s),
        }
    }
}

impl From<FunctionConfig> for FunctionDecl {
    fn from(config: FunctionConfig) -> Self {
        FunctionDecl {
            name: config.name,
            params: config
                .params
                .into_iter()
                .map(|p| ParamDecl {
                    name: p.name,
                    ty: p.ty,
                    default: p.default.map(Value::from),
                })
                .collect(),
            returns: config.returns,
        }
    }
}

impl DbcacheConfig {
    /// Store file from the config, falling back to the default
    pub fn database_path(&self) -> PathBuf {
        self.database
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path)
    }

    /// Store handle for this config; the file is not opened until first use
    pub fn store(&self) -> CacheStore {
        let store = CacheStore::open(self.database_path());
        match self.busy_timeout_ms {
            Some(ms) => store.with_busy_timeout(Duration::from_millis(ms)),
            None => store,
        }
    }

    /// Declarations of every configured function
    pub fn declarations(&self) -> Vec<FunctionDecl> {
        self.functions.iter().cloned().map(FunctionDecl::from).collect()
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("dbcache.toml")
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_PATH)
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<DbcacheConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: DbcacheConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &DbcacheConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Starter config written by `dbcache init`
pub fn sample_config() -> DbcacheConfig {
    DbcacheConfig {
        database: Some(DEFAULT_DB_PATH.to_string()),
        busy_timeout_ms: Some(5_000),
        functions: vec![FunctionConfig {
            name: "get_image".to_string(),
            returns: Some(TypeDecl::text()),
            params: vec![
                ParamConfig {
                    name: "card".to_string(),
                    ty: Some(TypeDecl::text()),
                    default: None,
                },
                ParamConfig {
                    name: "size".to_string(),
                    ty: Some(TypeDecl::text()),
                    default: Some(DefaultValue::Text("small".to_string())),
                },
            ],
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::Signature;
    use crate::Error;

    const SAMPLE: &str = r#"
database = "cache/func.db"
busy_timeout_ms = 250

[[functions]]
name = "get_image"
returns = "str"

[[functions.params]]
name = "card"
type = "str"

[[functions.params]]
name = "size"
type = "str"
default = "small"

[[functions]]
name = "price"
returns = "tuple[float, str | None]"

[[functions.params]]
name = "id"
type = "int"

[[functions.params]]
name = "foil"
type = "bool"
default = false
"#;

    #[test]
    fn test_parse_config() {
        let config: DbcacheConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("cache/func.db"));
        assert_eq!(config.busy_timeout_ms, Some(250));

        let decls = config.declarations();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].params[1].default, Some(Value::Text("small".into())));
        assert_eq!(decls[1].params[1].default, Some(Value::Integer(0)));

        let price = Signature::from_decl(decls[1].clone()).unwrap();
        assert_eq!(price.return_shape.arity(), 2);
    }

    #[test]
    fn test_missing_annotations_survive_parsing() {
        let config: DbcacheConfig = toml::from_str(
            r#"
[[functions]]
name = "f"

[[functions.params]]
name = "x"
"#,
        )
        .unwrap();

        let decl = config.declarations().remove(0);
        assert!(matches!(Signature::from_decl(decl), Err(Error::MissingParameterType(p)) if p == "x"));
    }

    #[test]
    fn test_bad_annotation_is_a_parse_error() {
        let result = toml::from_str::<DbcacheConfig>(
            r#"
[[functions]]
name = "f"
returns = "tuple[int"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_default_database_path() {
        let config = DbcacheConfig::default();
        assert_eq!(config.database_path(), PathBuf::from(".func.db"));
        assert_eq!(config.store().path(), Some(Path::new(".func.db")));
    }

    #[test]
    fn test_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbcache.toml");

        write_config(&path, &sample_config(), false).unwrap();
        assert!(write_config(&path, &sample_config(), false).is_err());
        write_config(&path, &sample_config(), true).unwrap();

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.functions, sample_config().functions);
        assert!(load_config(Some(&dir.path().join("missing.toml"))).unwrap().is_none());
    }
}
