//! TOML-based configuration for starql.
//!
//! Supports a config file (starql.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [query]
//! dialect = "postgres"
//! safe_labels = true
//! include_cell_count = false
//!
//! [schema]
//! schema = "analytics"
//! fact_prefix = "ft_"
//! dimension_prefix = "dm_"
//! fact_key = "id"
//!
//! [store]
//! path = "${DATA_DIR}/sales.sqlite"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::sql::Dialect;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub query: QuerySettings,
    pub schema: SchemaSettings,
    pub store: StoreSettings,
}

/// Statement generation and browsing defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QuerySettings {
    pub dialect: Dialect,
    /// Label result columns `a0`, `a1`, ... instead of attribute references.
    pub safe_labels: bool,
    pub include_summary: bool,
    pub include_cell_count: bool,
    pub coalesce_measures: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            safe_labels: false,
            include_summary: true,
            include_cell_count: true,
            coalesce_measures: true,
        }
    }
}

/// Naming conventions of the physical star schema.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchemaSettings {
    pub schema: Option<String>,
    /// Schema of dimension tables, `schema` when absent.
    pub dimension_schema: Option<String>,
    pub fact_prefix: String,
    pub fact_suffix: String,
    pub dimension_prefix: String,
    pub dimension_suffix: String,
    pub fact_key: String,
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            schema: None,
            dimension_schema: None,
            fact_prefix: String::new(),
            fact_suffix: String::new(),
            dimension_prefix: String::new(),
            dimension_suffix: String::new(),
            fact_key: "id".to_string(),
        }
    }
}

impl SchemaSettings {
    pub fn fact_table_name(&self, cube: &str) -> String {
        format!("{}{}{}", self.fact_prefix, cube, self.fact_suffix)
    }

    pub fn dimension_table_name(&self, dimension: &str) -> String {
        format!("{}{}{}", self.dimension_prefix, dimension, self.dimension_suffix)
    }
}

/// SQLite execution backend.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Database file; in-memory when absent.
    pub path: Option<String>,
}

impl StoreSettings {
    /// Database path with environment variables expanded.
    pub fn resolved_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.path
            .as_deref()
            .map(|p| expand_env_vars(p).map(PathBuf::from))
            .transpose()
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `STARQL_CONFIG`
    /// 2. `./starql.toml`
    /// 3. `~/.config/starql/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("STARQL_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("starql.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("starql").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.schema.fact_key.is_empty() {
            return Err(SettingsError::InvalidConfig(
                "schema.fact_key should not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.next_if_eq(&'{').is_some() {
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            // $VAR ends at the first non-identifier character
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                var_name.push(ch);
            }
            if var_name.is_empty() {
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
