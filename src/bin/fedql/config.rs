use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fedql::backing::{MemoryBacking, RestBacking, RestRoute, SqliteBacking, SqliteMode};
use fedql::schema::permissions::ParsePermissionsError;
use fedql::schema::SchemaError;
use fedql::{Backing, BackingError, Catalog, Engine, Permissions, SemanticType, TableSchema};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Engine description read from TOML.
///
/// ```toml
/// permissions = "select"
///
/// [backing]
/// kind = "memory"
///
/// [[tables]]
/// name = "Account"
/// csv = "accounts.csv"
/// fields = [
///     { name = "ID", type = "integer", tag = "primary" },
///     { name = "Email", type = "text", tag = "comment='Not validated'" },
/// ]
/// ```
#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    data: RawConfig,
}

impl CliConfig {
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.clone().or_else(default_config_path);
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            // An explicitly named file has to exist.
            Some(config_path) if explicit.is_some() => {
                return Err(ConfigError::Read {
                    path: config_path.clone(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                })
            }
            _ => RawConfig::default(),
        };
        Ok(Self { path, data })
    }

    pub fn from_toml(contents: &str, base: &Path) -> Result<Self, ConfigError> {
        let data = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: base.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: Some(base.join("config.toml")),
            data,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn resolve(&self, relative: &Path) -> PathBuf {
        match self.path.as_ref().and_then(|p| p.parent()) {
            Some(base) if relative.is_relative() => base.join(relative),
            _ => relative.to_path_buf(),
        }
    }

    pub fn permissions(&self) -> Result<Permissions, ConfigError> {
        match self.data.permissions.as_deref() {
            Some(raw) => raw
                .parse()
                .map_err(|source| ConfigError::Permissions { source }),
            None => Ok(Permissions::NONE),
        }
    }

    pub fn catalog(&self) -> Result<Catalog, ConfigError> {
        let schemas = self.data.tables.iter().map(|table| {
            table
                .fields
                .iter()
                .fold(TableSchema::new(&table.name), |schema, field| {
                    schema.field(&field.name, field.ty, &field.tag)
                })
        });
        Ok(Catalog::from_schemas(schemas)?)
    }

    /// Builds an engine; `permissions` overrides the configured set.
    pub fn build_engine(&self, permissions: Option<Permissions>) -> Result<Engine, ConfigError> {
        let catalog = Arc::new(self.catalog()?);
        let backing = self.backing(&catalog)?;
        let mut engine = Engine::new(catalog);
        engine.set_permissions(match permissions {
            Some(permissions) => permissions,
            None => self.permissions()?,
        });
        engine.set_backing(backing);
        Ok(engine)
    }

    fn backing(&self, catalog: &Arc<Catalog>) -> Result<Arc<dyn Backing>, ConfigError> {
        let section = &self.data.backing;
        let backing: Arc<dyn Backing> = match section.kind {
            BackingKind::Memory => {
                let backing = MemoryBacking::new(Arc::clone(catalog));
                for table in &self.data.tables {
                    if let Some(csv) = &table.csv {
                        let name = TableSchema::new(&table.name).table_name();
                        let rows = backing.load_csv(&name, &self.resolve(csv))?;
                        debug!(table = %name, rows, "cli.config.csv_loaded");
                    }
                }
                Arc::new(backing)
            }
            BackingKind::Sqlite => {
                let path = section
                    .path
                    .as_ref()
                    .ok_or(ConfigError::MissingDatabasePath)?;
                let mode = if section.pass_through {
                    SqliteMode::PassThrough
                } else {
                    SqliteMode::Populate
                };
                let backing = SqliteBacking::open(&self.resolve(path), mode)?;
                if section.create_schema {
                    backing.create_schema(catalog)?;
                }
                Arc::new(backing)
            }
            BackingKind::Rest => {
                let backing = RestBacking::with_timeout(
                    Arc::clone(catalog),
                    Duration::from_secs(section.timeout_secs.unwrap_or(30)),
                );
                for table in &self.data.tables {
                    if let Some(rest) = &table.rest {
                        let mut route = RestRoute::new(&rest.url);
                        route.headers = rest
                            .headers
                            .iter()
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect();
                        route.pointer = rest.pointer.clone();
                        backing.get(&TableSchema::new(&table.name).table_name(), route)?;
                    }
                }
                Arc::new(backing)
            }
        };
        Ok(backing)
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawConfig {
    #[serde(default)]
    permissions: Option<String>,
    #[serde(default)]
    backing: BackingSection,
    #[serde(default)]
    tables: Vec<TableSection>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
enum BackingKind {
    #[default]
    Memory,
    Sqlite,
    Rest,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct BackingSection {
    #[serde(default)]
    kind: BackingKind,
    path: Option<PathBuf>,
    #[serde(default)]
    pass_through: bool,
    #[serde(default)]
    create_schema: bool,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
struct TableSection {
    name: String,
    #[serde(default)]
    fields: Vec<FieldSection>,
    csv: Option<PathBuf>,
    rest: Option<RestSection>,
}

#[derive(Debug, Deserialize, Serialize)]
struct FieldSection {
    name: String,
    #[serde(rename = "type")]
    ty: SemanticType,
    #[serde(default)]
    tag: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct RestSection {
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    pointer: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid permissions: {source}")]
    Permissions { source: ParsePermissionsError },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("backing: {0}")]
    Backing(#[from] BackingError),
    #[error("sqlite backing requires `path`")]
    MissingDatabasePath,
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("fedql").join("config.toml"))
}
