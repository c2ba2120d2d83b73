//! Top-level entry point tying the catalog, permission set and backing
//! together.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::backing::{Backing, CancelToken};
use crate::error::{Error, Result};
use crate::query::errors::QueryError;
use crate::query::executor::Executor;
use crate::query::result::ResultRows;
use crate::query::sql::{expand_wildcards, parse_statement, translate};
use crate::query::validator::{validate, Validated};
use crate::schema::ddl::render_catalog;
use crate::schema::permissions::Permissions;
use crate::schema::Catalog;

/// Output of [`Engine::command`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandOutput {
    /// Rendered `CREATE TABLE` statements.
    Schema(String),
    /// Table names in order.
    Tables(Vec<String>),
    /// Rows of a SQL statement.
    Rows(ResultRows),
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutput::Schema(ddl) => f.write_str(ddl),
            CommandOutput::Tables(names) => f.write_str(&names.join("\n")),
            CommandOutput::Rows(rows) => write!(f, "{rows}"),
        }
    }
}

/// Federated query engine over one catalog.
///
/// Permissions default to deny-all. `execute` takes `&self`; the catalog is
/// never written after construction, so one engine can serve many threads.
///
/// ```
/// use std::sync::Arc;
/// use fedql::backing::MemoryBacking;
/// use fedql::{Catalog, Engine, Permissions, SemanticType, TableSchema};
///
/// let catalog = Arc::new(Catalog::from_schemas([TableSchema::new("Account")
///     .field("ID", SemanticType::Integer, "primary")
///     .field("Age", SemanticType::Integer, "")])?);
/// let backing = Arc::new(MemoryBacking::new(Arc::clone(&catalog)));
/// backing.insert_rows("accounts", vec![vec![1.into(), 30.into()]])?;
///
/// let mut engine = Engine::new(catalog);
/// engine.set_permissions(Permissions::SELECT);
/// engine.set_backing(backing);
/// let rows = engine.execute("select age from accounts where id = 1")?;
/// assert_eq!(rows.to_string(), "30");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Engine {
    catalog: Arc<Catalog>,
    permissions: Permissions,
    backing: Option<Arc<dyn Backing>>,
}

impl Engine {
    /// Engine with no permissions and no backing.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            permissions: Permissions::NONE,
            backing: None,
        }
    }

    /// Replaces the permission set.
    pub fn set_permissions(&mut self, permissions: Permissions) {
        self.permissions = permissions;
    }

    /// Current permission set.
    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    /// Installs the backing that supplies rows.
    pub fn set_backing(&mut self, backing: Arc<dyn Backing>) {
        self.backing = Some(backing);
    }

    /// Shared catalog.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Executes one statement.
    pub fn execute(&self, sql: &str) -> Result<ResultRows> {
        self.execute_with(sql, &CancelToken::new())
    }

    /// Executes one statement, aborting with `Cancelled` once `cancel` fires.
    pub fn execute_with(&self, sql: &str, cancel: &CancelToken) -> Result<ResultRows> {
        let mut parsed = parse_statement(sql)?;
        let statement = translate(&parsed)?;
        let validated = validate(&statement, &self.catalog, self.permissions)?;
        let backing = self.backing.as_ref().ok_or(Error::NoBacking)?;

        let rows = if backing.pass_through() {
            expand_wildcards(&mut parsed, &self.catalog)?;
            let text = parsed.to_string();
            debug!(sql = %text, "engine.pass_through");
            backing.execute_raw(&text, cancel)?
        } else {
            match validated {
                Validated::Query(plan) => Executor::new(backing.as_ref(), cancel).execute(&plan)?,
                Validated::Mutation { kind, table } => {
                    return Err(QueryError::unsupported(format!(
                        "{kind} on '{table}' needs a pass-through backing"
                    ))
                    .into())
                }
            }
        };
        debug!(rows = rows.len(), "engine.execute.completed");
        Ok(rows)
    }

    /// Runs a dot command (`.schema`, `.tables`) or a SQL statement.
    pub fn command(&self, input: &str) -> Result<CommandOutput> {
        let input = input.trim();
        match input {
            ".schema" => Ok(CommandOutput::Schema(render_catalog(&self.catalog))),
            ".tables" => Ok(CommandOutput::Tables(
                self.catalog.tables().map(|t| t.name.clone()).collect(),
            )),
            other if other.starts_with('.') => {
                Err(Error::Parse(format!("unknown command '{other}'")))
            }
            sql => self.execute(sql).map(CommandOutput::Rows),
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("tables", &self.catalog.len())
            .field("permissions", &self.permissions)
            .field("backing", &self.backing.is_some())
            .finish()
    }
}
