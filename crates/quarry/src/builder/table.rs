use super::QueryBuilder;
use crate::grammar::Dialect;
use crate::scope::Scope;
use std::fmt;
use std::sync::Arc;

/// Table metadata: name, primary key, connection and global scopes.
///
/// Builders created from a `Table` carry all of it, so call sites never
/// repeat the soft-delete or timestamp setup.
///
/// # Example
///
/// ```rust
/// use quarry::{Dialect, SoftDelete, Table};
///
/// let users = Table::new("users")
///     .dialect(Dialect::MySql)
///     .with_scope(SoftDelete::new());
///
/// let sql = users.query().where_eq("id", 1).to_sql().unwrap();
/// assert_eq!(
///     sql,
///     "SELECT * FROM `users` WHERE `users`.`id` = '1' AND `users`.`deleted_at` IS NULL"
/// );
/// ```
#[derive(Clone)]
pub struct Table {
    name: String,
    primary_key: String,
    connection: Option<String>,
    dialect: Dialect,
    scopes: Vec<Arc<dyn Scope>>,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("primary_key", &self.primary_key)
            .field("connection", &self.connection)
            .field("dialect", &self.dialect)
            .field(
                "scopes",
                &self.scopes.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: "id".to_string(),
            connection: None,
            dialect: Dialect::default(),
            scopes: Vec::new(),
        }
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn on_connection(mut self, name: impl Into<String>) -> Self {
        self.connection = Some(name.into());
        self
    }

    /// Dialect for [`Table::query`]; builders from
    /// [`Database::query_table`](crate::Database::query_table) take the
    /// connection's dialect instead.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_scope(mut self, scope: impl Scope + 'static) -> Self {
        self.scopes.push(Arc::new(scope));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.primary_key
    }

    pub fn connection_name(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    /// A fresh builder bound to this table.
    pub fn query(&self) -> QueryBuilder {
        self.apply(QueryBuilder::table(self.dialect, &self.name))
    }

    pub(crate) fn apply(&self, query: QueryBuilder) -> QueryBuilder {
        let mut query = query.primary_key(self.primary_key.clone());
        if let Some(connection) = &self.connection {
            query = query.on_connection(connection.clone());
        }
        self.scopes
            .iter()
            .fold(query, |query, scope| query.with_scope(scope.as_ref()))
    }
}

/// Factory for a builder bound to `table`.
pub fn new_query(table: &Table) -> QueryBuilder {
    table.query()
}
