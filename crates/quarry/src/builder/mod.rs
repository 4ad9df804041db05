//! Fluent, dialect-independent query builder.
//!
//! A [`QueryBuilder`] accumulates expression nodes in call order. Nothing is
//! rendered until one of the compile entry points runs:
//!
//! - [`QueryBuilder::to_sql`]: literal SQL for logs and assertions
//! - [`QueryBuilder::to_qmark`]: `?` SQL plus ordered bindings
//!
//! Both are pure. Global scopes are applied to a clone right before
//! rendering, so compiling twice gives the same result and the builder can be
//! reused as a template (clone it, or call [`QueryBuilder::reset`]).
//!
//! Builder methods never fail. The first invalid input (unknown operator,
//! mismatched raw bindings, unknown macro) is recorded and returned by every
//! compile and execute entry point before any rendering or I/O.

mod conditions;
mod execute;
mod mutation;
mod table;

#[cfg(test)]
mod tests;

pub use table::{new_query, Table};

use crate::error::{QuarryError, QuarryResult};
use crate::expr::{
    parse_operator, split_alias, Aggregate, AggregateExpr, Connector, Direction, GroupByExpr,
    HavingExpr, HavingKind, JoinClause, JoinKind, Lock, OrderByExpr, SelectExpr, UpdateExpr,
    WhereExpr,
};
use crate::grammar::{self, Action, CompiledQuery, Dialect, Mode};
use crate::row::Row;
use crate::scope::{MacroFn, MacroTable, Scope, ScopeTable};
use crate::value::Value;
use std::sync::Arc;
use std::time::Duration;

/// Mutable query accumulator.
#[derive(Clone, Debug)]
pub struct QueryBuilder {
    /// Dialect used by `to_sql`/`to_qmark`; execution uses the executor's
    pub(crate) dialect: Dialect,
    /// Base table (without prefix)
    pub(crate) table: String,
    /// Optional alias from `"table as alias"`
    pub(crate) alias: Option<String>,
    /// Table prefix of the connection
    pub(crate) prefix: String,
    /// Logical connection name; `None` means the default connection
    pub(crate) connection: Option<String>,
    pub(crate) primary_key: String,
    /// Statement kind `to_sql`/`to_qmark` compile
    pub(crate) action: Action,

    pub(crate) columns: Vec<SelectExpr>,
    pub(crate) distinct: bool,
    pub(crate) aggregates: Vec<AggregateExpr>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) wheres: Vec<WhereExpr>,
    pub(crate) groups: Vec<GroupByExpr>,
    pub(crate) havings: Vec<HavingExpr>,
    pub(crate) orders: Vec<OrderByExpr>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) lock: Option<Lock>,
    pub(crate) updates: Vec<UpdateExpr>,
    pub(crate) inserts: Vec<Row>,

    /// Global scopes, keyed by (action, name)
    pub(crate) scopes: ScopeTable,
    /// Local scopes, run only through `call_scope`
    pub(crate) local_scopes: MacroTable,
    pub(crate) macros: MacroTable,

    pub(crate) allow_delete_all: bool,
    pub(crate) timeout: Option<Duration>,
    /// First builder error, surfaced at compile/execute time
    pub(crate) build_error: Option<QuarryError>,
}

impl QueryBuilder {
    /// An empty builder; set the table with [`QueryBuilder::from`].
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            table: String::new(),
            alias: None,
            prefix: String::new(),
            connection: None,
            primary_key: "id".to_string(),
            action: Action::Select,
            columns: Vec::new(),
            distinct: false,
            aggregates: Vec::new(),
            joins: Vec::new(),
            wheres: Vec::new(),
            groups: Vec::new(),
            havings: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
            lock: None,
            updates: Vec::new(),
            inserts: Vec::new(),
            scopes: ScopeTable::new(),
            local_scopes: MacroTable::new(),
            macros: MacroTable::new(),
            allow_delete_all: false,
            timeout: None,
            build_error: None,
        }
    }

    /// Builder over `table` (`"users"` or `"users as u"`).
    pub fn table(dialect: Dialect, table: &str) -> Self {
        Self::new(dialect).from(table)
    }

    pub fn from(mut self, table: &str) -> Self {
        let (table, alias) = split_alias(table);
        self.table = table;
        self.alias = alias;
        self
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Route execution to a named connection instead of the default one.
    pub fn on_connection(mut self, name: impl Into<String>) -> Self {
        self.connection = Some(name.into());
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn connection_name(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    pub fn current_action(&self) -> Action {
        self.action
    }

    pub fn current_dialect(&self) -> Dialect {
        self.dialect
    }

    /// Record the first error; later ones are dropped.
    pub(crate) fn fail(&mut self, err: QuarryError) {
        if self.build_error.is_none() {
            self.build_error = Some(err);
        }
    }

    pub(crate) fn push_where(&mut self, expr: WhereExpr) {
        self.wheres.push(expr);
    }

    pub(crate) fn push_update(&mut self, update: UpdateExpr) {
        self.updates.push(update);
    }

    pub(crate) fn set_action(&mut self, action: Action) {
        self.action = action;
    }

    // ---------------------------------------------------------------
    // Select list
    // ---------------------------------------------------------------

    /// Replace the select list. Entries may carry aliases (`"name as n"`).
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.columns = columns
            .into_iter()
            .map(|c| SelectExpr::column(c.as_ref()))
            .collect();
        self
    }

    pub fn add_select(mut self, column: &str) -> Self {
        self.columns.push(SelectExpr::column(column));
        self
    }

    /// Raw select-list entry, rendered verbatim.
    pub fn select_raw(mut self, sql: impl Into<String>) -> Self {
        self.columns.push(SelectExpr::raw(sql));
        self
    }

    /// `(SELECT ...) AS alias` in the select list.
    pub fn add_select_sub(mut self, sub: QueryBuilder, alias: impl Into<String>) -> Self {
        if let Some(sub) = self.attach_sub(sub) {
            self.columns.push(SelectExpr::subquery(sub, alias));
        }
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    // ---------------------------------------------------------------
    // Chainable aggregates (see `fetch_*` for the executing forms)
    // ---------------------------------------------------------------

    pub fn aggregate(mut self, function: Aggregate, column: &str) -> Self {
        self.aggregates.push(AggregateExpr::new(function, column));
        self
    }

    /// `COUNT(column)`; pass `"*"` for a row count.
    pub fn count(self, column: &str) -> Self {
        self.aggregate(Aggregate::Count, column)
    }

    pub fn sum(self, column: &str) -> Self {
        self.aggregate(Aggregate::Sum, column)
    }

    pub fn avg(self, column: &str) -> Self {
        self.aggregate(Aggregate::Avg, column)
    }

    pub fn min(self, column: &str) -> Self {
        self.aggregate(Aggregate::Min, column)
    }

    pub fn max(self, column: &str) -> Self {
        self.aggregate(Aggregate::Max, column)
    }

    // ---------------------------------------------------------------
    // Joins
    // ---------------------------------------------------------------

    fn join_kind(mut self, kind: JoinKind, table: &str, left: &str, op: &str, right: &str) -> Self {
        match parse_operator(op) {
            Ok(op) => self
                .joins
                .push(JoinClause::new(table, kind).on(left, op, right)),
            Err(e) => self.fail(e),
        }
        self
    }

    /// `INNER JOIN table ON left op right`
    pub fn join(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.join_kind(JoinKind::Inner, table, left, op, right)
    }

    pub fn left_join(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.join_kind(JoinKind::Left, table, left, op, right)
    }

    pub fn right_join(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.join_kind(JoinKind::Right, table, left, op, right)
    }

    /// Add a pre-built join.
    pub fn join_with(mut self, join: JoinClause) -> Self {
        self.joins.push(join);
        self
    }

    /// Build a multi-condition join in a callback.
    pub fn join_using<F>(self, table: &str, kind: JoinKind, build: F) -> Self
    where
        F: FnOnce(JoinClause) -> JoinClause,
    {
        let join = build(JoinClause::new(table, kind));
        self.join_with(join)
    }

    // ---------------------------------------------------------------
    // Grouping and ordering
    // ---------------------------------------------------------------

    /// `"name desc, email"` shorthand; bare entries sort ascending.
    pub fn order_by(mut self, columns: &str) -> Self {
        self.orders
            .extend(OrderByExpr::parse_list(columns, Direction::Asc));
        self
    }

    pub fn order_by_desc(mut self, columns: &str) -> Self {
        self.orders
            .extend(OrderByExpr::parse_list(columns, Direction::Desc));
        self
    }

    pub fn order_by_raw(mut self, sql: impl Into<String>) -> Self {
        self.orders.push(OrderByExpr::raw(sql));
        self
    }

    /// Comma-separated column list.
    pub fn group_by(mut self, columns: &str) -> Self {
        self.groups.extend(GroupByExpr::parse_list(columns));
        self
    }

    pub fn group_by_raw(mut self, sql: impl Into<String>) -> Self {
        self.groups.push(GroupByExpr::raw(sql));
        self
    }

    fn push_having(mut self, connector: Connector, column: &str, op: &str, value: Value) -> Self {
        match parse_operator(op) {
            Ok(op) => self.havings.push(HavingExpr {
                connector,
                kind: HavingKind::Compare {
                    column: column.to_string(),
                    op,
                    value,
                },
            }),
            Err(e) => self.fail(e),
        }
        self
    }

    /// `HAVING column op value`; `column` is usually an aggregate alias.
    pub fn having(self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        self.push_having(Connector::And, column, op, value.into())
    }

    pub fn or_having(self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        self.push_having(Connector::Or, column, op, value.into())
    }

    /// `HAVING column` (truthiness of an alias).
    pub fn having_column(mut self, column: &str) -> Self {
        self.havings.push(HavingExpr {
            connector: Connector::And,
            kind: HavingKind::Column(column.to_string()),
        });
        self
    }

    pub fn having_raw(mut self, sql: &str, bindings: Vec<Value>) -> Self {
        if let Err(e) = check_raw_bindings(sql, &bindings) {
            self.fail(e);
            return self;
        }
        self.havings.push(HavingExpr {
            connector: Connector::And,
            kind: HavingKind::Raw {
                sql: sql.to_string(),
                bindings,
            },
        });
        self
    }

    // ---------------------------------------------------------------
    // Bounds and locks
    // ---------------------------------------------------------------

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Alias for [`QueryBuilder::limit`].
    pub fn take(self, limit: u64) -> Self {
        self.limit(limit)
    }

    /// Alias for [`QueryBuilder::offset`].
    pub fn skip(self, offset: u64) -> Self {
        self.offset(offset)
    }

    /// 1-based page of `per_page` rows.
    pub fn for_page(self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        self.limit(per_page).offset((page - 1) * per_page)
    }

    pub fn lock_for_update(mut self) -> Self {
        self.lock = Some(Lock::Update);
        self
    }

    pub fn shared_lock(mut self) -> Self {
        self.lock = Some(Lock::Share);
        self
    }

    /// Deadline for statements executed from this builder.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Permit `delete()` without any WHERE predicate.
    pub fn allow_delete_all(mut self) -> Self {
        self.allow_delete_all = true;
        self
    }

    /// Apply `f` only when `condition` holds.
    pub fn when<F>(self, condition: bool, f: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        if condition { f(self) } else { self }
    }

    /// Clear all clause state; table, connection, scopes and macros stay.
    pub fn reset(mut self) -> Self {
        self.action = Action::Select;
        self.columns.clear();
        self.distinct = false;
        self.aggregates.clear();
        self.joins.clear();
        self.wheres.clear();
        self.groups.clear();
        self.havings.clear();
        self.orders.clear();
        self.limit = None;
        self.offset = None;
        self.lock = None;
        self.updates.clear();
        self.inserts.clear();
        self.allow_delete_all = false;
        self.build_error = None;
        self
    }

    // ---------------------------------------------------------------
    // Scopes and macros
    // ---------------------------------------------------------------

    /// Attach a global scope.
    pub fn with_scope(mut self, scope: &dyn Scope) -> Self {
        scope.attach(&mut self);
        self
    }

    /// Detach a global scope.
    pub fn without_scope(mut self, scope: &dyn Scope) -> Self {
        scope.detach(&mut self);
        self
    }

    /// Drop one `(action, name)` scope entry.
    pub fn remove_scope(mut self, action: Action, name: &str) -> Self {
        self.scopes.remove(action, name);
        self
    }

    pub fn has_scope(&self, action: Action, name: &str) -> bool {
        self.scopes.contains(action, name)
    }

    /// Register a local scope, applied only through [`QueryBuilder::call_scope`].
    pub fn register_scope<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(QueryBuilder, &[Value]) -> QueryBuilder + Send + Sync + 'static,
    {
        self.local_scopes.register(name, Arc::new(f) as MacroFn);
        self
    }

    /// Register a macro: a named user callable exposed on the builder.
    pub fn register_macro<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(QueryBuilder, &[Value]) -> QueryBuilder + Send + Sync + 'static,
    {
        self.macros.register(name, Arc::new(f) as MacroFn);
        self
    }

    /// Run a local scope by name. Unknown names record a usage error.
    pub fn call_scope(mut self, name: &str, args: &[Value]) -> Self {
        match self.local_scopes.get(name) {
            Some(f) => f(self, args),
            None => {
                self.fail(QuarryError::usage(format!("unknown scope '{name}'")));
                self
            }
        }
    }

    /// Run a macro by name. Unknown names record a usage error.
    pub fn call_macro(mut self, name: &str, args: &[Value]) -> Self {
        match self.macros.get(name) {
            Some(f) => f(self, args),
            None => {
                self.fail(QuarryError::usage(format!("unknown macro '{name}'")));
                self
            }
        }
    }

    // ---------------------------------------------------------------
    // Compilation
    // ---------------------------------------------------------------

    /// Surface the first recorded builder error.
    pub fn validate(&self) -> QuarryResult<()> {
        match &self.build_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Clone with `action` set and the matching global scopes applied.
    ///
    /// A scope may switch the action (soft delete turns DELETE into UPDATE);
    /// the new action's scopes then run as well, each action at most once.
    pub(crate) fn prepared(&self, action: Action) -> QuarryResult<QueryBuilder> {
        self.validate()?;
        if self.table.is_empty() {
            return Err(QuarryError::usage("no table is bound to the builder"));
        }
        let mut query = self.clone();
        query.action = action;

        let mut applied: Vec<Action> = Vec::new();
        while !applied.contains(&query.action) {
            let current = query.action;
            applied.push(current);
            for scope in query.scopes.for_action(current) {
                scope(&mut query);
            }
        }

        query.validate()?;
        Ok(query)
    }

    /// Prepare a nested builder for embedding. Its errors move to `self`.
    pub(crate) fn attach_sub(&mut self, sub: QueryBuilder) -> Option<QueryBuilder> {
        match sub.prepared(Action::Select) {
            Ok(sub) => Some(sub),
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    /// Compile the current action in the given mode.
    pub fn compile(&self, mode: Mode) -> QuarryResult<CompiledQuery> {
        let query = self.prepared(self.action)?;
        grammar::compile(&query, query.action, mode)
    }

    /// Literal SQL with every value inlined in single quotes, unescaped.
    /// For logs and tests; never execute it.
    pub fn to_sql(&self) -> QuarryResult<String> {
        Ok(self.compile(Mode::Literal)?.sql)
    }

    /// `?` SQL plus bindings in placeholder order.
    pub fn to_qmark(&self) -> QuarryResult<CompiledQuery> {
        self.compile(Mode::Qmark)
    }
}

/// Raw fragments must carry exactly one binding per `?`.
pub(crate) fn check_raw_bindings(sql: &str, bindings: &[Value]) -> QuarryResult<()> {
    let expected = grammar::count_placeholders(sql);
    if expected != bindings.len() {
        return Err(QuarryError::validation(format!(
            "raw fragment has {expected} placeholders but {} bindings",
            bindings.len()
        )));
    }
    Ok(())
}
