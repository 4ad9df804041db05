//! The shared compiler: walks a builder's clause lists and renders each slot.

use super::{replace_placeholders, Action, CompiledQuery, Grammar, Mode};
use crate::builder::QueryBuilder;
use crate::error::{QuarryError, QuarryResult};
use crate::expr::{
    AggregateExpr, GroupByExpr, HavingExpr, HavingKind, JoinClause, OnKind, Operand,
    OrderByExpr, Predicate, SelectExpr, SelectKind, UpdateExpr, WhereExpr,
};
use crate::value::Value;

/// Compile `query` for `action` with the grammar of the builder's dialect.
pub(crate) fn compile(
    query: &QueryBuilder,
    action: Action,
    mode: Mode,
) -> QuarryResult<CompiledQuery> {
    let grammar = query.dialect.grammar();
    let mut compiler = Compiler {
        grammar,
        mode,
        prefix: &query.prefix,
        tables: Vec::new(),
        bindings: Vec::new(),
    };

    let sql = match action {
        Action::Select => compiler.select(query),
        Action::Insert => compiler.insert(query, false)?,
        Action::BulkCreate => compiler.insert(query, true)?,
        Action::Update => compiler.update(query)?,
        Action::Delete => compiler.delete(query),
    };

    Ok(CompiledQuery {
        sql,
        bindings: compiler.bindings,
        action,
        dialect: grammar.dialect(),
    })
}

struct Compiler<'a> {
    grammar: &'a dyn Grammar,
    mode: Mode,
    prefix: &'a str,
    /// Unaliased tables visible to the statement being rendered; dotted
    /// column references naming one of them get the prefix too.
    tables: Vec<String>,
    bindings: Vec<Value>,
}

/// Anything with a parenthesis or a space is an expression, not a column.
fn is_expression(name: &str) -> bool {
    name.contains('(') || name.contains(' ')
}

impl Compiler<'_> {
    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => self.grammar.bool_literal(*b),
            other => format!("'{}'", other.literal_text()),
        }
    }

    /// Render a value: inline in literal mode, `?` plus a binding otherwise.
    fn param(&mut self, value: &Value) -> String {
        match self.mode {
            Mode::Literal => self.literal(value),
            Mode::Qmark => {
                self.bindings.push(value.clone());
                "?".to_string()
            }
        }
    }

    fn param_list(&mut self, values: &[Value]) -> String {
        values
            .iter()
            .map(|v| self.param(v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// A raw fragment whose `?` marks consume `bindings` in order.
    fn raw(&mut self, sql: &str, bindings: &[Value]) -> String {
        match self.mode {
            Mode::Qmark => {
                self.bindings.extend(bindings.iter().cloned());
                sql.to_string()
            }
            Mode::Literal => replace_placeholders(sql, |index| {
                bindings
                    .get(index - 1)
                    .map(|v| self.literal(v))
                    .unwrap_or_else(|| "?".to_string())
            }),
        }
    }

    /// `a.b.c` -> each segment quoted; `*` segments stay bare.
    fn identifier_path(&self, name: &str) -> String {
        name.split('.')
            .map(|segment| {
                let segment = segment.trim();
                if segment == "*" {
                    segment.to_string()
                } else {
                    self.grammar.quote_identifier(segment)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Dotted column reference. The segment before the column is prefixed
    /// when it names an unaliased table of the statement.
    fn column_path(&self, name: &str) -> String {
        let segments = name.split('.').map(str::trim).collect::<Vec<_>>();
        let table_index = segments.len().checked_sub(2);
        segments
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                if *segment == "*" {
                    segment.to_string()
                } else if Some(i) == table_index && self.is_statement_table(segment) {
                    self.grammar
                        .quote_identifier(&format!("{}{segment}", self.prefix))
                } else {
                    self.grammar.quote_identifier(segment)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    fn is_statement_table(&self, name: &str) -> bool {
        !self.prefix.is_empty() && self.tables.iter().any(|t| t == name)
    }

    /// Bring `table` into scope unless it is referenced through an alias.
    fn enter_table(&mut self, table: &str, alias: Option<&str>) {
        if alias.is_none() {
            let name = table.rsplit('.').next().unwrap_or(table).trim();
            self.tables.push(name.to_string());
        }
    }

    /// Table reference with the connection prefix applied to its last segment.
    fn table_name(&self, table: &str) -> String {
        match table.rsplit_once('.') {
            Some((schema, name)) => format!(
                "{}.{}",
                self.identifier_path(schema),
                self.grammar.quote_identifier(&format!("{}{name}", self.prefix))
            ),
            None => self
                .grammar
                .quote_identifier(&format!("{}{table}", self.prefix)),
        }
    }

    fn table_with_alias(&self, table: &str, alias: Option<&str>) -> String {
        match alias {
            Some(alias) => format!(
                "{} AS {}",
                self.table_name(table),
                self.grammar.quote_identifier(alias)
            ),
            None => self.table_name(table),
        }
    }

    /// What bare column names of `query` are qualified with.
    fn qualifier(&self, query: &QueryBuilder) -> String {
        match &query.alias {
            Some(alias) => self.grammar.quote_identifier(alias),
            None => self.table_name(&query.table),
        }
    }

    /// Column reference: bare names get the builder's table, dotted names are
    /// quoted per segment, `*` and expressions pass through.
    fn column(&self, name: &str, qualifier: &str) -> String {
        let name = name.trim();
        if name == "*" || is_expression(name) {
            return name.to_string();
        }
        if name.contains('.') {
            return self.column_path(name);
        }
        format!("{qualifier}.{}", self.grammar.quote_identifier(name))
    }

    /// Unqualified column (INSERT column lists, SET targets, HAVING aliases).
    fn bare_column(&self, name: &str) -> String {
        let name = name.trim();
        if name == "*" || is_expression(name) {
            return name.to_string();
        }
        self.column_path(name)
    }

    fn select(&mut self, query: &QueryBuilder) -> String {
        let scope = self.tables.len();
        self.enter_table(&query.table, query.alias.as_deref());
        for join in &query.joins {
            self.enter_table(&join.table, join.alias.as_deref());
        }

        let qualifier = self.qualifier(query);
        let mut parts = vec!["SELECT".to_string()];

        if query.distinct {
            parts.push("DISTINCT".to_string());
        }
        if let Some(top) = self.grammar.top(query.limit, query.offset) {
            parts.push(top);
        }
        parts.push(self.select_list(&query.columns, &query.aggregates, &qualifier));
        parts.push(format!(
            "FROM {}",
            self.table_with_alias(&query.table, query.alias.as_deref())
        ));

        for join in &query.joins {
            parts.push(self.join(join));
        }
        if let Some(wheres) = self.wheres(&query.wheres, &qualifier) {
            parts.push(wheres);
        }
        if let Some(groups) = self.group_by(&query.groups, &qualifier) {
            parts.push(groups);
        }
        if let Some(havings) = self.having(&query.havings) {
            parts.push(havings);
        }

        let pagination = self.grammar.limit_offset(query.limit, query.offset);
        match self.order_by(&query.orders, &qualifier) {
            Some(orders) => parts.push(orders),
            None if pagination.is_some() && self.grammar.offset_requires_order() => {
                parts.push("ORDER BY (SELECT NULL)".to_string());
            }
            None => {}
        }
        if let Some(pagination) = pagination {
            parts.push(pagination);
        }
        if let Some(lock) = query.lock.and_then(|l| self.grammar.lock_clause(l)) {
            parts.push(lock.to_string());
        }

        self.tables.truncate(scope);
        parts.join(" ")
    }

    fn select_list(
        &mut self,
        columns: &[SelectExpr],
        aggregates: &[AggregateExpr],
        qualifier: &str,
    ) -> String {
        let mut rendered = Vec::with_capacity(columns.len() + aggregates.len());
        for column in columns {
            let body = match &column.kind {
                SelectKind::Column => self.column(&column.column, qualifier),
                SelectKind::Raw => column.column.clone(),
                SelectKind::Subquery(sub) => format!("({})", self.select(sub)),
            };
            rendered.push(match &column.alias {
                Some(alias) => format!("{body} AS {}", self.grammar.quote_identifier(alias)),
                None => body,
            });
        }
        for aggregate in aggregates {
            rendered.push(format!(
                "{}({}) AS {}",
                aggregate.function.as_sql(),
                self.column(&aggregate.column, qualifier),
                aggregate.alias
            ));
        }

        if rendered.is_empty() {
            "*".to_string()
        } else {
            rendered.join(", ")
        }
    }

    fn join(&mut self, join: &JoinClause) -> String {
        let mut sql = format!(
            "{} {}",
            join.kind.as_sql(),
            self.table_with_alias(&join.table, join.alias.as_deref())
        );

        let mut conditions = String::new();
        for (i, condition) in join.conditions.iter().enumerate() {
            if i > 0 {
                conditions.push(' ');
                conditions.push_str(condition.connector.as_sql());
                conditions.push(' ');
            }
            let rendered = match &condition.kind {
                OnKind::Columns { left, op, right } => format!(
                    "{} {op} {}",
                    self.bare_column(left),
                    self.bare_column(right)
                ),
                OnKind::Value { column, op, value } => {
                    format!("{} {op} {}", self.bare_column(column), self.param(value))
                }
                OnKind::Null { column, negated } => format!(
                    "{} IS {}NULL",
                    self.bare_column(column),
                    if *negated { "NOT " } else { "" }
                ),
            };
            conditions.push_str(&rendered);
        }

        if !conditions.is_empty() {
            sql.push_str(" ON ");
            sql.push_str(&conditions);
        }
        sql
    }

    fn wheres(&mut self, wheres: &[WhereExpr], qualifier: &str) -> Option<String> {
        let body = self.predicates(wheres, qualifier);
        (!body.is_empty()).then(|| format!("WHERE {body}"))
    }

    /// Join predicates with their connectors. The first rendered predicate
    /// never gets one, whichever method produced it.
    fn predicates(&mut self, wheres: &[WhereExpr], qualifier: &str) -> String {
        let mut out = String::new();
        for expr in wheres {
            let Some(rendered) = self.predicate(&expr.predicate, qualifier) else {
                continue;
            };
            if !out.is_empty() {
                out.push(' ');
                out.push_str(expr.connector.as_sql());
                out.push(' ');
            }
            out.push_str(&rendered);
        }
        out
    }

    fn predicate(&mut self, predicate: &Predicate, qualifier: &str) -> Option<String> {
        let sql = match predicate {
            Predicate::Compare { column, op, value } => {
                let column = self.column(column, qualifier);
                let rhs = self.operand(value);
                format!("{column} {op} {rhs}")
            }
            Predicate::Null { column, negated } => format!(
                "{} IS {}NULL",
                self.column(column, qualifier),
                if *negated { "NOT " } else { "" }
            ),
            Predicate::In {
                column,
                values,
                negated,
            } => {
                if let Operand::List(list) = values {
                    if list.is_empty() {
                        return Some(if *negated { "1 = 1" } else { "0 = 1" }.to_string());
                    }
                }
                let column = self.column(column, qualifier);
                let rhs = self.operand(values);
                let keyword = if *negated { "NOT IN" } else { "IN" };
                format!("{column} {keyword} {rhs}")
            }
            Predicate::Between {
                column,
                low,
                high,
                negated,
            } => {
                let column = self.column(column, qualifier);
                let low = self.param(low);
                let high = self.param(high);
                let keyword = if *negated { "NOT BETWEEN" } else { "BETWEEN" };
                format!("{column} {keyword} {low} AND {high}")
            }
            Predicate::Exists { query, negated } => format!(
                "{}EXISTS ({})",
                if *negated { "NOT " } else { "" },
                self.select(query)
            ),
            Predicate::Column { left, op, right } => format!(
                "{} {op} {}",
                self.column(left, qualifier),
                self.column(right, qualifier)
            ),
            Predicate::Group(inner) => {
                let body = self.predicates(inner, qualifier);
                if body.is_empty() {
                    return None;
                }
                format!("({body})")
            }
            Predicate::Raw { sql, bindings } => self.raw(sql, bindings),
        };
        Some(sql)
    }

    /// Right-hand side of a comparison or IN.
    fn operand(&mut self, operand: &Operand) -> String {
        match operand {
            Operand::Value(value) => self.param(value),
            Operand::List(values) => format!("({})", self.param_list(values)),
            Operand::Subquery(sub) => format!("({})", self.select(sub)),
            Operand::Raw(sql) => sql.clone(),
        }
    }

    fn group_by(&self, groups: &[GroupByExpr], qualifier: &str) -> Option<String> {
        if groups.is_empty() {
            return None;
        }
        let rendered = groups
            .iter()
            .map(|g| {
                if g.raw {
                    g.column.clone()
                } else {
                    self.column(&g.column, qualifier)
                }
            })
            .collect::<Vec<_>>();
        Some(format!("GROUP BY {}", rendered.join(", ")))
    }

    fn having(&mut self, havings: &[HavingExpr]) -> Option<String> {
        if havings.is_empty() {
            return None;
        }
        let mut out = String::from("HAVING ");
        for (i, having) in havings.iter().enumerate() {
            if i > 0 {
                out.push(' ');
                out.push_str(having.connector.as_sql());
                out.push(' ');
            }
            let rendered = match &having.kind {
                HavingKind::Column(column) => self.bare_column(column),
                HavingKind::Compare { column, op, value } => {
                    let column = self.bare_column(column);
                    format!("{column} {op} {}", self.param(value))
                }
                HavingKind::Raw { sql, bindings } => self.raw(sql, bindings),
            };
            out.push_str(&rendered);
        }
        Some(out)
    }

    fn order_by(&self, orders: &[OrderByExpr], qualifier: &str) -> Option<String> {
        if orders.is_empty() {
            return None;
        }
        let rendered = orders
            .iter()
            .map(|o| {
                if o.raw {
                    o.column.clone()
                } else {
                    format!("{} {}", self.column(&o.column, qualifier), o.direction.as_sql())
                }
            })
            .collect::<Vec<_>>();
        Some(format!("ORDER BY {}", rendered.join(", ")))
    }

    fn insert(&mut self, query: &QueryBuilder, bulk: bool) -> QuarryResult<String> {
        self.enter_table(&query.table, None);
        let rows = if bulk {
            &query.inserts[..]
        } else {
            &query.inserts[..query.inserts.len().min(1)]
        };
        let first = rows
            .first()
            .filter(|row| !row.is_empty())
            .ok_or_else(|| QuarryError::validation("insert requires at least one column"))?;
        let columns = first.columns().map(str::to_string).collect::<Vec<_>>();

        let mut tuples = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let mut values = Vec::with_capacity(columns.len());
            for column in &columns {
                let value = row.get(column).ok_or_else(|| {
                    QuarryError::validation(format!(
                        "bulk insert row {index} is missing column '{column}'"
                    ))
                })?;
                values.push(self.param(value));
            }
            tuples.push(format!("({})", values.join(", ")));
        }

        let column_list = columns
            .iter()
            .map(|c| self.bare_column(c))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!(
            "INSERT INTO {} ({column_list}) VALUES {}",
            self.table_name(&query.table),
            tuples.join(", ")
        );
        if let Some(returning) = self.grammar.insert_returning() {
            sql.push(' ');
            sql.push_str(returning);
        }
        Ok(sql)
    }

    fn update(&mut self, query: &QueryBuilder) -> QuarryResult<String> {
        self.enter_table(&query.table, None);
        if query.updates.is_empty() {
            return Err(QuarryError::validation(
                "update requires at least one assignment",
            ));
        }

        let mut assignments = Vec::with_capacity(query.updates.len());
        for update in &query.updates {
            let rendered = match update {
                UpdateExpr::Set { column, value } => {
                    format!("{} = {}", self.bare_column(column), self.param(value))
                }
                UpdateExpr::Increment { column, amount } => {
                    let column = self.bare_column(column);
                    format!("{column} = {column} + {}", self.param(amount))
                }
                UpdateExpr::Decrement { column, amount } => {
                    let column = self.bare_column(column);
                    format!("{column} = {column} - {}", self.param(amount))
                }
                UpdateExpr::Raw { sql, bindings } => self.raw(sql, bindings),
            };
            assignments.push(rendered);
        }

        let table = self.table_name(&query.table);
        let mut sql = format!("UPDATE {table} SET {}", assignments.join(", "));
        if let Some(wheres) = self.wheres(&query.wheres, &table) {
            sql.push(' ');
            sql.push_str(&wheres);
        }
        Ok(sql)
    }

    fn delete(&mut self, query: &QueryBuilder) -> String {
        self.enter_table(&query.table, None);
        let table = self.table_name(&query.table);
        let mut sql = format!("DELETE FROM {table}");
        if let Some(wheres) = self.wheres(&query.wheres, &table) {
            sql.push(' ');
            sql.push_str(&wheres);
        }
        sql
    }
}
