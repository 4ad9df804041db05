//! Soft deletes: rows are flagged with a timestamp instead of removed.

use super::{system_clock, Clock, Scope};
use crate::builder::QueryBuilder;
use crate::connection::Executor;
use crate::error::QuarryResult;
use crate::expr::{Predicate, UpdateExpr, WhereExpr};
use crate::grammar::Action;
use crate::value::Value;
use std::sync::Arc;

const ONLY_TRASHED: &str = "only_trashed";
const RESTORE: &str = "restore";

/// Filters trashed rows out of SELECTs and turns DELETE into an UPDATE of
/// the `deleted_at` column.
#[derive(Clone)]
pub struct SoftDelete {
    column: String,
    clock: Clock,
}

impl SoftDelete {
    pub const NAME: &'static str = "soft_delete";

    pub fn new() -> Self {
        Self {
            column: "deleted_at".to_string(),
            clock: system_clock(),
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for SoftDelete {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope for SoftDelete {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn attach(&self, query: &mut QueryBuilder) {
        let column = self.column.clone();
        query.scopes.register(
            Action::Select,
            Self::NAME,
            Arc::new(move |q: &mut QueryBuilder| {
                q.push_where(WhereExpr::and(Predicate::Null {
                    column: column.clone(),
                    negated: false,
                }));
            }),
        );

        let column = self.column.clone();
        let clock = Arc::clone(&self.clock);
        query.scopes.register(
            Action::Delete,
            Self::NAME,
            Arc::new(move |q: &mut QueryBuilder| {
                q.set_action(Action::Update);
                q.push_update(UpdateExpr::Set {
                    column: column.clone(),
                    value: Value::Timestamp(clock()),
                });
            }),
        );

        let column = self.column.clone();
        query.local_scopes.register(
            ONLY_TRASHED,
            Arc::new(move |q: QueryBuilder, _args: &[Value]| {
                q.with_trashed().where_not_null(column.as_str())
            }),
        );

        let column = self.column.clone();
        query.local_scopes.register(
            RESTORE,
            Arc::new(move |q: QueryBuilder, _args: &[Value]| {
                q.with_trashed().set(column.as_str(), Value::Null)
            }),
        );
    }

    fn detach(&self, query: &mut QueryBuilder) {
        query.scopes.remove_named(Self::NAME);
        query.local_scopes.remove(ONLY_TRASHED);
        query.local_scopes.remove(RESTORE);
    }
}

/// Escape hatches for builders carrying [`SoftDelete`].
impl QueryBuilder {
    /// Include trashed rows in SELECTs.
    pub fn with_trashed(mut self) -> Self {
        self.scopes.remove(Action::Select, SoftDelete::NAME);
        self
    }

    /// Only trashed rows.
    pub fn only_trashed(self) -> Self {
        self.call_scope(ONLY_TRASHED, &[])
    }

    /// Physically delete the matching rows.
    pub async fn force_delete<E>(&self, db: &E) -> QuarryResult<u64>
    where
        E: Executor + ?Sized,
    {
        let mut query = self.clone();
        query.scopes.remove(Action::Delete, SoftDelete::NAME);
        query.delete(db).await
    }

    /// Clear the soft-delete flag on the matching rows.
    pub async fn restore<E>(&self, db: &E) -> QuarryResult<u64>
    where
        E: Executor + ?Sized,
    {
        self.clone().call_scope(RESTORE, &[]).execute(db).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Dialect;
    use chrono::NaiveDate;

    fn fixed_clock() -> Clock {
        Arc::new(|| {
            NaiveDate::from_ymd_opt(2024, 1, 2)
                .and_then(|d| d.and_hms_opt(3, 4, 5))
                .unwrap_or_default()
        })
    }

    fn users() -> QueryBuilder {
        QueryBuilder::table(Dialect::MySql, "users")
            .with_scope(&SoftDelete::new().with_clock(fixed_clock()))
    }

    #[test]
    fn select_excludes_trashed() {
        assert_eq!(
            users().where_eq("id", 1).to_sql().unwrap(),
            "SELECT * FROM `users` WHERE `users`.`id` = '1' AND `users`.`deleted_at` IS NULL"
        );
    }

    #[test]
    fn delete_becomes_update() {
        assert_eq!(
            users().where_eq("id", 1).for_delete().to_sql().unwrap(),
            "UPDATE `users` SET `deleted_at` = '2024-01-02 03:04:05' WHERE `users`.`id` = '1'"
        );
    }

    #[test]
    fn with_trashed_drops_filter() {
        assert_eq!(
            users().with_trashed().to_sql().unwrap(),
            "SELECT * FROM `users`"
        );
    }

    #[test]
    fn only_trashed_inverts_filter() {
        assert_eq!(
            users().only_trashed().to_sql().unwrap(),
            "SELECT * FROM `users` WHERE `users`.`deleted_at` IS NOT NULL"
        );
    }

    #[test]
    fn detach_restores_plain_behaviour() {
        let query = users().without_scope(&SoftDelete::new());
        assert_eq!(query.to_sql().unwrap(), "SELECT * FROM `users`");
        assert_eq!(
            query.where_eq("id", 1).for_delete().to_sql().unwrap(),
            "DELETE FROM `users` WHERE `users`.`id` = '1'"
        );
    }

    #[test]
    fn only_trashed_without_scope_is_usage_error() {
        let err = QueryBuilder::table(Dialect::MySql, "users")
            .only_trashed()
            .to_sql()
            .unwrap_err();
        assert!(matches!(err, crate::error::QuarryError::Usage(_)));
    }
}
