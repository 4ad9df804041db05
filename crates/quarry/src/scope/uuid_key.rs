//! Client-side UUID primary keys.

use super::Scope;
use crate::builder::QueryBuilder;
use crate::grammar::Action;
use crate::value::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Generates a v4 UUID for the primary key of every inserted row that does
/// not already carry one. Use it for tables without a driver-side
/// auto-increment.
#[derive(Debug, Clone, Default)]
pub struct UuidKey {
    column: Option<String>,
}

impl UuidKey {
    pub const NAME: &'static str = "uuid_key";

    /// Key the builder's primary key column.
    pub fn new() -> Self {
        Self::default()
    }

    /// Key an explicit column instead of the builder's primary key.
    pub fn column(column: impl Into<String>) -> Self {
        Self {
            column: Some(column.into()),
        }
    }
}

impl Scope for UuidKey {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn attach(&self, query: &mut QueryBuilder) {
        for action in [Action::Insert, Action::BulkCreate] {
            let column = self.column.clone();
            query.scopes.register(
                action,
                Self::NAME,
                Arc::new(move |q: &mut QueryBuilder| {
                    let column = column.clone().unwrap_or_else(|| q.primary_key.clone());
                    for row in q.inserts.iter_mut() {
                        if row.get(&column).is_none() {
                            row.insert(column.as_str(), Value::Uuid(Uuid::new_v4()));
                        }
                    }
                }),
            );
        }
    }
}
