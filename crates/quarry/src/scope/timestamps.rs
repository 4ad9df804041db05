//! Automatic `created_at` / `updated_at` columns.

use super::{system_clock, Clock, Scope};
use crate::builder::QueryBuilder;
use crate::expr::UpdateExpr;
use crate::grammar::Action;
use crate::value::Value;
use std::sync::Arc;

/// Fills `created_at` and `updated_at` on insert and refreshes `updated_at`
/// on update. Values the caller supplied explicitly are left alone.
#[derive(Clone)]
pub struct Timestamps {
    created_at: String,
    updated_at: String,
    clock: Clock,
}

impl Timestamps {
    pub const NAME: &'static str = "timestamps";

    pub fn new() -> Self {
        Self {
            created_at: "created_at".to_string(),
            updated_at: "updated_at".to_string(),
            clock: system_clock(),
        }
    }

    pub fn columns(mut self, created_at: impl Into<String>, updated_at: impl Into<String>) -> Self {
        self.created_at = created_at.into();
        self.updated_at = updated_at.into();
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for Timestamps {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope for Timestamps {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn attach(&self, query: &mut QueryBuilder) {
        for action in [Action::Insert, Action::BulkCreate] {
            let this = self.clone();
            query.scopes.register(
                action,
                Self::NAME,
                Arc::new(move |q: &mut QueryBuilder| {
                    let now = Value::Timestamp((this.clock)());
                    for row in q.inserts.iter_mut() {
                        if row.get(&this.created_at).is_none() {
                            row.insert(this.created_at.as_str(), now.clone());
                        }
                        if row.get(&this.updated_at).is_none() {
                            row.insert(this.updated_at.as_str(), now.clone());
                        }
                    }
                }),
            );
        }

        let this = self.clone();
        query.scopes.register(
            Action::Update,
            Self::NAME,
            Arc::new(move |q: &mut QueryBuilder| {
                let already_set = q
                    .updates
                    .iter()
                    .any(|u| u.column() == Some(this.updated_at.as_str()));
                if !already_set {
                    q.push_update(UpdateExpr::Set {
                        column: this.updated_at.clone(),
                        value: Value::Timestamp((this.clock)()),
                    });
                }
            }),
        );
    }
}
