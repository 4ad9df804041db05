//! Scopes and macros: named query modifiers held in typed tables.
//!
//! A global scope is registered per `(action, name)` and runs automatically
//! right before a builder is compiled for that action. Local scopes and macros
//! are explicit: they run only when called by name through
//! [`QueryBuilder::call_scope`] / [`QueryBuilder::call_macro`].

mod soft_delete;
mod timestamps;
mod uuid_key;

pub use soft_delete::SoftDelete;
pub use timestamps::Timestamps;
pub use uuid_key::UuidKey;

use crate::builder::QueryBuilder;
use crate::grammar::Action;
use crate::value::Value;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A global scope callable: mutates the builder in place before compilation.
pub type ScopeFn = Arc<dyn Fn(&mut QueryBuilder) + Send + Sync>;

/// A local scope or macro: takes the builder and call arguments, returns the
/// (possibly modified) builder.
pub type MacroFn = Arc<dyn Fn(QueryBuilder, &[Value]) -> QueryBuilder + Send + Sync>;

/// Source of "now" for scopes that write timestamps.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub(crate) fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().naive_utc())
}

/// A pluggable query modifier with an attach and a detach hook.
pub trait Scope: Send + Sync {
    /// Name under which the scope's callables are registered.
    fn name(&self) -> &str;

    /// Register this scope's callables on the builder's scope table (and,
    /// for scopes with escape hatches, its local scope table).
    fn attach(&self, query: &mut QueryBuilder);

    /// Remove everything registered under [`Scope::name`].
    fn detach(&self, query: &mut QueryBuilder) {
        query.scopes.remove_named(self.name());
    }
}

#[derive(Clone)]
struct Entry {
    action: Action,
    name: String,
    apply: ScopeFn,
}

/// `(action, name) -> callable`, kept in registration order.
#[derive(Clone, Default)]
pub struct ScopeTable {
    entries: Vec<Entry>,
}

impl ScopeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callable; an existing entry with the same key is replaced
    /// in place.
    pub fn register(&mut self, action: Action, name: impl Into<String>, apply: ScopeFn) {
        let name = name.into();
        match self
            .entries
            .iter_mut()
            .find(|e| e.action == action && e.name == name)
        {
            Some(entry) => entry.apply = apply,
            None => self.entries.push(Entry {
                action,
                name,
                apply,
            }),
        }
    }

    pub fn remove(&mut self, action: Action, name: &str) {
        self.entries
            .retain(|e| !(e.action == action && e.name == name));
    }

    /// Remove a name for every action.
    pub fn remove_named(&mut self, name: &str) {
        self.entries.retain(|e| e.name != name);
    }

    pub fn contains(&self, action: Action, name: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.action == action && e.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Callables registered for `action`, in registration order.
    pub(crate) fn for_action(&self, action: Action) -> Vec<ScopeFn> {
        self.entries
            .iter()
            .filter(|e| e.action == action)
            .map(|e| Arc::clone(&e.apply))
            .collect()
    }
}

impl fmt::Debug for ScopeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|e| format!("{}:{}", e.action, e.name)),
            )
            .finish()
    }
}

/// Named local scopes or macros.
#[derive(Clone, Default)]
pub struct MacroTable {
    entries: BTreeMap<String, MacroFn>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, f: MacroFn) {
        self.entries.insert(name.into(), f);
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.remove(name);
    }

    pub fn get(&self, name: &str) -> Option<MacroFn> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

impl fmt::Debug for MacroTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}
