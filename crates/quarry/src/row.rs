//! Row mapping traits and utilities

use crate::error::{QuarryError, QuarryResult};
use crate::value::{FromValue, Value};
use serde::de::DeserializeOwned;

/// A result row returned by any driver.
///
/// Columns keep the order the driver reported them in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut row = Row::new();
        for (k, v) in pairs {
            row.insert(k, v);
        }
        row
    }

    /// Set a column, replacing an existing value with the same name.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    /// Value at a positional index.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.columns.get(index).map(|(_, v)| v)
    }

    /// Typed column access, returning `QuarryError::Decode` on failure.
    pub fn try_get<T: FromValue>(&self, column: &str) -> QuarryResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| QuarryError::decode(column, "column not present in row"))?;
        T::from_value(value).map_err(|e| match e {
            QuarryError::Decode { message, .. } => QuarryError::decode(column, message),
            other => other,
        })
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, v)| (name.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Convert the row into a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .columns
            .iter()
            .map(|(name, v)| (name.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }

    /// Deserialize the row into any `serde` type through its JSON form.
    pub fn deserialize<T: DeserializeOwned>(&self) -> QuarryResult<T> {
        Ok(serde_json::from_value(self.to_json())?)
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

/// Trait for converting a result row into a Rust struct.
///
/// Any `serde::Deserialize` type gets an implementation for free; implement it
/// by hand when column names do not line up with field names.
pub trait FromRow: Sized {
    /// Convert a result row into Self
    fn from_row(row: &Row) -> QuarryResult<Self>;
}

impl<T: DeserializeOwned> FromRow for T {
    fn from_row(row: &Row) -> QuarryResult<Self> {
        row.deserialize()
    }
}
