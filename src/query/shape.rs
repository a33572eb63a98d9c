//! Result shaping: raw rows and column names into records or tables.

use crate::db::{Row, Value};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;

/// A row rendered as an insertion-ordered column-name-to-value mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing an existing value in place. Returns the old value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    /// Looks up a value by column name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(index).1)
    }

    /// Overlays `other` onto this record; its values win on key collision.
    pub fn overlay(&mut self, other: Record) {
        for (key, value) in other.fields {
            self.insert(key, value);
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Converts the record into a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Ordered columns and ordered rows, the tabular view of a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All values of the named column, top to bottom.
    ///
    /// Rows shorter than the column position contribute `Value::Null`.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        static NULL: Value = Value::Null;
        let index = self.columns.iter().position(|c| c == name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(index).unwrap_or(&NULL))
                .collect(),
        )
    }

    /// Gives back the columns and rows the table was built from.
    pub fn into_parts(self) -> (Vec<String>, Vec<Row>) {
        (self.columns, self.rows)
    }

    /// Re-shapes the table as records.
    pub fn to_records(&self) -> Vec<Record> {
        to_records(&self.rows, &self.columns)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return write!(f, "(empty)");
        }

        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(Value::to_display_string).collect())
            .collect();

        // Calculate column widths
        let mut widths: Vec<usize> = self.columns.iter().map(|h| h.chars().count()).collect();
        for row in &cells {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(cell.chars().count());
                }
            }
        }

        let header: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
            .collect();
        writeln!(f, "{}", header.join(" │ ").trim_end())?;

        let separator: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
        write!(f, "{}", separator.join("─┼─"))?;

        for row in &cells {
            let line: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(i, cell)| {
                    let width = widths.get(i).copied().unwrap_or(0);
                    format!("{:width$}", cell, width = width)
                })
                .collect();
            write!(f, "\n{}", line.join(" │ ").trim_end())?;
        }

        Ok(())
    }
}

/// Zips every row against the column names, one record per row.
///
/// No rows or no columns yields an empty vector. A row longer or shorter than
/// the column list is cut to the shorter of the two.
pub fn to_records<S: AsRef<str>>(rows: &[Row], columns: &[S]) -> Vec<Record> {
    if rows.is_empty() || columns.is_empty() {
        return Vec::new();
    }

    rows.iter()
        .map(|row| {
            columns
                .iter()
                .zip(row.iter())
                .map(|(column, value)| (column.as_ref(), value.clone()))
                .collect::<Record>()
        })
        .collect()
}

/// Builds a table preserving column and row order.
///
/// No rows or no columns yields an empty table without columns.
pub fn to_table<S: AsRef<str>>(rows: &[Row], columns: &[S]) -> Table {
    if rows.is_empty() || columns.is_empty() {
        return Table::default();
    }

    Table {
        columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
        rows: rows.to_vec(),
    }
}
