//! Row projection onto a stable output shape
//!
//! The same logical field can arrive under different column names depending on
//! the store version (`team_abbr` vs `team`), and numbers sometimes arrive as
//! strings. A [`FieldMap`] declares each output field once, with its candidate
//! source columns in priority order, its type and its default.

use crate::filter::parse_flag;
use crate::store::RawRow;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// A projected, typed field value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
}

impl FieldValue {
    /// Numeric view of the value; `None` for text and booleans
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(n) => Some(*n as f64),
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) | FieldValue::Boolean(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Integer(n) => write!(f, "{}", n),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Target type of an output field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Integer,
    Boolean,
}

/// One output field: candidate source columns, type and default
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    /// Source columns in priority order
    pub sources: Vec<String>,
    pub kind: FieldKind,
    pub default: FieldValue,
}

impl FieldSpec {
    fn new(name: &str, sources: &[&str], kind: FieldKind, default: FieldValue) -> Self {
        let sources = if sources.is_empty() {
            vec![name.to_string()]
        } else {
            sources.iter().map(|s| s.to_string()).collect()
        };
        Self { name: name.to_string(), sources, kind, default }
    }

    pub fn text(name: &str, sources: &[&str], default: &str) -> Self {
        Self::new(name, sources, FieldKind::Text, FieldValue::Text(default.to_string()))
    }

    pub fn number(name: &str, sources: &[&str], default: f64) -> Self {
        Self::new(name, sources, FieldKind::Number, FieldValue::Number(default))
    }

    pub fn integer(name: &str, sources: &[&str], default: i64) -> Self {
        Self::new(name, sources, FieldKind::Integer, FieldValue::Integer(default))
    }

    pub fn boolean(name: &str, sources: &[&str], default: bool) -> Self {
        Self::new(name, sources, FieldKind::Boolean, FieldValue::Boolean(default))
    }

    /// First candidate that coerces to this field's type, else the default
    fn resolve(&self, row: &RawRow) -> FieldValue {
        self.sources
            .iter()
            .filter_map(|source| row.get(source))
            .find_map(|cell| coerce(cell, self.kind))
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Declared output shape of an endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    pub fields: Vec<FieldSpec>,
    /// Carry raw columns no field consumes, after the declared fields
    pub keep_unmapped: bool,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn keep_unmapped(mut self) -> Self {
        self.keep_unmapped = true;
        self
    }

    fn consumes(&self, column: &str) -> bool {
        self.fields
            .iter()
            .any(|spec| spec.name == column || spec.sources.iter().any(|s| s == column))
    }

    pub fn project(&self, row: &RawRow) -> NormalizedRow {
        let extra = if self.keep_unmapped {
            row.iter()
                .filter(|(column, _)| !self.consumes(column))
                .map(|(column, value)| (column.clone(), value.clone()))
                .collect()
        } else {
            RawRow::new()
        };
        NormalizedRow {
            fields: self.fields.iter().map(|spec| (spec.name.clone(), spec.resolve(row))).collect(),
            extra,
        }
    }

    pub fn project_all(&self, rows: &[RawRow]) -> Vec<NormalizedRow> {
        rows.iter().map(|row| self.project(row)).collect()
    }
}

/// Project one raw row through a field map
pub fn project(row: &RawRow, map: &FieldMap) -> NormalizedRow {
    map.project(row)
}

/// A row with fixed field names in declared order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRow {
    fields: Vec<(String, FieldValue)>,
    /// Unmapped raw columns, serialized after the declared fields
    extra: RawRow,
}

impl NormalizedRow {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(field, _)| field == name).map(|(_, value)| value)
    }

    /// Numeric value of a field, 0 when absent or non-numeric
    pub fn number(&self, name: &str) -> f64 {
        self.get(name).and_then(FieldValue::as_f64).unwrap_or(0.0)
    }

    /// Text rendering of a field, empty when absent
    pub fn text(&self, name: &str) -> String {
        self.get(name).map(|v| v.to_string()).unwrap_or_default()
    }

    /// Replace a field's value, appending the field if it is new
    pub fn set(&mut self, name: &str, value: FieldValue) {
        match self.fields.iter_mut().find(|(field, _)| field == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }
}

impl Serialize for NormalizedRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + self.extra.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        for (name, value) in &self.extra {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

fn coerce(cell: &Value, kind: FieldKind) -> Option<FieldValue> {
    match kind {
        FieldKind::Number => finite_number(cell).map(FieldValue::Number),
        FieldKind::Integer => finite_number(cell).map(|n| FieldValue::Integer(n.trunc() as i64)),
        FieldKind::Text => match cell {
            Value::String(s) if !s.trim().is_empty() => Some(FieldValue::Text(s.clone())),
            Value::Number(n) => Some(FieldValue::Text(n.to_string())),
            Value::Bool(b) => Some(FieldValue::Text(b.to_string())),
            _ => None,
        },
        FieldKind::Boolean => match cell {
            Value::Bool(b) => Some(FieldValue::Boolean(*b)),
            Value::String(s) => parse_flag(s).map(FieldValue::Boolean),
            Value::Number(n) => match n.as_f64() {
                Some(x) if x == 0.0 => Some(FieldValue::Boolean(false)),
                Some(x) if x == 1.0 => Some(FieldValue::Boolean(true)),
                _ => None,
            },
            _ => None,
        },
    }
}

fn finite_number(cell: &Value) -> Option<f64> {
    let n = match cell {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}
