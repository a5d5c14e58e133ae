//! Collapsing per-situation rows into one row per entity

use crate::filter::SortDirection;
use crate::projection::{FieldValue, NormalizedRow};
use std::collections::HashMap;
use std::hash::Hash;

/// `name = numerator / denominator`, recomputed after summing
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedField {
    pub name: String,
    pub numerator: String,
    pub denominator: String,
    /// Round to this many decimals
    pub decimals: Option<u32>,
}

impl DerivedField {
    fn compute(&self, row: &NormalizedRow) -> f64 {
        let denominator = row.number(&self.denominator);
        if denominator == 0.0 {
            return 0.0;
        }
        let value = row.number(&self.numerator) / denominator;
        match self.decimals {
            Some(decimals) => {
                let scale = 10f64.powi(decimals as i32);
                (value * scale).round() / scale
            }
            None => value,
        }
    }
}

/// How rows sharing an identity key are merged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reducer {
    /// Fields summed across the group
    pub additive: Vec<String>,
    /// Ratios recomputed from the summed fields
    pub derived: Vec<DerivedField>,
    /// Constant values written after merging
    pub overrides: Vec<(String, FieldValue)>,
}

impl Reducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sum(mut self, fields: &[&str]) -> Self {
        self.additive.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    pub fn ratio(
        mut self,
        name: &str,
        numerator: &str,
        denominator: &str,
        decimals: Option<u32>,
    ) -> Self {
        self.derived.push(DerivedField {
            name: name.to_string(),
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
            decimals,
        });
        self
    }

    pub fn set(mut self, name: &str, value: FieldValue) -> Self {
        self.overrides.push((name.to_string(), value));
        self
    }

    fn merge_into(&self, target: &mut NormalizedRow, row: &NormalizedRow) {
        for field in &self.additive {
            let merged = add(target.get(field), row.get(field));
            target.set(field, merged);
        }
    }

    fn finish(&self, row: &mut NormalizedRow) {
        for derived in &self.derived {
            let value = derived.compute(row);
            row.set(&derived.name, FieldValue::Number(value));
        }
        for (name, value) in &self.overrides {
            row.set(name, value.clone());
        }
    }
}

/// Group rows by `identity` and reduce each group to one row.
///
/// Groups come out in the order their key first appears. Fields that are
/// neither additive, derived nor overridden keep the first row's value.
pub fn aggregate<K, F>(
    rows: Vec<NormalizedRow>,
    identity: F,
    reducer: &Reducer,
) -> Vec<NormalizedRow>
where
    K: Eq + Hash,
    F: Fn(&NormalizedRow) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<NormalizedRow> = Vec::new();

    for row in rows {
        let key = identity(&row);
        match index.get(&key) {
            Some(&slot) => reducer.merge_into(&mut groups[slot], &row),
            None => {
                index.insert(key, groups.len());
                groups.push(row);
            }
        }
    }

    for group in &mut groups {
        reducer.finish(group);
    }
    groups
}

/// Identity key made of the text rendering of `fields`
pub fn identity_key(row: &NormalizedRow, fields: &[String]) -> Vec<String> {
    fields.iter().map(|field| row.text(field)).collect()
}

/// Stable sort by a numeric field
pub fn sort_rows(rows: &mut [NormalizedRow], field: &str, direction: SortDirection) {
    rows.sort_by(|a, b| {
        let ord = a.number(field).total_cmp(&b.number(field));
        if direction.is_ascending() {
            ord
        } else {
            ord.reverse()
        }
    });
}

fn add(a: Option<&FieldValue>, b: Option<&FieldValue>) -> FieldValue {
    match (a, b) {
        (Some(FieldValue::Integer(x)), Some(FieldValue::Integer(y))) => {
            FieldValue::Integer(x.saturating_add(*y))
        }
        (Some(FieldValue::Integer(x)), None) | (None, Some(FieldValue::Integer(x))) => {
            FieldValue::Integer(*x)
        }
        _ => {
            let a = a.and_then(FieldValue::as_f64).unwrap_or(0.0);
            let b = b.and_then(FieldValue::as_f64).unwrap_or(0.0);
            FieldValue::Number(a + b)
        }
    }
}
