//! Rows and index keys

use std::hash::{Hash, Hasher};

use crate::types::Value;

/// A fixed-length value vector plus its insertion position
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub position: usize,
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(position: usize, values: Vec<Value>) -> Self {
        Row { position, values }
    }

    pub fn get(&self, ordinal: usize) -> Option<&Value> {
        self.values.get(ordinal)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Project the values at `columns` into a key.
    ///
    /// Returns `None` if any ordinal is out of range.
    pub fn key(&self, columns: &[usize]) -> Option<Key> {
        let values = columns
            .iter()
            .map(|&c| self.values.get(c).cloned())
            .collect::<Option<Vec<_>>>()?;
        Some(Key::new(values, columns.to_vec()))
    }
}

/// Selected values of a row together with the ordinals they came from.
///
/// Equality and hashing look at the values only: two keys built from
/// different tables with the same layout compare equal.
#[derive(Debug, Clone)]
pub struct Key {
    pub values: Vec<Value>,
    pub columns: Vec<usize>,
}

impl Key {
    pub fn new(values: Vec<Value>, columns: Vec<usize>) -> Self {
        Key { values, columns }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| key_value_eq(a, b))
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.values.len().hash(state);
        for value in &self.values {
            match value {
                Value::Integer(i) => {
                    0u8.hash(state);
                    i.hash(state);
                }
                Value::Real(r) => {
                    1u8.hash(state);
                    real_bits(*r).hash(state);
                }
                Value::Text(s) => {
                    2u8.hash(state);
                    s.hash(state);
                }
                Value::Boolean(b) => {
                    3u8.hash(state);
                    b.hash(state);
                }
            }
        }
    }
}

fn key_value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Real(x), Value::Real(y)) => real_bits(*x) == real_bits(*y),
        _ => a == b,
    }
}

// -0.0 and 0.0 share a bucket
fn real_bits(r: f64) -> u64 {
    if r == 0.0 {
        0
    } else {
        r.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_projects_columns() {
        let row = Row::new(0, vec![Value::Integer(1), Value::from("a"), Value::Real(2.0)]);
        let key = row.key(&[2, 0]).unwrap();
        assert_eq!(key.values, vec![Value::Real(2.0), Value::Integer(1)]);
        assert_eq!(key.columns, vec![2, 0]);
        assert!(row.key(&[3]).is_none());
    }

    #[test]
    fn test_key_equality_ignores_origin_columns() {
        let a = Key::new(vec![Value::from("x")], vec![0]);
        let b = Key::new(vec![Value::from("x")], vec![4]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_hash_consistent_for_reals() {
        let mut set = HashSet::new();
        set.insert(Key::new(vec![Value::Real(0.0)], vec![0]));
        assert!(set.contains(&Key::new(vec![Value::Real(-0.0)], vec![0])));
        assert!(!set.contains(&Key::new(vec![Value::Integer(0)], vec![0])));
    }
}
