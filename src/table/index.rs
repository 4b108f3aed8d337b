//! Secondary indexes over table rows

use std::collections::HashMap;

use crate::table::row::{Key, Row};

/// Maps a key over a fixed column list to the positions of matching rows
#[derive(Debug, Clone)]
pub struct Index {
    columns: Vec<usize>,
    buckets: HashMap<Key, Vec<usize>>,
}

impl Index {
    pub fn new(columns: Vec<usize>) -> Self {
        Index {
            columns,
            buckets: HashMap::new(),
        }
    }

    /// Ordered column list; also the index's identity
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Record `row` under its projected key
    pub fn insert(&mut self, row: &Row) {
        if let Some(key) = row.key(&self.columns) {
            self.buckets.entry(key).or_default().push(row.position);
        }
    }

    /// Positions of rows stored under `key`, in insertion order
    pub fn get(&self, key: &Key) -> Option<&[usize]> {
        self.buckets.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.buckets.contains_key(key)
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn test_buckets_keep_insertion_order() {
        let mut index = Index::new(vec![1]);
        index.insert(&Row::new(0, vec![Value::Integer(1), Value::from("a")]));
        index.insert(&Row::new(1, vec![Value::Integer(2), Value::from("b")]));
        index.insert(&Row::new(2, vec![Value::Integer(3), Value::from("a")]));

        let key = Key::new(vec![Value::from("a")], vec![1]);
        assert_eq!(index.get(&key), Some(&[0, 2][..]));
        assert_eq!(index.len(), 2);
        assert!(!index.contains(&Key::new(vec![Value::from("c")], vec![1])));
    }
}
