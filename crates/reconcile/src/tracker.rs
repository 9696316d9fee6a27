//! Keys observed from the source during one run.

use mirror_core::PrimaryKey;
use std::collections::HashSet;

/// Append-only set of source keys.
///
/// The set only grows during a run and is dropped with it. Orphan cleanup
/// deletes every target key missing here.
#[derive(Debug, Default)]
pub struct ProcessedKeySet {
    keys: HashSet<PrimaryKey>,
}

impl ProcessedKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key`; returns `false` if it was already present.
    pub fn insert(&mut self, key: PrimaryKey) -> bool {
        self.keys.insert(key)
    }

    pub fn contains(&self, key: &PrimaryKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_core::Value;

    #[test]
    fn test_insert_reports_duplicates() {
        let mut set = ProcessedKeySet::new();
        assert!(set.insert(PrimaryKey::from(Value::Int(5))));
        assert!(!set.insert(PrimaryKey::from(Value::Int(5))));
        assert_eq!(set.len(), 1);
        assert!(set.contains(&PrimaryKey::from(Value::Int(5))));
    }
}
