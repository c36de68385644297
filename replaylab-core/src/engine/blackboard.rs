//! Named numeric values shared between stages of one evaluation loop.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key → value map written by signal stages and read by later stages.
///
/// Keys are ordered so snapshots serialize deterministically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Blackboard {
    values: BTreeMap<String, f64>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn get_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).unwrap_or(default)
    }

    /// Set `key`, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: f64) -> Option<f64> {
        self.values.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<f64> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_overwrite() {
        let mut board = Blackboard::new();
        assert_eq!(board.set("BTC/USD.signal", 1.0), None);
        assert_eq!(board.set("BTC/USD.signal", -1.0), Some(1.0));
        assert_eq!(board.get("BTC/USD.signal"), Some(-1.0));
        assert_eq!(board.get_or("missing", 0.5), 0.5);
    }

    #[test]
    fn iteration_is_key_ordered() {
        let mut board = Blackboard::new();
        board.set("b", 2.0);
        board.set("a", 1.0);
        let keys: Vec<&str> = board.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
