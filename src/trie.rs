use std::collections::HashMap;
use std::hash::Hash;

/// Mutable trie used while a spec table is being assembled.
///
/// Construction code inspects `has_value`/`has_branches` to detect prefix
/// conflicts before inserting; once every entry is in place the builder is
/// consumed by [`TrieBuilder::freeze`] and only the read-only [`Trie`] is
/// kept around.
pub struct TrieBuilder<K, V> {
    branches: HashMap<K, TrieBuilder<K, V>>,
    value: Option<V>,
}

impl<K: Eq + Hash, V> TrieBuilder<K, V> {
    pub fn new() -> Self {
        Self {
            branches: HashMap::new(),
            value: None,
        }
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn has_branches(&self) -> bool {
        !self.branches.is_empty()
    }

    pub fn set_value(&mut self, value: V) {
        self.value = Some(value);
    }

    pub fn ensure_branch(&mut self, key: K) -> &mut TrieBuilder<K, V> {
        self.branches.entry(key).or_insert_with(TrieBuilder::new)
    }

    pub fn freeze(self) -> Trie<K, V> {
        let branches = self
            .branches
            .into_iter()
            .map(|(key, branch)| (key, branch.freeze()))
            .collect();

        Trie {
            branches,
            value: self.value,
        }
    }
}

impl<K: Eq + Hash, V> Default for TrieBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Frozen form of [`TrieBuilder`]. Lookup only.
pub struct Trie<K, V> {
    branches: HashMap<K, Trie<K, V>>,
    value: Option<V>,
}

impl<K: Eq + Hash, V> Trie<K, V> {
    pub fn branch(&self, key: &K) -> Option<&Trie<K, V>> {
        self.branches.get(key)
    }

    pub fn has_branches(&self) -> bool {
        !self.branches.is_empty()
    }

    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_lookup() {
        let mut builder = TrieBuilder::new();
        builder.ensure_branch(1u8).ensure_branch(2u8).set_value("a");
        builder.ensure_branch(3u8).set_value("b");

        let trie = builder.freeze();

        let node = trie.branch(&1).unwrap();
        assert!(node.value().is_none());
        assert!(node.has_branches());
        assert_eq!(node.branch(&2).unwrap().value(), Some(&"a"));
        assert_eq!(trie.branch(&3).unwrap().value(), Some(&"b"));
        assert!(trie.branch(&4).is_none());
    }

    #[test]
    fn test_conflict_is_visible_to_builder() {
        let mut builder = TrieBuilder::new();
        builder.ensure_branch(1u8).set_value(0);

        // a spec table builder walking 1 -> 2 sees the value at 1 and can
        // reject the insertion as an ambiguous prefix
        assert!(builder.ensure_branch(1).has_value());
    }
}
