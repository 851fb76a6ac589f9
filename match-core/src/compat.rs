use std::collections::HashMap;
use tracing::warn;

/// One record of a [`CompatibilityMap`]. `value == None` means no compatible
/// commit was found for `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub key: String,
    pub value: Option<String>,
}

/// Insertion-ordered association list from a commit on one side to its
/// compatible commit on the other side. Keys are write-once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompatibilityMap {
    entries: Vec<MapEntry>,
    index: HashMap<String, usize>,
}

impl CompatibilityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key -> value` unless `key` is already present. Returns whether
    /// the entry was written.
    pub fn insert(&mut self, key: &str, value: Option<&str>) -> bool {
        if self.index.contains_key(key) {
            return false;
        }
        self.index.insert(key.to_string(), self.entries.len());
        self.entries.push(MapEntry {
            key: key.to_string(),
            value: value.map(str::to_string),
        });
        true
    }

    /// Mark `key` as having no compatible commit
    pub fn mark_unmatched(&mut self, key: &str) -> bool {
        self.insert(key, None)
    }

    pub fn get(&self, key: &str) -> Option<&MapEntry> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Entries in discovery order, newest first
    pub fn entries(&self) -> &[MapEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn matched_count(&self) -> usize {
        self.entries.iter().filter(|e| e.value.is_some()).count()
    }

    /// Merge maps from several runs into a new one. For each key a concrete
    /// pairing beats "unmatched"; between two different pairings the first
    /// one seen wins. Keys keep the order of their first appearance.
    pub fn reconcile<'a, I>(maps: I) -> CompatibilityMap
    where
        I: IntoIterator<Item = &'a CompatibilityMap>,
    {
        let mut order: Vec<String> = Vec::new();
        let mut chosen: HashMap<String, Option<String>> = HashMap::new();

        for map in maps {
            for entry in &map.entries {
                match chosen.get_mut(&entry.key) {
                    None => {
                        order.push(entry.key.clone());
                        chosen.insert(entry.key.clone(), entry.value.clone());
                    }
                    Some(slot) => {
                        if slot.is_none() {
                            *slot = entry.value.clone();
                        } else if let (Some(kept), Some(other)) = (slot.as_ref(), entry.value.as_ref()) {
                            if kept != other {
                                warn!("conflicting pairings for {}: keeping {}, ignoring {}", entry.key, kept, other);
                            }
                        }
                    }
                }
            }
        }

        let mut merged = CompatibilityMap::new();
        for key in order {
            let value = chosen.get(&key).cloned().flatten();
            merged.insert(&key, value.as_deref());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(map: &CompatibilityMap) -> Vec<(&str, Option<&str>)> {
        map.entries().iter().map(|e| (e.key.as_str(), e.value.as_deref())).collect()
    }

    #[test]
    fn test_keys_are_write_once() {
        let mut map = CompatibilityMap::new();
        assert!(map.insert("a2", Some("b3")));
        assert!(!map.insert("a2", Some("b1")));
        assert!(!map.mark_unmatched("a2"));

        assert!(map.mark_unmatched("a1"));
        assert!(!map.insert("a1", Some("b0")));

        assert_eq!(pairs(&map), vec![("a2", Some("b3")), ("a1", None)]);
        assert_eq!(map.matched_count(), 1);
        assert_eq!(map.get("a2").and_then(|e| e.value.as_deref()), Some("b3"));
    }

    #[test]
    fn test_reconcile_prefers_concrete_pairing() {
        let mut first = CompatibilityMap::new();
        first.insert("a3", Some("b3"));
        first.mark_unmatched("a2");

        let mut second = CompatibilityMap::new();
        second.insert("a2", Some("b2"));
        second.insert("a3", Some("b9"));
        second.insert("a1", Some("b1"));

        let merged = CompatibilityMap::reconcile([&first, &second]);
        assert_eq!(pairs(&merged), vec![("a3", Some("b3")), ("a2", Some("b2")), ("a1", Some("b1"))]);
    }
}
