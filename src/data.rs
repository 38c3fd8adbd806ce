//! Data structures for passing keys into and values out of a bulk lookup.

use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::slice;

/// The result of a bulk lookup: every key the lookup could resolve, paired
/// with its value. Keys that are absent are treated as "not found".
pub type ValueMap<K, V> = HashMap<K, V>;

/// A set of keys passed into a bulk lookup. Keys are unique and kept in the
/// order in which their first request arrived, so a lookup that cares about
/// ordering (for instance to build a query string) sees a stable order.
///
/// Several handles requesting the same key share one entry; the worker hands
/// each of them a clone of the resolved value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySet<Key> {
    keys: Vec<Key>,
}

impl<Key: Eq + Hash> KeySet<Key> {
    /// Check if there are any keys in this keyset
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Get the number of unique keys in this keyset.
    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Get an iterator over all the keys in this keyset. These are guaranteed
    /// to be:
    ///
    /// - Unique
    /// - At most as many as the configured `max_batch_size`
    /// - In order of first arrival
    pub fn keys(&self) -> slice::Iter<'_, Key> {
        self.keys.iter()
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Key: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.keys.iter().any(|k| k.borrow() == key)
    }

    /// Build a [`ValueMap`] by computing a value for every key. Useful when
    /// the upstream returns values positionally.
    pub fn into_values<Value>(self, mut get_value: impl FnMut(&Key) -> Value) -> ValueMap<Key, Value> {
        self.keys
            .into_iter()
            .map(|key| {
                let value = get_value(&key);
                (key, value)
            })
            .collect()
    }

    /// Like `into_values`, but `get_value` may decline a key by returning
    /// `None`, leaving it out of the map so it resolves as not found.
    pub fn filter_values<Value>(
        self,
        mut get_value: impl FnMut(&Key) -> Option<Value>,
    ) -> ValueMap<Key, Value> {
        self.keys
            .into_iter()
            .filter_map(|key| get_value(&key).map(move |value| (key, value)))
            .collect()
    }

    /// Pair each entry returned by the upstream with the key it was requested
    /// under. Entries whose key wasn't part of this set are dropped. If the
    /// upstream returns the same key twice, the last entry wins.
    pub fn values_from_iter<Value>(
        &self,
        entries: impl IntoIterator<Item = Value>,
    ) -> ValueMap<Key, Value>
    where
        Key: Clone,
        Value: KeyedEntry<Key>,
    {
        let wanted: HashSet<&Key> = self.keys.iter().collect();

        entries
            .into_iter()
            .filter_map(|entry| {
                let key = wanted.get(entry.get_key())?;
                Some(((*key).clone(), entry))
            })
            .collect()
    }

    /// Iterate over the keys of this set that don't appear in `values`.
    pub fn missing<'a, Value>(
        &'a self,
        values: &'a ValueMap<Key, Value>,
    ) -> impl Iterator<Item = &'a Key> + 'a {
        self.keys.iter().filter(move |key| !values.contains_key(*key))
    }
}

impl<Key: Eq + Hash + Clone> KeySet<Key> {
    /// Collect the unique keys of a batch, in order of first appearance.
    pub(crate) fn collect_from<'a>(keys: impl IntoIterator<Item = &'a Key>) -> Self
    where
        Key: 'a,
    {
        keys.into_iter().cloned().collect()
    }
}

impl<Key: Eq + Hash + Clone> FromIterator<Key> for KeySet<Key> {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        let mut seen = HashSet::new();
        let keys = iter
            .into_iter()
            .filter(|key| seen.insert(key.clone()))
            .collect();

        KeySet { keys }
    }
}

impl<Key> IntoIterator for KeySet<Key> {
    type Item = Key;
    type IntoIter = std::vec::IntoIter<Key>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.into_iter()
    }
}

impl<'a, Key> IntoIterator for &'a KeySet<Key> {
    type Item = &'a Key;
    type IntoIter = slice::Iter<'a, Key>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}

/// Trait for values returned by an upstream that carry their own key, such
/// as a record with an `id` field. Used with [`KeySet::values_from_iter`].
pub trait KeyedEntry<Key: ?Sized> {
    fn get_key(&self) -> &Key;
}
