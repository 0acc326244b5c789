//! Insertion-ordered collections whose keys compare case and whitespace insensitively,
//! matching how the server resolves object names.

use std::{collections::HashMap, fmt::Debug, hash::Hash};

use serde::{Serialize, Serializer};

/// Lower-cases `name` and strips every whitespace character.
pub fn normalize(name: &str) -> String {
    name.split_whitespace().collect::<String>().to_lowercase()
}

/// Compares two names the way the server does.
pub fn insensitive_eq(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Keys (and borrowed lookup forms of keys) that have an insensitive normal form.
pub trait Normalize {
    /// Form two keys share exactly when the server treats them as the same name.
    type Normalized: Eq + Hash + Clone;

    /// Normal form of `self`.
    fn normalize(&self) -> Self::Normalized;
}

impl Normalize for str {
    type Normalized = String;

    fn normalize(&self) -> String {
        normalize(self)
    }
}

impl Normalize for String {
    type Normalized = String;

    fn normalize(&self) -> String {
        normalize(self)
    }
}

impl<S: AsRef<str>> Normalize for [S] {
    type Normalized = Vec<String>;

    fn normalize(&self) -> Vec<String> {
        self.iter().map(|s| normalize(s.as_ref())).collect()
    }
}

impl<S: AsRef<str>> Normalize for Vec<S> {
    type Normalized = Vec<String>;

    fn normalize(&self) -> Vec<String> {
        self.as_slice().normalize()
    }
}

/// Ordered map keyed insensitively.
///
/// Re-inserting an equivalent key replaces both the stored key and the value
/// but keeps the entry at its original position.
#[derive(Clone)]
pub struct InsensitiveMap<K: Normalize, V> {
    entries: Vec<(K, V)>,
    index: HashMap<K::Normalized, usize>,
}

/// Insensitive map keyed by a single name.
pub type InsensitiveDict<V> = InsensitiveMap<String, V>;

/// Insensitive map keyed by a tuple of element names.
pub type InsensitiveTupleMap<V> = InsensitiveMap<Vec<String>, V>;

impl<K: Normalize, V> Default for InsensitiveMap<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K: Normalize, V> InsensitiveMap<K, V> {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty map with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Inserts `value`, returning the previous value stored under an equivalent key.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let normalized = key.normalize();
        if let Some(&position) = self.index.get(&normalized) {
            let (_, old) = std::mem::replace(&mut self.entries[position], (key, value));
            return Some(old);
        }
        self.index.insert(normalized, self.entries.len());
        self.entries.push((key, value));
        None
    }

    /// Value stored under a key equivalent to `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        Q: Normalize<Normalized = K::Normalized> + ?Sized,
    {
        self.index
            .get(&key.normalize())
            .map(|&position| &self.entries[position].1)
    }

    /// Mutable [`InsensitiveMap::get`].
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        Q: Normalize<Normalized = K::Normalized> + ?Sized,
    {
        let position = *self.index.get(&key.normalize())?;
        Some(&mut self.entries[position].1)
    }

    /// Returns the key as it was stored, which may differ in case or spacing from `key`.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        Q: Normalize<Normalized = K::Normalized> + ?Sized,
    {
        self.index.get(&key.normalize()).map(|&position| {
            let (k, v) = &self.entries[position];
            (k, v)
        })
    }

    /// Whether a key equivalent to `key` is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        Q: Normalize<Normalized = K::Normalized> + ?Sized,
    {
        self.index.contains_key(&key.normalize())
    }

    /// Removes an entry, shifting later entries down to keep insertion order.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        Q: Normalize<Normalized = K::Normalized> + ?Sized,
    {
        let position = self.index.remove(&key.normalize())?;
        let (_, value) = self.entries.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(value)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` without entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order, keys as stored.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &K> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Values in insertion order.
    pub fn values(&self) -> impl ExactSizeIterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Entry at `position` in insertion order.
    pub fn get_index(&self, position: usize) -> Option<(&K, &V)> {
        self.entries.get(position).map(|(k, v)| (k, v))
    }

    /// Entries in insertion order.
    pub fn as_slice(&self) -> &[(K, V)] {
        &self.entries
    }
}

impl<K: Normalize + Debug, V: Debug> Debug for InsensitiveMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Normalize, V: PartialEq> PartialEq for InsensitiveMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|((ka, va), (kb, vb))| ka.normalize() == kb.normalize() && va == vb)
    }
}

/// Serializes as a map in insertion order, keys as stored.
impl<K: Normalize + Serialize, V: Serialize> Serialize for InsensitiveMap<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

impl<K: Normalize, V> FromIterator<(K, V)> for InsensitiveMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K: Normalize, V> Extend<(K, V)> for InsensitiveMap<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K: Normalize, V> IntoIterator for InsensitiveMap<K, V> {
    type Item = (K, V);
    type IntoIter = std::vec::IntoIter<(K, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a, K: Normalize, V> IntoIterator for &'a InsensitiveMap<K, V> {
    type Item = &'a (K, V);
    type IntoIter = std::slice::Iter<'a, (K, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Ordered set of names compared insensitively; the first spelling wins.
#[derive(Clone, Default, PartialEq)]
pub struct InsensitiveSet {
    inner: InsensitiveMap<String, ()>,
}

impl InsensitiveSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if an equivalent name was already present.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.inner.contains_key(name.as_str()) {
            return false;
        }
        self.inner.insert(name, ());
        true
    }

    /// Whether an equivalent name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Returns `false` if no equivalent name was present.
    pub fn remove(&mut self, name: &str) -> bool {
        self.inner.remove(name).is_some()
    }

    /// Number of names.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// `true` without names.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Names in insertion order, first spelling kept.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &String> {
        self.inner.keys()
    }
}

impl Debug for InsensitiveSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<S: Into<String>> FromIterator<S> for InsensitiveSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for name in iter {
            set.insert(name);
        }
        set
    }
}

impl<S: Into<String>> Extend<S> for InsensitiveSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for name in iter {
            self.insert(name);
        }
    }
}
