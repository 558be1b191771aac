//! Direct-mapped computed table for the BDD operations.
//!
//! A plain array with `2^bits` slots, where each key hashes to exactly one
//! slot and collisions overwrite the previous entry. Memory stays fixed for
//! the whole run no matter how many operations are performed.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub struct Cache<K, V> {
    entries: Vec<Option<(K, V)>>,
    bitmask: u64,
    hits: usize,
    misses: usize,
    faults: usize,
}

impl<K, V> Default for Cache<K, V> {
    fn default() -> Self {
        Self::new(14)
    }
}

impl<K, V> Cache<K, V> {
    /// Create a new cache with `2^bits` slots.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Cache bits must be in range 0..=31, got {}", bits);

        let size = 1usize << bits;
        Self {
            entries: (0..size).map(|_| None).collect(),
            bitmask: (size - 1) as u64,
            hits: 0,
            misses: 0,
            faults: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of lookups answered from the cache.
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Number of lookups that found nothing.
    pub fn misses(&self) -> usize {
        self.misses
    }

    /// Misses on a slot occupied by another key.
    pub fn faults(&self) -> usize {
        self.faults
    }

    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            *entry = None;
        }
    }
}

impl<K: Hash, V> Cache<K, V> {
    #[inline]
    fn index(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() & self.bitmask) as usize
    }
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq,
    V: Copy,
{
    #[inline]
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = self.index(key);
        match &self.entries[idx] {
            Some((k, v)) if k == key => {
                self.hits += 1;
                Some(v)
            }
            Some(_) => {
                self.faults += 1;
                self.misses += 1;
                None
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Insert a result, overwriting whatever occupied its slot.
    #[inline]
    pub fn insert(&mut self, key: K, value: V) {
        let idx = self.index(&key);
        self.entries[idx] = Some((key, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache() {
        let mut cache = Cache::<(u64, u64), i32>::new(3);

        cache.insert((1, 2), 3);
        assert_eq!(cache.get(&(1, 2)), Some(&3));
        assert_eq!(cache.get(&(2, 1)), None);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.capacity(), 8);
    }

    #[test]
    fn test_size_is_fixed() {
        let mut cache = Cache::<(u64, u64), i32>::new(2);
        for i in 0..64 {
            cache.insert((i, 0), i as i32);
        }
        assert_eq!(cache.capacity(), 4);

        let found = (0..64).filter(|&i| cache.get(&(i, 0)).is_some()).count();
        assert!(found <= 4);
        assert!(cache.faults() > 0);
    }

    #[test]
    fn test_clear() {
        let mut cache = Cache::<u32, u32>::default();
        cache.insert(1, 1);
        cache.clear();
        assert_eq!(cache.get(&1), None);
    }
}
