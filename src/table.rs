use std::collections::HashMap;
use std::hash::Hash;
use std::ops::Index;

/// Unique table: an append-only arena of values with a reverse index.
///
/// Index 0 is a sentinel and never handed out, so that `0` can be used as the
/// "no node" marker by callers. Values are never dropped: symbolic sets stay
/// valid for the lifetime of the manager and can be shared freely across
/// refinement rounds.
pub struct Table<T> {
    data: Vec<T>,
    index: HashMap<T, u32>,
}

impl<T> Table<T>
where
    T: Default + Clone + Eq + Hash,
{
    /// Create a new table with room for `2^bits` values before reallocation.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Storage bits should be in the range 0..=31");
        let capacity = 1usize << bits.min(20);
        let mut data = Vec::with_capacity(capacity);
        data.push(T::default()); // sentinel
        Self {
            data,
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Number of stored values, including the sentinel.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Get the value at the given index.
    pub fn value(&self, index: u32) -> &T {
        assert_ne!(index, 0, "Index is 0");
        &self.data[index as usize]
    }

    /// Append a value without deduplication and return its index.
    pub fn add(&mut self, value: T) -> u32 {
        let i = self.data.len();
        assert!(i < i32::MAX as usize, "Storage is full");
        self.data.push(value);
        i as u32
    }

    /// Put a value into the table, returning the index of an equal value if
    /// one is already stored.
    pub fn put(&mut self, value: T) -> u32 {
        if let Some(&i) = self.index.get(&value) {
            return i;
        }
        let i = self.add(value.clone());
        self.index.insert(value, i);
        i
    }
}

impl<T> Index<u32> for Table<T>
where
    T: Default + Clone + Eq + Hash,
{
    type Output = T;

    fn index(&self, index: u32) -> &Self::Output {
        self.value(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add() {
        let mut table = Table::new(2);
        let index = table.add(42);
        assert_eq!(index, 1);
        assert_eq!(table[index], 42);
    }

    #[test]
    fn test_put_deduplicates() {
        let mut table = Table::new(2);
        let a = table.put((1, 2));
        let b = table.put((2, 1));
        let c = table.put((1, 2));
        assert_ne!(a, b);
        assert_eq!(a, c);
        assert_eq!(table.size(), 3);
    }

    #[test]
    #[should_panic(expected = "Index is 0")]
    fn test_sentinel_is_not_addressable() {
        let table = Table::<u8>::new(1);
        table.value(0);
    }
}
