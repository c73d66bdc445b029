//! Bounded, append-only, id-addressable log.
//!
//! Entries are kept in insertion order inside a `VecDeque`. Each entry gets a
//! monotonically increasing sequence number; an `id → sequence` map gives
//! O(1) lookup without storing references between entries. When the log is
//! full the oldest entry is evicted.

use std::collections::{HashMap, VecDeque};

/// Anything stored in a [`BoundedLog`] must expose a stable string id.
pub trait Keyed {
    /// The entry's unique id.
    fn key(&self) -> &str;
}

/// A capacity-capped append-only sequence.
#[derive(Debug, Clone)]
pub struct BoundedLog<T: Keyed> {
    entries: VecDeque<T>,
    /// Sequence number of `entries[0]`.
    head_seq: u64,
    index: HashMap<String, u64>,
    capacity: usize,
}

impl<T: Keyed> BoundedLog<T> {
    /// Create a log holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            head_seq: 0,
            index: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append an entry, returning the evicted oldest entry if the log was full.
    pub fn push(&mut self, entry: T) -> Option<T> {
        let seq = self.head_seq + self.entries.len() as u64;
        self.index.insert(entry.key().to_string(), seq);
        self.entries.push_back(entry);

        if self.entries.len() > self.capacity {
            let evicted = self.entries.pop_front()?;
            self.index.remove(evicted.key());
            self.head_seq += 1;
            return Some(evicted);
        }
        None
    }

    /// Position of an entry counted from the oldest retained entry.
    pub fn position(&self, id: &str) -> Option<usize> {
        let seq = *self.index.get(id)?;
        Some((seq - self.head_seq) as usize)
    }

    /// Look up an entry by id.
    pub fn get(&self, id: &str) -> Option<&T> {
        self.position(id).and_then(|pos| self.entries.get(pos))
    }

    /// Mutable lookup by id.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        let pos = self.position(id)?;
        self.entries.get_mut(pos)
    }

    /// Entry at a position (0 = oldest retained).
    pub fn at(&self, pos: usize) -> Option<&T> {
        self.entries.get(pos)
    }

    /// Mutable entry at a position.
    pub fn at_mut(&mut self, pos: usize) -> Option<&mut T> {
        self.entries.get_mut(pos)
    }

    /// The entry immediately before `id`, if retained.
    pub fn previous(&self, id: &str) -> Option<&T> {
        let pos = self.position(id)?;
        pos.checked_sub(1).and_then(|p| self.entries.get(p))
    }

    /// The entry immediately after `id`.
    pub fn next(&self, id: &str) -> Option<&T> {
        let pos = self.position(id)?;
        self.entries.get(pos + 1)
    }

    /// Most recent entry.
    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Mutable most recent entry.
    pub fn latest_mut(&mut self) -> Option<&mut T> {
        self.entries.back_mut()
    }

    /// Oldest retained entry.
    pub fn oldest(&self) -> Option<&T> {
        self.entries.front()
    }

    /// Mutable oldest retained entry.
    pub fn oldest_mut(&mut self) -> Option<&mut T> {
        self.entries.front_mut()
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    /// The last `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> Vec<&T> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).collect()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry(String);

    impl Keyed for Entry {
        fn key(&self) -> &str {
            &self.0
        }
    }

    fn entry(id: &str) -> Entry {
        Entry(id.to_string())
    }

    #[test]
    fn test_push_and_lookup() {
        let mut log = BoundedLog::new(3);
        assert!(log.push(entry("a")).is_none());
        assert!(log.push(entry("b")).is_none());

        assert_eq!(log.len(), 2);
        assert_eq!(log.get("a"), Some(&entry("a")));
        assert_eq!(log.position("b"), Some(1));
        assert_eq!(log.latest(), Some(&entry("b")));
    }

    #[test]
    fn test_eviction_drops_oldest() {
        let mut log = BoundedLog::new(2);
        log.push(entry("a"));
        log.push(entry("b"));
        let evicted = log.push(entry("c"));

        assert_eq!(evicted, Some(entry("a")));
        assert_eq!(log.len(), 2);
        assert!(log.get("a").is_none());
        assert_eq!(log.position("b"), Some(0));
        assert_eq!(log.position("c"), Some(1));
        assert_eq!(log.oldest(), Some(&entry("b")));
    }

    #[test]
    fn test_neighbours() {
        let mut log = BoundedLog::new(5);
        for id in ["a", "b", "c"] {
            log.push(entry(id));
        }
        assert_eq!(log.previous("b"), Some(&entry("a")));
        assert_eq!(log.next("b"), Some(&entry("c")));
        assert!(log.previous("a").is_none());
        assert!(log.next("c").is_none());
        assert!(log.previous("missing").is_none());
    }

    #[test]
    fn test_positions_stay_consistent_across_many_evictions() {
        let mut log = BoundedLog::new(4);
        for i in 0..100 {
            log.push(entry(&format!("e{i}")));
        }
        assert_eq!(log.len(), 4);
        for (pos, e) in log.iter().enumerate() {
            assert_eq!(log.position(&e.0), Some(pos));
        }
        assert_eq!(log.oldest(), Some(&entry("e96")));
    }

    #[test]
    fn test_tail() {
        let mut log = BoundedLog::new(10);
        for id in ["a", "b", "c", "d"] {
            log.push(entry(id));
        }
        let tail: Vec<_> = log.tail(2).into_iter().cloned().collect();
        assert_eq!(tail, vec![entry("c"), entry("d")]);
        assert_eq!(log.tail(10).len(), 4);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut log = BoundedLog::new(0);
        log.push(entry("a"));
        log.push(entry("b"));
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.len(), 1);
        assert_eq!(log.latest(), Some(&entry("b")));
    }
}
