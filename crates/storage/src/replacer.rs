use std::hash::Hash;

use hashlink::LinkedHashSet;
use parking_lot::Mutex;

/// Identifies a frame in the buffer pool.
pub type FrameId = usize;

/// Eviction policy over an arbitrary key type.
///
/// The buffer pool instantiates this at [`FrameId`]; tests also drive it
/// with plain integers.
pub trait Replacer<T: Copy + Eq + Hash> {
    /// Records `value` as just used. A key already present is moved to
    /// the most-recently-used position instead of being duplicated.
    fn insert(&self, value: T);

    /// Removes and returns the least recently inserted key, or `None`
    /// when no candidate exists.
    fn victim(&self) -> Option<T>;

    /// Removes `value`, reporting whether it was present.
    fn erase(&self, value: T) -> bool;

    /// Returns the number of eviction candidates.
    fn size(&self) -> usize;
}

/// Strict LRU replacer: a hash-linked list ordered by recency of insert.
///
/// Every operation is O(1) expected. The internal lock makes each call
/// atomic on its own; callers holding a coarser latch get the same
/// answers either way.
#[derive(Debug, Default)]
pub struct LruReplacer<T: Copy + Eq + Hash> {
    entries: Mutex<LinkedHashSet<T>>,
}

impl<T: Copy + Eq + Hash> LruReplacer<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(LinkedHashSet::new()),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LinkedHashSet::with_capacity(capacity)),
        }
    }
}

impl<T: Copy + Eq + Hash> Replacer<T> for LruReplacer<T> {
    fn insert(&self, value: T) {
        let mut entries = self.entries.lock();
        // detach a present key so it re-attaches at the MRU end
        entries.remove(&value);
        entries.insert(value);
    }

    fn victim(&self) -> Option<T> {
        self.entries.lock().pop_front()
    }

    fn erase(&self, value: T) -> bool {
        self.entries.lock().remove(&value)
    }

    fn size(&self) -> usize {
        self.entries.lock().len()
    }
}
