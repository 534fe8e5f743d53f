//! Directory search cache.
//!
//! Find-first and find-next are separate guest calls, so the listing taken
//! by find-first has to outlive the call. Snapshots live in a fixed array
//! indexed by `serial % SEARCH_CACHE_SIZE`.
//!
//! The cache is lossy: two searches whose serials collide share a slot and
//! the later find-first silently replaces the earlier snapshot. A find-next
//! on the older search then continues through the newer listing.

use crate::host::HostEntry;

/// Number of searches that can be in progress at once.
pub const SEARCH_CACHE_SIZE: usize = 4;

/// Entries captured by one find-first, in guest order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirSnapshot {
    entries: Vec<HostEntry>,
}

impl DirSnapshot {
    pub fn new(entries: Vec<HostEntry>) -> Self {
        Self { entries }
    }

    pub fn get(&self, index: usize) -> Option<&HostEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostEntry> {
        self.entries.iter()
    }
}

/// Fixed-size table of in-progress searches.
#[derive(Debug, Default)]
pub struct SearchCache {
    slots: [Option<DirSnapshot>; SEARCH_CACHE_SIZE],
}

impl SearchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot used by a search serial.
    pub fn slot_for(serial: u16) -> usize {
        serial as usize % SEARCH_CACHE_SIZE
    }

    /// Store a new snapshot, replacing whatever shared the slot.
    pub fn insert(&mut self, serial: u16, snapshot: DirSnapshot) -> &DirSnapshot {
        self.slots[Self::slot_for(serial)].insert(snapshot)
    }

    pub fn get(&self, serial: u16) -> Option<&DirSnapshot> {
        self.slots[Self::slot_for(serial)].as_ref()
    }

    /// Entry `index` of the search with this serial.
    pub fn entry(&self, serial: u16, index: usize) -> Option<&HostEntry> {
        self.get(serial).and_then(|s| s.get(index))
    }

    /// Drop every snapshot.
    pub fn clear(&mut self) {
        self.slots = Default::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fib::DosDateTime;

    fn entry(name: &str) -> HostEntry {
        HostEntry::file(name, 1, DosDateTime::default())
    }

    fn snapshot(names: &[&str]) -> DirSnapshot {
        DirSnapshot::new(names.iter().map(|n| entry(n)).collect())
    }

    #[test]
    fn test_empty_cache() {
        let cache = SearchCache::new();
        for serial in 0..8 {
            assert!(cache.get(serial).is_none());
            assert!(cache.entry(serial, 0).is_none());
        }
    }

    #[test]
    fn test_independent_slots() {
        let mut cache = SearchCache::new();
        cache.insert(0, snapshot(&["A.TXT"]));
        cache.insert(1, snapshot(&["B.TXT", "C.TXT"]));

        assert_eq!(cache.entry(0, 0).map(|e| e.name.as_str()), Some("A.TXT"));
        assert_eq!(cache.entry(1, 1).map(|e| e.name.as_str()), Some("C.TXT"));
        assert!(cache.entry(0, 1).is_none());
    }

    #[test]
    fn test_colliding_serials_share_a_slot() {
        let mut cache = SearchCache::new();
        cache.insert(1, snapshot(&["OLD.TXT"]));
        cache.insert(1 + SEARCH_CACHE_SIZE as u16, snapshot(&["NEW1.TXT", "NEW2.TXT"]));

        // The first search now walks the second listing.
        assert_eq!(cache.entry(1, 0).map(|e| e.name.as_str()), Some("NEW1.TXT"));
        assert_eq!(cache.entry(1, 1).map(|e| e.name.as_str()), Some("NEW2.TXT"));
    }

    #[test]
    fn test_clear() {
        let mut cache = SearchCache::new();
        cache.insert(3, snapshot(&["X"]));
        cache.clear();
        assert!(cache.get(3).is_none());
    }
}
