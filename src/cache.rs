// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Shared LRU cache of upstream responses, keyed by the raw request bytes.
//!
//! Entries live in a slab arena and are threaded onto a doubly-linked recency
//! list through stable slab indices; a hashed index maps keys to the same
//! indices for O(1) lookup. A single reader-writer lock guards both
//! structures. Lookups take the read lock to find the entry, then reacquire
//! as a writer to promote it — revalidating by key after the upgrade, since
//! another writer may have evicted the entry in the window between the locks.
//!
//! Response bodies are immutable after insertion and handed out as `Arc`
//! snapshots, so hits stream to sockets without holding the lock.

use ahash::RandomState;
use slab::Slab;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::stats::Stats;

pub struct Cache {
    inner: RwLock<Inner>,
    max_total_bytes: usize,
    max_entry_bytes: usize,
    stats: Arc<Stats>,
}

struct Inner {
    entries: Slab<Entry>,
    index: HashMap<Box<[u8]>, usize, RandomState>,
    head: Option<usize>,
    tail: Option<usize>,
    total_bytes: usize,
}

#[allow(dead_code)]
struct Entry {
    key: Box<[u8]>,
    body: Arc<[u8]>,
    inserted_at: Instant,
    last_access_at: Instant,
    access_count: u64,
    prev: Option<usize>,
    next: Option<usize>,
}

// accounted size of an entry: body + key + fixed bookkeeping overhead
fn entry_cost(key_len: usize, body_len: usize) -> usize {
    body_len + key_len + std::mem::size_of::<Entry>()
}

impl Cache {
    pub fn new(max_total_bytes: usize, max_entry_bytes: usize, stats: Arc<Stats>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: Slab::new(),
                index: HashMap::with_hasher(RandomState::new()),
                head: None,
                tail: None,
                total_bytes: 0,
            }),
            max_total_bytes,
            max_entry_bytes,
            stats,
        }
    }

    /// Looks up `key`, returning a snapshot of the cached body on a hit. The
    /// hit promotes the entry to the head of the recency list and stamps its
    /// access metadata.
    pub fn lookup(&self, key: &[u8]) -> Option<Arc<[u8]>> {
        {
            let inner = self.inner.read().unwrap();
            if !inner.index.contains_key(key) {
                self.stats.record_miss();
                return None;
            }
        }

        // upgrade by reacquiring as a writer; the entry may be gone by now
        let mut inner = self.inner.write().unwrap();
        match inner.index.get(key).copied() {
            Some(idx) => {
                inner.unlink(idx);
                inner.link_front(idx);
                let entry = &mut inner.entries[idx];
                entry.last_access_at = Instant::now();
                entry.access_count += 1;
                self.stats.record_hit();
                Some(entry.body.clone())
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Stores `body` under `key`, evicting from the tail until it fits.
    /// Returns `false` when the entry alone exceeds the per-entry ceiling.
    /// An existing entry under the same key is replaced.
    pub fn insert(&self, key: &[u8], body: Vec<u8>) -> bool {
        let cost = entry_cost(key.len(), body.len());
        if cost > self.max_entry_bytes {
            return false;
        }

        let mut inner = self.inner.write().unwrap();

        if let Some(idx) = inner.index.get(key).copied() {
            inner.remove(idx);
        }

        // eviction and insertion under one write-lock critical section, so a
        // concurrent insert never observes an inconsistent total
        while inner.total_bytes + cost > self.max_total_bytes {
            if !inner.remove_tail() {
                break;
            }
        }

        let now = Instant::now();
        let idx = inner.entries.insert(Entry {
            key: key.into(),
            body: body.into(),
            inserted_at: now,
            last_access_at: now,
            access_count: 1,
            prev: None,
            next: None,
        });
        inner.index.insert(key.into(), idx);
        inner.link_front(idx);
        inner.total_bytes += cost;

        true
    }

    /// Removes the least-recently-used entry; no-op on an empty cache.
    pub fn evict_one(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.remove_tail();
    }

    /// Current accounted footprint in bytes.
    pub fn total_bytes(&self) -> usize {
        self.inner.read().unwrap().total_bytes
    }

    pub fn entry_count(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }
}

impl Inner {
    fn link_front(&mut self, idx: usize) {
        self.entries[idx].prev = None;
        self.entries[idx].next = self.head;
        if let Some(old_head) = self.head {
            self.entries[old_head].prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let entry = &self.entries[idx];
            (entry.prev, entry.next)
        };
        match prev {
            Some(p) => self.entries[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.entries[n].prev = prev,
            None => self.tail = prev,
        }
        self.entries[idx].prev = None;
        self.entries[idx].next = None;
    }

    fn remove(&mut self, idx: usize) {
        self.unlink(idx);
        let entry = self.entries.remove(idx);
        self.index.remove(&entry.key);
        self.total_bytes -= entry_cost(entry.key.len(), entry.body.len());
    }

    fn remove_tail(&mut self) -> bool {
        match self.tail {
            Some(idx) => {
                self.remove(idx);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_for(max_total: usize, max_entry: usize) -> Cache {
        Cache::new(max_total, max_entry, Arc::new(Stats::new()))
    }

    // a limit that fits exactly `n` entries of the given key/body sizes
    fn fits(n: usize, key_len: usize, body_len: usize) -> usize {
        n * entry_cost(key_len, body_len)
    }

    #[test]
    fn miss_then_hit() {
        let cache = cache_for(fits(4, 1, 5), fits(1, 1, 5));
        assert!(cache.lookup(b"A").is_none());
        assert!(cache.insert(b"A", b"hello".to_vec()));
        let body = cache.lookup(b"A").expect("expected a hit");
        assert_eq!(&body[..], b"hello");
    }

    #[test]
    fn hits_are_byte_identical() {
        let cache = cache_for(fits(4, 1, 5), fits(1, 1, 5));
        cache.insert(b"A", b"hello".to_vec());
        let first = cache.lookup(b"A").unwrap();
        let second = cache.lookup(b"A").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn keys_are_exact_bytes() {
        let cache = cache_for(fits(4, 2, 5), fits(1, 2, 5));
        cache.insert(b"A\n", b"hello".to_vec());
        assert!(cache.lookup(b"A").is_none());
        assert!(cache.lookup(b"A ").is_none());
        assert!(cache.lookup(b"A\n").is_some());
    }

    #[test]
    fn oversize_entry_is_rejected() {
        let cache = cache_for(fits(4, 1, 4), fits(1, 1, 4));
        assert!(!cache.insert(b"A", b"hello".to_vec()));
        assert!(cache.lookup(b"A").is_none());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn total_footprint_never_exceeds_limit() {
        let max_total = fits(3, 1, 8);
        let cache = cache_for(max_total, fits(1, 1, 8));
        for key in 0u8..32 {
            assert!(cache.insert(&[key], vec![0u8; 8]));
            assert!(cache.total_bytes() <= max_total);
        }
        assert_eq!(cache.entry_count(), 3);
    }

    #[test]
    fn lru_eviction_order() {
        // room for exactly two entries
        let cache = cache_for(fits(2, 1, 4), fits(1, 1, 4));
        assert!(cache.insert(b"A", b"aaaa".to_vec()));
        assert!(cache.insert(b"B", b"bbbb".to_vec()));
        assert!(cache.insert(b"C", b"cccc".to_vec()));

        assert!(cache.lookup(b"A").is_none());
        assert!(cache.lookup(b"B").is_some());
        assert!(cache.lookup(b"C").is_some());
    }

    #[test]
    fn lookup_promotes_against_eviction() {
        let cache = cache_for(fits(2, 1, 4), fits(1, 1, 4));
        cache.insert(b"A", b"aaaa".to_vec());
        cache.insert(b"B", b"bbbb".to_vec());

        // touch A so that B becomes the eviction candidate
        assert!(cache.lookup(b"A").is_some());
        cache.insert(b"C", b"cccc".to_vec());

        assert!(cache.lookup(b"A").is_some());
        assert!(cache.lookup(b"B").is_none());
        assert!(cache.lookup(b"C").is_some());
    }

    #[test]
    fn repeated_lookup_stays_a_hit() {
        let cache = cache_for(fits(2, 1, 4), fits(1, 1, 4));
        cache.insert(b"A", b"aaaa".to_vec());
        assert!(cache.lookup(b"A").is_some());
        assert!(cache.lookup(b"A").is_some());
    }

    #[test]
    fn duplicate_key_replaces_entry() {
        let cache = cache_for(fits(3, 1, 4), fits(1, 1, 4));
        cache.insert(b"A", b"old!".to_vec());
        cache.insert(b"A", b"new!".to_vec());
        assert_eq!(cache.entry_count(), 1);
        assert_eq!(&cache.lookup(b"A").unwrap()[..], b"new!");
    }

    #[test]
    fn evict_one_removes_the_tail_and_tolerates_empty() {
        let cache = cache_for(fits(3, 1, 4), fits(1, 1, 4));
        cache.evict_one();
        cache.insert(b"A", b"aaaa".to_vec());
        cache.insert(b"B", b"bbbb".to_vec());
        cache.evict_one();
        assert!(cache.lookup(b"A").is_none());
        assert!(cache.lookup(b"B").is_some());
    }

    #[test]
    fn lookup_counts_hits_and_misses() {
        let stats = Arc::new(Stats::new());
        let cache = Cache::new(fits(2, 1, 4), fits(1, 1, 4), stats.clone());
        cache.lookup(b"A");
        cache.insert(b"A", b"aaaa".to_vec());
        cache.lookup(b"A");
        assert_eq!(stats.cache_hits(), 1);
        assert_eq!(stats.cache_misses(), 1);
    }

    #[test]
    fn parallel_lookups_keep_the_structure_consistent() {
        let cache = Arc::new(cache_for(fits(8, 1, 16), fits(1, 1, 16)));
        for key in 0u8..8 {
            cache.insert(&[key], vec![key; 16]);
        }

        let mut handles = Vec::new();
        for t in 0u8..4 {
            let cache = cache.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..1000u32 {
                    let key = [((i as u8).wrapping_add(t)) % 8];
                    if let Some(body) = cache.lookup(&key) {
                        assert_eq!(&body[..], &[key[0]; 16]);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().expect("lookup thread panicked");
        }
        assert_eq!(cache.entry_count(), 8);
    }
}
