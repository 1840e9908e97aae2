//! Bounded replay detection for request ids.
//!
//! Keys are remembered by SHA-256 fingerprint for a fixed window. Eviction
//! runs on every insert: first anything older than the window, then the
//! oldest entries until the map is back under capacity.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

pub type Fingerprint = [u8; 32];

pub fn fingerprint(key: &str) -> Fingerprint {
    Sha256::digest(key.as_bytes()).into()
}

#[derive(Debug)]
pub struct Deduplicator {
    window: Duration,
    capacity: usize,
    seen: HashMap<Fingerprint, Instant>,
    // Insertion order; timestamps are non-decreasing front to back.
    order: VecDeque<(Fingerprint, Instant)>,
}

impl Deduplicator {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            capacity: capacity.max(1),
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Record `key` at `now`. Returns `false` if it was already seen within
    /// the window.
    pub fn check_and_insert(&mut self, key: &str, now: Instant) -> bool {
        self.evict_expired(now);

        let fp = fingerprint(key);
        if self.seen.contains_key(&fp) {
            return false;
        }

        self.seen.insert(fp, now);
        self.order.push_back((fp, now));
        while self.seen.len() > self.capacity {
            self.evict_oldest();
        }
        true
    }

    pub fn contains(&self, key: &str, now: Instant) -> bool {
        self.seen
            .get(&fingerprint(key))
            .is_some_and(|seen| now.saturating_duration_since(*seen) < self.window)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some((_, seen)) = self.order.front() {
            if now.saturating_duration_since(*seen) < self.window {
                break;
            }
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) {
        if let Some((fp, _)) = self.order.pop_front() {
            self.seen.remove(&fp);
        }
    }
}
