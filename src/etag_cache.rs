//! Bounded cache of HTTP validators used for conditional feature requests.
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// Least-recently-used map of request URL to `ETag`.
///
/// All operations are atomic: the cache owns its lock, and a `get` both reads the entry and
/// refreshes its recency under the same lock.
#[derive(Debug)]
pub struct EtagCache {
    max_size: usize,
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Monotonic access counter. Entry with the smallest tick is the least recently used.
    tick: u64,
}

#[derive(Debug)]
struct Entry {
    etag: String,
    last_used: u64,
}

impl Inner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

impl EtagCache {
    /// Default capacity.
    pub const DEFAULT_MAX_SIZE: usize = 100;

    /// Create a cache holding at most `max_size` entries.
    pub fn new(max_size: usize) -> EtagCache {
        EtagCache {
            max_size,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every operation leaves the map consistent before it can panic.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the ETag stored for `url` and mark it as most recently used.
    pub fn get(&self, url: &str) -> Option<String> {
        let mut inner = self.lock();
        let tick = inner.next_tick();
        let entry = inner.entries.get_mut(url)?;
        entry.last_used = tick;
        Some(entry.etag.clone())
    }

    /// Store `etag` for `url`, evicting the least recently used entry if the cache is full.
    ///
    /// `None` removes the entry.
    pub fn put(&self, url: &str, etag: Option<&str>) {
        let Some(etag) = etag else {
            self.remove(url);
            return;
        };
        if self.max_size == 0 {
            return;
        }

        let mut inner = self.lock();
        let tick = inner.next_tick();
        if let Some(entry) = inner.entries.get_mut(url) {
            entry.etag = etag.to_owned();
            entry.last_used = tick;
            return;
        }

        if inner.entries.len() >= self.max_size {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(url, _)| url.clone());
            if let Some(oldest) = oldest {
                log::trace!(target: "growthbook", url = oldest.as_str(); "evicting etag");
                inner.entries.remove(&oldest);
            }
        }

        inner.entries.insert(
            url.to_owned(),
            Entry {
                etag: etag.to_owned(),
                last_used: tick,
            },
        );
    }

    /// Remove the entry for `url`, returning its ETag.
    pub fn remove(&self, url: &str) -> Option<String> {
        self.lock().entries.remove(url).map(|entry| entry.etag)
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Return `true` if `url` has an entry. Does not affect recency.
    pub fn contains(&self, url: &str) -> bool {
        self.lock().entries.contains_key(url)
    }

    pub fn size(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

impl Default for EtagCache {
    fn default() -> EtagCache {
        EtagCache::new(EtagCache::DEFAULT_MAX_SIZE)
    }
}
