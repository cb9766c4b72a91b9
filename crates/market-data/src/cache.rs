//! Surface cache
//!
//! Holds one slot per (pair, tenor, UTC date). A slot is either a ready
//! entry or an in-flight fetch that later callers join instead of issuing
//! their own upstream call.
//!
//! ```text
//! Empty -> Fetching -> Fresh -> Stale -> Fetching -> Fresh | Empty
//! ```
//!
//! The slot map lock is only held to check and update slots, never across
//! an await.

use crate::types::{CurrencyPair, GapReason, Tenor, TenorOutcome, VolatilityPoint};
use chrono::{NaiveDate, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use observability::CacheMetrics;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Fetch shared by every caller waiting on the same key
pub type SharedFetch = Shared<BoxFuture<'static, TenorOutcome>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub pair: CurrencyPair,
    pub tenor: Tenor,
    /// UTC date the quotes belong to
    pub bucket: NaiveDate,
}

impl CacheKey {
    pub fn new(pair: CurrencyPair, tenor: Tenor, bucket: NaiveDate) -> Self {
        Self { pair, tenor, bucket }
    }

    /// Key in today's UTC bucket
    pub fn today(pair: CurrencyPair, tenor: Tenor) -> Self {
        Self::new(pair, tenor, Utc::now().date_naive())
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub point: VolatilityPoint,
    pub fetched_at: Instant,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Observable state of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Empty,
    Fetching,
    Fresh,
    Stale,
}

enum Slot {
    Ready(CacheEntry),
    Fetching {
        id: u64,
        fetch: SharedFetch,
        previous: Option<CacheEntry>,
        started_at: Instant,
    },
}

/// Result of a cache lookup
pub enum Lookup {
    Hit(VolatilityPoint),
    /// Wait on a fetch; `coalesced` is true when another caller started it
    Pending { fetch: SharedFetch, coalesced: bool },
}

impl Lookup {
    /// Resolve to the tenor outcome
    pub fn into_outcome(self) -> BoxFuture<'static, TenorOutcome> {
        match self {
            Lookup::Hit(point) => futures::future::ready(TenorOutcome::Point(point)).boxed(),
            Lookup::Pending { fetch, .. } => fetch.boxed(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    pub stale: u64,
    pub coalesced: u64,
    pub evictions: u64,
    pub ttl_seconds: u64,
}

/// TTL cache of volatility points with in-flight fetch coalescing
pub struct SurfaceCache {
    ttl: Duration,
    slots: Mutex<HashMap<CacheKey, Slot>>,
    next_id: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    stale: AtomicU64,
    coalesced: AtomicU64,
    evictions: AtomicU64,
    metrics: CacheMetrics,
}

impl SurfaceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            metrics: CacheMetrics::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up `key`, starting a fetch when there is no usable entry
    ///
    /// An entry is usable while younger than `min(max_age, ttl)`. `start`
    /// receives the fetch id to hand back to [`complete`](Self::complete)
    /// and is only called when no fetch for `key` is in flight.
    pub fn get_or_fetch<F>(&self, key: &CacheKey, max_age: Duration, start: F) -> Lookup
    where
        F: FnOnce(u64) -> BoxFuture<'static, TenorOutcome>,
    {
        let now = Instant::now();
        let limit = max_age.min(self.ttl);
        let mut slots = self.slots.lock();

        let previous = match slots.remove(key) {
            Some(Slot::Ready(entry)) if entry.age(now) < limit && !entry.is_expired(now) => {
                let point = entry.point.clone();
                slots.insert(key.clone(), Slot::Ready(entry));
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.metrics.hit();
                return Lookup::Hit(point);
            }
            Some(Slot::Fetching {
                id,
                fetch,
                previous,
                started_at,
            }) => {
                let shared = fetch.clone();
                slots.insert(
                    key.clone(),
                    Slot::Fetching {
                        id,
                        fetch,
                        previous,
                        started_at,
                    },
                );
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                self.metrics.coalesced();
                return Lookup::Pending {
                    fetch: shared,
                    coalesced: true,
                };
            }
            Some(Slot::Ready(entry)) => {
                self.stale.fetch_add(1, Ordering::Relaxed);
                self.metrics.stale();
                Some(entry).filter(|e| !e.is_expired(now))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.metrics.miss();
                None
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let fetch = start(id).shared();
        slots.insert(
            key.clone(),
            Slot::Fetching {
                id,
                fetch: fetch.clone(),
                previous,
                started_at: now,
            },
        );
        self.metrics.set_entries(slots.len());

        Lookup::Pending {
            fetch,
            coalesced: false,
        }
    }

    /// Record the outcome of fetch `id`
    ///
    /// A point becomes a fresh entry. A gap is never cached: the previous
    /// entry is restored if it has not expired, otherwise the key is emptied.
    /// Returns false when the slot no longer belongs to `id` (invalidated
    /// while in flight).
    pub fn complete(&self, key: &CacheKey, id: u64, outcome: &TenorOutcome) -> bool {
        let now = Instant::now();
        let mut slots = self.slots.lock();

        let owned = matches!(
            slots.get(key),
            Some(Slot::Fetching { id: current, .. }) if *current == id
        );
        if !owned {
            debug!(pair = %key.pair, tenor = %key.tenor, id, "Discarding superseded fetch");
            return false;
        }
        let previous = match slots.remove(key) {
            Some(Slot::Fetching { previous, .. }) => previous,
            _ => None,
        };

        match outcome {
            TenorOutcome::Point(point) => {
                slots.insert(
                    key.clone(),
                    Slot::Ready(CacheEntry {
                        point: point.clone(),
                        fetched_at: now,
                        expires_at: now + self.ttl,
                    }),
                );
            }
            TenorOutcome::Gap(reason) => {
                debug!(pair = %key.pair, tenor = %key.tenor, reason = %reason, "Fetch produced a gap");
                if let Some(entry) = previous.filter(|e| !e.is_expired(now)) {
                    slots.insert(key.clone(), Slot::Ready(entry));
                }
            }
        }

        self.metrics.set_entries(slots.len());
        true
    }

    /// Give up on fetch `id` without an outcome
    pub fn abandon(&self, key: &CacheKey, id: u64) {
        self.complete(key, id, &TenorOutcome::Gap(GapReason::UpstreamUnavailable));
    }

    pub fn state(&self, key: &CacheKey) -> EntryState {
        let now = Instant::now();
        match self.slots.lock().get(key) {
            None => EntryState::Empty,
            Some(Slot::Fetching { .. }) => EntryState::Fetching,
            Some(Slot::Ready(entry)) if entry.age(now) < self.ttl => EntryState::Fresh,
            Some(Slot::Ready(_)) => EntryState::Stale,
        }
    }

    /// Cached point for `key` regardless of age
    pub fn peek(&self, key: &CacheKey) -> Option<VolatilityPoint> {
        match self.slots.lock().get(key) {
            Some(Slot::Ready(entry)) => Some(entry.point.clone()),
            Some(Slot::Fetching { previous, .. }) => previous.as_ref().map(|e| e.point.clone()),
            None => None,
        }
    }

    /// Drop every slot for `pair`; in-flight fetches for it are discarded on completion
    pub fn invalidate_pair(&self, pair: &CurrencyPair) -> usize {
        self.remove_where(|key, _| &key.pair == pair)
    }

    pub fn invalidate_all(&self) -> usize {
        self.remove_where(|_, _| true)
    }

    /// Evict expired entries and fetches running longer than `stuck_after`
    pub fn sweep(&self, stuck_after: Duration) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        let mut evicted = 0;

        slots.retain(|_, slot| match slot {
            Slot::Ready(entry) => {
                let keep = !entry.is_expired(now);
                evicted += usize::from(!keep);
                keep
            }
            Slot::Fetching { started_at, .. } => {
                let keep = now.saturating_duration_since(*started_at) < stuck_after;
                evicted += usize::from(!keep);
                keep
            }
        });

        self.record_evictions(evicted, slots.len());
        evicted
    }

    pub fn stats(&self) -> CacheStats {
        let slots = self.slots.lock();
        let in_flight = slots
            .values()
            .filter(|s| matches!(s, Slot::Fetching { .. }))
            .count();

        CacheStats {
            entries: slots.len() - in_flight,
            in_flight,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            ttl_seconds: self.ttl.as_secs(),
        }
    }

    fn remove_where(&self, predicate: impl Fn(&CacheKey, &Slot) -> bool) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|key, slot| !predicate(key, slot));
        let removed = before - slots.len();

        self.record_evictions(removed, slots.len());
        removed
    }

    fn record_evictions(&self, count: usize, remaining: usize) {
        if count > 0 {
            self.evictions.fetch_add(count as u64, Ordering::Relaxed);
            self.metrics.evicted(count);
        }
        self.metrics.set_entries(remaining);
    }
}
