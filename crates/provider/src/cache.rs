//! Short-lived response memoization with request coalescing.
//!
//! Each key maps to a shared `OnceCell`. The first caller runs the query;
//! concurrent callers for the same key await that single computation. A
//! cancelled computation leaves the cell empty, so the next waiter takes
//! over and nothing half-finished is ever recorded.

use crate::NodeClient;
use async_trait::async_trait;
use bitlens_core::{QueryRequest, QueryResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

pub const DEFAULT_SUCCESS_TTL: Duration = Duration::from_secs(10);
pub const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(1);

/// Sweep expired cells once the map grows past this.
const PURGE_THRESHOLD: usize = 4096;

/// Time-to-live per outcome. Failures expire much sooner than successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub success_ttl: Duration,
    pub failure_ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            success_ttl: DEFAULT_SUCCESS_TTL,
            failure_ttl: DEFAULT_FAILURE_TTL,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: QueryResult,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, policy: &CachePolicy) -> bool {
        let ttl = if self.value.is_ok() {
            policy.success_ttl
        } else {
            policy.failure_ttl
        };
        self.inserted_at.elapsed() < ttl
    }
}

type Slot = Arc<OnceCell<CacheEntry>>;

/// Memoizes query results keyed by `(method, args)`.
pub struct ResponseCache {
    slots: DashMap<QueryRequest, Slot>,
    policy: CachePolicy,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            slots: DashMap::new(),
            policy,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Returns the cached result, or runs `compute` and caches its outcome.
    pub async fn get_or_compute<F, Fut>(&self, request: &QueryRequest, compute: F) -> QueryResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = QueryResult>,
    {
        let slot = self.slot_for(request);
        let computed = AtomicBool::new(false);
        let flag = &computed;
        let entry = slot
            .get_or_init(|| async move {
                flag.store(true, Ordering::Relaxed);
                let value = compute().await;
                CacheEntry {
                    value,
                    inserted_at: Instant::now(),
                }
            })
            .await;

        if computed.load(Ordering::Relaxed) {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(method = request.method(), "cache miss");
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(method = request.method(), "cache hit");
        }
        entry.value.clone()
    }

    /// Live cell for `request`, replacing an expired one atomically.
    fn slot_for(&self, request: &QueryRequest) -> Slot {
        if self.slots.len() > PURGE_THRESHOLD {
            self.purge_expired();
        }

        match self.slots.entry(request.clone()) {
            Entry::Occupied(mut occupied) => {
                let stale = occupied
                    .get()
                    .get()
                    .is_some_and(|entry| !entry.is_fresh(&self.policy));
                if stale {
                    occupied.insert(Arc::new(OnceCell::new()));
                }
                Arc::clone(occupied.get())
            }
            Entry::Vacant(vacant) => {
                let slot: Slot = Arc::new(OnceCell::new());
                vacant.insert(Arc::clone(&slot));
                slot
            }
        }
    }

    /// Drops every expired entry. Cells still being computed are kept.
    pub fn purge_expired(&self) {
        let policy = self.policy;
        self.slots
            .retain(|_, slot| slot.get().map_or(true, |entry| entry.is_fresh(&policy)));
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

/// A [`NodeClient`] that routes every call through a [`ResponseCache`].
pub struct CachedClient<C> {
    inner: C,
    cache: Arc<ResponseCache>,
}

impl<C: NodeClient> CachedClient<C> {
    pub fn new(inner: C, cache: Arc<ResponseCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: NodeClient> NodeClient for CachedClient<C> {
    async fn execute(&self, request: &QueryRequest) -> QueryResult {
        self.cache
            .get_or_compute(request, || self.inner.execute(request))
            .await
    }
}
