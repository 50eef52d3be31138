//! Bounded-concurrency fan-out over block heights.
//!
//! Tasks run in a `JoinSet` throttled by a semaphore. Results come back
//! sorted by key regardless of completion order. Dropping the returned
//! future aborts every task still in flight.

use bitlens_core::{BitlensResult, QueryError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Default cap on simultaneous node invocations.
pub const DEFAULT_CONCURRENCY: usize = 6;

/// Runs `task(key)` for every key with at most `concurrency` in flight.
///
/// ```ignore
/// let blocks = fan_out(heights, 6, |h| {
///     let client = client.clone();
///     async move { fetch_sample(&*client, h).await }
/// })
/// .await;
/// ```
pub async fn fan_out<T, F, Fut>(
    keys: impl IntoIterator<Item = u64>,
    concurrency: usize,
    task: F,
) -> Vec<(u64, BitlensResult<T>)>
where
    T: Send + 'static,
    F: Fn(u64) -> Fut,
    Fut: Future<Output = BitlensResult<T>> + Send + 'static,
{
    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
    let mut tasks = tokio::task::JoinSet::new();
    let mut keys_by_task = HashMap::new();

    for key in keys {
        let sem = Arc::clone(&semaphore);
        let fut = task(key);
        let handle = tasks.spawn(async move {
            let _permit = sem
                .acquire_owned()
                .await
                .map_err(|_| QueryError::internal("fan-out semaphore closed"))?;
            fut.await
        });
        keys_by_task.insert(handle.id(), key);
    }

    let mut results = Vec::with_capacity(keys_by_task.len());
    let mut failed = 0usize;

    while let Some(joined) = tasks.join_next_with_id().await {
        let (id, result) = match joined {
            Ok((id, result)) => (id, result),
            Err(e) => {
                tracing::warn!(error = %e, "fan-out task panicked");
                (e.id(), Err(QueryError::internal(format!("worker task failed: {e}"))))
            }
        };
        if result.is_err() {
            failed += 1;
        }
        if let Some(key) = keys_by_task.remove(&id) {
            results.push((key, result));
        }
    }

    results.sort_by_key(|(key, _)| *key);
    tracing::debug!(fetched = results.len() - failed, failed, "fan-out done");
    results
}
