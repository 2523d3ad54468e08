#[cfg(test)]
#[path = "query_cache_test.rs"]
mod tests;

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::models::CacheKey;
use crate::domain::models::QueryState;
use crate::domain::models::QueryStatus;
use crate::domain::models::RequestDescriptor;
use crate::domain::models::RequestError;
use crate::domain::models::Tag;
use crate::domain::models::TransportBox;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// How long an entry without subscribers is kept before eviction.
    pub grace_period: Duration,
    /// Refetch settled entries whenever a new subscriber arrives.
    pub refetch_on_subscribe: bool,
}

struct Entry {
    request: RequestDescriptor,
    tags: Vec<Tag>,
    state: watch::Sender<QueryState>,
    subscribers: usize,
    /// Generation of the most recently issued request. Only its response is
    /// ever applied.
    issued: u64,
    in_flight: Option<JoinHandle<()>>,
    /// Invalidated while a request was in flight.
    stale: bool,
    eviction: Option<JoinHandle<()>>,
}

impl Entry {
    fn new(request: RequestDescriptor, tags: Vec<Tag>) -> Entry {
        let (state, _) = watch::channel(QueryState::default());
        return Entry {
            request,
            tags,
            state,
            subscribers: 0,
            issued: 0,
            in_flight: None,
            stale: false,
            eviction: None,
        };
    }

    fn cancel(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.abort();
        }
        if let Some(eviction) = self.eviction.take() {
            eviction.abort();
        }
    }

    fn needs_fetch(&self, options: &CacheOptions) -> bool {
        if self.in_flight.is_some() {
            return false;
        }

        let status = self.state.borrow().status;
        return self.stale
            || status == QueryStatus::Idle
            || status == QueryStatus::Error
            || options.refetch_on_subscribe;
    }
}

struct CacheInner {
    transport: TransportBox,
    entries: DashMap<CacheKey, Entry>,
    options: CacheOptions,
    generation: AtomicU64,
}

impl CacheInner {
    /// Issues a request for the entry, superseding anything in flight.
    fn fetch(inner: &Arc<CacheInner>, key: &CacheKey) {
        let mut entry = match inner.entries.get_mut(key) {
            Some(entry) => entry,
            None => return,
        };

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        entry.issued = generation;
        entry.stale = false;
        if let Some(previous) = entry.in_flight.take() {
            tracing::debug!(key = %key, "Superseding in-flight request");
            previous.abort();
        }
        entry.state.send_modify(|state| {
            state.begin();
        });

        let request = entry.request.clone();
        let task_inner = Arc::clone(inner);
        let task_key = key.clone();
        tracing::debug!(key = %key, generation, "Issuing query");

        entry.in_flight = Some(tokio::spawn(async move {
            let res = task_inner.transport.execute(&request).await;
            CacheInner::settle(&task_inner, &task_key, generation, res);
        }));
    }

    fn settle(
        inner: &Arc<CacheInner>,
        key: &CacheKey,
        generation: u64,
        res: Result<Value, RequestError>,
    ) {
        let refetch = {
            let mut entry = match inner.entries.get_mut(key) {
                Some(entry) => entry,
                None => {
                    tracing::debug!(key = %key, generation, "Discarding response for evicted entry");
                    return;
                }
            };

            if entry.issued != generation {
                tracing::debug!(key = %key, generation, "Discarding superseded response");
                return;
            }

            entry.in_flight = None;
            if entry.stale {
                tracing::debug!(key = %key, generation, "Discarding stale response");
                true
            } else {
                if let Err(err) = &res {
                    tracing::warn!(key = %key, error = %err, "Query failed");
                }
                entry.state.send_modify(|state| {
                    state.settle(res);
                });
                false
            }
        };

        if refetch {
            CacheInner::fetch(inner, key);
        }
    }

    fn release(inner: &Arc<CacheInner>, key: &CacheKey) {
        let grace_period = inner.options.grace_period;
        let evict_now = {
            let mut entry = match inner.entries.get_mut(key) {
                Some(entry) => entry,
                None => return,
            };

            entry.subscribers = entry.subscribers.saturating_sub(1);
            if entry.subscribers > 0 {
                return;
            }

            match Handle::try_current() {
                Ok(handle) if !grace_period.is_zero() => {
                    let task_inner = Arc::clone(inner);
                    let task_key = key.clone();
                    entry.eviction = Some(handle.spawn(async move {
                        tokio::time::sleep(grace_period).await;
                        let removed = task_inner
                            .entries
                            .remove_if(&task_key, |_, entry| return entry.subscribers == 0);
                        if let Some((_, mut entry)) = removed {
                            entry.eviction = None;
                            entry.cancel();
                            tracing::debug!(key = %task_key, "Evicted unused query");
                        }
                    }));
                    false
                }
                _ => true,
            }
        };

        if evict_now {
            CacheInner::evict(inner, key);
        }
    }

    fn evict(inner: &Arc<CacheInner>, key: &CacheKey) {
        if let Some((_, mut entry)) = inner.entries.remove(key) {
            entry.cancel();
            tracing::debug!(key = %key, "Evicted query");
        }
    }
}

/// Shared store of query results. Clones refer to the same cache.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl QueryCache {
    pub fn new(transport: TransportBox, options: CacheOptions) -> QueryCache {
        return QueryCache {
            inner: Arc::new(CacheInner {
                transport,
                entries: DashMap::new(),
                options,
                generation: AtomicU64::new(0),
            }),
        };
    }

    /// Starts observing a query. Subscribers to the same key share a single
    /// request and result. Must be called from within a tokio runtime.
    pub fn subscribe(
        &self,
        key: CacheKey,
        request: RequestDescriptor,
        tags: Vec<Tag>,
    ) -> QuerySubscription {
        let (receiver, should_fetch) = {
            let mut entry = self
                .inner
                .entries
                .entry(key.clone())
                .or_insert_with(|| return Entry::new(request, tags));

            entry.subscribers += 1;
            if let Some(eviction) = entry.eviction.take() {
                eviction.abort();
            }

            (entry.state.subscribe(), entry.needs_fetch(&self.inner.options))
        };

        if should_fetch {
            CacheInner::fetch(&self.inner, &key);
        }

        return QuerySubscription {
            key,
            receiver,
            inner: Arc::clone(&self.inner),
        };
    }

    /// Marks every entry carrying one of the tags as outdated. Subscribed
    /// entries refetch, in-flight ones refetch once their current request
    /// settles, and unsubscribed ones are dropped.
    pub fn invalidate_tags(&self, tags: &[Tag]) {
        if tags.is_empty() {
            return;
        }

        let mut refetch: Vec<CacheKey> = vec![];
        let mut evict: Vec<CacheKey> = vec![];
        for mut entry in self.inner.entries.iter_mut() {
            if !entry.tags.iter().any(|tag| return tags.contains(tag)) {
                continue;
            }

            if entry.subscribers == 0 {
                evict.push(entry.key().clone());
            } else if entry.in_flight.is_some() {
                entry.stale = true;
            } else {
                refetch.push(entry.key().clone());
            }
        }

        tracing::debug!(
            tags = ?tags,
            refetch = refetch.len(),
            evict = evict.len(),
            "Invalidated tags"
        );

        for key in evict {
            CacheInner::evict(&self.inner, &key);
        }
        for key in refetch {
            CacheInner::fetch(&self.inner, &key);
        }
    }

    /// Issues a request outside the cache. Mutations go through here so they
    /// are never deduplicated.
    pub async fn execute(&self, request: &RequestDescriptor) -> Result<Value, RequestError> {
        return self.inner.transport.execute(request).await;
    }

    /// Executes a mutation and, when it succeeds, invalidates the given tags.
    pub async fn mutate(
        &self,
        request: &RequestDescriptor,
        invalidates: &[Tag],
    ) -> Result<Value, RequestError> {
        let res = self.execute(request).await;
        if res.is_ok() {
            self.invalidate_tags(invalidates);
        }

        return res;
    }
}

/// A consumer's handle on a cached query. Dropping it unsubscribes.
pub struct QuerySubscription {
    key: CacheKey,
    receiver: watch::Receiver<QueryState>,
    inner: Arc<CacheInner>,
}

impl QuerySubscription {
    pub fn key(&self) -> &CacheKey {
        return &self.key;
    }

    pub fn state(&self) -> QueryState {
        return self.receiver.borrow().clone();
    }

    /// Waits until the query has succeeded or failed.
    pub async fn settled(&mut self) -> QueryState {
        let res = self
            .receiver
            .wait_for(|state| return state.is_settled())
            .await
            .map(|state| return state.clone());

        return match res {
            Ok(state) => state,
            Err(_) => self.receiver.borrow().clone(),
        };
    }

    pub fn refetch(&self) {
        CacheInner::fetch(&self.inner, &self.key);
    }
}

impl Drop for QuerySubscription {
    fn drop(&mut self) {
        CacheInner::release(&self.inner, &self.key);
    }
}
