use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use serde_json::Value;
use tokio::sync::oneshot;

use super::CacheOptions;
use super::QueryCache;
use crate::domain::models::CacheKey;
use crate::domain::models::EndpointName;
use crate::domain::models::Method;
use crate::domain::models::QueryState;
use crate::domain::models::QueryStatus;
use crate::domain::models::RequestDescriptor;
use crate::domain::models::RequestError;
use crate::domain::models::Tag;
use crate::domain::models::Transport;

impl QueryCache {
    fn state(&self, key: &CacheKey) -> Option<QueryState> {
        return self
            .inner
            .entries
            .get(key)
            .map(|entry| return entry.state.borrow().clone());
    }

    fn contains(&self, key: &CacheKey) -> bool {
        return self.inner.entries.contains_key(key);
    }

    fn subscriber_count(&self, key: &CacheKey) -> usize {
        return self
            .inner
            .entries
            .get(key)
            .map(|entry| return entry.subscribers)
            .unwrap_or(0);
    }
}

type Gate = oneshot::Sender<Result<Value, RequestError>>;

/// Holds every request open until the test resolves it by index.
#[derive(Default)]
struct GatedTransport {
    calls: AtomicUsize,
    gates: Mutex<Vec<Option<Gate>>>,
}

impl GatedTransport {
    fn calls(&self) -> usize {
        return self.calls.load(Ordering::SeqCst);
    }

    fn resolve(&self, idx: usize, res: Result<Value, RequestError>) {
        let gate = self.gates.lock().unwrap()[idx].take();
        if let Some(tx) = gate {
            // The request may have been cancelled already.
            let _ = tx.send(res);
        }
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn execute(&self, _request: &RequestDescriptor) -> Result<Value, RequestError> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().push(Some(tx));
        self.calls.fetch_add(1, Ordering::SeqCst);

        return rx
            .await
            .unwrap_or_else(|_| return Err(RequestError::Network("gate dropped".to_string())));
    }
}

fn setup(options: CacheOptions) -> (Arc<GatedTransport>, QueryCache) {
    let transport = Arc::new(GatedTransport::default());
    let cache = QueryCache::new(transport.clone(), options);
    return (transport, cache);
}

fn cases_query() -> (CacheKey, RequestDescriptor) {
    return (
        CacheKey::new(EndpointName::GetCases, &Value::Null),
        RequestDescriptor::new(Method::Get, "dengue-cases"),
    );
}

fn report_query(id: u32) -> (CacheKey, RequestDescriptor) {
    return (
        CacheKey::new(EndpointName::GetReport, &json!({ "id": id })),
        RequestDescriptor::new(Method::Get, &format!("reports/{id}")),
    );
}

async fn wait_for_calls(transport: &GatedTransport, count: usize) {
    for _ in 0..100 {
        if transport.calls() >= count {
            return;
        }
        tokio::task::yield_now().await;
    }

    panic!("expected {count} calls, saw {}", transport.calls());
}

async fn settle_tasks() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn it_shares_one_request_between_subscribers() {
    let (transport, cache) = setup(CacheOptions::default());
    let (key, request) = cases_query();

    let mut first = cache.subscribe(key.clone(), request.clone(), vec![Tag::Cases]);
    let mut second = cache.subscribe(key.clone(), request.clone(), vec![Tag::Cases]);
    let mut third = cache.subscribe(key.clone(), request, vec![Tag::Cases]);

    assert!(first.state().is_loading());
    wait_for_calls(&transport, 1).await;
    settle_tasks().await;
    assert_eq!(transport.calls(), 1);
    assert_eq!(cache.subscriber_count(&key), 3);

    transport.resolve(0, Ok(json!(["case"])));

    for sub in [&mut first, &mut second, &mut third] {
        let state = sub.settled().await;
        assert_eq!(state.status, QueryStatus::Success);
        assert_eq!(state.data, Some(json!(["case"])));
    }
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn it_serves_cached_data_to_late_subscribers() {
    let (transport, cache) = setup(CacheOptions::default());
    let (key, request) = cases_query();

    let mut first = cache.subscribe(key.clone(), request.clone(), vec![Tag::Cases]);
    wait_for_calls(&transport, 1).await;
    transport.resolve(0, Ok(json!(["case"])));
    first.settled().await;

    let late = cache.subscribe(key, request, vec![Tag::Cases]);
    settle_tasks().await;

    assert_eq!(late.state().status, QueryStatus::Success);
    assert_eq!(late.state().data, Some(json!(["case"])));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn it_refetches_on_subscribe_when_configured() {
    let (transport, cache) = setup(CacheOptions {
        grace_period: Duration::ZERO,
        refetch_on_subscribe: true,
    });
    let (key, request) = cases_query();

    let mut first = cache.subscribe(key.clone(), request.clone(), vec![Tag::Cases]);
    wait_for_calls(&transport, 1).await;
    transport.resolve(0, Ok(json!(["case"])));
    first.settled().await;

    let late = cache.subscribe(key, request, vec![Tag::Cases]);

    assert!(late.state().is_loading());
    assert_eq!(late.state().data, Some(json!(["case"])));
    wait_for_calls(&transport, 2).await;
}

#[tokio::test]
async fn it_refetches_subscribed_queries_on_invalidation() {
    let (transport, cache) = setup(CacheOptions::default());
    let (key, request) = cases_query();

    let mut sub = cache.subscribe(key, request, vec![Tag::Cases]);
    wait_for_calls(&transport, 1).await;
    transport.resolve(0, Ok(json!("old")));
    sub.settled().await;

    cache.invalidate_tags(&[Tag::Cases]);

    let state = sub.state();
    assert!(state.is_loading());
    assert_eq!(state.data, Some(json!("old")));

    wait_for_calls(&transport, 2).await;
    transport.resolve(1, Ok(json!("new")));

    assert_eq!(sub.settled().await.data, Some(json!("new")));
    settle_tasks().await;
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn it_ignores_unrelated_tags() {
    let (transport, cache) = setup(CacheOptions::default());
    let (key, request) = cases_query();

    let mut sub = cache.subscribe(key, request, vec![Tag::Cases]);
    wait_for_calls(&transport, 1).await;
    transport.resolve(0, Ok(json!("cases")));
    sub.settled().await;

    cache.invalidate_tags(&[Tag::Reports, Tag::Profile]);
    settle_tasks().await;

    assert_eq!(sub.state().status, QueryStatus::Success);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn it_invalidates_after_successful_mutation() -> Result<()> {
    let (transport, cache) = setup(CacheOptions::default());
    let (key, request) = cases_query();

    let mut sub = cache.subscribe(key, request, vec![Tag::Cases]);
    wait_for_calls(&transport, 1).await;
    transport.resolve(0, Ok(json!("old")));
    sub.settled().await;

    let mutation_cache = cache.clone();
    let mutation = tokio::spawn(async move {
        let request = RequestDescriptor::new(Method::Post, "reports").with_body(json!({}));
        return mutation_cache.mutate(&request, &[Tag::Cases]).await;
    });

    wait_for_calls(&transport, 2).await;
    transport.resolve(1, Ok(json!({ "id": "r-1" })));
    assert_eq!(mutation.await?, Ok(json!({ "id": "r-1" })));

    wait_for_calls(&transport, 3).await;
    transport.resolve(2, Ok(json!("new")));
    assert_eq!(sub.settled().await.data, Some(json!("new")));

    return Ok(());
}

#[tokio::test]
async fn it_does_not_invalidate_after_failed_mutation() -> Result<()> {
    let (transport, cache) = setup(CacheOptions::default());
    let (key, request) = cases_query();

    let mut sub = cache.subscribe(key, request, vec![Tag::Cases]);
    wait_for_calls(&transport, 1).await;
    transport.resolve(0, Ok(json!("old")));
    sub.settled().await;

    let mutation_cache = cache.clone();
    let mutation = tokio::spawn(async move {
        let request = RequestDescriptor::new(Method::Post, "reports").with_body(json!({}));
        return mutation_cache.mutate(&request, &[Tag::Cases]).await;
    });

    wait_for_calls(&transport, 2).await;
    transport.resolve(
        1,
        Err(RequestError::Api {
            status: 400,
            body: json!({ "district": "required" }),
        }),
    );
    assert!(mutation.await?.is_err());

    settle_tasks().await;
    assert_eq!(transport.calls(), 2);
    assert_eq!(sub.state().data, Some(json!("old")));
    return Ok(());
}

#[tokio::test]
async fn it_never_deduplicates_mutations() -> Result<()> {
    let (transport, cache) = setup(CacheOptions::default());
    let request = RequestDescriptor::new(Method::Post, "reports").with_body(json!({}));

    let first_cache = cache.clone();
    let first_request = request.clone();
    let first = tokio::spawn(async move {
        return first_cache.mutate(&first_request, &[]).await;
    });
    let second_cache = cache.clone();
    let second = tokio::spawn(async move {
        return second_cache.mutate(&request, &[]).await;
    });

    wait_for_calls(&transport, 2).await;
    transport.resolve(0, Ok(json!(1)));
    transport.resolve(1, Ok(json!(2)));

    assert_eq!(first.await?, Ok(json!(1)));
    assert_eq!(second.await?, Ok(json!(2)));
    assert!(cache.inner.entries.is_empty());
    return Ok(());
}

#[tokio::test]
async fn it_discards_in_flight_result_when_invalidated() {
    let (transport, cache) = setup(CacheOptions::default());
    let (key, request) = cases_query();

    let mut sub = cache.subscribe(key, request, vec![Tag::Cases]);
    wait_for_calls(&transport, 1).await;

    cache.invalidate_tags(&[Tag::Cases]);
    settle_tasks().await;
    assert_eq!(transport.calls(), 1);

    transport.resolve(0, Ok(json!("old")));
    wait_for_calls(&transport, 2).await;

    let state = sub.state();
    assert!(state.is_loading());
    assert_eq!(state.data, None);

    transport.resolve(1, Ok(json!("new")));
    assert_eq!(sub.settled().await.data, Some(json!("new")));
}

#[tokio::test]
async fn it_keeps_last_issued_response_when_older_arrives_late() {
    let (transport, cache) = setup(CacheOptions::default());
    let (key, request) = cases_query();

    let mut sub = cache.subscribe(key, request, vec![Tag::Cases]);
    wait_for_calls(&transport, 1).await;
    sub.refetch();
    wait_for_calls(&transport, 2).await;

    transport.resolve(1, Ok(json!("b")));
    assert_eq!(sub.settled().await.data, Some(json!("b")));

    transport.resolve(0, Ok(json!("a")));
    settle_tasks().await;

    assert_eq!(sub.state().data, Some(json!("b")));
}

#[tokio::test]
async fn it_ignores_superseded_response_that_arrives_first() {
    let (transport, cache) = setup(CacheOptions::default());
    let (key, request) = cases_query();

    let mut sub = cache.subscribe(key, request, vec![Tag::Cases]);
    wait_for_calls(&transport, 1).await;
    sub.refetch();
    wait_for_calls(&transport, 2).await;

    transport.resolve(0, Ok(json!("a")));
    settle_tasks().await;
    assert!(sub.state().is_loading());
    assert_eq!(sub.state().data, None);

    transport.resolve(1, Ok(json!("b")));
    assert_eq!(sub.settled().await.data, Some(json!("b")));
}

#[tokio::test]
async fn it_isolates_errors_per_key() {
    let (transport, cache) = setup(CacheOptions::default());
    let (first_key, first_request) = report_query(1);
    let (second_key, second_request) = report_query(2);

    let mut failing = cache.subscribe(first_key, first_request, vec![Tag::Reports]);
    let mut working = cache.subscribe(second_key, second_request, vec![Tag::Reports]);
    wait_for_calls(&transport, 2).await;

    transport.resolve(0, Err(RequestError::Network("connection reset".to_string())));
    transport.resolve(1, Ok(json!({ "id": 2 })));

    let failed = failing.settled().await;
    assert_eq!(failed.status, QueryStatus::Error);
    assert_eq!(
        failed.error,
        Some(RequestError::Network("connection reset".to_string()))
    );

    let succeeded = working.settled().await;
    assert_eq!(succeeded.status, QueryStatus::Success);
    assert_eq!(succeeded.error, None);
}

#[tokio::test]
async fn it_keeps_last_good_data_after_error() {
    let (transport, cache) = setup(CacheOptions::default());
    let (key, request) = cases_query();

    let mut sub = cache.subscribe(key, request, vec![Tag::Cases]);
    wait_for_calls(&transport, 1).await;
    transport.resolve(0, Ok(json!("good")));
    sub.settled().await;

    sub.refetch();
    wait_for_calls(&transport, 2).await;
    transport.resolve(1, Err(RequestError::Decode("eof".to_string())));

    let state = sub.settled().await;
    assert_eq!(state.status, QueryStatus::Error);
    assert_eq!(state.data, Some(json!("good")));
    assert_eq!(state.error, Some(RequestError::Decode("eof".to_string())));
}

#[tokio::test]
async fn it_retries_errored_entries_for_new_subscribers() {
    let (transport, cache) = setup(CacheOptions {
        grace_period: Duration::from_secs(10),
        refetch_on_subscribe: false,
    });
    let (key, request) = cases_query();

    let mut first = cache.subscribe(key.clone(), request.clone(), vec![Tag::Cases]);
    wait_for_calls(&transport, 1).await;
    transport.resolve(0, Err(RequestError::Network("offline".to_string())));
    first.settled().await;

    let mut second = cache.subscribe(key, request, vec![Tag::Cases]);
    wait_for_calls(&transport, 2).await;
    transport.resolve(1, Ok(json!("cases")));

    assert_eq!(second.settled().await.status, QueryStatus::Success);
}

#[tokio::test]
async fn it_evicts_when_last_subscriber_leaves() {
    let (transport, cache) = setup(CacheOptions::default());
    let (key, request) = cases_query();

    let first = cache.subscribe(key.clone(), request.clone(), vec![Tag::Cases]);
    let second = cache.subscribe(key.clone(), request, vec![Tag::Cases]);
    wait_for_calls(&transport, 1).await;

    drop(first);
    assert!(cache.contains(&key));
    assert_eq!(cache.subscriber_count(&key), 1);

    drop(second);
    assert!(!cache.contains(&key));

    transport.resolve(0, Ok(json!("late")));
    settle_tasks().await;
    assert!(cache.inner.entries.is_empty());
}

#[tokio::test]
async fn it_keeps_entries_during_grace_period() {
    let (transport, cache) = setup(CacheOptions {
        grace_period: Duration::from_millis(50),
        refetch_on_subscribe: false,
    });
    let (key, request) = cases_query();

    let mut sub = cache.subscribe(key.clone(), request.clone(), vec![Tag::Cases]);
    wait_for_calls(&transport, 1).await;
    transport.resolve(0, Ok(json!("cases")));
    sub.settled().await;
    drop(sub);

    assert!(cache.contains(&key));
    let again = cache.subscribe(key.clone(), request, vec![Tag::Cases]);
    assert_eq!(again.state().data, Some(json!("cases")));
    assert_eq!(transport.calls(), 1);
    drop(again);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!cache.contains(&key));
}

#[tokio::test]
async fn it_drops_unsubscribed_entries_on_invalidation() {
    let (transport, cache) = setup(CacheOptions {
        grace_period: Duration::from_secs(10),
        refetch_on_subscribe: false,
    });
    let (key, request) = cases_query();

    let mut sub = cache.subscribe(key.clone(), request, vec![Tag::Cases]);
    wait_for_calls(&transport, 1).await;
    transport.resolve(0, Ok(json!("cases")));
    sub.settled().await;
    drop(sub);

    cache.invalidate_tags(&[Tag::Cases]);

    assert!(!cache.contains(&key));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn it_has_no_state_for_unknown_key() {
    let (_transport, cache) = setup(CacheOptions::default());
    let (key, _request) = cases_query();

    assert!(!cache.contains(&key));
    assert_eq!(cache.state(&key), None);
}
