//! Delivery queue integration tests.
//!
//! These drive the coordinator, store and workers together against a
//! scripted transport, plus one end-to-end run over real HTTP.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use courier_common::{DeliveryConfig, DeliveryMetrics, generate_rsa_keypair};
use courier_queue::{
    ClaimedJob, DeadLetterEntry, DeliveryCoordinator, DeliveryJob, DeliveryObserver, DeliveryOutcome,
    DeliveryQueueStore, DeliveryTransport, DeliveryTrigger, DeliveryWorker, DeliveryWorkerPool,
    DrainStats, HttpDeliveryTransport, MemoryQueueStore, QueueError, QueueResult, RetryPolicy,
    StaticKeySource,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ALICE: &str = "https://local.example/u/alice";

/// One delivery as seen by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Call {
    address: String,
    body: String,
    signing_key: String,
}

/// Answers each address from a script, then with 202 once the script runs
/// out.
#[derive(Default)]
struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<DeliveryOutcome>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    fn script(self, address: &str, outcomes: impl IntoIterator<Item = DeliveryOutcome>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(address.to_string(), outcomes.into_iter().collect());
        self
    }

    fn addresses(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.address.clone())
            .collect()
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryTransport for ScriptedTransport {
    async fn deliver(
        &self,
        _actor_id: &str,
        body: &str,
        address: &str,
        signing_key: &str,
    ) -> DeliveryOutcome {
        self.calls.lock().unwrap().push(Call {
            address: address.to_string(),
            body: body.to_string(),
            signing_key: signing_key.to_string(),
        });
        self.scripts
            .lock()
            .unwrap()
            .get_mut(address)
            .and_then(VecDeque::pop_front)
            .unwrap_or(DeliveryOutcome::Success { status: 202 })
    }
}

#[derive(Default)]
struct RecordingObserver {
    rejected: Mutex<Vec<(String, Option<u16>)>>,
    dead: Mutex<Vec<(String, u32, String)>>,
}

impl DeliveryObserver for RecordingObserver {
    fn on_permanent_failure(&self, job: &DeliveryJob, status: Option<u16>, _reason: &str) {
        self.rejected
            .lock()
            .unwrap()
            .push((job.address.clone(), status));
    }

    fn on_dead_letter(&self, entry: &DeadLetterEntry<DeliveryJob>) {
        self.dead.lock().unwrap().push((
            entry.job.address.clone(),
            entry.attempts,
            entry.last_error.clone(),
        ));
    }
}

/// Memory store whose next few requeues fail.
#[derive(Clone)]
struct FlakyStore {
    inner: MemoryQueueStore,
    failing_requeues: Arc<AtomicUsize>,
    requeued: Arc<Mutex<Vec<u32>>>,
}

impl FlakyStore {
    fn failing_requeues(inner: MemoryQueueStore, count: usize) -> Self {
        Self {
            inner,
            failing_requeues: Arc::new(AtomicUsize::new(count)),
            requeued: Arc::default(),
        }
    }
}

#[async_trait]
impl DeliveryQueueStore for FlakyStore {
    async fn enqueue(
        &self,
        actor_id: &str,
        body: &str,
        addresses: &[String],
        signing_key: &str,
    ) -> QueueResult<usize> {
        self.inner.enqueue(actor_id, body, addresses, signing_key).await
    }

    async fn dequeue_one(&self) -> QueueResult<Option<ClaimedJob>> {
        self.inner.dequeue_one().await
    }

    async fn complete(&self, claimed: &ClaimedJob) -> QueueResult<bool> {
        self.inner.complete(claimed).await
    }

    async fn requeue(&self, claimed: &ClaimedJob) -> QueueResult<Option<DeliveryJob>> {
        let failing = self
            .failing_requeues
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(QueueError::Persistence("connection reset".to_string()));
        }
        let stored = self.inner.requeue(claimed).await?;
        if let Some(job) = &stored {
            self.requeued.lock().unwrap().push(job.attempt);
        }
        Ok(stored)
    }

    async fn pending_count(&self) -> QueueResult<u64> {
        self.inner.pending_count().await
    }
}

fn server_error() -> DeliveryOutcome {
    DeliveryOutcome::from_status(500, "500 Internal Server Error")
}

fn addresses(names: &[&str]) -> Vec<String> {
    names
        .iter()
        .map(|n| format!("https://{n}.example/inbox"))
        .collect()
}

fn worker(store: &MemoryQueueStore, transport: &Arc<ScriptedTransport>) -> DeliveryWorker {
    DeliveryWorker::new(Arc::new(store.clone()), transport.clone())
        .with_metrics(Arc::new(DeliveryMetrics::new()))
}

async fn enqueue(store: &impl DeliveryQueueStore, addresses: &[String]) {
    store
        .enqueue(ALICE, r#"{"type":"Create"}"#, addresses, "KEY")
        .await
        .unwrap();
}

async fn wait_for_calls(transport: &ScriptedTransport, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while transport.calls().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_delivers_in_enqueue_order() {
    let store = MemoryQueueStore::new();
    let transport = Arc::new(ScriptedTransport::default());
    let targets = addresses(&["a", "b", "c", "d"]);
    enqueue(&store, &targets).await;

    let stats = worker(&store, &transport).drain().await.unwrap();

    assert_eq!(transport.addresses(), targets);
    assert_eq!(stats.delivered, 4);
    assert_eq!(store.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_job_waits_behind_newer_jobs() {
    let store = MemoryQueueStore::new();
    let targets = addresses(&["first", "second"]);
    let transport = Arc::new(ScriptedTransport::default().script(&targets[0], [server_error()]));
    enqueue(&store, &targets).await;

    let stats = worker(&store, &transport).drain().await.unwrap();

    assert_eq!(
        transport.addresses(),
        vec![targets[0].clone(), targets[1].clone(), targets[0].clone()]
    );
    assert_eq!(
        stats,
        DrainStats {
            delivered: 2,
            requeued: 1,
            ..DrainStats::default()
        }
    );
}

#[tokio::test]
async fn test_mixed_outcomes_retry_only_transient() {
    let store = MemoryQueueStore::new();
    let targets = addresses(&["a", "b", "c", "d"]);
    let transport = Arc::new(
        ScriptedTransport::default()
            .script(&targets[0], [server_error()])
            .script(&targets[2], [DeliveryOutcome::no_response("connection refused")]),
    );
    enqueue(&store, &targets).await;

    let stats = worker(&store, &transport).drain().await.unwrap();

    assert_eq!(
        transport.addresses(),
        vec![
            targets[0].clone(),
            targets[1].clone(),
            targets[2].clone(),
            targets[3].clone(),
            targets[0].clone(),
            targets[2].clone(),
        ]
    );
    assert_eq!(stats.delivered, 4);
    assert_eq!(stats.requeued, 2);
}

#[tokio::test]
async fn test_requeued_job_carries_attempt() {
    let store = FlakyStore::failing_requeues(MemoryQueueStore::new(), 0);
    let targets = addresses(&["bob", "sally"]);
    let transport = Arc::new(
        ScriptedTransport::default()
            .script(&targets[0], [server_error(), server_error()]),
    );
    enqueue(&store, &targets).await;
    let worker = DeliveryWorker::new(
        Arc::new(store.clone()),
        transport.clone(),
    );

    let stats = worker.drain().await.unwrap();

    assert_eq!(stats.requeued, 2);
    assert_eq!(stats.delivered, 2);
    assert_eq!(
        transport.addresses(),
        vec![
            targets[0].clone(),
            targets[1].clone(),
            targets[0].clone(),
            targets[0].clone(),
        ]
    );
    assert_eq!(*store.requeued.lock().unwrap(), vec![1, 2]);
    assert!(store.inner.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_client_error_is_never_retried() {
    let store = MemoryQueueStore::new();
    let targets = addresses(&["gone"]);
    let transport = Arc::new(
        ScriptedTransport::default()
            .script(&targets[0], [DeliveryOutcome::from_status(400, "400 Bad Request")]),
    );
    let observer = Arc::new(RecordingObserver::default());
    enqueue(&store, &targets).await;

    let stats = worker(&store, &transport)
        .with_observer(observer.clone())
        .drain()
        .await
        .unwrap();

    assert_eq!(stats.permanent_failures, 1);
    assert_eq!(stats.requeued, 0);
    assert_eq!(transport.addresses(), targets);
    assert_eq!(store.pending_count().await.unwrap(), 0);
    assert_eq!(
        *observer.rejected.lock().unwrap(),
        vec![(targets[0].clone(), Some(400))]
    );
}

#[tokio::test]
async fn test_attempt_ceiling_dead_letters() {
    let store = MemoryQueueStore::new();
    let targets = addresses(&["down"]);
    let transport = Arc::new(
        ScriptedTransport::default().script(&targets[0], std::iter::repeat_n(server_error(), 10)),
    );
    let observer = Arc::new(RecordingObserver::default());
    let metrics = Arc::new(DeliveryMetrics::new());
    enqueue(&store, &targets).await;

    let stats = DeliveryWorker::new(Arc::new(store.clone()), transport.clone())
        .with_policy(RetryPolicy {
            max_attempts: Some(3),
            report_after_attempts: 2,
        })
        .with_observer(observer.clone())
        .with_metrics(metrics.clone())
        .drain()
        .await
        .unwrap();

    assert_eq!(transport.addresses().len(), 3);
    assert_eq!(stats.requeued, 2);
    assert_eq!(stats.dead_lettered, 1);
    assert_eq!(store.pending_count().await.unwrap(), 0);

    let dead = observer.dead.lock().unwrap().clone();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].0, targets[0]);
    assert_eq!(dead[0].1, 3);
    assert!(dead[0].2.contains("500"));

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.deliveries_failed_transient, 3);
    assert_eq!(snapshot.jobs_dead_lettered, 1);
}

#[tokio::test]
async fn test_requeue_failure_stops_pass() {
    let store = FlakyStore::failing_requeues(MemoryQueueStore::new(), usize::MAX);
    let targets = addresses(&["a", "b", "c"]);
    let transport = Arc::new(ScriptedTransport::default().script(&targets[1], [server_error()]));
    enqueue(&store, &targets).await;

    let err = DeliveryWorker::new(Arc::new(store.clone()), transport.clone())
        .with_requeue_backoff([])
        .drain()
        .await
        .unwrap_err();

    assert!(matches!(err, QueueError::Persistence(_)));
    assert_eq!(transport.addresses(), targets[..2].to_vec());
    // "b" is still stored, claimed by the failed pass
    assert_eq!(store.pending_count().await.unwrap(), 2);
    let waiting = store.inner.snapshot().await;
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].address, targets[2]);
}

#[tokio::test]
async fn test_failed_requeue_keeps_job() {
    let store = FlakyStore::failing_requeues(MemoryQueueStore::new(), 1);
    let targets = addresses(&["a"]);
    let unavailable = DeliveryOutcome::from_status(503, "503 Service Unavailable");
    let transport = Arc::new(
        ScriptedTransport::default().script(&targets[0], std::iter::repeat_n(unavailable, 10)),
    );
    enqueue(&store, &targets).await;

    let err = DeliveryWorker::new(Arc::new(store.clone()), transport.clone())
        .with_metrics(Arc::new(DeliveryMetrics::new()))
        .with_requeue_backoff([])
        .drain()
        .await
        .unwrap_err();

    assert!(matches!(err, QueueError::Persistence(_)));
    assert_eq!(transport.addresses(), targets);
    assert_eq!(store.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_requeue_is_retried_after_store_error() {
    let store = FlakyStore::failing_requeues(MemoryQueueStore::new(), 2);
    let targets = addresses(&["a", "b"]);
    let transport = Arc::new(ScriptedTransport::default().script(&targets[0], [server_error()]));
    enqueue(&store, &targets).await;

    let stats = DeliveryWorker::new(Arc::new(store.clone()), transport.clone())
        .with_metrics(Arc::new(DeliveryMetrics::new()))
        .with_requeue_backoff([Duration::from_millis(1), Duration::from_millis(1)])
        .drain()
        .await
        .unwrap();

    assert_eq!(stats.requeued, 1);
    assert_eq!(stats.delivered, 2);
    assert_eq!(
        transport.addresses(),
        vec![targets[0].clone(), targets[1].clone(), targets[0].clone()]
    );
    assert_eq!(*store.requeued.lock().unwrap(), vec![1]);
    assert_eq!(store.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_cancelled_drain_takes_nothing() {
    let store = MemoryQueueStore::new();
    let transport = Arc::new(ScriptedTransport::default());
    enqueue(&store, &addresses(&["a", "b"])).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let stats = worker(&store, &transport)
        .drain_with(&cancel, None)
        .await
        .unwrap();

    assert_eq!(stats.processed(), 0);
    assert_eq!(store.pending_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_coordinator_wakes_pool() {
    let store = MemoryQueueStore::new();
    let transport = Arc::new(ScriptedTransport::default());
    let trigger = DeliveryTrigger::new();
    let pool = DeliveryWorkerPool::spawn(
        3,
        worker(&store, &transport),
        trigger.clone(),
        Duration::ZERO,
    );
    let coordinator = DeliveryCoordinator::new(
        Arc::new(store.clone()),
        Arc::new(StaticKeySource::new().with_key(ALICE, "ALICE-PEM")),
        trigger,
    );
    let targets = addresses(&["a", "b", "c", "d", "e"]);

    coordinator
        .queue_for_delivery(
            ALICE,
            &json!({"type": "Create", "bto": ["https://secret.example/u/x"]}),
            &targets,
        )
        .await
        .unwrap();
    wait_for_calls(&transport, targets.len()).await;
    pool.shutdown().await;

    let calls = transport.calls();
    let mut delivered: Vec<_> = calls.iter().map(|c| c.address.clone()).collect();
    delivered.sort();
    assert_eq!(delivered, targets);
    assert!(calls.iter().all(|c| c.body == calls[0].body));
    assert!(calls.iter().all(|c| c.signing_key == "ALICE-PEM"));
    assert!(!calls[0].body.contains("bto"));
}

#[tokio::test]
async fn test_pool_drains_leftover_jobs_on_start() {
    let store = MemoryQueueStore::new();
    let transport = Arc::new(ScriptedTransport::default());
    enqueue(&store, &addresses(&["a", "b"])).await;

    let pool = DeliveryWorkerPool::spawn(
        1,
        worker(&store, &transport),
        DeliveryTrigger::new(),
        Duration::ZERO,
    );
    wait_for_calls(&transport, 2).await;
    pool.shutdown().await;

    assert_eq!(store.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_pool_recovers_after_store_error() {
    let store = FlakyStore::failing_requeues(
        MemoryQueueStore::new().with_lease(Duration::from_millis(100)),
        1,
    );
    let targets = addresses(&["a", "b"]);
    let transport = Arc::new(ScriptedTransport::default().script(&targets[0], [server_error()]));
    enqueue(&store, &targets).await;

    // the first pass stops on the failed requeue with "a" still claimed; a
    // sweep delivers "b", and "a" once its lease runs out
    let pool = DeliveryWorkerPool::spawn(
        1,
        DeliveryWorker::new(Arc::new(store.clone()), transport.clone())
            .with_metrics(Arc::new(DeliveryMetrics::new()))
            .with_requeue_backoff([]),
        DeliveryTrigger::new(),
        Duration::from_millis(20),
    );
    wait_for_calls(&transport, 3).await;
    pool.shutdown().await;

    assert_eq!(
        transport.addresses(),
        vec![targets[0].clone(), targets[1].clone(), targets[0].clone()]
    );
    assert_eq!(store.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_end_to_end_over_http() {
    let keypair = generate_rsa_keypair().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users/bob/inbox"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/users/bob/inbox"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let store = MemoryQueueStore::new();
    let transport = HttpDeliveryTransport::new(&DeliveryConfig {
        request_timeout_secs: 5,
        ..DeliveryConfig::default()
    })
    .unwrap();
    let coordinator = DeliveryCoordinator::new(
        Arc::new(store.clone()),
        Arc::new(StaticKeySource::new().with_key(ALICE, keypair.private_key_pem)),
        DeliveryTrigger::new(),
    );
    coordinator
        .queue_for_delivery(
            ALICE,
            &json!({"type": "Follow", "actor": ALICE, "_local": 1}),
            &[format!("{}/users/bob/inbox", server.uri())],
        )
        .await
        .unwrap();

    let stats = DeliveryWorker::new(Arc::new(store.clone()), Arc::new(transport))
        .with_metrics(Arc::new(DeliveryMetrics::new()))
        .drain()
        .await
        .unwrap();

    assert_eq!(stats.requeued, 1);
    assert_eq!(stats.delivered, 1);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body, requests[1].body);
    let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent, json!({"type": "Follow", "actor": ALICE}));
}
