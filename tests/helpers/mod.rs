#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use topic_engine::collaborators::{ClusterTransport, NullCluster, NullStore, RetainedStore, StoreCall, StoreHandle};
use topic_engine::config::Config;
use topic_engine::error::{EngineError, Result};
use topic_engine::retained::RetainedMessage;
use topic_engine::subscriptions::{ClientId, Subscriber, SubscriberList};
use topic_engine::TopicEngine;

pub const LOCAL_UID: &str = "TEST0001";

pub fn setup_engine() -> TopicEngine {
    TopicEngine::new(&Config::default_for_tests(), Arc::new(NullStore::default()), Arc::new(NullCluster))
}

pub fn setup_engine_with(store: Arc<MemoryStore>, cluster: Arc<RecordingCluster>) -> TopicEngine {
    TopicEngine::new(&Config::default_for_tests(), store, cluster)
}

pub fn subscriber(name: &str) -> Arc<Subscriber> {
    Arc::new(Subscriber::new(ClientId(format!("client-{}", name)), name))
}

pub fn client_subscriber(client: &str, name: &str) -> Arc<Subscriber> {
    Arc::new(Subscriber::new(ClientId(client.to_string()), name))
}

/// Sorted subscriber names of a list.
pub fn names(list: &SubscriberList) -> Vec<String> {
    let mut names: Vec<String> = list.subscribers().iter().map(|s| s.name.clone()).collect();
    names.sort();
    names
}

pub fn retained(topic: &str, payload: &'static str, origin: &str, timestamp: u64, persistent: bool) -> Arc<RetainedMessage> {
    Arc::new(RetainedMessage::new(topic, Bytes::from_static(payload.as_bytes()), origin, timestamp, persistent))
}

// =========================================================================================
// MEMORY STORE
// =========================================================================================

/// Scripted answer for the next `store_retained_message` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreScript {
    GenerationFull,
    Pending,
}

#[derive(Default)]
pub struct MemoryStore {
    next_handle: AtomicU64,
    pub stored: Mutex<HashMap<StoreHandle, (String, u64)>>,
    script: Mutex<VecDeque<StoreScript>>,
    pending: Mutex<Vec<(oneshot::Sender<Result<StoreHandle>>, StoreHandle)>>,
    pub rollbacks: AtomicU32,
    pub commits: AtomicU32,
    pub min_active_order_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, answers: &[StoreScript]) {
        self.script.lock().extend(answers.iter().copied());
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Answers every pending store call successfully.
    pub fn complete_pending(&self) -> usize {
        let pending: Vec<_> = self.pending.lock().drain(..).collect();
        let count = pending.len();
        for (tx, handle) in pending {
            let _ = tx.send(Ok(handle));
        }
        count
    }

    pub fn stored_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.stored.lock().values().map(|(topic, _)| topic.clone()).collect();
        topics.sort();
        topics
    }

    fn keep(&self, message: &RetainedMessage, order_id: u64) -> StoreHandle {
        let handle = StoreHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        self.stored.lock().insert(handle, (message.topic.clone(), order_id));
        handle
    }
}

impl RetainedStore for MemoryStore {
    fn store_retained_message(&self, message: &RetainedMessage, order_id: u64, _references: u32) -> StoreCall<StoreHandle> {
        match self.script.lock().pop_front() {
            Some(StoreScript::GenerationFull) => StoreCall::Completed(Err(EngineError::StoreGenerationFull)),
            Some(StoreScript::Pending) => {
                let handle = self.keep(message, order_id);
                let (tx, rx) = oneshot::channel();
                self.pending.lock().push((tx, handle));
                StoreCall::Pending(rx)
            }
            None => StoreCall::ok(self.keep(message, order_id)),
        }
    }

    fn delete_stored_message(&self, handle: StoreHandle) -> StoreCall<()> {
        match self.stored.lock().remove(&handle) {
            Some(_) => StoreCall::ok(()),
            None => StoreCall::Completed(Err(EngineError::NotFound)),
        }
    }

    fn commit(&self) -> StoreCall<()> {
        self.commits.fetch_add(1, Ordering::Relaxed);
        StoreCall::ok(())
    }

    fn rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    fn set_min_active_order_id(&self, order_id: u64) {
        self.min_active_order_id.store(order_id, Ordering::Relaxed);
    }
}

// =========================================================================================
// RECORDING CLUSTER
// =========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    AddInterest(String, bool),
    RemoveInterest(String, bool),
    Stats(String, Vec<u8>),
}

#[derive(Default)]
pub struct RecordingCluster {
    pub events: Mutex<Vec<ClusterEvent>>,
    pub reject_next_add: AtomicBool,
}

impl RecordingCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ClusterEvent> {
        self.events.lock().clone()
    }
}

impl ClusterTransport for RecordingCluster {
    fn report_retained_stats(&self, server_uid: &str, stats: &[u8]) -> Result<()> {
        self.events.lock().push(ClusterEvent::Stats(server_uid.to_string(), stats.to_vec()));
        Ok(())
    }

    fn add_cluster_subscription_interest(&self, pattern: &str, wildcard: bool) -> Result<()> {
        if self.reject_next_add.swap(false, Ordering::AcqRel) {
            return Err(EngineError::Cluster("rejected by test".to_string()));
        }
        self.events.lock().push(ClusterEvent::AddInterest(pattern.to_string(), wildcard));
        Ok(())
    }

    fn remove_cluster_subscription_interest(&self, pattern: &str, wildcard: bool) -> Result<()> {
        self.events.lock().push(ClusterEvent::RemoveInterest(pattern.to_string(), wildcard));
        Ok(())
    }
}

// =========================================================================================
// BENCHMARK
// =========================================================================================

pub struct Benchmark {
    pub name: String,
    pub start: Instant,
    pub count: usize,
    pub samples: Vec<Duration>,
}

impl Benchmark {
    pub fn start(name: &str, count: usize) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
            count,
            samples: Vec::with_capacity(count),
        }
    }

    pub fn record(&mut self, duration: Duration) {
        self.samples.push(duration);
    }

    pub fn stop(mut self) {
        let total_duration = self.start.elapsed();
        let secs = total_duration.as_secs_f64();
        let ops_sec = self.count as f64 / secs;

        self.samples.sort();
        let len = self.samples.len();

        let p50 = self.samples.get(len * 50 / 100).unwrap_or(&Duration::ZERO).as_micros();
        let p95 = self.samples.get(len * 95 / 100).unwrap_or(&Duration::ZERO).as_micros();
        let p99 = self.samples.get(len * 99 / 100).unwrap_or(&Duration::ZERO).as_micros();
        let max = self.samples.last().unwrap_or(&Duration::ZERO).as_micros();

        println!("\n{}", self.name);
        println!(" Throughput:  {:.0} ops/sec", ops_sec);
        println!(" Total Time:  {:.2?}", total_duration);
        println!(" Latency (µs): p50: {} | p95: {} | p99: {} | MAX: {}", p50, p95, p99, max);
        println!(" Count:       {}\n", self.count);
    }
}
