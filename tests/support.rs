use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

use async_trait::async_trait;
use chrono::Utc;
use notification_service::{
    clients::{database::NotificationStore, rbmq::DeliveryBroker},
    error::{BrokerError, StoreError},
    models::{
        message::{NotificationRequest, QueuedMessage},
        notification::{Fingerprint, ListFilter, PersistOutcome, PersistedNotification},
        status::Disposition,
        topology::QueueTopology,
    },
    worker::DeliveryConsumer,
};

/// Store with the same insert-if-absent contract as PostgreSQL, plus switches
/// to simulate an unreachable database.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<PersistedNotification>>,
    failures_remaining: AtomicU32,
    always_fail: AtomicBool,
    persist_calls: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(calls: u32) -> Self {
        let store = Self::default();
        store.failures_remaining.store(calls, Ordering::SeqCst);
        store
    }

    pub fn always_failing() -> Self {
        let store = Self::default();
        store.always_fail.store(true, Ordering::SeqCst);
        store
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.always_fail.store(unavailable, Ordering::SeqCst);
    }

    pub fn persist_calls(&self) -> u32 {
        self.persist_calls.load(Ordering::SeqCst)
    }

    pub fn rows(&self) -> Vec<PersistedNotification> {
        self.rows.lock().unwrap().clone()
    }

    pub fn rows_with(&self, fingerprint: &Fingerprint) -> usize {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.fingerprint == fingerprint.as_str())
            .count()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }

        let consumed_failure = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed_failure {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    async fn persist(&self, request: &NotificationRequest) -> Result<PersistOutcome, StoreError> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let fingerprint = Fingerprint::of(request);
        let mut rows = self.rows.lock().unwrap();

        if rows.iter().any(|row| row.fingerprint == fingerprint.as_str()) {
            return Ok(PersistOutcome::AlreadyExists);
        }

        let id = rows.len() as i64 + 1;
        rows.push(PersistedNotification {
            id,
            sender: request.sender.clone(),
            recipient: request.recipient.clone(),
            message: request.message.clone(),
            fingerprint: fingerprint.to_string(),
            created_at: Utc::now(),
        });

        Ok(PersistOutcome::Inserted)
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<PersistedNotification>, StoreError> {
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }

        let mut rows: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));

        Ok(rows
            .into_iter()
            .skip(filter.effective_offset() as usize)
            .take(filter.effective_limit() as usize)
            .collect())
    }
}

type Entry = (Vec<u8>, u32);

#[derive(Default)]
struct BrokerState {
    next_tag: u64,
    queues: HashMap<String, VecDeque<Entry>>,
    in_flight: HashMap<u64, Entry>,
    deliveries: u32,
    acked: u32,
    discarded: u32,
    unroutable: u32,
}

impl BrokerState {
    fn queue(&mut self, name: &str) -> &mut VecDeque<Entry> {
        self.queues.entry(name.to_string()).or_default()
    }

    fn bodies(&self, name: &str) -> Vec<Vec<u8>> {
        self.queues
            .get(name)
            .map(|queue| queue.iter().map(|(body, _)| body.clone()).collect())
            .unwrap_or_default()
    }
}

/// Routes messages through the same exchanges and bindings `declare` sets up
/// on RabbitMQ. Nacks dead-letter with the rejected count bumped; anything
/// without a matching binding is counted as unroutable and lost.
#[derive(Default)]
pub struct SimulatedBroker {
    topology: QueueTopology,
    state: Mutex<BrokerState>,
    dlq_unavailable: AtomicBool,
    closed: AtomicBool,
}

impl SimulatedBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_dlq_unavailable(&self, unavailable: bool) {
        self.dlq_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn route(
        &self,
        state: &mut BrokerState,
        (exchange, routing_key): (&str, &str),
        entry: Entry,
    ) {
        match self.topology.route(exchange, routing_key) {
            Some(queue) => state.queue(queue).push_back(entry),
            None => state.unroutable += 1,
        }
    }

    pub fn publish_raw(&self, body: impl Into<Vec<u8>>) {
        let mut state = self.state.lock().unwrap();
        self.route(&mut state, ("", self.topology.main.as_str()), (body.into(), 0));
    }

    pub fn deliver(&self) -> Option<QueuedMessage> {
        let mut state = self.state.lock().unwrap();
        let (body, prior) = state.queue(&self.topology.main).pop_front()?;

        state.next_tag += 1;
        state.deliveries += 1;
        let tag = state.next_tag;
        state.in_flight.insert(tag, (body.clone(), prior));

        Some(QueuedMessage::new(tag, body, prior))
    }

    /// Lets the retry TTL elapse. Returns whether anything moved.
    pub fn expire_retry(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        let expired: Vec<Entry> = state.queue(&self.topology.retry).drain(..).collect();
        let moved = !expired.is_empty();
        for entry in expired {
            self.route(&mut state, self.topology.retry_dead_letter_route(), entry);
        }
        moved
    }

    pub fn main_bodies(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().bodies(&self.topology.main)
    }

    pub fn retry_len(&self) -> usize {
        self.state.lock().unwrap().bodies(&self.topology.retry).len()
    }

    pub fn dlq(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().bodies(&self.topology.dlq)
    }

    pub fn deliveries(&self) -> u32 {
        self.state.lock().unwrap().deliveries
    }

    pub fn acked(&self) -> u32 {
        self.state.lock().unwrap().acked
    }

    pub fn discarded(&self) -> u32 {
        self.state.lock().unwrap().discarded
    }

    pub fn unroutable(&self) -> u32 {
        self.state.lock().unwrap().unroutable
    }

    pub fn unsettled(&self) -> usize {
        self.state.lock().unwrap().in_flight.len()
    }

    fn settle(&self, delivery_tag: u64) -> Result<Entry, BrokerError> {
        self.state
            .lock()
            .unwrap()
            .in_flight
            .remove(&delivery_tag)
            .ok_or_else(|| BrokerError::Unavailable(format!("unknown delivery tag {delivery_tag}")))
    }
}

#[async_trait]
impl DeliveryBroker for SimulatedBroker {
    async fn acknowledge(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.settle(delivery_tag)?;
        self.state.lock().unwrap().acked += 1;
        Ok(())
    }

    async fn discard(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.settle(delivery_tag)?;
        self.state.lock().unwrap().discarded += 1;
        Ok(())
    }

    async fn retry_later(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        let (body, prior) = self.settle(delivery_tag)?;
        let mut state = self.state.lock().unwrap();
        self.route(
            &mut state,
            self.topology.main_dead_letter_route(),
            (body, prior + 1),
        );
        Ok(())
    }

    async fn publish_to_dlq(&self, body: &[u8]) -> Result<(), BrokerError> {
        if self.dlq_unavailable.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable("dlq publish refused".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        self.route(&mut state, ("", self.topology.dlq.as_str()), (body.to_vec(), 0));
        Ok(())
    }

    async fn publish(&self, request: &NotificationRequest) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable("channel closed".to_string()));
        }
        self.publish_raw(request.encode()?);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable("channel closed".to_string()));
        }
        Ok(())
    }
}

pub fn consumer_for(store: &Arc<MemoryStore>, broker: &Arc<SimulatedBroker>) -> DeliveryConsumer {
    DeliveryConsumer::new(store.clone(), broker.clone())
}

/// Feeds the consumer until main and retry are both empty, letting the retry
/// TTL elapse between rounds.
pub async fn drain(consumer: &DeliveryConsumer, broker: &SimulatedBroker) -> Vec<Disposition> {
    let mut dispositions = Vec::new();
    for _ in 0..20 {
        while let Some(message) = broker.deliver() {
            dispositions.push(consumer.handle(message).await);
        }
        if !broker.expire_retry() {
            return dispositions;
        }
    }
    panic!("messages still cycling after 20 retry rounds");
}

pub fn body(sender: &str, recipient: &str, message: &str) -> Vec<u8> {
    NotificationRequest::new(sender, recipient, message)
        .encode()
        .unwrap()
}
