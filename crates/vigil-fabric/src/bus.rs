use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Notify;
use tracing::{info, warn};

use vigil_config::BusConfig;
use vigil_types::{EventType, RingBuffer, SubscriberId};

use crate::error::BusError;
use crate::record::EventRecord;

struct SubscriberState {
    filter: Vec<EventType>,
    queue: RingBuffer<EventRecord>,
    dropped_count: u64,
    notify: Arc<Notify>,
}

impl SubscriberState {
    fn accepts(&self, event_type: EventType) -> bool {
        self.filter.is_empty() || self.filter.contains(&event_type)
    }
}

struct Inner {
    subscribers: HashMap<SubscriberId, SubscriberState>,
    total_published: u64,
    total_dropped: u64,
}

/// Snapshot returned by [`EventBus::metrics`].
#[derive(Clone, Debug, Default)]
pub struct BusMetrics {
    pub total_published: u64,
    pub total_dropped: u64,
    pub subscriber_count: usize,
    pub per_subscriber_queue_depth: HashMap<SubscriberId, usize>,
    pub per_subscriber_dropped: HashMap<SubscriberId, u64>,
}

/// Pub/sub broker with per-subscriber bounded queues and drop-oldest
/// backpressure. Cheap to clone: every clone shares the same subscriber
/// table. `publish` never awaits.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<RwLock<Inner>>,
    closed: Arc<AtomicBool>,
    default_capacity: usize,
}

impl EventBus {
    pub fn new(config: &BusConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                subscribers: HashMap::new(),
                total_published: 0,
                total_dropped: 0,
            })),
            closed: Arc::new(AtomicBool::new(false)),
            default_capacity: config.buffer_size,
        }
    }

    /// Register a new subscriber with an empty bounded queue of
    /// `self`'s configured capacity. `filter` empty means "accept all".
    pub fn subscribe(
        &self,
        subscriber_id: impl Into<SubscriberId>,
        filter: Vec<EventType>,
    ) -> Result<SubscriptionHandle, BusError> {
        if self.default_capacity == 0 {
            return Err(BusError::ZeroCapacity);
        }
        let subscriber_id = subscriber_id.into();
        let mut inner = self.inner.write().expect("bus subscriber table lock poisoned");
        if inner.subscribers.contains_key(&subscriber_id) {
            return Err(BusError::SubscriberConflict(subscriber_id));
        }
        let notify = Arc::new(Notify::new());
        inner.subscribers.insert(
            subscriber_id.clone(),
            SubscriberState {
                filter,
                queue: RingBuffer::new(self.default_capacity),
                dropped_count: 0,
                notify: notify.clone(),
            },
        );
        info!(subscriber = %subscriber_id, "subscriber registered");
        Ok(SubscriptionHandle {
            id: subscriber_id,
            bus: self.clone(),
            notify,
        })
    }

    /// Remove a subscriber and drop its queue. Safe to call concurrently
    /// with publish; in-flight records for that subscriber are discarded.
    pub fn unsubscribe(&self, subscriber_id: &SubscriberId) {
        let removed = {
            let mut inner = self.inner.write().expect("bus subscriber table lock poisoned");
            inner.subscribers.remove(subscriber_id)
        };
        if let Some(sub) = removed {
            sub.notify.notify_waiters();
            info!(subscriber = %subscriber_id, "subscriber removed");
        }
    }

    /// Route `record` to every subscriber whose filter accepts its type.
    /// A full queue evicts its oldest entry; publish itself never blocks.
    pub fn publish(&self, record: EventRecord) -> Result<(), BusError> {
        record.validate()?;
        let mut inner = self.inner.write().expect("bus subscriber table lock poisoned");
        inner.total_published += 1;
        for (id, sub) in inner.subscribers.iter_mut() {
            if !sub.accepts(record.event_type) {
                continue;
            }
            if sub.queue.push(record.clone()).is_some() {
                sub.dropped_count += 1;
                inner.total_dropped += 1;
                warn!(subscriber = %id, event_type = %record.event_type, "subscriber queue full, dropped oldest record");
            }
            sub.notify.notify_one();
        }
        Ok(())
    }

    pub fn metrics(&self) -> BusMetrics {
        let inner = self.inner.read().expect("bus subscriber table lock poisoned");
        let per_subscriber_queue_depth = inner
            .subscribers
            .iter()
            .map(|(id, s)| (id.clone(), s.queue.len()))
            .collect();
        let per_subscriber_dropped = inner
            .subscribers
            .iter()
            .map(|(id, s)| (id.clone(), s.dropped_count))
            .collect();
        BusMetrics {
            total_published: inner.total_published,
            total_dropped: inner.total_dropped,
            subscriber_count: inner.subscribers.len(),
            per_subscriber_queue_depth,
            per_subscriber_dropped,
        }
    }

    /// Signal shutdown: every blocked `receive` wakes and observes `None`
    /// once its queue drains. Does not remove subscribers or drop their
    /// already-queued records.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let inner = self.inner.read().expect("bus subscriber table lock poisoned");
        for sub in inner.subscribers.values() {
            sub.notify.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Opaque handle returned by [`EventBus::subscribe`]; the only way a
/// consumer observes records.
pub struct SubscriptionHandle {
    id: SubscriberId,
    bus: EventBus,
    notify: Arc<Notify>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Await the next record that survived eviction, in publish order.
    /// Returns `None` if the subscriber was removed or the bus closed
    /// while the queue was empty (the cancellation sentinel).
    pub async fn receive(&self) -> Option<EventRecord> {
        loop {
            {
                let mut inner = self.bus.inner.write().expect("bus subscriber table lock poisoned");
                match inner.subscribers.get_mut(&self.id) {
                    None => return None,
                    Some(sub) => {
                        if let Some(record) = sub.queue.pop_front() {
                            return Some(record);
                        }
                    }
                }
            }
            if self.bus.is_closed() {
                let mut inner = self.bus.inner.write().expect("bus subscriber table lock poisoned");
                return inner
                    .subscribers
                    .get_mut(&self.id)
                    .and_then(|sub| sub.queue.pop_front());
            }
            self.notify.notified().await;
        }
    }

    pub fn unsubscribe(self) {
        self.bus.unsubscribe(&self.id);
    }
}
