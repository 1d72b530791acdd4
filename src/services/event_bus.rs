//! In-process pub/sub fan-out with a per-subscriber project-ID filter (C2).
//!
//! Every published event is persisted first (the repository assigns `seq`)
//! then fanned out. A subscriber's queue is bounded; a publish into a full
//! queue disconnects that subscriber rather than blocking the publisher or
//! dropping the event for everyone else. Reconnection is a full resync via
//! [`EventRepository::list_since`], not a replay of missed events.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::domain::error::CoreResult;
use crate::domain::models::{Event, EventType};
use crate::domain::ports::EventRepository;

/// Default bound on a subscriber's outstanding-event queue.
pub const DEFAULT_SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

struct Subscriber {
    sender: mpsc::Sender<Event>,
    filter: Arc<RwLock<HashSet<Uuid>>>,
}

/// A live subscription handle. Drop or call [`EventBus::unsubscribe`] to
/// stop receiving events; the bus also drops a subscriber on its own when
/// its queue overflows.
pub struct Subscription {
    pub id: Uuid,
    pub receiver: mpsc::Receiver<Event>,
    filter: Arc<RwLock<HashSet<Uuid>>>,
}

impl Subscription {
    pub async fn set_project_filter(&self, project_ids: HashSet<Uuid>) {
        *self.filter.write().await = project_ids;
    }
}

pub struct EventBus {
    repository: Arc<dyn EventRepository>,
    subscribers: RwLock<HashMap<Uuid, Subscriber>>,
    queue_capacity: usize,
    disconnect_count: AtomicU64,
}

impl EventBus {
    pub fn new(repository: Arc<dyn EventRepository>) -> Self {
        Self::with_queue_capacity(repository, DEFAULT_SUBSCRIBER_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(repository: Arc<dyn EventRepository>, queue_capacity: usize) -> Self {
        Self {
            repository,
            subscribers: RwLock::new(HashMap::new()),
            queue_capacity,
            disconnect_count: AtomicU64::new(0),
        }
    }

    /// Registers a new subscriber filtered to `project_ids` (empty = only
    /// filter-exempt events).
    pub async fn subscribe(&self, project_ids: HashSet<Uuid>) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let filter = Arc::new(RwLock::new(project_ids));
        self.subscribers.write().await.insert(
            id,
            Subscriber { sender: tx, filter: filter.clone() },
        );
        Subscription { id, receiver: rx, filter }
    }

    pub async fn unsubscribe(&self, subscription_id: Uuid) {
        self.subscribers.write().await.remove(&subscription_id);
    }

    /// Persists `event_type`/`payload` (assigning `seq`) then fans the
    /// resulting [`Event`] out to every matching subscriber. Subscribers
    /// whose queue is full are disconnected; other subscribers are
    /// unaffected.
    pub async fn publish(
        &self,
        project_id: Option<Uuid>,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> CoreResult<Event> {
        let draft = Event::new(0, project_id, event_type, payload);
        let seq = self.repository.append(&draft).await?;
        let event = Event { seq, ..draft };

        let mut dead = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            for (id, subscriber) in subscribers.iter() {
                let filter = subscriber.filter.read().await;
                if !event.matches_filter(&filter) {
                    continue;
                }
                drop(filter);
                if subscriber.sender.try_send(event.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in dead {
                subscribers.remove(&id);
                self.disconnect_count.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(subscription_id = %id, "subscriber queue overflowed, disconnecting");
            }
        }

        Ok(event)
    }

    /// Number of subscribers disconnected for queue overflow since startup.
    pub fn disconnect_count(&self) -> u64 {
        self.disconnect_count.load(Ordering::Relaxed)
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}
