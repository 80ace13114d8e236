use std::sync::{
    Arc, RwLock, Weak,
    atomic::{AtomicU64, Ordering},
};

use tokio::{sync::Notify, time::Instant};
use tracing::trace;
use uuid::Uuid;

use crate::{
    events::{EnrichedEvent, VoiceEvent, VoiceEventKind},
    queues::{FifoDropOldestQueue, FifoDropOldestReceiver},
    routes::{Route, RouteInbox, Routes},
};

#[derive(Default)]
pub struct BusMetrics {
    pub unrouted_publish_total: AtomicU64,
    pub published_total: AtomicU64,
}

impl BusMetrics {
    pub fn record_unrouted(&self, kind: VoiceEventKind) {
        trace!(%kind, "no subscribers");
        self.unrouted_publish_total.fetch_add(1, Ordering::Relaxed);
    }
}

/// In-process fan-out of voice events to any number of subscribers.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

pub struct EventBusInner {
    session_id: Uuid,
    next_ingest_seq: AtomicU64,
    next_subscriber_id: AtomicU64,
    routes: RwLock<Routes>,
    metrics: BusMetrics,
}

impl EventBusInner {
    fn remove(&self, subscriber_id: u64) {
        self.routes
            .write()
            .expect("EventBus routes poisoned")
            .remove_subscriber(subscriber_id);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Uuid::new_v4())
    }
}

impl EventBus {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            inner: Arc::new(EventBusInner {
                session_id,
                next_ingest_seq: AtomicU64::new(0),
                next_subscriber_id: AtomicU64::new(0),
                routes: RwLock::new(Routes::default()),
                metrics: BusMetrics::default(),
            }),
        }
    }

    pub fn publish(&self, event: VoiceEvent) {
        let kind = event.kind();
        let ingest_seq = self.inner.next_ingest_seq.fetch_add(1, Ordering::Relaxed);
        self.inner.metrics.published_total.fetch_add(1, Ordering::Relaxed);

        let enriched_event = Arc::new(EnrichedEvent {
            event,
            session_id: self.inner.session_id,
            ingest_seq,
            ingested_at: Instant::now(),
        });

        // Snapshot so handlers may subscribe or dispose while being called.
        let routes = self
            .inner
            .routes
            .read()
            .expect("EventBus routes poisoned")
            .routes_for(kind);

        let Some(routes) = routes else {
            self.inner.metrics.record_unrouted(kind);
            return;
        };

        for route in routes {
            let ok = route.inbox.try_deliver(Arc::clone(&enriched_event));

            if !ok {
                route.drops_total.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Calls `handler` for every event of `kind` until the returned
    /// [`Subscription`] is disposed or dropped.
    pub fn subscribe<F>(&self, kind: VoiceEventKind, handler: F) -> Subscription
    where
        F: Fn(&VoiceEvent) + Send + Sync + 'static,
    {
        let id = self.next_subscriber_id();
        let route = Arc::new(Route {
            subscriber_id: id,
            inbox: RouteInbox::Callback(Arc::new(move |e: &EnrichedEvent| handler(&e.event))),
            drops_total: Arc::new(AtomicU64::new(0)),
        });
        self.inner
            .routes
            .write()
            .expect("EventBus routes poisoned")
            .insert(kind, route);

        self.subscription(id)
    }

    /// Queues events of the given kinds for a consumer that pulls at its own pace.
    pub fn subscribe_inbox(&self, kinds: &[VoiceEventKind], capacity: usize) -> Inbox {
        let id = self.next_subscriber_id();
        let queue = Arc::new(FifoDropOldestQueue::new(capacity, Arc::new(Notify::new())));
        let drops_total = Arc::new(AtomicU64::new(0));

        {
            let mut routes = self.inner.routes.write().expect("EventBus routes poisoned");
            for kind in kinds {
                routes.insert(
                    *kind,
                    Arc::new(Route {
                        subscriber_id: id,
                        inbox: RouteInbox::FifoDropOldest(Arc::clone(&queue)),
                        drops_total: Arc::clone(&drops_total),
                    }),
                );
            }
        }

        Inbox {
            receiver: queue.receiver(),
            drops_total,
            _subscription: self.subscription(id),
        }
    }

    pub fn subscriber_count(&self, kind: VoiceEventKind) -> usize {
        self.inner
            .routes
            .read()
            .expect("EventBus routes poisoned")
            .table
            .get(&kind)
            .map_or(0, Vec::len)
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    pub fn metrics(&self) -> &BusMetrics {
        &self.inner.metrics
    }

    fn next_subscriber_id(&self) -> u64 {
        self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed)
    }

    fn subscription(&self, id: u64) -> Subscription {
        Subscription {
            bus: Arc::downgrade(&self.inner),
            id,
        }
    }
}

/// Disposer for a bus subscription. Dropping it unsubscribes too.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    bus: Weak<EventBusInner>,
    id: u64,
}

impl Subscription {
    pub fn dispose(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}

/// Pull side of [`EventBus::subscribe_inbox`].
pub struct Inbox {
    receiver: FifoDropOldestReceiver<Arc<EnrichedEvent>>,
    drops_total: Arc<AtomicU64>,
    _subscription: Subscription,
}

impl Inbox {
    pub async fn recv(&self) -> Arc<EnrichedEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&self) -> Option<Arc<EnrichedEvent>> {
        self.receiver.try_recv()
    }

    pub fn drops_total(&self) -> u64 {
        self.drops_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn counter(bus: &EventBus, kind: VoiceEventKind) -> (Arc<AtomicU64>, Subscription) {
        let hits = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&hits);
        let sub = bus.subscribe(kind, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (hits, sub)
    }

    #[test]
    fn fans_out_to_every_subscriber() {
        let bus = EventBus::default();
        let (a, _sub_a) = counter(&bus, VoiceEventKind::End);
        let (b, _sub_b) = counter(&bus, VoiceEventKind::End);
        let (other, _sub_other) = counter(&bus, VoiceEventKind::Start);

        bus.publish(VoiceEvent::End);

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dispose_and_drop_unsubscribe() {
        let bus = EventBus::default();
        let (a, sub_a) = counter(&bus, VoiceEventKind::End);
        let (b, sub_b) = counter(&bus, VoiceEventKind::End);

        sub_a.dispose();
        bus.publish(VoiceEvent::End);
        drop(sub_b);
        bus.publish(VoiceEvent::End);

        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(VoiceEventKind::End), 0);
        assert_eq!(bus.metrics().unrouted_publish_total.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn handler_can_dispose_itself() {
        let bus = EventBus::default();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(AtomicU64::new(0));

        let own = Arc::clone(&slot);
        let seen = Arc::clone(&hits);
        let sub = bus.subscribe(VoiceEventKind::End, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            own.lock().unwrap().take();
        });
        *slot.lock().unwrap() = Some(sub);

        bus.publish(VoiceEvent::End);
        bus.publish(VoiceEvent::End);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delta_payload_reaches_handler() {
        let bus = EventBus::default();
        let got = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&got);
        let _sub = bus.subscribe(VoiceEventKind::Delta, move |e| {
            if let VoiceEvent::Delta { transcript } = e {
                sink.lock().unwrap().push(transcript.clone());
            }
        });

        bus.publish(VoiceEvent::Delta { transcript: "Hel".into() });
        bus.publish(VoiceEvent::Delta { transcript: "lo".into() });

        assert_eq!(*got.lock().unwrap(), vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn inbox_keeps_order_and_counts_drops() {
        let bus = EventBus::default();
        let inbox = bus.subscribe_inbox(&[VoiceEventKind::Start, VoiceEventKind::End], 2);

        bus.publish(VoiceEvent::Start);
        bus.publish(VoiceEvent::End);
        bus.publish(VoiceEvent::End);

        assert_eq!(inbox.drops_total(), 1);
        let first = inbox.recv().await;
        let second = inbox.recv().await;
        assert_eq!(first.event, VoiceEvent::End);
        assert_eq!(second.event, VoiceEvent::End);
        assert!(first.ingest_seq < second.ingest_seq);
        assert_eq!(first.session_id, bus.session_id());
    }

    #[test]
    fn dropping_inbox_removes_its_routes() {
        let bus = EventBus::default();
        let inbox = bus.subscribe_inbox(&VoiceEventKind::ALL, 4);
        assert_eq!(bus.subscriber_count(VoiceEventKind::ToolCall), 1);

        drop(inbox);

        for kind in VoiceEventKind::ALL {
            assert_eq!(bus.subscriber_count(kind), 0);
        }
    }
}
