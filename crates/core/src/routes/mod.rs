use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::AtomicU64,
    },
};

use crate::{
    events::{EnrichedEvent, VoiceEventKind},
    queues::FifoDropOldestQueue,
};

pub type Handler = Arc<dyn Fn(&EnrichedEvent) + Send + Sync>;

#[derive(Default)]
pub struct Routes {
    pub table: HashMap<VoiceEventKind, Vec<Arc<Route>>>,
}

pub struct Route {
    pub subscriber_id: u64,
    pub inbox: RouteInbox,
    pub drops_total: Arc<AtomicU64>,
}

pub enum RouteInbox {
    Callback(Handler),
    FifoDropOldest(Arc<FifoDropOldestQueue<Arc<EnrichedEvent>>>),
}

impl RouteInbox {
    pub fn try_deliver(&self, event: Arc<EnrichedEvent>) -> bool {
        match self {
            RouteInbox::Callback(handler) => {
                handler(&event);
                true
            }
            RouteInbox::FifoDropOldest(q) => q.push_overwrite(event),
        }
    }
}

impl Routes {
    pub fn insert(&mut self, kind: VoiceEventKind, route: Arc<Route>) {
        self.table.entry(kind).or_default().push(route);
    }

    /// Drops every route owned by `subscriber_id`; returns how many were removed.
    pub fn remove_subscriber(&mut self, subscriber_id: u64) -> usize {
        let mut removed = 0;
        for routes in self.table.values_mut() {
            let before = routes.len();
            routes.retain(|r| r.subscriber_id != subscriber_id);
            removed += before - routes.len();
        }
        self.table.retain(|_, routes| !routes.is_empty());
        removed
    }

    pub fn routes_for(&self, kind: VoiceEventKind) -> Option<Vec<Arc<Route>>> {
        self.table.get(&kind).cloned()
    }
}
