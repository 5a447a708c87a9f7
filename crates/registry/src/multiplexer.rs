//! Subscription Multiplexer (§4.5): fans observed events out to per-
//! connection subscriptions, each with its own filter and its own
//! monotonic cursor counter (counters are not shared across
//! subscriptions — §4.2).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use harness_protocol::command::SubscriptionFilter;
use harness_protocol::cursor::Cursor;
use harness_protocol::event::ObservedEvent;
use tokio::sync::mpsc;

/// Bounded per-subscription delivery queue. A subscription that can't
/// keep up is dropped rather than allowed to apply backpressure to the
/// store's critical section (§12 open question 3).
const SUBSCRIPTION_QUEUE_DEPTH: usize = 1024;
/// Retained event window used to answer `afterCursor` replay requests
/// (§12 open question 2).
const RETENTION_DEPTH: usize = 4096;

pub struct Subscription {
    pub subscription_id: String,
    filter: SubscriptionFilter,
    next_cursor: AtomicI64,
    tx: mpsc::Sender<(Cursor, ObservedEvent)>,
}

impl Subscription {
    fn matches(&self, event: &ObservedEvent) -> bool {
        if event.is_session_output() && !self.filter.include_output {
            return false;
        }

        if let Some(event_scope) = event.scope() {
            if !self.filter.scope.matches(&event_scope) {
                return false;
            }
        }

        if let Some(directory_id) = &self.filter.directory_id {
            if event.directory_id().map(|id| id != directory_id).unwrap_or(true) {
                return false;
            }
        }
        if let Some(conversation_id) = &self.filter.conversation_id {
            if event.conversation_id().map(|id| id != conversation_id).unwrap_or(true) {
                return false;
            }
        }
        if let Some(repository_id) = &self.filter.repository_id {
            if !event.repository_ids().iter().any(|id| id == repository_id) {
                return false;
            }
        }
        if let Some(task_id) = &self.filter.task_id {
            if !event.task_ids().iter().any(|id| id == task_id) {
                return false;
            }
        }
        true
    }
}

struct RetainedEvent {
    cursor: i64,
    event: ObservedEvent,
}

pub struct SubscriptionMultiplexer {
    subscriptions: DashMap<String, Arc<Subscription>>,
    retained: std::sync::Mutex<std::collections::VecDeque<RetainedEvent>>,
    retained_cursor: AtomicI64,
}

impl SubscriptionMultiplexer {
    pub fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
            retained: std::sync::Mutex::new(std::collections::VecDeque::new()),
            retained_cursor: AtomicI64::new(0),
        }
    }

    /// `stream.subscribe`: registers a subscription and, if `afterCursor`
    /// was provided, replays retained events with strictly greater
    /// cursors. Returns `(subscriptionId, cursor, truncated, receiver)`.
    pub fn subscribe(
        &self,
        filter: SubscriptionFilter,
    ) -> (String, Cursor, bool, mpsc::Receiver<(Cursor, ObservedEvent)>) {
        let subscription_id = harness_protocol::new_id();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_QUEUE_DEPTH);
        let after_cursor = filter.after_cursor;

        let subscription = Arc::new(Subscription {
            subscription_id: subscription_id.clone(),
            filter,
            next_cursor: AtomicI64::new(0),
            tx: tx.clone(),
        });

        let mut truncated = false;
        if let Some(after) = after_cursor {
            let retained = self.retained.lock().expect("retained events mutex poisoned");
            let oldest = retained.front().map(|e| e.cursor);
            if let Some(oldest) = oldest {
                if after.0 < oldest {
                    truncated = true;
                }
            }
            for entry in retained.iter().filter(|e| e.cursor > after.0) {
                if subscription.matches(&entry.event) {
                    let cursor = Cursor(subscription.next_cursor.fetch_add(1, Ordering::SeqCst));
                    let _ = tx.try_send((cursor, entry.event.clone()));
                }
            }
        }

        let cursor = Cursor(subscription.next_cursor.load(Ordering::SeqCst));
        self.subscriptions.insert(subscription_id.clone(), subscription);
        (subscription_id, cursor, truncated, rx)
    }

    pub fn unsubscribe(&self, subscription_id: &str) -> bool {
        self.subscriptions.remove(subscription_id).is_some()
    }

    /// Publishes one batch of events that committed atomically inside a
    /// single Domain Store critical section (§9): delivery order within
    /// the batch must match commit order, enforced here by iterating the
    /// slice in order and never interleaving batches from different
    /// callers (callers are expected to call this once per store
    /// mutation, holding no lock of their own across the call).
    pub fn publish(&self, events: &[ObservedEvent]) {
        let mut retained = self.retained.lock().expect("retained events mutex poisoned");
        for event in events {
            let cursor = self.retained_cursor.fetch_add(1, Ordering::SeqCst);
            retained.push_back(RetainedEvent {
                cursor,
                event: event.clone(),
            });
            if retained.len() > RETENTION_DEPTH {
                retained.pop_front();
            }

            for entry in self.subscriptions.iter() {
                let subscription = entry.value();
                if !subscription.matches(event) {
                    continue;
                }
                let delivery_cursor = Cursor(subscription.next_cursor.fetch_add(1, Ordering::SeqCst));
                let _ = subscription.tx.try_send((delivery_cursor, event.clone()));
            }
        }
    }
}

impl Default for SubscriptionMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harness_protocol::types::{Directory, Scope};

    fn sample_directory_event(id: &str) -> ObservedEvent {
        sample_directory_event_scoped(id, Scope::default())
    }

    fn sample_directory_event_scoped(id: &str, scope: Scope) -> ObservedEvent {
        ObservedEvent::DirectoryUpserted {
            directory: Directory {
                directory_id: id.to_string(),
                scope,
                path: "/repo".to_string(),
                repository_id: None,
                created_at: chrono::Utc::now(),
                archived_at: None,
            },
        }
    }

    #[test]
    fn unfiltered_subscription_receives_every_event() {
        let mux = SubscriptionMultiplexer::new();
        let (_, _, _, mut rx) = mux.subscribe(SubscriptionFilter::default());
        mux.publish(&[sample_directory_event("d1")]);
        let (cursor, _) = rx.try_recv().unwrap();
        assert_eq!(cursor, Cursor(0));
    }

    #[test]
    fn directory_filter_excludes_other_directories() {
        let mux = SubscriptionMultiplexer::new();
        let filter = SubscriptionFilter {
            directory_id: Some("d1".into()),
            ..Default::default()
        };
        let (_, _, _, mut rx) = mux.subscribe(filter);
        mux.publish(&[sample_directory_event("other")]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn scope_filter_excludes_other_tenants() {
        let mux = SubscriptionMultiplexer::new();
        let filter = SubscriptionFilter {
            scope: Scope {
                tenant_id: Some("tenant-a".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let (_, _, _, mut rx) = mux.subscribe(filter);

        let other_tenant = Scope {
            tenant_id: Some("tenant-b".into()),
            ..Default::default()
        };
        mux.publish(&[sample_directory_event_scoped("d1", other_tenant)]);
        assert!(rx.try_recv().is_err());

        let same_tenant = Scope {
            tenant_id: Some("tenant-a".into()),
            ..Default::default()
        };
        mux.publish(&[sample_directory_event_scoped("d2", same_tenant)]);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn session_output_excluded_unless_include_output() {
        let mux = SubscriptionMultiplexer::new();
        let (_, _, _, mut rx) = mux.subscribe(SubscriptionFilter::default());
        mux.publish(&[ObservedEvent::SessionOutput {
            session_id: "s1".into(),
            cursor: Cursor(0),
            chunk_len: 4,
        }]);
        assert!(rx.try_recv().is_err());

        let filter = SubscriptionFilter {
            include_output: true,
            ..Default::default()
        };
        let (_, _, _, mut rx) = mux.subscribe(filter);
        mux.publish(&[ObservedEvent::SessionOutput {
            session_id: "s1".into(),
            cursor: Cursor(1),
            chunk_len: 4,
        }]);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn unsubscribe_unknown_id_returns_false() {
        let mux = SubscriptionMultiplexer::new();
        assert!(!mux.unsubscribe("missing"));
    }
}
