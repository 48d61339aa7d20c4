//! In-process change notifications for content tables.
//!
//! Every successful write to a content table publishes a [`ChangeEvent`].
//! Consumers (the SSE route) register with [`ChangeBroadcaster::subscribe`]
//! and receive events for the tables they asked for. The returned
//! [`SubscriptionHandle`] unregisters itself on drop, so a disconnecting
//! client can never leak a standing registration.

use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Events buffered per subscriber before it is considered too slow.
const SUBSCRIBER_BUFFER: usize = 64;

/// The content tables a client can watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentTable {
    Hero,
    Intro,
    Sections,
    Services,
    Testimonials,
    Faqs,
    FooterSettings,
    LoginSettings,
    CalendarSettings,
    PrivacyPolicy,
}

impl ContentTable {
    /// The backing table name, which is also the wire name of the event.
    pub fn as_str(self) -> &'static str {
        match self {
            ContentTable::Hero => "hero_content_dwd2024",
            ContentTable::Intro => "intro_content_dwd2024",
            ContentTable::Sections => "section_content_dwd2024",
            ContentTable::Services => "services_dwd2024",
            ContentTable::Testimonials => "testimonials_dwd2024",
            ContentTable::Faqs => "faqs_dwd2024",
            ContentTable::FooterSettings => "footer_settings_dwd2024",
            ContentTable::LoginSettings => "login_settings_dwd2024",
            ContentTable::CalendarSettings => "calendar_settings_dwd2024",
            ContentTable::PrivacyPolicy => "privacy_policy_dwd2024",
        }
    }

    /// Parse either the full table name or its short alias ("services").
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hero_content_dwd2024" | "hero" => Some(ContentTable::Hero),
            "intro_content_dwd2024" | "intro" => Some(ContentTable::Intro),
            "section_content_dwd2024" | "sections" => Some(ContentTable::Sections),
            "services_dwd2024" | "services" => Some(ContentTable::Services),
            "testimonials_dwd2024" | "testimonials" => Some(ContentTable::Testimonials),
            "faqs_dwd2024" | "faqs" => Some(ContentTable::Faqs),
            "footer_settings_dwd2024" | "footer" => Some(ContentTable::FooterSettings),
            "login_settings_dwd2024" | "login" => Some(ContentTable::LoginSettings),
            "calendar_settings_dwd2024" | "calendar" => Some(ContentTable::CalendarSettings),
            "privacy_policy_dwd2024" | "privacy" => Some(ContentTable::PrivacyPolicy),
            _ => None,
        }
    }
}

impl Serialize for ContentTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// A row-level change on a watched table. `row` carries the new row for
/// inserts/updates and `{"id": ...}` (or `{"key": ...}`) for deletes.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub table: ContentTable,
    pub op: ChangeOp,
    pub row: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SubscriptionId(u64);

struct Subscriber {
    /// `None` watches every table.
    tables: Option<HashSet<ContentTable>>,
    sender: mpsc::Sender<ChangeEvent>,
}

impl Subscriber {
    fn matches(&self, table: ContentTable) -> bool {
        match &self.tables {
            Some(tables) => tables.contains(&table),
            None => true,
        }
    }
}

/// Registry of live subscribers. Publishing never blocks: a subscriber
/// whose buffer is full is dropped instead of stalling writers.
pub struct ChangeBroadcaster {
    subscribers: RwLock<HashMap<SubscriptionId, Subscriber>>,
    next_id: AtomicU64,
}

impl ChangeBroadcaster {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber for the given tables (`None` = all tables).
    /// Dropping the handle unregisters it.
    pub fn subscribe(
        self: &Arc<Self>,
        tables: Option<HashSet<ContentTable>>,
    ) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);

        self.subscribers
            .write()
            .insert(id, Subscriber { tables, sender });

        SubscriptionHandle {
            id,
            receiver,
            broadcaster: Arc::clone(self),
        }
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.write().remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver an event to every matching subscriber, evicting any that
    /// cannot keep up.
    pub fn publish(&self, event: ChangeEvent) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscribers.read();
            for (id, sub) in subs.iter() {
                if !sub.matches(event.table) {
                    continue;
                }
                if sub.sender.try_send(event.clone()).is_err() {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscribers.write();
            for id in to_remove {
                subs.remove(&id);
                tracing::warn!(subscription = id.0, "dropped slow change subscriber");
            }
        }
    }
}

impl Default for ChangeBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of a subscription. Unregisters on drop.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    receiver: mpsc::Receiver<ChangeEvent>,
    broadcaster: Arc<ChangeBroadcaster>,
}

impl SubscriptionHandle {
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.receiver.try_recv().ok()
    }

    pub(crate) fn poll_recv(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<ChangeEvent>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_event(op: ChangeOp) -> ChangeEvent {
        ChangeEvent {
            table: ContentTable::Services,
            op,
            row: serde_json::json!({ "id": 1 }),
        }
    }

    #[test]
    fn test_parse_accepts_table_name_and_alias() {
        assert_eq!(
            ContentTable::parse("services_dwd2024"),
            Some(ContentTable::Services)
        );
        assert_eq!(ContentTable::parse("faqs"), Some(ContentTable::Faqs));
        assert_eq!(ContentTable::parse("nope"), None);
    }

    #[tokio::test]
    async fn test_subscribe_receives_matching_event() {
        let broadcaster = Arc::new(ChangeBroadcaster::new());
        let mut handle =
            broadcaster.subscribe(Some([ContentTable::Services].into_iter().collect()));

        broadcaster.publish(service_event(ChangeOp::Insert));

        let event = handle.try_recv().expect("event should be delivered");
        assert_eq!(event.table, ContentTable::Services);
        assert_eq!(event.op, ChangeOp::Insert);
    }

    #[tokio::test]
    async fn test_non_matching_table_is_filtered() {
        let broadcaster = Arc::new(ChangeBroadcaster::new());
        let mut handle = broadcaster.subscribe(Some([ContentTable::Faqs].into_iter().collect()));

        broadcaster.publish(service_event(ChangeOp::Update));

        assert!(handle.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_none_filter_receives_everything() {
        let broadcaster = Arc::new(ChangeBroadcaster::new());
        let mut handle = broadcaster.subscribe(None);

        broadcaster.publish(service_event(ChangeOp::Delete));
        broadcaster.publish(ChangeEvent {
            table: ContentTable::Hero,
            op: ChangeOp::Update,
            row: serde_json::json!({ "id": 1 }),
        });

        assert!(handle.try_recv().is_some());
        assert!(handle.try_recv().is_some());
    }

    #[tokio::test]
    async fn test_drop_unregisters() {
        let broadcaster = Arc::new(ChangeBroadcaster::new());
        let handle = broadcaster.subscribe(None);
        assert_eq!(broadcaster.subscriber_count(), 1);

        drop(handle);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_evicted() {
        let broadcaster = Arc::new(ChangeBroadcaster::new());
        let _handle = broadcaster.subscribe(None);

        for _ in 0..(SUBSCRIBER_BUFFER + 1) {
            broadcaster.publish(service_event(ChangeOp::Update));
        }

        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serializes_with_table_name() {
        let json = serde_json::to_string(&service_event(ChangeOp::Insert)).unwrap();
        assert!(json.contains("services_dwd2024"));
        assert!(json.contains("\"insert\""));
    }
}
