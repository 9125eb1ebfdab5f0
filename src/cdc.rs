//! Change-data-capture event bus.
//!
//! Decoded logical-replication events are routed by table name into hot,
//! multi-subscriber broadcast streams with a bounded buffer. A subscriber
//! that falls behind loses the oldest events (accounted for in a drop
//! counter); producers never block on slow consumers.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::Stream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, info, warn};

pub const DEFAULT_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdcEventType {
    Insert,
    Update,
    Delete,
    Begin,
    Commit,
}

/// One decoded logical-replication event.
#[derive(Debug, Clone)]
pub struct CdcEvent {
    pub event_type: CdcEventType,
    pub schema: String,
    pub table: String,
    pub data_json: serde_json::Value,
    pub operation_label: String,
    pub lsn: String,
}

/// Source of decoded replication events; the transport and decoding live
/// with the collaborator implementing this.
pub trait ReplicationSource: Send + 'static {
    fn next_event(
        &mut self,
    ) -> impl std::future::Future<Output = anyhow::Result<Option<CdcEvent>>> + Send;
}

pub struct CdcBus {
    buffer_size: usize,
    streams: RwLock<HashMap<String, broadcast::Sender<CdcEvent>>>,
    dropped: Arc<AtomicU64>,
    running: AtomicBool,
}

impl CdcBus {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
            streams: RwLock::new(HashMap::new()),
            dropped: Arc::new(AtomicU64::new(0)),
            running: AtomicBool::new(false),
        }
    }

    /// Hot stream of events for one table. All callers for the same table
    /// share one underlying channel; each returned stream observes
    /// independently from its subscription point.
    pub fn table_stream(&self, table: &str) -> impl Stream<Item = CdcEvent> + Send + use<> {
        let receiver = self.sender_for(table).subscribe();
        let dropped = self.dropped.clone();

        BroadcastStream::new(receiver).filter_map(move |result| match result {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                dropped.fetch_add(missed, Ordering::Relaxed);
                None
            }
        })
    }

    fn sender_for(&self, table: &str) -> broadcast::Sender<CdcEvent> {
        if let Some(sender) = self.streams.read().expect("cdc stream map poisoned").get(table) {
            return sender.clone();
        }

        let mut streams = self.streams.write().expect("cdc stream map poisoned");
        // Double-check under the write lock so creation stays single-flight.
        if let Some(sender) = streams.get(table) {
            return sender.clone();
        }
        let (sender, _) = broadcast::channel(self.buffer_size);
        streams.insert(table.to_string(), sender.clone());
        debug!(table, "created CDC stream");
        sender
    }

    /// Route one decoded event. Transaction markers carry no table and are
    /// dropped silently.
    pub fn handle_event(&self, event: CdcEvent) {
        if matches!(event.event_type, CdcEventType::Begin | CdcEventType::Commit)
            || event.table.is_empty()
        {
            return;
        }

        let sender = self.sender_for(&event.table);
        // No receivers is not an error; the stream is hot.
        let _ = sender.send(event);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn active_subscription_count(&self) -> usize {
        self.streams
            .read()
            .expect("cdc stream map poisoned")
            .values()
            .map(|sender| sender.receiver_count())
            .sum()
    }

    pub fn dropped_event_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Pump a replication source into the bus on a background task. The
    /// task ends when the source is exhausted or fails.
    pub fn spawn<S: ReplicationSource>(self: &Arc<Self>, mut source: S) -> JoinHandle<()> {
        let bus = self.clone();
        bus.running.store(true, Ordering::Relaxed);

        tokio::spawn(async move {
            info!("CDC bus started");
            loop {
                match source.next_event().await {
                    Ok(Some(event)) => bus.handle_event(event),
                    Ok(None) => {
                        info!("replication source ended");
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "replication source failed");
                        break;
                    }
                }
            }
            bus.running.store(false, Ordering::Relaxed);
        })
    }
}

impl Default for CdcBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: CdcEventType, table: &str, label: &str) -> CdcEvent {
        CdcEvent {
            event_type,
            schema: "public".into(),
            table: table.into(),
            data_json: serde_json::json!({"op": label}),
            operation_label: label.into(),
            lsn: "0/16B3748".into(),
        }
    }

    #[tokio::test]
    async fn events_route_to_their_table_stream() {
        let bus = CdcBus::default();

        let mut customer_stream = Box::pin(bus.table_stream("customer"));
        let mut orders_stream = Box::pin(bus.table_stream("orders"));

        bus.handle_event(event(CdcEventType::Insert, "customer", "INSERT"));
        bus.handle_event(event(CdcEventType::Update, "orders", "UPDATE"));

        let customer_event = customer_stream.next().await.unwrap();
        assert_eq!(customer_event.event_type, CdcEventType::Insert);
        assert_eq!(customer_event.table, "customer");

        let orders_event = orders_stream.next().await.unwrap();
        assert_eq!(orders_event.event_type, CdcEventType::Update);
        assert_eq!(orders_event.table, "orders");
    }

    #[tokio::test]
    async fn transaction_markers_are_dropped_silently() {
        let bus = CdcBus::default();
        let mut stream = Box::pin(bus.table_stream("customer"));

        bus.handle_event(event(CdcEventType::Begin, "", "BEGIN"));
        bus.handle_event(event(CdcEventType::Commit, "", "COMMIT"));
        bus.handle_event(event(CdcEventType::Insert, "customer", "INSERT"));

        let first = stream.next().await.unwrap();
        assert_eq!(first.event_type, CdcEventType::Insert);
    }

    #[tokio::test]
    async fn same_table_streams_share_one_source() {
        let bus = CdcBus::default();

        let mut first = Box::pin(bus.table_stream("customer"));
        let mut second = Box::pin(bus.table_stream("customer"));
        assert_eq!(bus.active_subscription_count(), 2);

        bus.handle_event(event(CdcEventType::Delete, "customer", "DELETE"));

        assert_eq!(first.next().await.unwrap().event_type, CdcEventType::Delete);
        assert_eq!(second.next().await.unwrap().event_type, CdcEventType::Delete);
    }

    #[tokio::test]
    async fn slow_subscribers_lose_oldest_events_without_blocking() {
        let bus = CdcBus::new(4);
        let mut stream = Box::pin(bus.table_stream("customer"));

        for index in 0..10 {
            bus.handle_event(event(CdcEventType::Insert, "customer", &index.to_string()));
        }

        let mut received = Vec::new();
        while received.len() < 10 {
            match tokio::time::timeout(std::time::Duration::from_millis(50), stream.next()).await {
                Ok(Some(ev)) => received.push(ev.operation_label.parse::<u64>().unwrap()),
                _ => break,
            }
        }

        assert!(!received.is_empty());
        assert!(received.len() < 10, "a bounded buffer must have dropped");
        // Oldest events are the ones lost; what remains is the ordered tail.
        let expected_tail: Vec<u64> =
            ((10 - received.len() as u64)..10).collect();
        assert_eq!(received, expected_tail);
        assert_eq!(
            bus.dropped_event_count(),
            10 - received.len() as u64
        );
    }

    struct ScriptedSource {
        events: Vec<CdcEvent>,
    }

    impl ReplicationSource for ScriptedSource {
        async fn next_event(&mut self) -> anyhow::Result<Option<CdcEvent>> {
            if self.events.is_empty() {
                Ok(None)
            } else {
                Ok(Some(self.events.remove(0)))
            }
        }
    }

    #[tokio::test]
    async fn spawned_source_is_pumped_until_exhausted() {
        let bus = Arc::new(CdcBus::default());
        let mut stream = Box::pin(bus.table_stream("customer"));

        let handle = bus.spawn(ScriptedSource {
            events: vec![
                event(CdcEventType::Begin, "", "BEGIN"),
                event(CdcEventType::Insert, "customer", "INSERT"),
                event(CdcEventType::Commit, "", "COMMIT"),
            ],
        });

        let received = stream.next().await.unwrap();
        assert_eq!(received.event_type, CdcEventType::Insert);

        handle.await.unwrap();
        assert!(!bus.is_running());
    }
}
