//! Broadcast hub implementation
//!
//! Fans every published message out to all attached subscribers. Delivery
//! runs on the publishing task: the message is encoded once, then handed to
//! each sink with a non-blocking `try_deliver`. Sinks that are gone or refuse
//! the message are pruned.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use dashmap::DashMap;

use crate::registry::{ConnectionState, DeviceId, DeviceRecord};

use super::message::{self, EncodedMessage, ServerMessage};
use super::subscriber::{SessionId, Subscriber};

/// Central fan-out point for frames and device events
pub struct BroadcastHub {
    /// Attached subscribers, held weakly; the transport owns the sink
    subscribers: DashMap<SessionId, Weak<dyn Subscriber>>,

    /// Next session ID to hand out
    next_session_id: AtomicU64,
}

impl BroadcastHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Allocate a session ID for a new subscriber connection
    pub fn next_session_id(&self) -> SessionId {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Attach a subscriber
    ///
    /// The subscriber immediately receives a welcome message. No earlier
    /// frames are replayed. Returns false if the welcome could not be
    /// delivered, in which case the subscriber is not attached.
    pub fn subscribe(&self, session_id: SessionId, sink: &Arc<dyn Subscriber>) -> bool {
        let welcome = match message::encode(&ServerMessage::welcome()) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(session_id = session_id, error = %e, "Failed to encode welcome");
                return false;
            }
        };

        if let Err(e) = sink.try_deliver(&welcome) {
            tracing::warn!(session_id = session_id, error = %e, "Subscriber refused welcome");
            return false;
        }

        self.subscribers.insert(session_id, Arc::downgrade(sink));

        tracing::info!(
            session_id = session_id,
            subscribers = self.subscribers.len(),
            "Subscriber added"
        );
        true
    }

    /// Detach a subscriber
    ///
    /// Returns false if the session was not attached (already pruned).
    pub fn unsubscribe(&self, session_id: SessionId) -> bool {
        let removed = self.subscribers.remove(&session_id).is_some();

        if removed {
            tracing::info!(
                session_id = session_id,
                subscribers = self.subscribers.len(),
                "Subscriber removed"
            );
        }
        removed
    }

    /// Number of attached subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Check whether a session is attached
    pub fn is_subscribed(&self, session_id: SessionId) -> bool {
        self.subscribers.contains_key(&session_id)
    }

    /// Deliver a message to every subscriber
    ///
    /// Returns the number of subscribers that accepted it. Nothing is encoded
    /// when no one is listening.
    pub fn publish(&self, message: &ServerMessage) -> usize {
        if self.subscribers.is_empty() {
            return 0;
        }

        match message::encode(message) {
            Ok(encoded) => self.deliver_all(&encoded, message.kind()),
            Err(e) => {
                tracing::error!(kind = message.kind(), error = %e, "Failed to encode message");
                0
            }
        }
    }

    /// Publish one JPEG frame from a device
    pub fn publish_frame(&self, device_id: DeviceId, frame: &Bytes) -> usize {
        if frame.is_empty() || self.subscribers.is_empty() {
            return 0;
        }
        self.publish(&ServerMessage::frame(device_id, frame))
    }

    /// Publish a device connection state change
    pub fn publish_device_status(&self, device_id: DeviceId, state: ConnectionState) -> usize {
        self.publish(&ServerMessage::device_status(device_id, state))
    }

    /// Publish a device list snapshot
    pub fn publish_device_list(&self, devices: &[DeviceRecord]) -> usize {
        if self.subscribers.is_empty() {
            return 0;
        }
        self.publish(&ServerMessage::device_list(devices))
    }

    /// Deliver a message to a single subscriber
    ///
    /// A failed delivery detaches the subscriber, as with broadcasts.
    pub fn send_to(&self, session_id: SessionId, message: &ServerMessage) -> bool {
        let sink = self.subscribers.get(&session_id).and_then(|w| w.upgrade());
        let Some(sink) = sink else {
            self.subscribers.remove(&session_id);
            return false;
        };

        let encoded = match message::encode(message) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(kind = message.kind(), error = %e, "Failed to encode message");
                return false;
            }
        };

        match sink.try_deliver(&encoded) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(session_id = session_id, error = %e, "Dropping subscriber");
                sink.close();
                self.subscribers.remove(&session_id);
                false
            }
        }
    }

    /// Close every sink and detach all subscribers
    pub fn close_all(&self) {
        for entry in self.subscribers.iter() {
            if let Some(sink) = entry.value().upgrade() {
                sink.close();
            }
        }
        let count = self.subscribers.len();
        self.subscribers.clear();

        tracing::info!(subscribers = count, "All subscribers closed");
    }

    fn deliver_all(&self, encoded: &EncodedMessage, kind: &'static str) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        for entry in self.subscribers.iter() {
            let session_id = *entry.key();
            match entry.value().upgrade() {
                Some(sink) => match sink.try_deliver(encoded) {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        tracing::warn!(
                            session_id = session_id,
                            kind = kind,
                            error = %e,
                            "Dropping subscriber"
                        );
                        sink.close();
                        dead.push(session_id);
                    }
                },
                None => {
                    tracing::debug!(session_id = session_id, "Pruning released subscriber");
                    dead.push(session_id);
                }
            }
        }

        // Removal happens after iteration; DashMap shards are read-locked above
        for session_id in dead {
            self.subscribers.remove(&session_id);
        }

        delivered
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::subscriber::testing::RecordingSink;
    use super::*;

    fn attach(hub: &BroadcastHub, sink: RecordingSink) -> (SessionId, Arc<RecordingSink>) {
        let sink = Arc::new(sink);
        let dyn_sink: Arc<dyn Subscriber> = sink.clone();
        let session_id = hub.next_session_id();
        assert!(hub.subscribe(session_id, &dyn_sink));
        (session_id, sink)
    }

    #[test]
    fn test_subscribe_sends_welcome() {
        let hub = BroadcastHub::new();
        let (session_id, sink) = attach(&hub, RecordingSink::new());

        assert!(hub.is_subscribed(session_id));
        assert_eq!(sink.kinds(), vec!["welcome"]);
    }

    #[test]
    fn test_no_backfill_for_late_subscriber() {
        let hub = BroadcastHub::new();
        let (_, early) = attach(&hub, RecordingSink::new());

        hub.publish_frame(DeviceId::new(1), &Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]));
        let (_, late) = attach(&hub, RecordingSink::new());

        assert_eq!(early.kinds(), vec!["welcome", "frame"]);
        assert_eq!(late.kinds(), vec!["welcome"]);
    }

    #[test]
    fn test_failing_subscriber_is_pruned() {
        let hub = BroadcastHub::new();
        let (_, first) = attach(&hub, RecordingSink::new());
        // Welcome is delivery 1, so the 3rd delivery is the second status event
        let (flaky_id, flaky) = attach(&hub, RecordingSink::failing_on(3));
        let (_, last) = attach(&hub, RecordingSink::new());

        for id in 1..=4 {
            hub.publish_device_status(DeviceId::new(id), ConnectionState::Online);
            if id == 2 {
                assert!(!hub.is_subscribed(flaky_id));
            }
        }

        assert_eq!(hub.subscriber_count(), 2);
        assert_eq!(flaky.messages().len(), 2);
        assert_eq!(first.messages().len(), 5);
        assert_eq!(last.messages().len(), 5);
    }

    #[test]
    fn test_released_sink_is_pruned() {
        let hub = BroadcastHub::new();
        let (session_id, sink) = attach(&hub, RecordingSink::new());
        drop(sink);

        let delivered = hub.publish_device_status(DeviceId::new(1), ConnectionState::Offline);

        assert_eq!(delivered, 0);
        assert!(!hub.is_subscribed(session_id));
    }

    #[test]
    fn test_refused_welcome_is_not_attached() {
        let hub = BroadcastHub::new();
        let sink: Arc<dyn Subscriber> = Arc::new(RecordingSink::failing_on(1));

        assert!(!hub.subscribe(7, &sink));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = BroadcastHub::new();
        assert_eq!(hub.publish_device_list(&[]), 0);
        assert_eq!(hub.publish_frame(DeviceId::new(1), &Bytes::from_static(b"x")), 0);
    }

    #[test]
    fn test_send_to_single_subscriber() {
        let hub = BroadcastHub::new();
        let (a_id, a) = attach(&hub, RecordingSink::new());
        let (_, b) = attach(&hub, RecordingSink::new());

        assert!(hub.send_to(a_id, &ServerMessage::pong()));
        assert!(!hub.send_to(999, &ServerMessage::pong()));

        assert_eq!(a.kinds(), vec!["welcome", "pong"]);
        assert_eq!(b.kinds(), vec!["welcome"]);
    }

    #[test]
    fn test_unsubscribe() {
        let hub = BroadcastHub::new();
        let (session_id, sink) = attach(&hub, RecordingSink::new());

        assert!(hub.unsubscribe(session_id));
        assert!(!hub.unsubscribe(session_id));

        hub.publish_device_status(DeviceId::new(1), ConnectionState::Online);
        assert_eq!(sink.messages().len(), 1);
    }

    #[derive(Clone, Default)]
    struct LogCapture(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
        type Writer = LogCapture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_repeated_unsubscribe_logs_once() {
        let hub = BroadcastHub::new();
        let (session_id, _sink) = attach(&hub, RecordingSink::new());

        let logs = LogCapture::default();
        let collector = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(collector, || {
            assert!(hub.unsubscribe(session_id));
            assert!(!hub.unsubscribe(session_id));
        });

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output.matches("Subscriber removed").count(), 1);
    }

    #[test]
    fn test_close_all() {
        let hub = BroadcastHub::new();
        let (_, a) = attach(&hub, RecordingSink::new());
        let (_, b) = attach(&hub, RecordingSink::new());

        hub.close_all();

        assert_eq!(hub.subscriber_count(), 0);
        assert!(a.is_closed());
        assert!(b.is_closed());
    }

    #[test]
    fn test_session_ids_are_unique() {
        let hub = BroadcastHub::new();
        let a = hub.next_session_id();
        let b = hub.next_session_id();
        assert_ne!(a, b);
    }
}
