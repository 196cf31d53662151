//! Subscriber sinks
//!
//! The transport layer owns each sink; the hub only keeps a `Weak` handle to
//! it. A sink must accept or refuse a message immediately: there is no await
//! on the delivery path.

use std::fmt;
use std::sync::Mutex;

use tokio::sync::mpsc;

use super::message::EncodedMessage;

/// Identifier of one subscriber connection
pub type SessionId = u64;

/// Destination for encoded hub messages
pub trait Subscriber: Send + Sync {
    /// Hand a message to the sink without waiting
    fn try_deliver(&self, message: &EncodedMessage) -> Result<(), DeliveryError>;

    /// Whether the sink can still accept messages
    fn is_open(&self) -> bool;

    /// Close the sink; later deliveries fail with [`DeliveryError::Closed`]
    fn close(&self);
}

/// Why a delivery was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The sink's buffer is full; the subscriber is not keeping up
    Full,
    /// The sink was closed or its receiver dropped
    Closed,
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Full => write!(f, "subscriber queue full"),
            DeliveryError::Closed => write!(f, "subscriber closed"),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Sink backed by a bounded `mpsc` channel
///
/// The receiving half is drained by the transport task that writes to the
/// actual socket.
pub struct ChannelSink {
    tx: Mutex<Option<mpsc::Sender<EncodedMessage>>>,
}

impl ChannelSink {
    /// Create a sink and the receiver its transport task should drain
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EncodedMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            tx: Mutex::new(Some(tx)),
        };
        (sink, rx)
    }
}

impl Subscriber for ChannelSink {
    fn try_deliver(&self, message: &EncodedMessage) -> Result<(), DeliveryError> {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let tx = guard.as_ref().ok_or(DeliveryError::Closed)?;

        tx.try_send(message.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    fn is_open(&self) -> bool {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    fn close(&self) {
        // Dropping the sender ends the receiver once it has drained
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

impl fmt::Debug for ChannelSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSink")
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory sinks for hub tests

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Records every delivered message; optionally fails on the n-th delivery
    #[derive(Default)]
    pub struct RecordingSink {
        pub messages: Mutex<Vec<String>>,
        pub fail_on: Option<usize>,
        attempts: Mutex<usize>,
        closed: AtomicBool,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_on(n: usize) -> Self {
            Self {
                fail_on: Some(n),
                ..Self::default()
            }
        }

        pub fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }

        /// Message `type` tags, in delivery order
        pub fn kinds(&self) -> Vec<String> {
            self.messages()
                .iter()
                .map(|m| {
                    let json: serde_json::Value = serde_json::from_str(m).unwrap();
                    json["type"].as_str().unwrap().to_string()
                })
                .collect()
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    impl Subscriber for RecordingSink {
        fn try_deliver(&self, message: &EncodedMessage) -> Result<(), DeliveryError> {
            if self.is_closed() {
                return Err(DeliveryError::Closed);
            }
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            if self.fail_on == Some(*attempts) {
                return Err(DeliveryError::Closed);
            }
            self.messages.lock().unwrap().push(message.to_string());
            Ok(())
        }

        fn is_open(&self) -> bool {
            !self.is_closed()
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let (sink, mut rx) = ChannelSink::new(4);
        let message: EncodedMessage = Arc::from("hello");

        sink.try_deliver(&message).unwrap();

        assert_eq!(&*rx.recv().await.unwrap(), "hello");
        assert!(sink.is_open());
    }

    #[tokio::test]
    async fn test_channel_sink_full() {
        let (sink, _rx) = ChannelSink::new(1);
        let message: EncodedMessage = Arc::from("x");

        sink.try_deliver(&message).unwrap();
        assert_eq!(sink.try_deliver(&message), Err(DeliveryError::Full));
    }

    #[tokio::test]
    async fn test_channel_sink_receiver_dropped() {
        let (sink, rx) = ChannelSink::new(1);
        drop(rx);

        assert!(!sink.is_open());
        assert_eq!(
            sink.try_deliver(&Arc::from("x")),
            Err(DeliveryError::Closed)
        );
    }

    #[tokio::test]
    async fn test_channel_sink_close_ends_receiver() {
        let (sink, mut rx) = ChannelSink::new(2);
        sink.try_deliver(&Arc::from("last")).unwrap();

        sink.close();

        assert!(!sink.is_open());
        assert_eq!(&*rx.recv().await.unwrap(), "last");
        assert!(rx.recv().await.is_none());
    }
}
