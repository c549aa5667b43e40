//! In-memory paired transport: two endpoints wired together by channels.
//!
//! Used for tests and for embedding a client and server in the same
//! process without going through a real I/O transport.

use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{TransportError, TransportResult};
use crate::traits::{Transport, TransportEventSink};
use crate::types::{MessageExtra, SendOptions, TransportMessage};

/// One side of an in-memory transport pair. Create both endpoints at once
/// with [`InMemoryTransport::pair`].
#[derive(Debug)]
pub struct InMemoryTransport {
    outbound: mpsc::UnboundedSender<TransportMessage>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<TransportMessage>>>,
    sink: Mutex<Option<Arc<dyn TransportEventSink>>>,
    open: AtomicBool,
    self_ref: Mutex<Weak<Self>>,
}

impl InMemoryTransport {
    /// Build two endpoints, each other's peer.
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Arc::new(Self {
            outbound: tx_b,
            inbound: Mutex::new(Some(rx_a)),
            sink: Mutex::new(None),
            open: AtomicBool::new(false),
            self_ref: Mutex::new(Weak::new()),
        });
        *a.self_ref.lock() = Arc::downgrade(&a);

        let b = Arc::new(Self {
            outbound: tx_a,
            inbound: Mutex::new(Some(rx_b)),
            sink: Mutex::new(None),
            open: AtomicBool::new(false),
            self_ref: Mutex::new(Weak::new()),
        });
        *b.self_ref.lock() = Arc::downgrade(&b);

        (a, b)
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    fn set_event_sink(&self, sink: Arc<dyn TransportEventSink>) {
        *self.sink.lock() = Some(sink);
    }

    async fn start(&self) -> TransportResult<()> {
        if self.open.swap(true, Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed(
                "already started".to_string(),
            ));
        }
        let mut rx = self
            .inbound
            .lock()
            .take()
            .expect("start() called twice on the same InMemoryTransport endpoint");
        let this = self
            .self_ref
            .lock()
            .upgrade()
            .expect("InMemoryTransport must be held as an Arc (via pair())");
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Some(sink) = this.sink.lock().clone() {
                    sink.on_message(msg, MessageExtra::default()).await;
                }
            }
            if this.open.swap(false, Ordering::SeqCst) {
                if let Some(sink) = this.sink.lock().clone() {
                    sink.on_close().await;
                }
            }
        });
        Ok(())
    }

    async fn send(&self, message: TransportMessage, _opts: SendOptions) -> TransportResult<()> {
        if !self.is_open() {
            return Err(TransportError::NotOpen(
                "in-memory transport not started".to_string(),
            ));
        }
        self.outbound
            .send(message)
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&self) -> TransportResult<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            if let Some(sink) = self.sink.lock().clone() {
                sink.on_close().await;
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protomcp_types::{JsonRpcNotification, JsonRpcMessage};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct CountingSink {
        count: AtomicUsize,
        notify: Notify,
    }

    #[async_trait]
    impl TransportEventSink for CountingSink {
        async fn on_message(&self, _message: TransportMessage, _extra: MessageExtra) {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
        }
        async fn on_error(&self, _error: TransportError) {}
        async fn on_close(&self) {}
    }

    #[tokio::test]
    async fn paired_endpoints_deliver_messages() {
        let (a, b) = InMemoryTransport::pair();
        a.start().await.unwrap();
        b.start().await.unwrap();

        let sink = Arc::new(CountingSink {
            count: AtomicUsize::new(0),
            notify: Notify::new(),
        });
        b.set_event_sink(sink.clone());

        let note = JsonRpcMessage::Notification(JsonRpcNotification::new("ping", None));
        a.send(note.into(), SendOptions::default()).await.unwrap();

        sink.notify.notified().await;
        assert_eq!(sink.count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_before_start_fails_loudly() {
        let (a, _b) = InMemoryTransport::pair();
        let note = JsonRpcMessage::Notification(JsonRpcNotification::new("ping", None));
        let result = a.send(note.into(), SendOptions::default()).await;
        assert!(result.is_err());
    }
}
