//! Newline-delimited JSON transport over standard input/output.
//!
//! Each line on stdin is one JSON-RPC message (or batch, as a JSON array);
//! each outbound message is serialized to a single line on stdout. This is
//! the transport CLI-hosted MCP servers use; the CLI entry point itself is
//! out of scope (see spec §1), only the transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use protomcp_types::JsonRpcMessage;

use crate::error::{TransportError, TransportResult};
use crate::traits::{Transport, TransportEventSink};
use crate::types::{MessageExtra, SendOptions, TransportMessage};

/// Stdio transport: reads newline-delimited JSON from `stdin`, writes
/// newline-delimited JSON to `stdout`.
pub struct StdioTransport {
    sink: Mutex<Option<Arc<dyn TransportEventSink>>>,
    open: AtomicBool,
    out_tx: mpsc::UnboundedSender<String>,
    out_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    self_ref: Mutex<Weak<Self>>,
}

impl Default for StdioTransport {
    fn default() -> Self {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        Self {
            sink: Mutex::new(None),
            open: AtomicBool::new(false),
            out_tx,
            out_rx: Mutex::new(Some(out_rx)),
            self_ref: Mutex::new(Weak::new()),
        }
    }
}

impl StdioTransport {
    /// Construct a new, unstarted stdio transport.
    pub fn new() -> Arc<Self> {
        let transport = Arc::new(Self::default());
        *transport.self_ref.lock() = Arc::downgrade(&transport);
        transport
    }

    fn parse_line(line: &str) -> Result<TransportMessage, TransportError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(TransportError::MalformedFrame {
                reason: "empty line".to_string(),
                fatal: false,
            });
        }
        let value: serde_json::Value = serde_json::from_str(trimmed)?;
        if value.is_array() {
            let batch: Vec<JsonRpcMessage> = serde_json::from_value(value)?;
            Ok(TransportMessage::Batch(batch))
        } else {
            let msg: JsonRpcMessage = serde_json::from_value(value)?;
            Ok(TransportMessage::Single(msg))
        }
    }

    fn encode(message: &TransportMessage) -> TransportResult<String> {
        let value = match message {
            TransportMessage::Single(msg) => serde_json::to_value(msg)?,
            TransportMessage::Batch(msgs) => serde_json::to_value(msgs)?,
        };
        Ok(serde_json::to_string(&value)?)
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn set_event_sink(&self, sink: Arc<dyn TransportEventSink>) {
        *self.sink.lock() = Some(sink);
    }

    async fn start(&self) -> TransportResult<()> {
        if self.open.swap(true, Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed(
                "already started".to_string(),
            ));
        }

        let this = self
            .self_ref
            .lock()
            .upgrade()
            .expect("StdioTransport must be held as an Arc (via StdioTransport::new())");

        // Reader task: stdin -> sink.on_message / on_error.
        let reader_handle = Arc::clone(&this);
        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let mut lines = BufReader::new(stdin).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match Self::parse_line(&line) {
                        Ok(msg) => {
                            if let Some(sink) = reader_handle.sink.lock().clone() {
                                sink.on_message(msg, MessageExtra::default()).await;
                            }
                        }
                        Err(err) => {
                            if let Some(sink) = reader_handle.sink.lock().clone() {
                                sink.on_error(err).await;
                            }
                        }
                    },
                    Ok(None) => break, // EOF
                    Err(io_err) => {
                        if let Some(sink) = reader_handle.sink.lock().clone() {
                            sink.on_error(io_err.into()).await;
                        }
                        break;
                    }
                }
            }
            reader_handle.open.store(false, Ordering::SeqCst);
            if let Some(sink) = reader_handle.sink.lock().clone() {
                sink.on_close().await;
            }
        });

        // Writer task: out_rx -> stdout, serializes all writes.
        let mut out_rx = self
            .out_rx
            .lock()
            .take()
            .expect("start() called twice on the same StdioTransport");
        tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(line) = out_rx.recv().await {
                if stdout.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdout.write_all(b"\n").await.is_err() {
                    break;
                }
                let _ = stdout.flush().await;
            }
        });

        Ok(())
    }

    async fn send(&self, message: TransportMessage, _opts: SendOptions) -> TransportResult<()> {
        if !self.is_open() {
            return Err(TransportError::NotOpen("stdio transport not started".to_string()));
        }
        let line = Self::encode(&message)?;
        self.out_tx
            .send(line)
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

    #[test]
    fn parses_single_and_batch_frames() {
        let single = StdioTransport::parse_line(r#"{"jsonrpc":"2.0","method":"ping"}"#).unwrap();
        assert!(matches!(single, TransportMessage::Single(_)));

        let batch = StdioTransport::parse_line(
            r#"[{"jsonrpc":"2.0","method":"a"},{"jsonrpc":"2.0","method":"b"}]"#,
        )
        .unwrap();
        assert!(matches!(batch, TransportMessage::Batch(items) if items.len() == 2));
    }

    #[test]
    fn rejects_empty_line_without_closing() {
        let err = StdioTransport::parse_line("   ").unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn rejects_malformed_json_non_fatally() {
        let err = StdioTransport::parse_line("not json").unwrap_err();
        assert!(!err.is_fatal());
    }
}
