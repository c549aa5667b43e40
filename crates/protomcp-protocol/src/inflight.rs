//! The in-flight outbound request record and its state machine.
//!
//! State machine per §4.2: `Pending -> (Progress*)+ -> {Resolved | Rejected
//! | Cancelled | TimedOut}`. Terminal states remove the record from the
//! owning [`crate::Protocol`]'s map; this module only models the record
//! itself, not the map.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;

use protomcp_types::ProgressToken;

use crate::error::ProtocolError;

/// Outcome delivered to the original caller of [`crate::Protocol::request`].
pub type RequestOutcome = Result<Value, ProtocolError>;

/// Caller-supplied deadline and progress options for a single request.
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Deadline from send time. `None` means no per-request timeout.
    pub timeout_ms: Option<u64>,
    /// Hard cap that `reset_timeout_on_progress` cannot extend past.
    pub max_total_timeout_ms: Option<u64>,
    /// If true, each matching `notifications/progress` resets the
    /// `timeout_ms` deadline (never the `max_total_timeout_ms` one).
    pub reset_timeout_on_progress: bool,
    /// Invoked for every `notifications/progress` whose token matches this
    /// request's id.
    pub on_progress: Option<std::sync::Arc<dyn Fn(f64, Option<f64>, Option<String>) + Send + Sync>>,
    /// Caller-controlled early cancellation, independent of timeouts.
    pub signal: Option<CancellationToken>,
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("timeout_ms", &self.timeout_ms)
            .field("max_total_timeout_ms", &self.max_total_timeout_ms)
            .field("reset_timeout_on_progress", &self.reset_timeout_on_progress)
            .field("on_progress", &self.on_progress.is_some())
            .field("signal", &self.signal.is_some())
            .finish()
    }
}

/// Bookkeeping for one outbound request awaiting a response.
pub(crate) struct InFlight {
    pub(crate) progress_token: ProgressToken,
    pub(crate) started_at: Instant,
    pub(crate) reset_timeout_on_progress: bool,
    pub(crate) on_progress: Option<std::sync::Arc<dyn Fn(f64, Option<f64>, Option<String>) + Send + Sync>>,
    /// Notified whenever a matching progress notification arrives, so the
    /// waiter in `Protocol::await_response` can reset its deadline window
    /// without polling.
    pub(crate) reset_notify: Arc<Notify>,
    pub(crate) cancellation: CancellationToken,
    pub(crate) responder: Option<oneshot::Sender<RequestOutcome>>,
}

impl InFlight {
    pub(crate) fn new(progress_token: ProgressToken, opts: &RequestOptions, responder: oneshot::Sender<RequestOutcome>) -> Self {
        Self {
            progress_token,
            started_at: Instant::now(),
            reset_timeout_on_progress: opts.reset_timeout_on_progress,
            on_progress: opts.on_progress.clone(),
            reset_notify: Arc::new(Notify::new()),
            cancellation: CancellationToken::new(),
            responder: Some(responder),
        }
    }

    /// Elapsed time since the request was sent.
    pub(crate) fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Resolve with a terminal outcome. No-op if already resolved (a
    /// cancellation racing a response is expected and harmless).
    pub(crate) fn resolve(&mut self, outcome: RequestOutcome) {
        if let Some(tx) = self.responder.take() {
            let _ = tx.send(outcome);
        }
    }

    /// Deliver a progress update: invoke the callback, then reset the
    /// waiter's deadline window if configured to do so.
    pub(crate) fn on_progress(&self, progress: f64, total: Option<f64>, message: Option<String>) {
        if let Some(cb) = &self.on_progress {
            cb(progress, total, message);
        }
        if self.reset_timeout_on_progress {
            self.reset_notify.notify_one();
        }
    }
}
