//! Method dispatch: handler traits and the table that holds them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use protomcp_types::JsonRpcError;

use crate::context::RequestContext;

/// Handles one request method, returning a result value or a structured
/// application error.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle `params` for a single request, with `ctx` carrying
    /// cancellation, auth, and peer send-back.
    async fn handle(&self, params: Option<Value>, ctx: RequestContext) -> Result<Value, JsonRpcError>;
}

/// Handles one notification method. No response is ever produced.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    /// Handle `params` for a single notification.
    async fn handle(&self, params: Option<Value>, ctx: RequestContext);
}

/// Adapts a boxed async closure to [`Handler`], for callers who would
/// rather not name a type than implement the trait directly.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Option<Value>, RequestContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, JsonRpcError>> + Send,
{
    async fn handle(&self, params: Option<Value>, ctx: RequestContext) -> Result<Value, JsonRpcError> {
        (self.0)(params, ctx).await
    }
}

/// Registry of method -> [`Handler`] and notification -> [`NotificationHandler`].
///
/// Held behind an `RwLock` rather than a `DashMap` because registration
/// happens at startup and is read far more often than it is written;
/// readers never block each other and writers are rare.
#[derive(Default)]
pub(crate) struct HandlerTable {
    requests: RwLock<HashMap<String, Arc<dyn Handler>>>,
    notifications: RwLock<HashMap<String, Arc<dyn NotificationHandler>>>,
}

impl HandlerTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn set_request_handler(&self, method: impl Into<String>, handler: Arc<dyn Handler>) {
        self.requests.write().await.insert(method.into(), handler);
    }

    pub(crate) async fn set_notification_handler(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn NotificationHandler>,
    ) {
        self.notifications.write().await.insert(method.into(), handler);
    }

    pub(crate) async fn request_handler(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self.requests.read().await.get(method).cloned()
    }

    pub(crate) async fn notification_handler(&self, method: &str) -> Option<Arc<dyn NotificationHandler>> {
        self.notifications.read().await.get(method).cloned()
    }
}
